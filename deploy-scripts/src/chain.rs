//! The chain client: the single interface through which the pipeline
//! touches the blockchain, with an ethers-backed production implementation

use std::{future::Future, path::Path, process::Command, str::FromStr, sync::Arc, time::Duration};

use async_trait::async_trait;
use ethers::{
    abi::{self, Abi, Token},
    contract::{ContractError, ContractFactory},
    middleware::SignerMiddleware,
    providers::{Http, Middleware, Provider},
    signers::{LocalWallet, Signer},
    types::{
        transaction::eip2718::TypedTransaction, Address, Bytes, TransactionRequest, H256, U64,
    },
};
use tracing::warn;

use crate::{
    constants::{
        FORGE_COMMAND, IMPLEMENTATION_STORAGE_SLOT, INITIAL_RETRY_DELAY_MS, MAX_RPC_ATTEMPTS,
        NUM_BYTES_ADDRESS, NUM_BYTES_STORAGE_SLOT, NUM_DEPLOY_CONFIRMATIONS,
        PROXY_ADMIN_STORAGE_SLOT, VERIFY_CONTRACT_COMMAND,
    },
    errors::ScriptError,
};

/// The on-chain operations the pipeline depends on.
///
/// Production runs use [`EthersClient`]; tests substitute an in-memory
/// double so orchestration logic can be exercised without a devnet.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// The active signer's public address
    fn deployer_address(&self) -> Address;

    /// The chain ID reported by the RPC endpoint
    async fn chain_id(&self) -> Result<u64, ScriptError>;

    /// Deploys a contract with the given constructor arguments, returning
    /// its address once the deployment transaction is confirmed
    async fn deploy_contract(
        &self,
        contract_abi: &Abi,
        bytecode: &Bytes,
        args: Vec<Token>,
    ) -> Result<Address, ScriptError>;

    /// Deploys an upgradeable proxy pointing at the given implementation,
    /// invoking the implementation's initializer with the given call-data
    async fn deploy_proxy(
        &self,
        proxy_abi: &Abi,
        proxy_bytecode: &Bytes,
        implementation: Address,
        admin_owner: Address,
        init_calldata: Vec<u8>,
    ) -> Result<Address, ScriptError>;

    /// Reads the implementation contract address from the proxy's EIP-1967
    /// implementation slot
    async fn get_implementation_address(&self, proxy: Address) -> Result<Address, ScriptError>;

    /// Reads the proxy admin contract address from the proxy's EIP-1967
    /// admin slot
    async fn get_admin_address(&self, proxy: Address) -> Result<Address, ScriptError>;

    /// Sends a state-mutating call to a deployed contract and waits for it
    /// to be mined
    async fn call_function(
        &self,
        to: Address,
        contract_abi: &Abi,
        function: &str,
        args: Vec<Token>,
    ) -> Result<(), ScriptError>;

    /// Executes a read-only call against a deployed contract
    async fn call_view(
        &self,
        to: Address,
        contract_abi: &Abi,
        function: &str,
        args: Vec<Token>,
    ) -> Result<Vec<Token>, ScriptError>;

    /// Submits a deployed contract for source verification.
    ///
    /// Best-effort: callers log failures as warnings and continue.
    async fn verify_source(
        &self,
        address: Address,
        artifact_path: &Path,
        constructor_args: &[Token],
    ) -> Result<(), ScriptError>;
}

/// Retries a chain operation with bounded exponential backoff.
///
/// Only transport-level errors are retried; reverts and other
/// application-level failures propagate immediately.
pub(crate) async fn with_retries<T, F, Fut>(op_name: &str, op: F) -> Result<T, ScriptError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, ScriptError>>,
{
    let mut delay = Duration::from_millis(INITIAL_RETRY_DELAY_MS);
    let mut attempt = 0;
    loop {
        attempt += 1;
        match op().await {
            Err(e) if e.is_transient() && attempt < MAX_RPC_ATTEMPTS => {
                warn!(attempt, "{op_name} failed with transient error, retrying: {e}");
                tokio::time::sleep(delay).await;
                delay *= 2;
            }
            other => return other,
        }
    }
}

/// Sets up the client with which the pipeline signs and sends transactions,
/// from the deployer's private key and the target RPC url
pub async fn setup_client(
    priv_key: &str,
    rpc_url: &str,
) -> Result<EthersClient<SignerMiddleware<Provider<Http>, LocalWallet>>, ScriptError> {
    let provider = Provider::<Http>::try_from(rpc_url)
        .map_err(|e| ScriptError::ClientInitialization(e.to_string()))?;

    let wallet = LocalWallet::from_str(priv_key)
        .map_err(|e| ScriptError::ClientInitialization(e.to_string()))?;
    let chain_id = provider
        .get_chainid()
        .await
        .map_err(|e| ScriptError::ClientInitialization(e.to_string()))?
        .as_u64();
    let deployer = wallet.address();
    let client = Arc::new(SignerMiddleware::new(
        provider,
        wallet.with_chain_id(chain_id),
    ));

    Ok(EthersClient { client, deployer })
}

/// A [`ChainClient`] backed by an ethers middleware stack
pub struct EthersClient<M: Middleware> {
    /// The signing middleware transactions are sent through
    client: Arc<M>,
    /// The signer's public address
    deployer: Address,
}

impl<M: Middleware> EthersClient<M> {
    /// Wraps an existing middleware stack
    pub fn new(client: Arc<M>, deployer: Address) -> Self {
        Self { client, deployer }
    }

    /// Reads an address out of the given storage slot of a contract
    async fn read_address_slot(
        &self,
        contract: Address,
        slot: &str,
    ) -> Result<Address, ScriptError> {
        let word = self
            .client
            .get_storage_at(
                contract,
                // Can `unwrap` here since we know the storage slot constitutes a valid H256
                H256::from_str(slot).unwrap(),
                None, /* block */
            )
            .await
            .map_err(classify_middleware_error)?;

        Ok(Address::from_slice(
            &word[NUM_BYTES_STORAGE_SLOT - NUM_BYTES_ADDRESS..NUM_BYTES_STORAGE_SLOT],
        ))
    }

    /// Encodes a call to the named function of the given ABI
    fn encode_call(
        contract_abi: &Abi,
        function: &str,
        args: &[Token],
    ) -> Result<Vec<u8>, ScriptError> {
        let function = contract_abi
            .function(function)
            .map_err(|e| ScriptError::CalldataConstruction(e.to_string()))?;
        function
            .encode_input(args)
            .map_err(|e| ScriptError::CalldataConstruction(e.to_string()))
    }
}

#[async_trait]
impl<M: Middleware + 'static> ChainClient for EthersClient<M> {
    fn deployer_address(&self) -> Address {
        self.deployer
    }

    async fn chain_id(&self) -> Result<u64, ScriptError> {
        let chain_id = self
            .client
            .get_chainid()
            .await
            .map_err(classify_middleware_error)?;
        Ok(chain_id.as_u64())
    }

    async fn deploy_contract(
        &self,
        contract_abi: &Abi,
        bytecode: &Bytes,
        args: Vec<Token>,
    ) -> Result<Address, ScriptError> {
        let address = with_retries("contract deployment", || {
            let factory =
                ContractFactory::new(contract_abi.clone(), bytecode.clone(), self.client.clone());
            let args = args.clone();
            async move {
                let contract = factory
                    .deploy_tokens(args)
                    .map_err(|e| ScriptError::CalldataConstruction(e.to_string()))?
                    .confirmations(NUM_DEPLOY_CONFIRMATIONS)
                    .send()
                    .await
                    .map_err(classify_contract_error)?;

                Ok(contract.address())
            }
        })
        .await?;

        Ok(address)
    }

    async fn deploy_proxy(
        &self,
        proxy_abi: &Abi,
        proxy_bytecode: &Bytes,
        implementation: Address,
        admin_owner: Address,
        init_calldata: Vec<u8>,
    ) -> Result<Address, ScriptError> {
        let args = vec![
            Token::Address(implementation),
            Token::Address(admin_owner),
            Token::Bytes(init_calldata),
        ];
        self.deploy_contract(proxy_abi, proxy_bytecode, args).await
    }

    async fn get_implementation_address(&self, proxy: Address) -> Result<Address, ScriptError> {
        with_retries("implementation slot read", || {
            self.read_address_slot(proxy, IMPLEMENTATION_STORAGE_SLOT)
        })
        .await
    }

    async fn get_admin_address(&self, proxy: Address) -> Result<Address, ScriptError> {
        with_retries("admin slot read", || {
            self.read_address_slot(proxy, PROXY_ADMIN_STORAGE_SLOT)
        })
        .await
    }

    async fn call_function(
        &self,
        to: Address,
        contract_abi: &Abi,
        function: &str,
        args: Vec<Token>,
    ) -> Result<(), ScriptError> {
        let data = Self::encode_call(contract_abi, function, &args)?;
        let tx = TransactionRequest::new().to(to).data(data);

        let receipt = self
            .client
            .send_transaction(tx, None /* block */)
            .await
            .map_err(classify_middleware_error)?
            .await
            .map_err(|e| ScriptError::Rpc(e.to_string()))?
            .ok_or_else(|| {
                ScriptError::ContractInteraction("transaction dropped from mempool".to_string())
            })?;

        if receipt.status == Some(U64::zero()) {
            return Err(ScriptError::Reverted(format!("{function} on {to:#x}")));
        }

        Ok(())
    }

    async fn call_view(
        &self,
        to: Address,
        contract_abi: &Abi,
        function: &str,
        args: Vec<Token>,
    ) -> Result<Vec<Token>, ScriptError> {
        let function = contract_abi
            .function(function)
            .map_err(|e| ScriptError::CalldataConstruction(e.to_string()))?;
        let data = function
            .encode_input(&args)
            .map_err(|e| ScriptError::CalldataConstruction(e.to_string()))?;

        let tx: TypedTransaction = TransactionRequest::new().to(to).data(data).into();
        let output = self
            .client
            .call(&tx, None /* block */)
            .await
            .map_err(classify_middleware_error)?;

        function
            .decode_output(&output)
            .map_err(|e| ScriptError::ContractInteraction(e.to_string()))
    }

    async fn verify_source(
        &self,
        address: Address,
        artifact_path: &Path,
        constructor_args: &[Token],
    ) -> Result<(), ScriptError> {
        let contract_name = artifact_path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .ok_or_else(|| {
                ScriptError::Verification(format!(
                    "could not derive contract name from {}",
                    artifact_path.display()
                ))
            })?;
        let chain_id = self.chain_id().await?;

        let mut verify_cmd = Command::new(FORGE_COMMAND);
        verify_cmd.arg(VERIFY_CONTRACT_COMMAND);
        verify_cmd.arg(format!("{address:#x}"));
        verify_cmd.arg(contract_name);
        verify_cmd.arg("--chain-id");
        verify_cmd.arg(chain_id.to_string());
        if !constructor_args.is_empty() {
            verify_cmd.arg("--constructor-args");
            verify_cmd.arg(format!("0x{}", hex::encode(abi::encode(constructor_args))));
        }
        verify_cmd.arg("--watch");

        command_success_or(verify_cmd, "source verification failed")
    }
}

/// Maps a contract deployment error to the pipeline taxonomy, keeping
/// reverts permanent and transport failures retryable
fn classify_contract_error<M: Middleware>(e: ContractError<M>) -> ScriptError {
    if e.as_revert().is_some() {
        ScriptError::Reverted(e.to_string())
    } else {
        ScriptError::Rpc(e.to_string())
    }
}

/// Maps a middleware error to the pipeline taxonomy.
///
/// Reverts surfaced during gas estimation arrive as middleware errors, so
/// the message is inspected to keep them out of the retry path.
fn classify_middleware_error<E: std::fmt::Display>(e: E) -> ScriptError {
    let msg = e.to_string();
    if msg.contains("revert") {
        ScriptError::Reverted(msg)
    } else {
        ScriptError::Rpc(msg)
    }
}

/// Runs a command to completion, mapping a non-zero exit status to a
/// verification error
fn command_success_or(mut cmd: Command, err_msg: &str) -> Result<(), ScriptError> {
    if !cmd
        .output()
        .map_err(|e| ScriptError::Verification(e.to_string()))?
        .status
        .success()
    {
        Err(ScriptError::Verification(String::from(err_msg)))
    } else {
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod mock {
    //! An in-memory chain client double recording every deployment and call

    use std::{
        collections::HashMap,
        path::Path,
        sync::Mutex,
    };

    use async_trait::async_trait;
    use ethers::{
        abi::{Abi, Token},
        types::{Address, Bytes},
    };

    use crate::errors::ScriptError;

    use super::ChainClient;

    /// The chain ID reported by the mock
    pub(crate) const MOCK_CHAIN_ID: u64 = 31337;

    /// One recorded contract deployment
    #[derive(Clone, Debug)]
    pub(crate) struct MockDeployment {
        /// The address allocated to the deployment
        pub address: Address,
        /// The constructor (or proxy-constructor) arguments it was deployed
        /// with
        pub args: Vec<Token>,
    }

    /// One recorded state-mutating call
    #[derive(Clone, Debug)]
    pub(crate) struct MockCall {
        /// The called contract
        pub to: Address,
        /// The called function name
        pub function: String,
        /// The call arguments
        pub args: Vec<Token>,
    }

    /// Mutable mock state
    #[derive(Default)]
    struct MockState {
        /// Counter driving deterministic address allocation
        next_address: u64,
        /// Every deployment in order
        deployments: Vec<MockDeployment>,
        /// Every state-mutating call in order
        calls: Vec<MockCall>,
        /// Proxy address -> implementation address
        implementations: HashMap<Address, Address>,
        /// Proxy address -> proxy admin address
        admins: HashMap<Address, Address>,
        /// Addresses submitted for verification
        verified: Vec<Address>,
    }

    /// An in-memory [`ChainClient`]
    #[derive(Default)]
    pub(crate) struct MockClient {
        /// Recorded chain state
        state: Mutex<MockState>,
        /// When set, `verify_source` fails; used to assert that
        /// verification is best-effort
        fail_verification: bool,
    }

    impl MockClient {
        /// Creates an empty mock
        pub fn new() -> Self {
            Self::default()
        }

        /// Creates a mock whose `verify_source` always fails
        pub fn with_failing_verification() -> Self {
            Self {
                fail_verification: true,
                ..Self::default()
            }
        }

        /// Allocates the next deterministic contract address
        fn allocate_address(state: &mut MockState) -> Address {
            state.next_address += 1;
            Address::from_low_u64_be(0x1000 + state.next_address)
        }

        /// The number of contract deployments performed
        pub fn deployment_count(&self) -> usize {
            self.state.lock().unwrap().deployments.len()
        }

        /// Every deployment in order
        pub fn deployments(&self) -> Vec<MockDeployment> {
            self.state.lock().unwrap().deployments.clone()
        }

        /// Every state-mutating call in order
        pub fn calls(&self) -> Vec<MockCall> {
            self.state.lock().unwrap().calls.clone()
        }

        /// Addresses submitted for verification
        pub fn verified(&self) -> Vec<Address> {
            self.state.lock().unwrap().verified.clone()
        }
    }

    #[async_trait]
    impl ChainClient for MockClient {
        fn deployer_address(&self) -> Address {
            Address::repeat_byte(0xAA)
        }

        async fn chain_id(&self) -> Result<u64, ScriptError> {
            Ok(MOCK_CHAIN_ID)
        }

        async fn deploy_contract(
            &self,
            _contract_abi: &Abi,
            _bytecode: &Bytes,
            args: Vec<Token>,
        ) -> Result<Address, ScriptError> {
            let mut state = self.state.lock().unwrap();
            let address = Self::allocate_address(&mut state);
            state.deployments.push(MockDeployment { address, args });
            Ok(address)
        }

        async fn deploy_proxy(
            &self,
            _proxy_abi: &Abi,
            _proxy_bytecode: &Bytes,
            implementation: Address,
            admin_owner: Address,
            init_calldata: Vec<u8>,
        ) -> Result<Address, ScriptError> {
            let mut state = self.state.lock().unwrap();
            let proxy = Self::allocate_address(&mut state);
            let admin = Self::allocate_address(&mut state);
            state.deployments.push(MockDeployment {
                address: proxy,
                args: vec![
                    Token::Address(implementation),
                    Token::Address(admin_owner),
                    Token::Bytes(init_calldata),
                ],
            });
            state.implementations.insert(proxy, implementation);
            state.admins.insert(proxy, admin);
            Ok(proxy)
        }

        async fn get_implementation_address(&self, proxy: Address) -> Result<Address, ScriptError> {
            self.state
                .lock()
                .unwrap()
                .implementations
                .get(&proxy)
                .copied()
                .ok_or_else(|| ScriptError::ContractInteraction(format!("no proxy at {proxy:#x}")))
        }

        async fn get_admin_address(&self, proxy: Address) -> Result<Address, ScriptError> {
            self.state
                .lock()
                .unwrap()
                .admins
                .get(&proxy)
                .copied()
                .ok_or_else(|| ScriptError::ContractInteraction(format!("no proxy at {proxy:#x}")))
        }

        async fn call_function(
            &self,
            to: Address,
            _contract_abi: &Abi,
            function: &str,
            args: Vec<Token>,
        ) -> Result<(), ScriptError> {
            self.state.lock().unwrap().calls.push(MockCall {
                to,
                function: function.to_string(),
                args,
            });
            Ok(())
        }

        async fn call_view(
            &self,
            _to: Address,
            _contract_abi: &Abi,
            function: &str,
            _args: Vec<Token>,
        ) -> Result<Vec<Token>, ScriptError> {
            if function == crate::constants::OWNER_FUNCTION_NAME {
                Ok(vec![Token::Address(self.deployer_address())])
            } else {
                Ok(Vec::new())
            }
        }

        async fn verify_source(
            &self,
            address: Address,
            _artifact_path: &Path,
            _constructor_args: &[Token],
        ) -> Result<(), ScriptError> {
            if self.fail_verification {
                return Err(ScriptError::Verification("explorer unavailable".to_string()));
            }
            self.state.lock().unwrap().verified.push(address);
            Ok(())
        }
    }
}
