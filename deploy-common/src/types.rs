//! Type definitions for contract manifests and deployment records

use std::fmt::{self, Display};

use ethers::abi::Abi;
use ethers::types::Address;
use serde::{de::Error as _, Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::constants::{
    CONTRACT_TAG_PREFIX, DEPLOYER_WALLET_TAG, DEV_WALLET_TAG, ENCODE_INITIALIZER_TAG_PREFIX,
    RECOGNIZED_ROLES, ROLE_TAG_SUFFIX, ZERO_ADDRESS_TAG,
};

/// The network class a chain belongs to
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum NetworkType {
    /// A production network
    Mainnet,
    /// A test network
    Testnet,
}

/// Static per-network wiring, carried in the manifest file header so that
/// deployment records can embed it without consulting the chain
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainProfile {
    /// The logical chain name, e.g. `"amoy"`
    pub name: String,
    /// The chain ID
    pub chain_id: u64,
    /// Whether the chain is a mainnet or testnet
    pub network_type: NetworkType,
    /// The RPC endpoint used for deployments
    pub rpc_url: String,
    /// The chain's native currency symbol
    pub currency: String,
    /// The base URL of the chain's block explorer
    pub explorer_base_url: String,
}

/// A constructor / initializer argument value, parsed from its manifest
/// representation into a tagged variant so that placeholder resolution is an
/// exhaustive match rather than a series of string-prefix checks
#[derive(Clone, Debug, PartialEq)]
pub enum ArgValue {
    /// A literal value passed through unchanged
    Literal(Value),
    /// The active signer's public address
    DeployerWallet,
    /// The chain's null-address sentinel
    ZeroAddress,
    /// A well-known role-constant hash, by role name
    RoleConstant(String),
    /// The deployed address of the named sibling contract, deploying it on
    /// demand if absent
    ContractRef(String),
    /// ABI-encoded call-data for the named implementation contract's
    /// initializer
    EncodedInitializer(String),
}

impl ArgValue {
    /// Classifies a raw manifest value against the enumerated placeholder
    /// tag set.
    ///
    /// Non-string values and strings matching no tag are literals. Malformed
    /// tags (an empty `CONTRACT_` / `ENCODE_INITIALIZE_FUNCTION_` name, or a
    /// `*_ROLE` token outside the recognized role set) are errors so that a
    /// typo fails manifest loading instead of reaching the chain as a
    /// literal string argument.
    pub fn parse(raw: &Value) -> Result<Self, String> {
        let tag = match raw.as_str() {
            Some(tag) => tag,
            None => return Ok(ArgValue::Literal(raw.clone())),
        };

        if tag == DEPLOYER_WALLET_TAG || tag == DEV_WALLET_TAG {
            Ok(ArgValue::DeployerWallet)
        } else if tag == ZERO_ADDRESS_TAG {
            Ok(ArgValue::ZeroAddress)
        } else if let Some(name) = tag.strip_prefix(CONTRACT_TAG_PREFIX) {
            if name.is_empty() {
                Err(format!("unresolvable placeholder tag: {tag}"))
            } else {
                Ok(ArgValue::ContractRef(name.to_string()))
            }
        } else if let Some(name) = tag.strip_prefix(ENCODE_INITIALIZER_TAG_PREFIX) {
            if name.is_empty() {
                Err(format!("unresolvable placeholder tag: {tag}"))
            } else {
                Ok(ArgValue::EncodedInitializer(name.to_string()))
            }
        } else if tag.ends_with(ROLE_TAG_SUFFIX) {
            if RECOGNIZED_ROLES.contains(&tag) {
                Ok(ArgValue::RoleConstant(tag.to_string()))
            } else {
                Err(format!("unrecognized role constant: {tag}"))
            }
        } else {
            Ok(ArgValue::Literal(raw.clone()))
        }
    }

    /// Renders the value back into its raw manifest representation
    pub fn raw(&self) -> Value {
        match self {
            ArgValue::Literal(value) => value.clone(),
            ArgValue::DeployerWallet => Value::String(DEPLOYER_WALLET_TAG.to_string()),
            ArgValue::ZeroAddress => Value::String(ZERO_ADDRESS_TAG.to_string()),
            ArgValue::RoleConstant(name) => Value::String(name.clone()),
            ArgValue::ContractRef(name) => {
                Value::String(format!("{CONTRACT_TAG_PREFIX}{name}"))
            }
            ArgValue::EncodedInitializer(name) => {
                Value::String(format!("{ENCODE_INITIALIZER_TAG_PREFIX}{name}"))
            }
        }
    }
}

impl Display for ArgValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw())
    }
}

impl Serialize for ArgValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.raw().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ArgValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Value::deserialize(deserializer)?;
        ArgValue::parse(&raw).map_err(D::Error::custom)
    }
}

/// A named constructor argument; the list order in the manifest matches the
/// constructor's ABI parameter order
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConstructorArg {
    /// The ABI parameter name
    pub name: String,
    /// The literal or placeholder value
    pub value: ArgValue,
}

/// A function call executed against an already-deployed contract after the
/// full dependency order has been deployed
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostDeployCall {
    /// The logical name of the contract to call
    pub target_contract: String,
    /// The function to invoke
    pub function_name: String,
    /// The (placeholder-resolvable) call arguments, in ABI order
    #[serde(default)]
    pub args: Vec<ArgValue>,
}

/// One facet of an upgradeable proxy, deployed separately and registered
/// against the proxy's extension registry
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtensionManifestEntry {
    /// The compiled artifact file name of the facet
    pub implementation_file_name: String,
    /// Constructor arguments for the facet itself
    #[serde(default)]
    pub constructor_args: Vec<ConstructorArg>,
    /// The subset of the facet's ABI to register against the proxy, as
    /// canonical function signatures
    pub function_signatures_to_expose: Vec<String>,
    /// The name under which the facet is registered
    pub metadata_name: String,
}

/// Static, author-supplied description of one contract's deployment intent
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractManifestEntry {
    /// The logical identifier, unique per chain
    pub name: String,
    /// The compiled artifact file name
    pub implementation_file_name: String,
    /// The category tag embedded in deployment records, unique per chain
    pub contract_type: String,
    /// The chain this entry targets; must match the manifest's chain profile
    pub chain: String,
    /// Whether the entry targets a mainnet or testnet
    pub network_type: NetworkType,
    /// The tenants this contract variant is deployed for, in order
    pub tenants: Vec<String>,
    /// Whether the contract is deployed behind an upgradeable proxy
    #[serde(default)]
    pub upgradable: bool,
    /// Whether to submit the deployed contract for source verification
    #[serde(default)]
    pub verify: bool,
    /// Logical names of contracts that must deploy before this one
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Constructor (or, for upgradable contracts, initializer) arguments
    #[serde(default)]
    pub constructor_args: Vec<ConstructorArg>,
    /// Calls executed after the full dependency order has been deployed
    #[serde(default)]
    pub post_deploy_calls: Vec<PostDeployCall>,
    /// The artifact file name of the proxy deployed in front of an
    /// upgradable implementation; defaults to the transparent proxy
    #[serde(default)]
    pub proxy_file_name: Option<String>,
    /// Facets to deploy and register against an upgradable proxy
    #[serde(default)]
    pub extensions: Vec<ExtensionManifestEntry>,
}

/// A facet registered against a deployed proxy, as embedded in a
/// [`DeploymentRecord`]
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployedExtension {
    /// The name the facet is registered under
    pub name: String,
    /// The facet's deployed address
    pub address: Address,
    /// The facet's full ABI
    pub abi: Abi,
    /// The canonical signatures of the functions exposed through the proxy
    pub exposed_functions: Vec<String>,
}

/// The durable unit of idempotency: produced once per successful deployment
/// of a (contract, tenant) pair and persisted to disk, superseded (never
/// deleted) by newer timestamped records
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentRecord {
    /// The logical name of the manifest entry this record was produced for
    pub logical_name: String,
    /// The manifest entry's category tag; keys the record file on disk
    pub contract_type: String,
    /// The tenant the contract was deployed for
    pub tenant: String,
    /// The address callers interact with (the proxy address for upgradable
    /// contracts)
    pub contract_address: Address,
    /// The contract's ABI (the implementation ABI for upgradable contracts)
    pub abi: Abi,
    /// The chain ID reported by the RPC endpoint at deploy time
    pub chain_id: u64,
    /// The logical chain name
    pub network_name: String,
    /// The RPC endpoint used for the deployment
    pub rpc_url: String,
    /// The chain's native currency symbol
    pub currency: String,
    /// The base URL of the chain's block explorer
    pub explorer_base_url: String,
    /// The keystore ciphertext the signer was loaded from, when one was
    /// provided; never a plaintext key
    #[serde(default)]
    pub encrypted_deployer_private_key: Option<String>,
    /// The deployer's public address
    pub deployer_public_key: Address,
    /// Whether the contract sits behind an upgradeable proxy
    pub upgradable: bool,
    /// The proxy's address, for upgradable contracts
    #[serde(default)]
    pub proxy_address: Option<Address>,
    /// The implementation address read back from the proxy's implementation
    /// slot
    #[serde(default)]
    pub implementation_address: Option<Address>,
    /// The proxy admin contract address read back from the proxy's admin
    /// slot
    #[serde(default)]
    pub proxy_admin_address: Option<Address>,
    /// The owner of the proxy admin contract
    #[serde(default)]
    pub proxy_admin_owner: Option<Address>,
    /// The facets registered against the proxy's extension registry
    #[serde(default)]
    pub extensions: Vec<DeployedExtension>,
    /// Unix-millisecond timestamp of the deployment; also names the record
    /// file on disk
    pub deployed_at: u64,
}
