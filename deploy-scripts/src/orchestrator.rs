//! The deployment orchestrator: composes the resolver, stores, deployer,
//! and extension manager into the top-level deploy and upgrade drivers

use std::{
    future::Future,
    pin::Pin,
    sync::{Arc, Mutex},
};

use deploy_common::types::DeploymentRecord;
use tracing::{error, info};

use crate::{
    artifacts::ArtifactStore,
    chain::ChainClient,
    checksum::ChecksumStore,
    deployer::{self, unix_millis},
    errors::ScriptError,
    extensions::{self, ExtensionAction},
    placeholders::tokenize_args,
    records::RecordStore,
    registry::ManifestRegistry,
    resolver::resolve_deployment_order,
};

/// A boxed future, used to break the async recursion between argument
/// resolution and on-demand deployment
pub(crate) type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Book-keeping scoped to one orchestration run
#[derive(Default)]
struct RunLedger {
    /// Every record produced so far, reused ones included, in production
    /// order
    produced: Vec<DeploymentRecord>,
    /// The (contract, tenant) pairs freshly deployed this run, whose
    /// post-deploy calls still need to execute
    fresh: Vec<(String, String)>,
    /// The (contract, tenant) pairs currently being deployed, for cycle
    /// detection across recursive argument resolution
    in_flight: Vec<(String, String)>,
}

/// The top-level deployment driver for one chain
pub struct Orchestrator<C: ChainClient> {
    /// The chain's manifest registry
    pub(crate) registry: ManifestRegistry,
    /// The compiled artifact store
    pub(crate) artifacts: ArtifactStore,
    /// The checksum (idempotency) store
    pub(crate) checksums: ChecksumStore,
    /// The deployment record store
    pub(crate) records: RecordStore,
    /// The chain client
    pub(crate) client: Arc<C>,
    /// The keystore ciphertext embedded in records, when the signer was
    /// loaded from one
    encrypted_deployer_key: Option<String>,
    /// Run-scoped book-keeping
    ledger: Mutex<RunLedger>,
}

impl<C: ChainClient> Orchestrator<C> {
    /// Creates an orchestrator over the given collaborators
    pub fn new(
        registry: ManifestRegistry,
        artifacts: ArtifactStore,
        checksums: ChecksumStore,
        records: RecordStore,
        client: Arc<C>,
        encrypted_deployer_key: Option<String>,
    ) -> Self {
        Self {
            registry,
            artifacts,
            checksums,
            records,
            client,
            encrypted_deployer_key,
            ledger: Mutex::new(RunLedger::default()),
        }
    }

    /// Deploys the named contract and its transitive dependencies for each
    /// declared tenant (optionally narrowed to one), skipping pairs whose
    /// checksum marks them already deployed, then executes the post-deploy
    /// calls of everything freshly deployed.
    ///
    /// Returns every record the run touched, reused ones included.
    pub async fn run(
        &self,
        target: &str,
        tenant_filter: Option<&str>,
    ) -> Result<Vec<DeploymentRecord>, ScriptError> {
        *self.ledger.lock().unwrap() = RunLedger::default();

        let order = resolve_deployment_order(&self.registry, target)?;
        info!(?order, "resolved deployment order");

        for name in &order {
            let entry = self.registry.get(name)?;
            for tenant in entry.tenants.clone() {
                if tenant_filter.is_some_and(|t| t != tenant) {
                    continue;
                }
                if let Err(e) = self.ensure_deployed(name, &tenant).await {
                    error!(contract = %name, tenant, "deployment failed: {e}");
                    return Err(e);
                }
            }
        }

        self.execute_post_deploy_calls().await?;

        let produced = self.ledger.lock().unwrap().produced.clone();
        Ok(produced)
    }

    /// Deploys one (contract, tenant) pair unless its checksum marks it
    /// already deployed, returning the record and whether it is fresh.
    ///
    /// Boxed because placeholder resolution recurses back in here for
    /// sibling-contract references.
    pub(crate) fn ensure_deployed<'a>(
        &'a self,
        name: &'a str,
        tenant: &'a str,
    ) -> BoxFuture<'a, Result<(DeploymentRecord, bool), ScriptError>> {
        Box::pin(async move {
            if let Some(record) = self.produced_record(name, tenant) {
                return Ok((record, false));
            }

            let entry = self.registry.get(name)?;
            self.check_not_in_flight(name, tenant)?;

            // Hold the deploy lock across the whole
            // check-then-deploy-then-write sequence so a concurrent run
            // cannot double-deploy the pair
            let _guard = self.checksums.lock(entry, tenant).await?;

            if self.checksums.is_already_deployed(entry, tenant) {
                info!(contract = %name, tenant, "already deployed, reusing record");
                let record = self.records.read_latest(&entry.contract_type, tenant)?;
                self.ledger.lock().unwrap().produced.push(record.clone());
                return Ok((record, false));
            }

            self.ledger
                .lock()
                .unwrap()
                .in_flight
                .push((name.to_string(), tenant.to_string()));
            let result = self.deploy_pair(name, tenant).await;
            self.ledger.lock().unwrap().in_flight.pop();
            let record = result?;

            let mut ledger = self.ledger.lock().unwrap();
            ledger.produced.push(record.clone());
            ledger.fresh.push((name.to_string(), tenant.to_string()));
            Ok((record, true))
        })
    }

    /// Resolves arguments, deploys, attaches extensions, and persists the
    /// checksum and record for one pair
    async fn deploy_pair(
        &self,
        name: &str,
        tenant: &str,
    ) -> Result<DeploymentRecord, ScriptError> {
        let entry = self.registry.get(name)?;
        info!(contract = %name, tenant, "deploying");

        let values = self.resolve_args(tenant, &entry.constructor_args).await?;
        let mut record = if entry.upgradable {
            deployer::deploy_upgradeable(
                self.client.as_ref(),
                &self.artifacts,
                self.registry.profile(),
                entry,
                tenant,
                values,
                self.encrypted_deployer_key.as_deref(),
            )
            .await?
        } else {
            deployer::deploy_plain(
                self.client.as_ref(),
                &self.artifacts,
                self.registry.profile(),
                entry,
                tenant,
                values,
                self.encrypted_deployer_key.as_deref(),
            )
            .await?
        };

        if !entry.extensions.is_empty() {
            let mut prepared = Vec::with_capacity(entry.extensions.len());
            for spec in &entry.extensions {
                let values = self.resolve_args(tenant, &spec.constructor_args).await?;
                prepared.push((spec.clone(), values));
            }
            let deployed =
                extensions::deploy_extensions(self.client.as_ref(), &self.artifacts, prepared)
                    .await?;
            extensions::register_extensions(
                self.client.as_ref(),
                record.contract_address,
                &deployed,
            )
            .await?;
            record.extensions = deployed;
        }

        self.checksums.write(entry, tenant)?;
        self.records.write(&record)?;
        Ok(record)
    }

    /// Applies one extension lifecycle action against an already-deployed
    /// proxy and persists the superseding record
    pub async fn upgrade_extension(
        &self,
        contract: &str,
        tenant: &str,
        extension: &str,
        action: ExtensionAction,
    ) -> Result<DeploymentRecord, ScriptError> {
        let entry = self.registry.get(contract)?;
        if !entry.upgradable {
            return Err(ScriptError::UnsupportedExtensionAction(format!(
                "{contract} is not upgradable"
            )));
        }
        let spec = entry
            .extensions
            .iter()
            .find(|spec| spec.metadata_name == extension)
            .ok_or_else(|| {
                ScriptError::ContractNotFound(format!("extension {extension} on {contract}"))
            })?;

        let mut record = self.records.read_latest(&entry.contract_type, tenant)?;
        let values = self.resolve_args(tenant, &spec.constructor_args).await?;

        let mut extension_list = record.extensions.clone();
        extensions::apply_action(
            self.client.as_ref(),
            &self.artifacts,
            record.contract_address,
            &mut extension_list,
            action,
            spec,
            values,
        )
        .await?;

        record.extensions = extension_list;
        record.deployed_at = unix_millis();
        self.records.write(&record)?;
        Ok(record)
    }

    /// Executes the declared post-deploy calls of every contract freshly
    /// deployed this run, against the now-resolved addresses.
    ///
    /// Role-granting cross-references live here rather than in constructor
    /// args, which is what lets sibling contracts reference each other
    /// without an address-level cycle.
    async fn execute_post_deploy_calls(&self) -> Result<(), ScriptError> {
        let fresh = self.ledger.lock().unwrap().fresh.clone();
        for (name, tenant) in fresh {
            let entry = self.registry.get(&name)?;
            for call in &entry.post_deploy_calls {
                let target = self.registry.get(&call.target_contract)?;
                let target_record = self
                    .records
                    .read_latest(&target.contract_type, &tenant)?;

                let values = self.resolve_values(&tenant, &call.args).await?;
                let function = target_record
                    .abi
                    .function(&call.function_name)
                    .map_err(|e| ScriptError::CalldataConstruction(e.to_string()))?;
                let tokens = tokenize_args(&function.inputs, &values)?;

                info!(
                    contract = %name,
                    target = %call.target_contract,
                    function = %call.function_name,
                    tenant,
                    "executing post-deploy call"
                );
                self.client
                    .call_function(
                        target_record.contract_address,
                        &target_record.abi,
                        &call.function_name,
                        tokens,
                    )
                    .await?;
            }
        }
        Ok(())
    }

    /// Whether this run already produced a record for the pair
    fn produced_record(&self, name: &str, tenant: &str) -> Option<DeploymentRecord> {
        self.ledger
            .lock()
            .unwrap()
            .produced
            .iter()
            .find(|record| record.logical_name == name && record.tenant == tenant)
            .cloned()
    }

    /// Rejects re-entrant deployment of a pair already being deployed: a
    /// constructor-argument reference cycle the dependency resolver cannot
    /// see
    fn check_not_in_flight(&self, name: &str, tenant: &str) -> Result<(), ScriptError> {
        let ledger = self.ledger.lock().unwrap();
        if ledger
            .in_flight
            .iter()
            .any(|(n, t)| n == name && t == tenant)
        {
            let mut cycle: Vec<&str> = ledger.in_flight.iter().map(|(n, _)| n.as_str()).collect();
            cycle.push(name);
            return Err(ScriptError::CyclicDependency(cycle.join(" -> ")));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::{fs, path::Path, sync::Arc};

    use deploy_common::{
        constants::role_hash,
        types::{
            ArgValue, ChainProfile, ConstructorArg, ContractManifestEntry,
            ExtensionManifestEntry, NetworkType, PostDeployCall,
        },
    };
    use ethers::{abi::Token, utils::keccak256};
    use serde_json::{json, Value};
    use tempfile::TempDir;

    use crate::{
        artifacts::ArtifactStore,
        chain::{mock::MockClient, ChainClient},
        checksum::ChecksumStore,
        errors::ScriptError,
        extensions::ExtensionAction,
        records::RecordStore,
        registry::ManifestRegistry,
    };

    use super::Orchestrator;

    /// The tenant used throughout these tests
    const TENANT: &str = "tenant-a";

    /// A chain profile for an in-memory manifest
    fn test_profile() -> ChainProfile {
        ChainProfile {
            name: "testchain".to_string(),
            chain_id: 31337,
            network_type: NetworkType::Testnet,
            rpc_url: "http://localhost:8545".to_string(),
            currency: "ETH".to_string(),
            explorer_base_url: "https://explorer.invalid".to_string(),
        }
    }

    /// A minimal plain manifest entry deployed for [`TENANT`]
    fn entry(name: &str) -> ContractManifestEntry {
        ContractManifestEntry {
            name: name.to_string(),
            implementation_file_name: name.to_string(),
            contract_type: name.to_uppercase(),
            chain: "testchain".to_string(),
            network_type: NetworkType::Testnet,
            tenants: vec![TENANT.to_string()],
            upgradable: false,
            verify: false,
            dependencies: Vec::new(),
            constructor_args: Vec::new(),
            post_deploy_calls: Vec::new(),
            proxy_file_name: None,
            extensions: Vec::new(),
        }
    }

    /// A named constructor argument
    fn arg(name: &str, value: ArgValue) -> ConstructorArg {
        ConstructorArg {
            name: name.to_string(),
            value,
        }
    }

    /// Writes a hardhat-style artifact file under the harness's artifacts
    /// root
    fn write_artifact(root: &Path, name: &str, upgradeable: bool, abi: Value) {
        let dir = if upgradeable {
            root.join("upgradeable")
        } else {
            root.to_path_buf()
        };
        fs::create_dir_all(&dir).unwrap();
        let artifact = json!({ "abi": abi, "bytecode": "0x6080604052" });
        fs::write(dir.join(format!("{name}.json")), artifact.to_string()).unwrap();
    }

    /// An ABI with no constructor and a `grantRole(bytes32,address)`
    /// function
    fn items_abi() -> Value {
        json!([
            {
                "type": "function",
                "name": "grantRole",
                "inputs": [
                    {"name": "role", "type": "bytes32"},
                    {"name": "account", "type": "address"}
                ],
                "outputs": [],
                "stateMutability": "nonpayable"
            }
        ])
    }

    /// An ABI whose constructor takes one address
    fn avatars_abi() -> Value {
        json!([
            {
                "type": "constructor",
                "inputs": [{"name": "itemsAddress", "type": "address"}],
                "stateMutability": "nonpayable"
            }
        ])
    }

    /// The test orchestrator plus handles the assertions need
    struct Harness {
        /// Keeps the temp state/artifact directories alive
        _tmp: TempDir,
        /// The artifacts root, for writing fixtures
        artifacts_root: std::path::PathBuf,
        /// The mock chain
        client: Arc<MockClient>,
        /// The orchestrator under test
        orchestrator: Orchestrator<MockClient>,
    }

    /// Builds an orchestrator over a temp state directory and a mock chain
    fn harness_with_client(
        entries: Vec<ContractManifestEntry>,
        client: MockClient,
    ) -> Harness {
        let tmp = TempDir::new().unwrap();
        let artifacts_root = tmp.path().join("artifacts");
        let chain_dir = tmp.path().join("state").join("testchain");

        let registry = ManifestRegistry::from_parts(test_profile(), entries).unwrap();
        let checksums = ChecksumStore::new(&chain_dir, false /* include_args */).unwrap();
        let records = RecordStore::new(&chain_dir).unwrap();
        let client = Arc::new(client);

        let orchestrator = Orchestrator::new(
            registry,
            ArtifactStore::new(&artifacts_root),
            checksums,
            records,
            client.clone(),
            None, /* encrypted_deployer_key */
        );

        Harness {
            _tmp: tmp,
            artifacts_root,
            client,
            orchestrator,
        }
    }

    /// [`harness_with_client`] with a default mock
    fn harness(entries: Vec<ContractManifestEntry>) -> Harness {
        harness_with_client(entries, MockClient::new())
    }

    /// The Items entry plus an Avatars entry whose constructor references
    /// Items
    fn items_and_avatars(with_dependency: bool) -> Vec<ContractManifestEntry> {
        let items = entry("Items");
        let mut avatars = entry("Avatars");
        if with_dependency {
            avatars.dependencies = vec!["Items".to_string()];
        }
        avatars.constructor_args = vec![arg(
            "itemsAddress",
            ArgValue::ContractRef("Items".to_string()),
        )];
        vec![items, avatars]
    }

    #[tokio::test]
    async fn test_items_avatars_scenario() {
        let h = harness(items_and_avatars(true /* with_dependency */));
        write_artifact(&h.artifacts_root, "Items", false, items_abi());
        write_artifact(&h.artifacts_root, "Avatars", false, avatars_abi());

        let records = h.orchestrator.run("Avatars", Some(TENANT)).await.unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].logical_name, "Items");
        assert_eq!(records[1].logical_name, "Avatars");

        // Avatars's resolved constructor argument is Items's address
        let deployments = h.client.deployments();
        assert_eq!(deployments.len(), 2);
        assert_eq!(
            deployments[1].args,
            vec![Token::Address(records[0].contract_address)]
        );

        // And the persisted Items record round-trips the same address
        let persisted = h.orchestrator.records.read_latest("ITEMS", TENANT).unwrap();
        assert_eq!(persisted.contract_address, records[0].contract_address);
    }

    #[tokio::test]
    async fn test_second_run_reuses_records() {
        let h = harness(items_and_avatars(true /* with_dependency */));
        write_artifact(&h.artifacts_root, "Items", false, items_abi());
        write_artifact(&h.artifacts_root, "Avatars", false, avatars_abi());

        let first = h.orchestrator.run("Avatars", Some(TENANT)).await.unwrap();
        let deployments_after_first = h.client.deployment_count();

        let second = h.orchestrator.run("Avatars", Some(TENANT)).await.unwrap();

        // Zero additional on-chain deployments, same addresses
        assert_eq!(h.client.deployment_count(), deployments_after_first);
        assert_eq!(second.len(), first.len());
        assert_eq!(second[1].contract_address, first[1].contract_address);
    }

    #[tokio::test]
    async fn test_contract_ref_deploys_on_demand() {
        // Items is referenced only through CONTRACT_Items, not listed as a
        // dependency
        let h = harness(items_and_avatars(false /* with_dependency */));
        write_artifact(&h.artifacts_root, "Items", false, items_abi());
        write_artifact(&h.artifacts_root, "Avatars", false, avatars_abi());

        let records = h.orchestrator.run("Avatars", Some(TENANT)).await.unwrap();

        // Exactly one deployment of Items, and its record is reported
        assert_eq!(h.client.deployment_count(), 2);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].logical_name, "Items");
    }

    #[tokio::test]
    async fn test_argument_reference_cycle_is_detected() {
        let mut items = entry("Items");
        items.constructor_args = vec![arg(
            "avatarsAddress",
            ArgValue::ContractRef("Avatars".to_string()),
        )];
        let mut avatars = entry("Avatars");
        avatars.constructor_args = vec![arg(
            "itemsAddress",
            ArgValue::ContractRef("Items".to_string()),
        )];

        let h = harness(vec![items, avatars]);
        write_artifact(&h.artifacts_root, "Items", false, avatars_abi());
        write_artifact(&h.artifacts_root, "Avatars", false, avatars_abi());

        let err = h.orchestrator.run("Items", Some(TENANT)).await.unwrap_err();
        assert!(matches!(err, ScriptError::CyclicDependency(_)));
    }

    #[tokio::test]
    async fn test_tenant_isolation() {
        let mut items = entry("Items");
        items.tenants = vec![TENANT.to_string(), "tenant-b".to_string()];
        let h = harness(vec![items]);
        write_artifact(&h.artifacts_root, "Items", false, items_abi());

        h.orchestrator.run("Items", Some(TENANT)).await.unwrap();

        let items_entry = h.orchestrator.registry.get("Items").unwrap();
        assert!(h
            .orchestrator
            .checksums
            .is_already_deployed(items_entry, TENANT));
        assert!(!h
            .orchestrator
            .checksums
            .is_already_deployed(items_entry, "tenant-b"));
        assert!(h
            .orchestrator
            .records
            .read_latest("ITEMS", "tenant-b")
            .is_err());
    }

    #[tokio::test]
    async fn test_tenant_prefix_applied_to_name_argument() {
        let mut items = entry("Items");
        items.constructor_args = vec![arg("name", ArgValue::Literal(json!("Gold")))];
        let h = harness(vec![items]);
        write_artifact(
            &h.artifacts_root,
            "Items",
            false,
            json!([
                {
                    "type": "constructor",
                    "inputs": [{"name": "name", "type": "string"}],
                    "stateMutability": "nonpayable"
                }
            ]),
        );

        h.orchestrator.run("Items", Some(TENANT)).await.unwrap();

        let deployments = h.client.deployments();
        assert_eq!(
            deployments[0].args,
            vec![Token::String(format!("{TENANT} Gold"))]
        );
    }

    #[tokio::test]
    async fn test_post_deploy_calls_run_once() {
        let mut manifest = items_and_avatars(true /* with_dependency */);
        manifest[1].post_deploy_calls = vec![PostDeployCall {
            target_contract: "Items".to_string(),
            function_name: "grantRole".to_string(),
            args: vec![
                ArgValue::RoleConstant("MINTER_ROLE".to_string()),
                ArgValue::ContractRef("Avatars".to_string()),
            ],
        }];

        let h = harness(manifest);
        write_artifact(&h.artifacts_root, "Items", false, items_abi());
        write_artifact(&h.artifacts_root, "Avatars", false, avatars_abi());

        let records = h.orchestrator.run("Avatars", Some(TENANT)).await.unwrap();

        let calls = h.client.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].to, records[0].contract_address);
        assert_eq!(calls[0].function, "grantRole");
        assert_eq!(
            calls[0].args,
            vec![
                Token::FixedBytes(role_hash("MINTER_ROLE").to_vec()),
                Token::Address(records[1].contract_address),
            ]
        );

        // A second run deploys nothing fresh, so the grant is not repeated
        h.orchestrator.run("Avatars", Some(TENANT)).await.unwrap();
        assert_eq!(h.client.calls().len(), 1);
    }

    /// An upgradable game entry with one mint facet
    fn upgradable_game() -> Vec<ContractManifestEntry> {
        let mut game = entry("Game");
        game.upgradable = true;
        game.constructor_args = vec![arg("owner", ArgValue::DeployerWallet)];
        game.extensions = vec![ExtensionManifestEntry {
            implementation_file_name: "MintModule".to_string(),
            constructor_args: Vec::new(),
            function_signatures_to_expose: vec!["mint(address,uint256)".to_string()],
            metadata_name: "mint-module".to_string(),
        }];
        vec![game]
    }

    /// Writes the implementation, proxy, and facet artifacts the
    /// upgradable game needs
    fn write_game_artifacts(root: &Path) {
        write_artifact(
            root,
            "Game",
            true,
            json!([
                {
                    "type": "function",
                    "name": "initialize",
                    "inputs": [{"name": "owner", "type": "address"}],
                    "outputs": [],
                    "stateMutability": "nonpayable"
                }
            ]),
        );
        write_artifact(
            root,
            "TransparentUpgradeableProxy",
            true,
            json!([
                {
                    "type": "constructor",
                    "inputs": [
                        {"name": "logic", "type": "address"},
                        {"name": "initialOwner", "type": "address"},
                        {"name": "data", "type": "bytes"}
                    ],
                    "stateMutability": "payable"
                }
            ]),
        );
        write_artifact(
            root,
            "MintModule",
            false,
            json!([
                {
                    "type": "function",
                    "name": "mint",
                    "inputs": [
                        {"name": "to", "type": "address"},
                        {"name": "amount", "type": "uint256"}
                    ],
                    "outputs": [],
                    "stateMutability": "nonpayable"
                }
            ]),
        );
    }

    #[tokio::test]
    async fn test_upgradable_deploy_with_extensions() {
        let h = harness(upgradable_game());
        write_game_artifacts(&h.artifacts_root);

        let records = h.orchestrator.run("Game", Some(TENANT)).await.unwrap();
        let record = &records[0];

        // The stable address is the proxy's, with the wiring read back
        // from the proxy slots
        assert!(record.upgradable);
        assert_eq!(record.proxy_address, Some(record.contract_address));
        assert!(record.implementation_address.is_some());
        assert!(record.proxy_admin_address.is_some());
        assert_eq!(record.proxy_admin_owner, Some(h.client.deployer_address()));

        // The proxy was constructed with the encoded initializer call-data
        let deployments = h.client.deployments();
        let proxy_deployment = &deployments[1];
        let initializer_selector = &keccak256("initialize(address)".as_bytes())[..4];
        match &proxy_deployment.args[2] {
            Token::Bytes(calldata) => assert_eq!(&calldata[..4], initializer_selector),
            other => panic!("expected initializer bytes, got {other:?}"),
        }

        // The facet was deployed and registered
        assert_eq!(record.extensions.len(), 1);
        let calls = h.client.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].to, record.contract_address);
        assert_eq!(calls[0].function, "addExtension");
    }

    #[tokio::test]
    async fn test_replace_preserves_proxy_address() {
        let h = harness(upgradable_game());
        write_game_artifacts(&h.artifacts_root);

        let records = h.orchestrator.run("Game", Some(TENANT)).await.unwrap();
        let original = records[0].clone();

        let upgraded = h
            .orchestrator
            .upgrade_extension("Game", TENANT, "mint-module", ExtensionAction::Replace)
            .await
            .unwrap();

        assert_eq!(upgraded.contract_address, original.contract_address);
        assert_ne!(
            upgraded.extensions[0].address,
            original.extensions[0].address
        );
        assert!(h
            .client
            .calls()
            .iter()
            .any(|call| call.function == "replaceExtension"));

        // The superseding record is what the store now returns
        let latest = h.orchestrator.records.read_latest("GAME", TENANT).unwrap();
        assert_eq!(
            latest.extensions[0].address,
            upgraded.extensions[0].address
        );
    }

    #[tokio::test]
    async fn test_remove_extension() {
        let h = harness(upgradable_game());
        write_game_artifacts(&h.artifacts_root);
        h.orchestrator.run("Game", Some(TENANT)).await.unwrap();

        let upgraded = h
            .orchestrator
            .upgrade_extension("Game", TENANT, "mint-module", ExtensionAction::Remove)
            .await
            .unwrap();
        assert!(upgraded.extensions.is_empty());

        // Removing again is an unsupported transition
        let err = h
            .orchestrator
            .upgrade_extension("Game", TENANT, "mint-module", ExtensionAction::Remove)
            .await
            .unwrap_err();
        assert!(matches!(err, ScriptError::UnsupportedExtensionAction(_)));
    }

    #[tokio::test]
    async fn test_encoded_initializer_requires_deployed_implementation() {
        let game_impl = entry("GameImpl");
        let mut game_proxy = entry("GameProxy");
        game_proxy.constructor_args = vec![arg(
            "initCalldata",
            ArgValue::EncodedInitializer("GameImpl".to_string()),
        )];

        let impl_abi = json!([
            {
                "type": "function",
                "name": "initialize",
                "inputs": [],
                "outputs": [],
                "stateMutability": "nonpayable"
            }
        ]);
        let proxy_abi = json!([
            {
                "type": "constructor",
                "inputs": [{"name": "initCalldata", "type": "bytes"}],
                "stateMutability": "nonpayable"
            }
        ]);

        // Without the dependency, the implementation record does not exist
        // at resolution time
        let h = harness(vec![game_impl.clone(), game_proxy.clone()]);
        write_artifact(&h.artifacts_root, "GameImpl", false, impl_abi.clone());
        write_artifact(&h.artifacts_root, "GameProxy", false, proxy_abi.clone());
        let err = h
            .orchestrator
            .run("GameProxy", Some(TENANT))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ScriptError::MissingImplementationContract(name) if name == "GameImpl"
        ));

        // With the dependency, the implementation deploys first and the
        // proxy receives its encoded initializer
        game_proxy.dependencies = vec!["GameImpl".to_string()];
        let h = harness(vec![game_impl, game_proxy]);
        write_artifact(&h.artifacts_root, "GameImpl", false, impl_abi);
        write_artifact(&h.artifacts_root, "GameProxy", false, proxy_abi);
        h.orchestrator.run("GameProxy", Some(TENANT)).await.unwrap();

        let deployments = h.client.deployments();
        let initializer_selector = &keccak256("initialize()".as_bytes())[..4];
        assert_eq!(
            deployments[1].args,
            vec![Token::Bytes(initializer_selector.to_vec())]
        );
    }

    #[tokio::test]
    async fn test_dangling_contract_ref_is_an_unresolved_placeholder() {
        let mut items = entry("Items");
        items.constructor_args = vec![arg(
            "registry",
            ArgValue::ContractRef("NotInManifest".to_string()),
        )];
        let h = harness(vec![items]);
        write_artifact(&h.artifacts_root, "Items", false, avatars_abi());

        let err = h.orchestrator.run("Items", Some(TENANT)).await.unwrap_err();
        assert!(matches!(err, ScriptError::UnresolvedPlaceholder(_)));
        // Nothing reached the chain
        assert_eq!(h.client.deployment_count(), 0);
    }

    #[tokio::test]
    async fn test_verification_failure_is_not_fatal() {
        let mut items = entry("Items");
        items.verify = true;
        let h = harness_with_client(vec![items], MockClient::with_failing_verification());
        write_artifact(&h.artifacts_root, "Items", false, items_abi());

        // The contract is live; a verification failure only warns
        let records = h.orchestrator.run("Items", Some(TENANT)).await.unwrap();
        assert_eq!(records.len(), 1);
    }
}
