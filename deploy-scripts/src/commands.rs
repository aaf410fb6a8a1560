//! Implementations of the deploy script commands

use std::{fs, path::Path, sync::Arc};

use tracing::{info, warn};

use crate::{
    artifacts::ArtifactStore,
    chain::setup_client,
    checksum::ChecksumStore,
    cli::{Cli, Command},
    constants::INVENTORY_FILE_NAME,
    errors::ScriptError,
    inventory::{FileInventory, InventoryService},
    orchestrator::Orchestrator,
    records::RecordStore,
    registry::ManifestRegistry,
};

/// Runs the parsed CLI command
pub async fn run(cli: Cli) -> Result<(), ScriptError> {
    let registry = ManifestRegistry::load(Path::new(&cli.manifest_path))?;
    let profile = registry.profile().clone();

    let rpc_url = cli.rpc_url.as_deref().unwrap_or(&profile.rpc_url);
    let client = Arc::new(setup_client(&cli.priv_key, rpc_url).await?);

    let encrypted_key = cli
        .keystore_path
        .as_deref()
        .map(|path| {
            fs::read_to_string(path).map_err(|e| ScriptError::ClientInitialization(e.to_string()))
        })
        .transpose()?;

    let chain_state_dir = Path::new(&cli.state_dir).join(&profile.name);
    let orchestrator = Orchestrator::new(
        registry,
        ArtifactStore::new(&cli.artifacts_dir),
        ChecksumStore::new(&chain_state_dir, cli.args_in_checksum)?,
        RecordStore::new(&chain_state_dir)?,
        client,
        encrypted_key,
    );
    let inventory = FileInventory::new(chain_state_dir.join(INVENTORY_FILE_NAME));

    match cli.command {
        Command::Deploy(args) => {
            let records = orchestrator
                .run(&args.contract, args.tenant.as_deref())
                .await?;
            info!(
                contract = %args.contract,
                records = records.len(),
                "deployment complete"
            );
            submit_inventory(&inventory, &records).await;
        }
        Command::UpgradeExtension(args) => {
            let record = orchestrator
                .upgrade_extension(&args.contract, &args.tenant, &args.extension, args.action)
                .await?;
            info!(
                contract = %args.contract,
                extension = %args.extension,
                action = %args.action,
                "extension upgrade complete"
            );
            submit_inventory(&inventory, std::slice::from_ref(&record)).await;
        }
    }

    Ok(())
}

/// Submits records to the inventory sink; failures are logged and
/// swallowed, never fatal to a deployment that already happened
async fn submit_inventory(
    inventory: &dyn InventoryService,
    records: &[deploy_common::types::DeploymentRecord],
) {
    if let Err(e) = inventory.submit(records).await {
        warn!("inventory submission failed: {e}");
    }
}
