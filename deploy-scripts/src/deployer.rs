//! The contract deployer: performs the on-chain deployment of one manifest
//! entry and produces its normalized deployment record.
//!
//! Pure "do the on-chain action" unit: checksum writes and record
//! persistence stay with the orchestrator.

use std::time::{SystemTime, UNIX_EPOCH};

use deploy_common::{
    constants::DEFAULT_PROXY_FILE_NAME,
    types::{ChainProfile, ContractManifestEntry, DeploymentRecord},
};
use ethers::abi::{parse_abi, Abi, Token};
use tracing::{info, warn};

use crate::{
    artifacts::ArtifactStore,
    chain::ChainClient,
    constants::{INITIALIZER_FUNCTION_NAME, OWNER_FUNCTION_NAME},
    errors::ScriptError,
    placeholders::{apply_tenant_prefix, tokenize_args, ResolvedValue},
};

/// Deploys a plain (non-upgradeable) contract
pub(crate) async fn deploy_plain<C: ChainClient>(
    client: &C,
    artifacts: &ArtifactStore,
    profile: &ChainProfile,
    entry: &ContractManifestEntry,
    tenant: &str,
    mut values: Vec<ResolvedValue>,
    encrypted_key: Option<&str>,
) -> Result<DeploymentRecord, ScriptError> {
    let artifact = artifacts.load(&entry.implementation_file_name, false /* upgradeable */)?;
    apply_tenant_prefix(&entry.constructor_args, &mut values, tenant);

    let params = artifact
        .abi
        .constructor()
        .map(|c| c.inputs.as_slice())
        .unwrap_or_default();
    let tokens = tokenize_args(params, &values)?;

    let address = client
        .deploy_contract(&artifact.abi, &artifact.bytecode, tokens.clone())
        .await?;
    info!(contract = %entry.name, tenant, "deployed at {address:#x}");

    if entry.verify {
        submit_verification(client, artifacts, entry, address, &tokens).await;
    }

    let mut record = base_record(client, profile, entry, tenant, encrypted_key).await?;
    record.contract_address = address;
    record.abi = artifact.abi;
    Ok(record)
}

/// Deploys a contract behind an upgradeable proxy: the implementation
/// first, then the proxy, whose constructor receives the ABI-encoded
/// initializer call-data in place of constructor arguments
pub(crate) async fn deploy_upgradeable<C: ChainClient>(
    client: &C,
    artifacts: &ArtifactStore,
    profile: &ChainProfile,
    entry: &ContractManifestEntry,
    tenant: &str,
    mut values: Vec<ResolvedValue>,
    encrypted_key: Option<&str>,
) -> Result<DeploymentRecord, ScriptError> {
    let implementation =
        artifacts.load(&entry.implementation_file_name, true /* upgradeable */)?;
    let proxy_file_name = entry
        .proxy_file_name
        .as_deref()
        .unwrap_or(DEFAULT_PROXY_FILE_NAME);
    let proxy = artifacts.load(proxy_file_name, true /* upgradeable */)?;

    apply_tenant_prefix(&entry.constructor_args, &mut values, tenant);
    let init_calldata = initializer_calldata(&implementation.abi, &entry.name, &values)?;

    // The implementation takes no constructor arguments; all of its state
    // is set through the initializer
    let implementation_address = client
        .deploy_contract(&implementation.abi, &implementation.bytecode, Vec::new())
        .await?;
    info!(
        contract = %entry.name,
        tenant,
        "implementation deployed at {implementation_address:#x}"
    );

    let proxy_address = client
        .deploy_proxy(
            &proxy.abi,
            &proxy.bytecode,
            implementation_address,
            client.deployer_address(),
            init_calldata,
        )
        .await?;
    info!(contract = %entry.name, tenant, "proxy deployed at {proxy_address:#x}");

    // Read the wiring back from the proxy's EIP-1967 slots rather than
    // trusting our own bookkeeping
    let implementation_address = client.get_implementation_address(proxy_address).await?;
    let admin_address = client.get_admin_address(proxy_address).await?;
    let admin_owner = client
        .call_view(
            admin_address,
            &proxy_admin_abi(),
            OWNER_FUNCTION_NAME,
            Vec::new(),
        )
        .await?
        .into_iter()
        .find_map(|token| match token {
            Token::Address(address) => Some(address),
            _ => None,
        });

    if entry.verify {
        submit_verification(client, artifacts, entry, implementation_address, &[]).await;
    }

    let mut record = base_record(client, profile, entry, tenant, encrypted_key).await?;
    record.contract_address = proxy_address;
    record.abi = implementation.abi;
    record.proxy_address = Some(proxy_address);
    record.implementation_address = Some(implementation_address);
    record.proxy_admin_address = Some(admin_address);
    record.proxy_admin_owner = admin_owner;
    Ok(record)
}

/// Encodes the initializer call-data for an upgradable entry.
///
/// An implementation without an initializer is only valid when the entry
/// declares no arguments; the proxy is then deployed with empty call-data.
fn initializer_calldata(
    implementation_abi: &Abi,
    contract_name: &str,
    values: &[ResolvedValue],
) -> Result<Vec<u8>, ScriptError> {
    match implementation_abi.function(INITIALIZER_FUNCTION_NAME) {
        Ok(function) => {
            let tokens = tokenize_args(&function.inputs, values)?;
            function
                .encode_input(&tokens)
                .map_err(|e| ScriptError::CalldataConstruction(e.to_string()))
        }
        Err(_) if values.is_empty() => Ok(Vec::new()),
        Err(_) => Err(ScriptError::CalldataConstruction(format!(
            "{contract_name} declares initializer arguments but its implementation has no {INITIALIZER_FUNCTION_NAME} method"
        ))),
    }
}

/// Submits a deployed contract for source verification, logging failures
/// as warnings: the contract is already live, verification is best-effort
async fn submit_verification<C: ChainClient>(
    client: &C,
    artifacts: &ArtifactStore,
    entry: &ContractManifestEntry,
    address: ethers::types::Address,
    constructor_args: &[Token],
) {
    let path = artifacts.artifact_path(&entry.implementation_file_name, entry.upgradable);
    if let Err(e) = client
        .verify_source(address, &path, constructor_args)
        .await
    {
        warn!(contract = %entry.name, "source verification failed: {e}");
    }
}

/// Builds the chain-metadata skeleton of a deployment record
async fn base_record<C: ChainClient>(
    client: &C,
    profile: &ChainProfile,
    entry: &ContractManifestEntry,
    tenant: &str,
    encrypted_key: Option<&str>,
) -> Result<DeploymentRecord, ScriptError> {
    Ok(DeploymentRecord {
        logical_name: entry.name.clone(),
        contract_type: entry.contract_type.clone(),
        tenant: tenant.to_string(),
        contract_address: Default::default(),
        abi: Abi::default(),
        chain_id: client.chain_id().await?,
        network_name: profile.name.clone(),
        rpc_url: profile.rpc_url.clone(),
        currency: profile.currency.clone(),
        explorer_base_url: profile.explorer_base_url.clone(),
        encrypted_deployer_private_key: encrypted_key.map(str::to_string),
        deployer_public_key: client.deployer_address(),
        upgradable: entry.upgradable,
        proxy_address: None,
        implementation_address: None,
        proxy_admin_address: None,
        proxy_admin_owner: None,
        extensions: Vec::new(),
        deployed_at: unix_millis(),
    })
}

/// The minimal proxy admin interface read back after a proxy deployment
fn proxy_admin_abi() -> Abi {
    // Can `unwrap` here since the static interface is known to parse
    parse_abi(&["function owner() external view returns (address)"]).unwrap()
}

/// The current unix timestamp in milliseconds
pub(crate) fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
