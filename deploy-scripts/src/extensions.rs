//! The extension manager: deploys facet contracts, derives their exposed
//! function selectors, and drives the add / replace / remove entry points
//! of a proxy's extension registry

use std::fmt::{self, Display};

use clap::ValueEnum;
use deploy_common::types::{DeployedExtension, ExtensionManifestEntry};
use ethers::{
    abi::{parse_abi, Abi, Function, Token},
    types::Address,
};
use itertools::Itertools;
use tracing::info;

use crate::{
    artifacts::ArtifactStore,
    chain::ChainClient,
    constants::{
        ADD_EXTENSION_FUNCTION, REMOVE_EXTENSION_FUNCTION, REPLACE_EXTENSION_FUNCTION,
    },
    errors::ScriptError,
    placeholders::{tokenize_args, ResolvedValue},
};

/// The lifecycle transitions of an extension relative to a proxy's registry
#[derive(ValueEnum, Copy, Clone, Debug, PartialEq, Eq)]
pub enum ExtensionAction {
    /// Register a new facet (`Absent -> Added`)
    Add,
    /// Unregister a facet by name, without redeploying (`Present ->
    /// Removed`)
    Remove,
    /// Deploy a new facet version and swap it in, preserving proxy storage
    /// (`Present -> Replaced`)
    Replace,
}

impl Display for ExtensionAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExtensionAction::Add => write!(f, "add"),
            ExtensionAction::Remove => write!(f, "remove"),
            ExtensionAction::Replace => write!(f, "replace"),
        }
    }
}

/// The proxy-side extension registry interface
fn registry_abi() -> Abi {
    // Can `unwrap` here since the static interface is known to parse
    parse_abi(&[
        "function addExtension(string name, address extension, bytes4[] selectors) external",
        "function replaceExtension(string name, address extension, bytes4[] selectors) external",
        "function removeExtension(string name) external",
    ])
    .unwrap()
}

/// The canonical signature of an ABI function, as written in manifests
fn canonical_signature(function: &Function) -> String {
    format!(
        "{}({})",
        function.name,
        function.inputs.iter().map(|p| p.kind.to_string()).join(",")
    )
}

/// Derives the 4-byte selectors for the manifest's exposed signatures from
/// the facet's ABI.
///
/// Each signature must match an ABI fragment exactly; deriving from the
/// ABI rather than hashing the manifest string guards against
/// manifest/ABI drift.
pub(crate) fn compute_selectors(
    facet_abi: &Abi,
    signatures: &[String],
) -> Result<Vec<[u8; 4]>, ScriptError> {
    signatures
        .iter()
        .map(|signature| {
            let normalized: String = signature.chars().filter(|c| !c.is_whitespace()).collect();
            let name = normalized.split('(').next().unwrap_or_default();
            facet_abi
                .functions_by_name(name)
                .ok()
                .and_then(|overloads| {
                    overloads
                        .iter()
                        .find(|f| canonical_signature(f) == normalized)
                })
                .map(Function::short_signature)
                .ok_or_else(|| {
                    ScriptError::CalldataConstruction(format!(
                        "signature {signature} does not match any facet ABI function"
                    ))
                })
        })
        .collect()
}

/// Deploys one facet contract, pre-validating its exposed selectors before
/// anything reaches the chain
pub(crate) async fn deploy_extension<C: ChainClient>(
    client: &C,
    artifacts: &ArtifactStore,
    spec: &ExtensionManifestEntry,
    values: Vec<ResolvedValue>,
) -> Result<DeployedExtension, ScriptError> {
    let artifact = artifacts.load(&spec.implementation_file_name, false /* upgradeable */)?;
    compute_selectors(&artifact.abi, &spec.function_signatures_to_expose)?;

    let params = artifact
        .abi
        .constructor()
        .map(|c| c.inputs.as_slice())
        .unwrap_or_default();
    let tokens = tokenize_args(params, &values)?;

    let address = client
        .deploy_contract(&artifact.abi, &artifact.bytecode, tokens)
        .await?;
    info!(extension = %spec.metadata_name, "facet deployed at {address:#x}");

    Ok(DeployedExtension {
        name: spec.metadata_name.clone(),
        address,
        abi: artifact.abi,
        exposed_functions: spec.function_signatures_to_expose.clone(),
    })
}

/// Deploys every facet of a batch before any registry mutation, shrinking
/// the window in which a mid-batch failure leaves the registry partially
/// updated
pub(crate) async fn deploy_extensions<C: ChainClient>(
    client: &C,
    artifacts: &ArtifactStore,
    prepared: Vec<(ExtensionManifestEntry, Vec<ResolvedValue>)>,
) -> Result<Vec<DeployedExtension>, ScriptError> {
    let mut deployed = Vec::with_capacity(prepared.len());
    for (spec, values) in prepared {
        deployed.push(deploy_extension(client, artifacts, &spec, values).await?);
    }
    Ok(deployed)
}

/// Registers a batch of freshly-deployed facets against the proxy.
///
/// Best-effort: a failure part-way leaves the earlier registrations
/// applied on-chain; the error names the facet that failed.
pub(crate) async fn register_extensions<C: ChainClient>(
    client: &C,
    proxy: Address,
    extensions: &[DeployedExtension],
) -> Result<(), ScriptError> {
    for extension in extensions {
        register_extension(client, proxy, extension, ADD_EXTENSION_FUNCTION).await?;
    }
    Ok(())
}

/// Issues one add or replace registration call for a facet
async fn register_extension<C: ChainClient>(
    client: &C,
    proxy: Address,
    extension: &DeployedExtension,
    registry_function: &str,
) -> Result<(), ScriptError> {
    let selectors = compute_selectors(&extension.abi, &extension.exposed_functions)?;
    let args = vec![
        Token::String(extension.name.clone()),
        Token::Address(extension.address),
        Token::Array(
            selectors
                .into_iter()
                .map(|selector| Token::FixedBytes(selector.to_vec()))
                .collect(),
        ),
    ];
    client
        .call_function(proxy, &registry_abi(), registry_function, args)
        .await
}

/// Applies one lifecycle action to the proxy's registry, rewriting the
/// record's extension list to match
pub(crate) async fn apply_action<C: ChainClient>(
    client: &C,
    artifacts: &ArtifactStore,
    proxy: Address,
    extensions: &mut Vec<DeployedExtension>,
    action: ExtensionAction,
    spec: &ExtensionManifestEntry,
    values: Vec<ResolvedValue>,
) -> Result<(), ScriptError> {
    let position = extensions
        .iter()
        .position(|e| e.name == spec.metadata_name);
    info!(extension = %spec.metadata_name, %action, "applying extension action");

    match action {
        ExtensionAction::Add => {
            if position.is_some() {
                return Err(ScriptError::UnsupportedExtensionAction(format!(
                    "{} is already registered, use replace",
                    spec.metadata_name
                )));
            }
            let extension = deploy_extension(client, artifacts, spec, values).await?;
            register_extension(client, proxy, &extension, ADD_EXTENSION_FUNCTION).await?;
            extensions.push(extension);
        }
        ExtensionAction::Replace => {
            let position = position.ok_or_else(|| {
                ScriptError::UnsupportedExtensionAction(format!(
                    "{} is not registered, use add",
                    spec.metadata_name
                ))
            })?;
            let extension = deploy_extension(client, artifacts, spec, values).await?;
            register_extension(client, proxy, &extension, REPLACE_EXTENSION_FUNCTION).await?;
            extensions[position] = extension;
        }
        ExtensionAction::Remove => {
            let position = position.ok_or_else(|| {
                ScriptError::UnsupportedExtensionAction(format!(
                    "{} is not registered",
                    spec.metadata_name
                ))
            })?;
            client
                .call_function(
                    proxy,
                    &registry_abi(),
                    REMOVE_EXTENSION_FUNCTION,
                    vec![Token::String(spec.metadata_name.clone())],
                )
                .await?;
            extensions.remove(position);
        }
    }

    Ok(())
}
