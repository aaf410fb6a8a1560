//! Definitions of errors that can occur during the execution of the
//! deployment pipeline

use std::{
    error::Error,
    fmt::{self, Display, Formatter},
};

/// Errors that can occur during the execution of the deployment pipeline
#[derive(Debug)]
pub enum ScriptError {
    /// Error reading or validating a contract manifest
    ManifestParsing(String),
    /// A referenced contract name does not exist in the manifest
    ContractNotFound(String),
    /// The manifest's dependency graph contains a cycle
    CyclicDependency(String),
    /// A placeholder token could not be resolved to a concrete value
    UnresolvedPlaceholder(String),
    /// Initializer encoding was requested before the implementation
    /// contract was deployed
    MissingImplementationContract(String),
    /// An extension action cannot be applied to the proxy's registry in its
    /// current state
    UnsupportedExtensionAction(String),
    /// Error parsing a compiled contract artifact
    ArtifactParsing(String),
    /// Error reading persisted deployment state
    ReadState(String),
    /// Error writing persisted deployment state
    WriteState(String),
    /// Error initializing the RPC client
    ClientInitialization(String),
    /// Error constructing calldata for a contract method
    CalldataConstruction(String),
    /// Error deploying a contract
    ContractDeployment(String),
    /// Error calling a contract method
    ContractInteraction(String),
    /// A transient RPC transport failure, eligible for bounded retry
    Rpc(String),
    /// An on-chain revert; always a permanent failure
    Reverted(String),
    /// Another orchestration run holds the deploy lock for this contract
    ConcurrentDeployment(String),
    /// Error submitting a contract for source verification
    Verification(String),
    /// Error submitting deployment records to the inventory service
    Inventory(String),
}

impl ScriptError {
    /// Whether the error is a transport-level failure worth retrying.
    ///
    /// Application-level failures (reverts, encoding errors, manifest
    /// errors) are permanent and must propagate unretried.
    pub fn is_transient(&self) -> bool {
        matches!(self, ScriptError::Rpc(_))
    }
}

impl Display for ScriptError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ScriptError::ManifestParsing(s) => write!(f, "error parsing manifest: {}", s),
            ScriptError::ContractNotFound(s) => {
                write!(f, "contract not found in manifest: {}", s)
            }
            ScriptError::CyclicDependency(s) => write!(f, "cyclic dependency: {}", s),
            ScriptError::UnresolvedPlaceholder(s) => {
                write!(f, "unresolved placeholder: {}", s)
            }
            ScriptError::MissingImplementationContract(s) => {
                write!(f, "implementation contract not yet deployed: {}", s)
            }
            ScriptError::UnsupportedExtensionAction(s) => {
                write!(f, "unsupported extension action: {}", s)
            }
            ScriptError::ArtifactParsing(s) => write!(f, "error parsing artifact: {}", s),
            ScriptError::ReadState(s) => write!(f, "error reading deployment state: {}", s),
            ScriptError::WriteState(s) => write!(f, "error writing deployment state: {}", s),
            ScriptError::ClientInitialization(s) => {
                write!(f, "error initializing client: {}", s)
            }
            ScriptError::CalldataConstruction(s) => {
                write!(f, "error constructing calldata: {}", s)
            }
            ScriptError::ContractDeployment(s) => write!(f, "error deploying contract: {}", s),
            ScriptError::ContractInteraction(s) => {
                write!(f, "error interacting with contract: {}", s)
            }
            ScriptError::Rpc(s) => write!(f, "transient RPC error: {}", s),
            ScriptError::Reverted(s) => write!(f, "transaction reverted: {}", s),
            ScriptError::ConcurrentDeployment(s) => {
                write!(f, "concurrent deployment detected: {}", s)
            }
            ScriptError::Verification(s) => write!(f, "error verifying source: {}", s),
            ScriptError::Inventory(s) => write!(f, "error submitting inventory: {}", s),
        }
    }
}

impl Error for ScriptError {}
