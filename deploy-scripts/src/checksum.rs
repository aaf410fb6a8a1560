//! The checksum store: filesystem markers recording which (contract,
//! tenant) pairs have already been deployed, plus the deploy lock guarding
//! the check-then-deploy-then-write sequence against concurrent runs

use std::{
    fs::{self, OpenOptions},
    path::PathBuf,
    time::Duration,
};

use deploy_common::types::ContractManifestEntry;
use ethers::utils::keccak256;
use tracing::warn;

use crate::{
    constants::{
        CHECKSUMS_DIR_SEGMENT, LOCKS_DIR_SEGMENT, LOCK_ACQUIRE_ATTEMPTS, LOCK_EXTENSION,
        LOCK_RETRY_DELAY_MS,
    },
    errors::ScriptError,
};

/// Records deployed (contract, tenant) pairs as empty marker files.
///
/// The fingerprint covers the implementation file name, the logical name,
/// and the tenant. It deliberately does NOT cover constructor arguments:
/// editing a manifest's args without clearing the checksum silently reuses
/// the stale deployment. Opting into `include_args` folds the raw args into
/// the fingerprint so such edits force a redeploy.
#[derive(Debug)]
pub struct ChecksumStore {
    /// The directory holding checksum marker files
    checksums_dir: PathBuf,
    /// The directory holding deploy lock files
    locks_dir: PathBuf,
    /// Whether constructor arguments participate in the fingerprint
    include_args: bool,
}

impl ChecksumStore {
    /// Creates a store under the given chain state directory
    pub fn new(
        chain_state_dir: impl Into<PathBuf>,
        include_args: bool,
    ) -> Result<Self, ScriptError> {
        let chain_state_dir = chain_state_dir.into();
        let checksums_dir = chain_state_dir.join(CHECKSUMS_DIR_SEGMENT);
        let locks_dir = chain_state_dir.join(LOCKS_DIR_SEGMENT);
        for dir in [&checksums_dir, &locks_dir] {
            fs::create_dir_all(dir).map_err(|e| ScriptError::WriteState(e.to_string()))?;
        }

        Ok(Self {
            checksums_dir,
            locks_dir,
            include_args,
        })
    }

    /// The stable fingerprint of a (contract, tenant) pair
    pub fn fingerprint(&self, entry: &ContractManifestEntry, tenant: &str) -> String {
        let mut preimage = format!(
            "{}\n{}\n{}",
            entry.implementation_file_name, entry.name, tenant
        );
        if self.include_args {
            // Infallible: ArgValue serializes back to plain JSON values
            let args = serde_json::to_string(&entry.constructor_args).unwrap();
            preimage.push('\n');
            preimage.push_str(&args);
        }
        hex::encode(keccak256(preimage.as_bytes()))
    }

    /// Whether the pair's checksum marker exists.
    ///
    /// Filesystem-only bookkeeping: this never consults the chain.
    pub fn is_already_deployed(&self, entry: &ContractManifestEntry, tenant: &str) -> bool {
        self.marker_path(entry, tenant).exists()
    }

    /// Writes the pair's checksum marker
    pub fn write(&self, entry: &ContractManifestEntry, tenant: &str) -> Result<(), ScriptError> {
        fs::write(self.marker_path(entry, tenant), [])
            .map_err(|e| ScriptError::WriteState(e.to_string()))
    }

    /// Acquires the deploy lock for a (contract, tenant) pair, retrying for
    /// a bounded interval before reporting a concurrent run
    pub async fn lock(
        &self,
        entry: &ContractManifestEntry,
        tenant: &str,
    ) -> Result<DeployGuard, ScriptError> {
        let path = self
            .locks_dir
            .join(self.fingerprint(entry, tenant))
            .with_extension(LOCK_EXTENSION);

        for attempt in 1..=LOCK_ACQUIRE_ATTEMPTS {
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(_) => return Ok(DeployGuard { path }),
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    if attempt == LOCK_ACQUIRE_ATTEMPTS {
                        break;
                    }
                    warn!(
                        contract = %entry.name,
                        tenant,
                        "deploy lock held by another run, waiting"
                    );
                    tokio::time::sleep(Duration::from_millis(LOCK_RETRY_DELAY_MS)).await;
                }
                Err(e) => return Err(ScriptError::WriteState(e.to_string())),
            }
        }

        Err(ScriptError::ConcurrentDeployment(format!(
            "{} for tenant {} (stale lock? remove {})",
            entry.name,
            tenant,
            path.display()
        )))
    }

    /// The path of the pair's checksum marker file
    fn marker_path(&self, entry: &ContractManifestEntry, tenant: &str) -> PathBuf {
        self.checksums_dir.join(self.fingerprint(entry, tenant))
    }
}

/// Holds the deploy lock for one (contract, tenant) pair; releases it on
/// drop
#[derive(Debug)]
pub struct DeployGuard {
    /// The lock file path
    path: PathBuf,
}

impl Drop for DeployGuard {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!("failed to release deploy lock {}: {e}", self.path.display());
        }
    }
}
