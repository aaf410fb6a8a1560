//! The record store: persists deployment records as timestamped JSON files
//! plus a `-latest` pointer per (contract type, tenant) for the skip path

use std::{
    fs,
    path::PathBuf,
};

use deploy_common::types::DeploymentRecord;

use crate::{
    constants::{JSON_EXTENSION, LATEST_RECORD_SUFFIX, RECORDS_DIR_SEGMENT},
    errors::ScriptError,
};

/// Persists deployment records under a chain state directory.
///
/// Every write lands in a new timestamped file; the pointer file is
/// rewritten to the newest record, so older records are superseded but
/// never deleted.
#[derive(Debug)]
pub struct RecordStore {
    /// The directory holding record files
    records_dir: PathBuf,
}

impl RecordStore {
    /// Creates a store under the given chain state directory
    pub fn new(chain_state_dir: impl Into<PathBuf>) -> Result<Self, ScriptError> {
        let records_dir = chain_state_dir.into().join(RECORDS_DIR_SEGMENT);
        fs::create_dir_all(&records_dir).map_err(|e| ScriptError::WriteState(e.to_string()))?;
        Ok(Self { records_dir })
    }

    /// Persists a record, superseding any previous record for its
    /// (contract type, tenant) pair
    pub fn write(&self, record: &DeploymentRecord) -> Result<(), ScriptError> {
        let contents = serde_json::to_string_pretty(record)
            .map_err(|e| ScriptError::WriteState(e.to_string()))?;

        let timestamped = self
            .records_dir
            .join(format!(
                "{}-{}-{}",
                record.contract_type, record.tenant, record.deployed_at
            ))
            .with_extension(JSON_EXTENSION);
        fs::write(&timestamped, &contents).map_err(|e| ScriptError::WriteState(e.to_string()))?;

        let latest = self.latest_path(&record.contract_type, &record.tenant);
        fs::write(&latest, &contents).map_err(|e| ScriptError::WriteState(e.to_string()))?;

        Ok(())
    }

    /// Reads the latest record for a (contract type, tenant) pair
    pub fn read_latest(
        &self,
        contract_type: &str,
        tenant: &str,
    ) -> Result<DeploymentRecord, ScriptError> {
        let path = self.latest_path(contract_type, tenant);
        let contents = fs::read_to_string(&path).map_err(|e| {
            ScriptError::ReadState(format!("{}: {}", path.display(), e))
        })?;
        serde_json::from_str(&contents)
            .map_err(|e| ScriptError::ReadState(format!("{}: {}", path.display(), e)))
    }

    /// The path of the pair's latest-record pointer file
    fn latest_path(&self, contract_type: &str, tenant: &str) -> PathBuf {
        self.records_dir
            .join(format!(
                "{contract_type}-{tenant}-{LATEST_RECORD_SUFFIX}"
            ))
            .with_extension(JSON_EXTENSION)
    }
}
