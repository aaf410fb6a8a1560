//! The inventory sink: off-chain bookkeeping of deployment records.
//!
//! Submission failures are logged and swallowed by callers; the deployment
//! itself is already durable on-chain and in the record store.

use std::{
    fs::OpenOptions,
    io::Write,
    path::PathBuf,
};

use async_trait::async_trait;
use deploy_common::types::DeploymentRecord;

use crate::errors::ScriptError;

/// Accepts deployment records for durable off-chain bookkeeping
#[async_trait]
pub trait InventoryService: Send + Sync {
    /// Submits a batch of records
    async fn submit(&self, records: &[DeploymentRecord]) -> Result<(), ScriptError>;
}

/// An inventory sink appending records as JSON lines to a local file
#[derive(Debug)]
pub struct FileInventory {
    /// The JSON-lines file records are appended to
    path: PathBuf,
}

impl FileInventory {
    /// Creates a sink appending to the given file
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl InventoryService for FileInventory {
    async fn submit(&self, records: &[DeploymentRecord]) -> Result<(), ScriptError> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| ScriptError::Inventory(e.to_string()))?;

        for record in records {
            let line = serde_json::to_string(record)
                .map_err(|e| ScriptError::Inventory(e.to_string()))?;
            writeln!(file, "{line}").map_err(|e| ScriptError::Inventory(e.to_string()))?;
        }

        Ok(())
    }
}
