//! The manifest registry: the read-only list of contract manifest entries
//! for one chain, injected into every component that needs lookups

use std::{collections::HashSet, fs, path::Path};

use deploy_common::types::{ChainProfile, ContractManifestEntry};
use serde::Deserialize;

use crate::errors::ScriptError;

/// The on-disk shape of a chain manifest file: the chain's wiring plus its
/// contract entries
#[derive(Deserialize)]
struct ManifestFile {
    /// The chain profile
    chain: ChainProfile,
    /// The contract manifest entries
    contracts: Vec<ContractManifestEntry>,
}

/// A read-only registry of one chain's contract manifest entries
#[derive(Debug)]
pub struct ManifestRegistry {
    /// The chain's static wiring
    profile: ChainProfile,
    /// The contract entries, in manifest order
    contracts: Vec<ContractManifestEntry>,
}

impl ManifestRegistry {
    /// Loads and validates a chain manifest file
    pub fn load(path: &Path) -> Result<Self, ScriptError> {
        let contents = fs::read_to_string(path).map_err(|e| {
            ScriptError::ManifestParsing(format!("{}: {}", path.display(), e))
        })?;
        let manifest: ManifestFile = serde_json::from_str(&contents).map_err(|e| {
            ScriptError::ManifestParsing(format!("{}: {}", path.display(), e))
        })?;

        Self::from_parts(manifest.chain, manifest.contracts)
    }

    /// Builds a registry from its parts, validating manifest invariants.
    ///
    /// This is the constructor tests use to substitute an in-memory
    /// manifest.
    pub fn from_parts(
        profile: ChainProfile,
        contracts: Vec<ContractManifestEntry>,
    ) -> Result<Self, ScriptError> {
        let mut names = HashSet::new();
        for entry in &contracts {
            if !names.insert(entry.name.as_str()) {
                return Err(ScriptError::ManifestParsing(format!(
                    "duplicate contract name: {}",
                    entry.name
                )));
            }
            if entry.chain != profile.name {
                return Err(ScriptError::ManifestParsing(format!(
                    "contract {} targets chain {} but the manifest is for {}",
                    entry.name, entry.chain, profile.name
                )));
            }
            if entry.network_type != profile.network_type {
                return Err(ScriptError::ManifestParsing(format!(
                    "contract {} network type does not match the chain profile",
                    entry.name
                )));
            }
            if !entry.upgradable && !entry.extensions.is_empty() {
                return Err(ScriptError::ManifestParsing(format!(
                    "contract {} declares extensions but is not upgradable",
                    entry.name
                )));
            }
        }

        Ok(Self { profile, contracts })
    }

    /// The chain's static wiring
    pub fn profile(&self) -> &ChainProfile {
        &self.profile
    }

    /// Looks up a manifest entry by logical name
    pub fn get(&self, name: &str) -> Result<&ContractManifestEntry, ScriptError> {
        self.contracts
            .iter()
            .find(|entry| entry.name == name)
            .ok_or_else(|| ScriptError::ContractNotFound(name.to_string()))
    }
}
