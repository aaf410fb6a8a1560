//! The artifact store: locates and parses compiled contract artifacts

use std::{
    fs,
    path::{Path, PathBuf},
};

use ethers::{abi::Abi, types::Bytes};
use serde::Deserialize;

use crate::{
    constants::{JSON_EXTENSION, UPGRADEABLE_PATH_SEGMENT},
    errors::ScriptError,
};

/// A compiled contract artifact, in the shape emitted by the contract build
/// pipeline: the ABI plus deployable creation bytecode
#[derive(Clone, Debug, Deserialize)]
pub struct ContractArtifact {
    /// The contract's ABI
    pub abi: Abi,
    /// The contract's creation bytecode
    pub bytecode: Bytes,
}

/// Locates compiled artifacts under an artifacts root directory.
///
/// Plain contracts live at `<root>/<file>.json`; upgradeable variants live
/// under `<root>/upgradeable/`.
#[derive(Clone, Debug)]
pub struct ArtifactStore {
    /// The artifacts root directory
    root: PathBuf,
}

impl ArtifactStore {
    /// Creates a store rooted at the given directory
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The path of the named contract's compiled artifact
    pub fn artifact_path(&self, file_name: &str, upgradeable: bool) -> PathBuf {
        let dir = if upgradeable {
            self.root.join(UPGRADEABLE_PATH_SEGMENT)
        } else {
            self.root.clone()
        };
        dir.join(file_name).with_extension(JSON_EXTENSION)
    }

    /// Loads and parses the named contract's compiled artifact
    pub fn load(&self, file_name: &str, upgradeable: bool) -> Result<ContractArtifact, ScriptError> {
        let path = self.artifact_path(file_name, upgradeable);
        Self::parse_artifact(&path)
    }

    /// Parses an artifact file
    fn parse_artifact(path: &Path) -> Result<ContractArtifact, ScriptError> {
        let contents = fs::read_to_string(path).map_err(|e| {
            ScriptError::ArtifactParsing(format!("{}: {}", path.display(), e))
        })?;
        serde_json::from_str(&contents)
            .map_err(|e| ScriptError::ArtifactParsing(format!("{}: {}", path.display(), e)))
    }
}
