//! The `data.yaml` manifest consumed by training tools.

use std::path::Path;

use serde::{Deserialize, Serialize};

use super::Split;
use crate::atomic::write_atomic;
use crate::error::FramelabelError;
use crate::registry::LabelRegistry;

/// Summary of a dataset: where it lives, where its splits are and which
/// classes it has.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub path: String,
    pub train: String,
    pub val: String,
    pub nc: usize,
    pub names: Vec<String>,
}

impl Manifest {
    /// Builds the manifest for `root` from the registry, in id order.
    pub fn new(root: &Path, registry: &LabelRegistry) -> Self {
        Self {
            path: root.to_string_lossy().replace('\\', "/"),
            train: format!("images/{}", Split::Train),
            val: format!("images/{}", Split::Val),
            nc: registry.len(),
            names: registry.names().to_vec(),
        }
    }

    pub fn to_yaml(&self, path: &Path) -> Result<String, FramelabelError> {
        serde_yaml::to_string(self).map_err(|source| FramelabelError::ManifestWrite {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn write(&self, path: &Path) -> Result<(), FramelabelError> {
        let yaml = self.to_yaml(path)?;
        write_atomic(path, yaml.as_bytes())
    }
}
