//! Forms Configuration

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Forms engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FormsConfig {
    /// Directory holding the persisted collection
    pub storage_dir: PathBuf,
    /// Fixed key of the persisted collection (file stem)
    pub storage_key: String,
    /// Options seeded into new select/radio/checkbox fields
    pub default_options: Vec<String>,
}

impl Default for FormsConfig {
    fn default() -> Self {
        Self {
            storage_dir: PathBuf::from("."),
            storage_key: "upliance_forms".into(),
            default_options: vec!["Option 1".into(), "Option 2".into()],
        }
    }
}

impl FormsConfig {
    /// Load from file
    pub fn load(path: impl AsRef<Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Path of the JSON file backing the form collection
    pub fn storage_path(&self) -> PathBuf {
        self.storage_dir.join(format!("{}.json", self.storage_key))
    }

    pub fn with_storage_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.storage_dir = dir.into();
        self
    }
}
