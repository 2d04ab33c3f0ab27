use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::Path;

/// Knobs for locating and classifying manifests. Every field has a default,
/// so a config file only needs the fields it changes.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct ResolverConfig {
    /// File-name suffix that marks an entry manifest candidate.
    pub entry_suffix: String,
    /// Path suffix that makes a reference a child manifest rather than a payload.
    pub manifest_suffix: String,
    /// Written in place of references that could not be resolved.
    pub absent_marker: String,
    /// Origin segment of minted handle addresses.
    pub handle_origin: String,
    /// Group name for uploaded files that sit outside any folder.
    pub loose_folder: String,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            entry_suffix: "tileset.json".to_string(),
            manifest_suffix: ".json".to_string(),
            absent_marker: String::new(),
            handle_origin: "tilepack".to_string(),
            loose_folder: "unknown_folder".to_string(),
        }
    }
}

impl ResolverConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let f = File::open(path).with_context(|| format!("open config {:?}", path))?;
        let cfg: Self =
            serde_json::from_reader(f).with_context(|| format!("parse config {:?}", path))?;
        Ok(cfg)
    }

    /// Whether a canonical reference path names another manifest.
    pub fn is_manifest(&self, path: &str) -> bool {
        path.ends_with(&self.manifest_suffix)
    }

    pub fn is_entry_candidate(&self, path: &str) -> bool {
        path.ends_with(&self.entry_suffix)
    }
}
