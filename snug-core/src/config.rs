//! Configuration (spec.md §6): optional YAML file describing storage
//! tiers and mirroring behavior. Absence of a config file is not an
//! error — the facade falls back to a single filesystem tier rooted at
//! `SNUG_STORAGE` or `~/.snug`.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, SnugError};

const STORAGE_ENV_VAR: &str = "SNUG_STORAGE";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VolumeType {
    Primary,
    Secondary,
    Glacier,
    Mirror,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageLocation {
    pub path: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub priority: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed: Option<String>,
    pub volume_type: VolumeType,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnugConfig {
    #[serde(default)]
    pub storage_locations: Vec<StorageLocation>,
    #[serde(default)]
    pub default_hash_algorithm: Option<String>,
    #[serde(default)]
    pub enable_mirroring: bool,
    #[serde(default)]
    pub mirror_locations: Vec<String>,
    #[serde(default = "default_true")]
    pub fail_if_primary_unavailable: bool,
}

fn default_true() -> bool {
    true
}

impl Default for SnugConfig {
    fn default() -> Self {
        Self {
            storage_locations: Vec::new(),
            default_hash_algorithm: None,
            enable_mirroring: false,
            mirror_locations: Vec::new(),
            fail_if_primary_unavailable: true,
        }
    }
}

impl SnugConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .map_err(|e| SnugError::Config(format!("reading {}: {e}", path.display())))?;
        serde_yaml::from_str(&contents).map_err(|e| SnugError::Config(e.to_string()))
    }

    /// Loads from `explicit_path` if given, else `~/.snug/config.yaml` if it
    /// exists, else falls back to defaults (no config file is not an error).
    pub fn load_or_default(explicit_path: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit_path {
            return Self::load(path);
        }
        match default_config_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }

    pub fn has_declared_secondary_tiers(&self) -> bool {
        self.enable_mirroring
            || !self.mirror_locations.is_empty()
            || self
                .storage_locations
                .iter()
                .any(|l| l.volume_type != VolumeType::Primary)
    }
}

fn default_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".snug").join("config.yaml"))
}

/// Resolves the default chunk-store root: `SNUG_STORAGE` env var, else
/// `~/.snug`, per spec.md §6.
pub fn default_storage_root() -> PathBuf {
    if let Ok(path) = std::env::var(STORAGE_ENV_VAR) {
        return PathBuf::from(path);
    }
    dirs::home_dir()
        .map(|h| h.join(".snug"))
        .unwrap_or_else(|| PathBuf::from(".snug"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_yaml() {
        let yaml = "storageLocations:\n  - path: /data/primary\n    required: true\n    priority: 0\n    volumeType: primary\n";
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(&path, yaml).unwrap();

        let config = SnugConfig::load(&path).unwrap();
        assert_eq!(config.storage_locations.len(), 1);
        assert_eq!(config.storage_locations[0].path, PathBuf::from("/data/primary"));
        assert!(config.fail_if_primary_unavailable);
    }

    #[test]
    fn missing_explicit_path_is_an_error() {
        let err = SnugConfig::load(Path::new("/no/such/config.yaml")).unwrap_err();
        assert!(matches!(err, SnugError::Config(_)));
    }

    #[test]
    fn absence_of_config_falls_back_to_defaults() {
        // No explicit path and (in this sandboxed test run) no real
        // ~/.snug/config.yaml: defaults apply rather than erroring.
        let config = SnugConfig::default();
        assert!(!config.enable_mirroring);
        assert!(config.storage_locations.is_empty());
    }

    #[test]
    fn declared_secondary_tiers_detected_from_mirroring_flag() {
        let mut config = SnugConfig::default();
        assert!(!config.has_declared_secondary_tiers());
        config.enable_mirroring = true;
        assert!(config.has_declared_secondary_tiers());
    }
}
