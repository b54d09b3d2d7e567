//! Configuration for the filler
//!
//! Reads config from `<config_dir>/fillfs/config.toml`. Every field has a
//! default, so a missing or partial file is fine; `load()` never fails.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

const MIB: u64 = 1024 * 1024;

/// Filler configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FillConfig {
    /// Size of the append buffer in MiB, allocated once and reused.
    pub buffer_mib: u64,
    /// Name of the single file appended to inside the sandbox.
    pub file_name: String,
    /// Minimum persistent grant requested at initialization.
    pub min_grant_bytes: u64,
    /// Sandbox quota for shells that construct a local store.
    pub quota_bytes: u64,
}

impl Default for FillConfig {
    fn default() -> Self {
        Self {
            // Size does not matter once the grant is unlimited; this is the
            // chunk the original demo pushed per write.
            buffer_mib: 100,
            file_name: "big.bin".to_string(),
            min_grant_bytes: MIB,
            quota_bytes: 1024 * MIB,
        }
    }
}

impl FillConfig {
    /// Append buffer size in bytes.
    ///
    /// Saturates so a pathological `buffer_mib` in the config file cannot
    /// wrap around.
    pub fn buffer_bytes(&self) -> u64 {
        self.buffer_mib.saturating_mul(MIB)
    }

    /// Load configuration from the default path, falling back to defaults.
    pub fn load() -> Self {
        Self::load_from_path(&Self::default_config_path()).unwrap_or_default()
    }

    /// Get default config path
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("fillfs")
            .join("config.toml")
    }

    /// Load from a specific path.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = FillConfig::default();
        assert_eq!(config.buffer_mib, 100);
        assert_eq!(config.buffer_bytes(), 100 * 1024 * 1024);
        assert_eq!(config.file_name, "big.bin");
        assert_eq!(config.min_grant_bytes, 1024 * 1024);
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "buffer_mib = 2\nfile_name = \"fill.bin\"\n").unwrap();

        let config = FillConfig::load_from_path(&path).unwrap();
        assert_eq!(config.buffer_mib, 2);
        assert_eq!(config.file_name, "fill.bin");
        assert_eq!(config.min_grant_bytes, 1024 * 1024);
    }

    #[test]
    fn buffer_bytes_saturates_instead_of_wrapping() {
        let config = FillConfig {
            buffer_mib: u64::MAX,
            ..FillConfig::default()
        };
        assert_eq!(config.buffer_bytes(), u64::MAX);

        let config = FillConfig {
            buffer_mib: u64::MAX / MIB,
            ..FillConfig::default()
        };
        assert_eq!(config.buffer_bytes(), (u64::MAX / MIB) * MIB);
    }

    #[test]
    fn missing_file_is_an_error_from_path_but_not_from_load() {
        let dir = tempfile::tempdir().unwrap();
        assert!(FillConfig::load_from_path(&dir.path().join("nope.toml")).is_err());
    }
}
