//! Configuration management for deltasim.
//!
//! Configuration is loaded from multiple sources in priority order:
//! 1. Environment variables (DELTASIM_BANDWIDTH, etc.)
//! 2. Project-local config file (`./deltasim.toml`)
//! 3. User config file (`~/.config/deltasim/config.toml`)
//! 4. Built-in defaults
//!
//! # Config File Format
//!
//! ```toml
//! # deltasim.toml
//!
//! # Default chunk-memory bandwidth in bytes per cycle
//! bandwidth_bytes_per_cycle = 16
//!
//! # Collapse every memory transfer to a single cycle
//! instant_memory_timing = false
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use crate::memory::timing::DEFAULT_BANDWIDTH_BYTES_PER_CYCLE;

/// Global cached configuration.
static CONFIG: OnceLock<Config> = OnceLock::new();

/// deltasim configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Default chunk-memory bandwidth in bytes per cycle.
    pub bandwidth_bytes_per_cycle: Option<u64>,

    /// Collapse every memory transfer to a single cycle.
    pub instant_memory_timing: Option<bool>,
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables
    /// 2. Project-local `deltasim.toml`
    /// 3. User config `~/.config/deltasim/config.toml`
    /// 4. Defaults
    pub fn load() -> Self {
        let mut config = Self::default();

        // Load user config first (lowest priority of file configs)
        if let Some(user_config) = Self::load_user_config() {
            config.merge(user_config);
        }

        // Load project-local config (higher priority)
        if let Some(local_config) = Self::load_local_config() {
            config.merge(local_config);
        }

        // Environment variables override everything
        config.apply_env_overrides();

        config
    }

    /// Get the cached global configuration.
    ///
    /// Loads configuration on first call and caches it.
    pub fn get() -> &'static Config {
        CONFIG.get_or_init(|| {
            let config = Self::load();
            log::debug!("Loaded configuration: {:?}", config);
            config
        })
    }

    /// Get the default bandwidth, with fallback to the built-in value.
    pub fn bandwidth_bytes_per_cycle(&self) -> u64 {
        self.bandwidth_bytes_per_cycle
            .unwrap_or(DEFAULT_BANDWIDTH_BYTES_PER_CYCLE)
    }

    /// Whether memory transfers collapse to a single cycle.
    pub fn instant_memory_timing(&self) -> bool {
        self.instant_memory_timing.unwrap_or(false)
    }

    /// Load user configuration from ~/.config/deltasim/config.toml
    fn load_user_config() -> Option<Self> {
        let config_dir = dirs::config_dir()?;
        let config_path = config_dir.join("deltasim").join("config.toml");
        Self::load_from_file(&config_path)
    }

    /// Load project-local configuration from ./deltasim.toml
    fn load_local_config() -> Option<Self> {
        // Try current directory
        let local_path = Path::new("deltasim.toml");
        if let Some(config) = Self::load_from_file(local_path) {
            return Some(config);
        }

        // Try to find project root by looking for Cargo.toml
        if let Ok(manifest_dir) = std::env::var("CARGO_MANIFEST_DIR") {
            let project_path = Path::new(&manifest_dir).join("deltasim.toml");
            if let Some(config) = Self::load_from_file(&project_path) {
                return Some(config);
            }
        }

        None
    }

    /// Load configuration from a specific file.
    fn load_from_file(path: &Path) -> Option<Self> {
        if !path.exists() {
            return None;
        }

        match std::fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => {
                    log::info!("Loaded config from {}", path.display());
                    Some(config)
                }
                Err(e) => {
                    log::warn!("Failed to parse {}: {}", path.display(), e);
                    None
                }
            },
            Err(e) => {
                log::warn!("Failed to read {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Merge another config into this one.
    /// Only overrides fields that are Some in the other config.
    fn merge(&mut self, other: Self) {
        if other.bandwidth_bytes_per_cycle.is_some() {
            self.bandwidth_bytes_per_cycle = other.bandwidth_bytes_per_cycle;
        }
        if other.instant_memory_timing.is_some() {
            self.instant_memory_timing = other.instant_memory_timing;
        }
    }

    /// Apply environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(raw) = std::env::var("DELTASIM_BANDWIDTH") {
            match raw.parse::<u64>() {
                Ok(value) if value > 0 => {
                    log::info!("Using DELTASIM_BANDWIDTH from environment: {}", value);
                    self.bandwidth_bytes_per_cycle = Some(value);
                }
                _ => log::warn!("Ignoring invalid DELTASIM_BANDWIDTH: {}", raw),
            }
        }
        if let Ok(raw) = std::env::var("DELTASIM_INSTANT_TIMING") {
            let value = matches!(raw.as_str(), "1" | "true" | "yes");
            log::info!("Using DELTASIM_INSTANT_TIMING from environment: {}", value);
            self.instant_memory_timing = Some(value);
        }
    }

    /// Get the path to the user config file (for display/creation).
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("deltasim").join("config.toml"))
    }

    /// Generate a sample config file content.
    pub fn sample_config() -> String {
        r#"# deltasim configuration
# Place this file at ~/.config/deltasim/config.toml or ./deltasim.toml

# Default chunk-memory bandwidth in bytes per cycle
bandwidth_bytes_per_cycle = 8

# Collapse every memory transfer to a single cycle
# instant_memory_timing = false
"#
        .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let config = Config::default();
        assert_eq!(
            config.bandwidth_bytes_per_cycle(),
            DEFAULT_BANDWIDTH_BYTES_PER_CYCLE
        );
        assert!(!config.instant_memory_timing());
    }

    #[test]
    fn test_config_merge() {
        let mut base = Config {
            bandwidth_bytes_per_cycle: Some(4),
            instant_memory_timing: None,
        };

        let overlay = Config {
            bandwidth_bytes_per_cycle: None,
            instant_memory_timing: Some(true),
        };

        base.merge(overlay);

        // bandwidth unchanged (overlay was None)
        assert_eq!(base.bandwidth_bytes_per_cycle, Some(4));
        // instant flag set from overlay
        assert_eq!(base.instant_memory_timing, Some(true));
    }

    #[test]
    fn test_sample_config_parses() {
        let sample = Config::sample_config();
        let config: Config = toml::from_str(&sample).expect("Sample config should parse");
        assert_eq!(config.bandwidth_bytes_per_cycle, Some(8));
    }
}
