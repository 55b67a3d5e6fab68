//! CLI argument definitions for the Parley terminal chat.
//!
//! Priority resolution: CLI args > env vars > config file > defaults.

use clap::Parser;
use std::path::PathBuf;

use parley_core::config::ParleyConfig;
use parley_core::types::StorageBackend;

/// Parley - a keyword-matched chat assistant in your terminal.
#[derive(Parser, Debug)]
#[command(name = "parley", version, about)]
pub struct CliArgs {
    /// Path to the configuration file.
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// Key the conversation is stored under.
    #[arg(short = 'k', long = "storage-key")]
    pub storage_key: Option<String>,

    /// Response catalog to use instead of the bundled one (.json or .toml).
    #[arg(long = "catalog")]
    pub catalog: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short = 'l', long = "log-level")]
    pub log_level: Option<String>,

    /// Keep the conversation in memory only.
    #[arg(long = "memory")]
    pub memory: bool,
}

impl CliArgs {
    /// Resolve the configuration file path.
    ///
    /// Priority: --config flag > PARLEY_CONFIG env var > ~/.parley/config.toml.
    pub fn resolve_config_path(&self) -> PathBuf {
        if let Some(ref p) = self.config {
            return p.clone();
        }
        if let Ok(p) = std::env::var("PARLEY_CONFIG") {
            return PathBuf::from(p);
        }
        default_config_path()
    }

    /// Resolve the storage key.
    ///
    /// Priority: --storage-key flag > PARLEY_STORAGE_KEY env var > config file value.
    pub fn resolve_storage_key(&self, config_key: &str) -> String {
        if let Some(ref k) = self.storage_key {
            if !k.trim().is_empty() {
                return k.clone();
            }
        }
        if let Ok(k) = std::env::var("PARLEY_STORAGE_KEY") {
            if !k.trim().is_empty() {
                return k;
            }
        }
        config_key.to_string()
    }

    /// Resolve the log level.
    ///
    /// Priority: --log-level flag > config file value.
    pub fn resolve_log_level(&self, config_level: &str) -> String {
        self.log_level
            .clone()
            .unwrap_or_else(|| config_level.to_string())
    }

    /// Fold the command-line overrides into a loaded configuration.
    pub fn apply(&self, config: &mut ParleyConfig) {
        config.widget.storage_key = self.resolve_storage_key(&config.widget.storage_key);
        config.general.log_level = self.resolve_log_level(&config.general.log_level);
        if let Some(ref catalog) = self.catalog {
            config.widget.catalog_path = Some(catalog.to_string_lossy().to_string());
        }
        if self.memory {
            config.storage.backend = StorageBackend::Memory;
        }
    }
}

/// Default config file path for the current platform.
fn default_config_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    if let Ok(home) = std::env::var("USERPROFILE") {
        return PathBuf::from(home).join(".parley").join("config.toml");
    }
    #[cfg(not(target_os = "windows"))]
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".parley").join("config.toml");
    }
    PathBuf::from("config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_parse() {
        let args = CliArgs::parse_from([
            "parley",
            "--config",
            "/tmp/parley.toml",
            "--storage-key",
            "support-chat",
            "--catalog",
            "catalog.toml",
            "--log-level",
            "debug",
            "--memory",
        ]);
        assert_eq!(args.resolve_config_path(), PathBuf::from("/tmp/parley.toml"));
        assert_eq!(args.resolve_storage_key("ignored"), "support-chat");
        assert_eq!(args.resolve_log_level("info"), "debug");
        assert!(args.memory);
    }

    #[test]
    fn test_apply_overrides_config() {
        let args = CliArgs::parse_from([
            "parley",
            "-k",
            "demo",
            "--catalog",
            "/srv/catalog.json",
            "--memory",
        ]);
        let mut config = ParleyConfig::default();
        args.apply(&mut config);
        assert_eq!(config.widget.storage_key, "demo");
        assert_eq!(
            config.widget.catalog_path.as_deref(),
            Some("/srv/catalog.json")
        );
        assert_eq!(config.storage.backend, StorageBackend::Memory);
        assert_eq!(config.general.log_level, "info");
    }

    #[test]
    fn test_blank_storage_key_flag_is_ignored() {
        let args = CliArgs::parse_from(["parley", "--storage-key", "  "]);
        // Falls through to the env var or the config value
        let key = args.resolve_storage_key("from-config");
        assert!(!key.trim().is_empty());
    }
}
