use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{ParleyError, Result};
use crate::types::StorageBackend;

/// Storage key used when the embedding application does not supply one.
pub const DEFAULT_STORAGE_KEY: &str = "chat-widget-messages";

/// Top-level configuration for a Parley chat widget.
///
/// Loaded from `~/.parley/config.toml` by default. Every section falls back
/// to its defaults when absent, so an empty file is a valid configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParleyConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub widget: WidgetConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub reveal: RevealConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

impl ParleyConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read, parsed, or fails
    /// validation.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: ParleyConfig = toml::from_str(&content)?;
        config.validate()?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist, cannot be parsed, or is invalid.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }

    /// Check cross-field constraints that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.session.reply_delay_min_ms >= self.session.reply_delay_max_ms {
            return Err(ParleyError::Config(format!(
                "session.reply_delay_min_ms ({}) must be less than reply_delay_max_ms ({})",
                self.session.reply_delay_min_ms, self.session.reply_delay_max_ms
            )));
        }
        if self.reveal.tick_interval_ms == 0 {
            return Err(ParleyError::Config(
                "reveal.tick_interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.widget.storage_key.trim().is_empty() {
            return Err(ParleyError::Config(
                "widget.storage_key must not be blank".to_string(),
            ));
        }
        Ok(())
    }
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Directory holding the SQLite database.
    pub data_dir: String,
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            data_dir: "~/.parley/data".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// Settings the embedding application exposes on the widget itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WidgetConfig {
    /// Key the conversation log is persisted under.
    pub storage_key: String,
    /// Whether follow-up suggestion chips are surfaced at all.
    pub show_suggestions: bool,
    /// Replaces the text of the seeded greeting when set.
    pub initial_greeting: Option<String>,
    /// Quick prompts offered while the conversation is empty.
    pub starter_prompts: Vec<String>,
    /// Alternate response catalog (`.json` or `.toml`).
    pub catalog_path: Option<String>,
}

impl Default for WidgetConfig {
    fn default() -> Self {
        Self {
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
            show_suggestions: true,
            initial_greeting: None,
            starter_prompts: vec![
                "What services do you offer?".to_string(),
                "Tell me about your AI philosophy".to_string(),
                "How do I get started?".to_string(),
            ],
            catalog_path: None,
        }
    }
}

/// Simulated reply latency.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Lower bound of the typing delay (inclusive).
    pub reply_delay_min_ms: u64,
    /// Upper bound of the typing delay (exclusive).
    pub reply_delay_max_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            reply_delay_min_ms: 1000,
            reply_delay_max_ms: 2000,
        }
    }
}

/// Progressive reveal cadence.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RevealConfig {
    /// Milliseconds between two reveal frames.
    pub tick_interval_ms: u64,
}

impl Default for RevealConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 20,
        }
    }
}

/// Persistence medium selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// SQLite file name, relative to `general.data_dir`.
    pub database_file: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Sqlite,
            database_file: "parley.db".to_string(),
        }
    }
}
