//! Layered configuration
//!
//! Sources, lowest priority first:
//!
//! ```text
//! built-in defaults
//!   └─→ TOML file (slotvault.toml, or --config <path>)
//!        └─→ environment (SLOTVAULT_SLOTS__REUSE=false, ...)
//! ```

use crate::error::{Error, Result};
use crate::slots::AllocStrategy;
use ::config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Default config file looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "slotvault.toml";

/// Environment variable prefix
pub const ENV_PREFIX: &str = "SLOTVAULT";

/// Top-level settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub slots: SlotSettings,
    pub save: SaveSettings,
    pub logging: LogSettings,
}

/// Slot table settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SlotSettings {
    /// Capacity of a freshly created table (must be > 0)
    pub initial_capacity: usize,
    /// Recycle freed slots; `false` hands out unique indices (debugging)
    pub reuse: bool,
}

impl Default for SlotSettings {
    fn default() -> Self {
        Self {
            initial_capacity: 1024,
            reuse: true,
        }
    }
}

impl SlotSettings {
    /// Allocation strategy selected by `reuse`
    pub fn strategy(&self) -> AllocStrategy {
        if self.reuse {
            AllocStrategy::Reuse
        } else {
            AllocStrategy::Unique
        }
    }
}

/// Cloud save settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SaveSettings {
    /// Root directory for the local save provider
    pub root: PathBuf,
    /// Sleep between storage setup status checks
    pub setup_poll_interval_ms: u64,
    /// Largest update the local provider accepts
    pub max_update_bytes: usize,
}

impl Default for SaveSettings {
    fn default() -> Self {
        Self {
            root: PathBuf::from("saves"),
            setup_poll_interval_ms: 250,
            max_update_bytes: 16 * 1024 * 1024,
        }
    }
}

impl SaveSettings {
    pub fn setup_poll_interval(&self) -> Duration {
        Duration::from_millis(self.setup_poll_interval_ms)
    }
}

/// Logging settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    /// trace, debug, info, warn, error
    pub level: String,
    /// Directory for rolling log files
    pub directory: PathBuf,
    /// Colored console output
    pub ansi: bool,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            directory: PathBuf::from("logs"),
            ansi: true,
        }
    }
}

impl Settings {
    /// Load settings from defaults, an optional file and the environment
    ///
    /// An explicit `path` must exist; without one, `slotvault.toml` in the
    /// working directory is used if present.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(p) => File::from(p).format(FileFormat::Toml).required(true),
            None => File::new(DEFAULT_CONFIG_FILE, FileFormat::Toml).required(false),
        };

        let settings: Settings = Config::builder()
            .add_source(file)
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        settings.validate()?;
        debug!(?settings, "Loaded configuration");
        Ok(settings)
    }

    /// Parse settings from a TOML string (no environment layer)
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let settings: Settings = Config::builder()
            .add_source(File::from_str(source, FileFormat::Toml))
            .build()?
            .try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Render the effective settings as TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to render settings: {}", e)))
    }

    fn validate(&self) -> Result<()> {
        if self.slots.initial_capacity == 0 {
            return Err(Error::Config(
                "slots.initial_capacity must be greater than zero".to_string(),
            ));
        }
        if self.save.setup_poll_interval_ms == 0 {
            return Err(Error::Config(
                "save.setup_poll_interval_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.slots.initial_capacity, 1024);
        assert_eq!(settings.slots.strategy(), AllocStrategy::Reuse);
        assert_eq!(settings.save.setup_poll_interval(), Duration::from_millis(250));
        assert_eq!(settings.logging.level, "info");
    }

    #[test]
    fn test_partial_toml_keeps_defaults() -> Result<()> {
        let settings = Settings::from_toml_str(
            r#"
            [slots]
            reuse = false

            [save]
            root = "/tmp/saves"
            "#,
        )?;

        assert_eq!(settings.slots.strategy(), AllocStrategy::Unique);
        assert_eq!(settings.slots.initial_capacity, 1024);
        assert_eq!(settings.save.root, PathBuf::from("/tmp/saves"));
        assert_eq!(settings.save.setup_poll_interval_ms, 250);
        Ok(())
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let result = Settings::from_toml_str("[slots]\ninitial_capacity = 0\n");
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_toml_roundtrip() -> Result<()> {
        let mut settings = Settings::default();
        settings.slots.initial_capacity = 64;
        let rendered = settings.to_toml()?;
        assert!(rendered.contains("initial_capacity = 64"));
        assert_eq!(Settings::from_toml_str(&rendered)?, settings);
        Ok(())
    }
}
