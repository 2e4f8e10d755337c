//! Layered configuration.
//!
//! Merge order (later overrides earlier):
//! 1. Compiled defaults
//! 2. `packledger.toml` in the working directory, or an explicit `--config` file
//! 3. `PACKLEDGER_*` environment variables
//! 4. `CRON_SECRET`, mapped to `trigger.bearer_token`

use crate::application::coordinator::EngineSettings;
use crate::domain::clock::ReferenceCalendar;
use crate::domain::subscription::{DEFAULT_MATURATION_HOURS, MAX_MATURATION_HOURS};
use crate::error::{EngineError, Result};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_FILE: &str = "packledger.toml";

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub accrual: AccrualConfig,

    #[serde(default)]
    pub trigger: TriggerConfig,

    #[serde(default)]
    pub storage: StorageConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            accrual: AccrualConfig::default(),
            trigger: TriggerConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AccrualConfig {
    /// Maturation window for purchases that do not carry their own.
    #[serde(default = "default_maturation_hours")]
    pub default_maturation_hours: i64,

    /// Offset of the reference timezone used for day rollover.
    #[serde(default)]
    pub reference_utc_offset_minutes: i32,

    /// Subscriptions credited concurrently within one pass.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
}

impl Default for AccrualConfig {
    fn default() -> Self {
        Self {
            default_maturation_hours: default_maturation_hours(),
            reference_utc_offset_minutes: 0,
            max_concurrency: default_max_concurrency(),
        }
    }
}

#[derive(Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TriggerConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Shared secret expected as `Authorization: Bearer <token>`.
    #[serde(default)]
    pub bearer_token: Option<String>,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
            bearer_token: None,
        }
    }
}

impl std::fmt::Debug for TriggerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TriggerConfig")
            .field("bind_address", &self.bind_address)
            .field("port", &self.port)
            .field("bearer_token", &self.bearer_token.as_ref().map(|_| "[redacted]"))
            .finish()
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// RocksDB directory. In-memory storage when unset.
    #[serde(default)]
    pub db_path: Option<PathBuf>,

    /// Subscriptions CSV imported at start.
    #[serde(default)]
    pub seed_csv: Option<PathBuf>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_maturation_hours() -> i64 {
    DEFAULT_MATURATION_HOURS
}

fn default_max_concurrency() -> usize {
    crate::application::accrual::DEFAULT_MAX_CONCURRENCY
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

impl EngineConfig {
    /// Loads `packledger.toml` (if present) or `path`, with env overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(explicit) = path.filter(|p| !p.exists()) {
            return Err(EngineError::ValidationError(format!(
                "config file {} not found",
                explicit.display()
            )));
        }
        let file = path.map_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE), Path::to_path_buf);
        let config: Self = base_figment()
            .merge(Toml::file(file))
            .merge(env_provider())
            .merge(cron_secret_provider())
            .extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Loads from a TOML string only, without environment overrides.
    pub fn from_toml_str(toml: &str) -> Result<Self> {
        let config: Self = base_figment().merge(Toml::string(toml)).extract()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(0..=MAX_MATURATION_HOURS).contains(&self.accrual.default_maturation_hours) {
            return Err(EngineError::ValidationError(format!(
                "accrual.default_maturation_hours must be between 0 and {MAX_MATURATION_HOURS}"
            )));
        }
        if self.accrual.max_concurrency == 0 {
            return Err(EngineError::ValidationError(
                "accrual.max_concurrency must be at least 1".to_string(),
            ));
        }
        ReferenceCalendar::from_offset_minutes(self.accrual.reference_utc_offset_minutes)?;
        if self
            .trigger
            .bearer_token
            .as_deref()
            .is_some_and(|t| t.trim().is_empty())
        {
            return Err(EngineError::ValidationError(
                "trigger.bearer_token cannot be blank".to_string(),
            ));
        }
        Ok(())
    }

    pub fn engine_settings(&self) -> Result<EngineSettings> {
        Ok(EngineSettings {
            calendar: ReferenceCalendar::from_offset_minutes(
                self.accrual.reference_utc_offset_minutes,
            )?,
            max_concurrency: self.accrual.max_concurrency,
        })
    }
}

fn base_figment() -> Figment {
    Figment::new().merge(Serialized::defaults(EngineConfig::default()))
}

/// `PACKLEDGER_TRIGGER_BEARER_TOKEN` -> `trigger.bearer_token`.
///
/// Maps the section prefix explicitly instead of `Env::split("_")`, since key
/// names themselves contain underscores.
fn env_provider() -> Env {
    Env::prefixed("PACKLEDGER_").map(|key| {
        key.as_str()
            .replacen("accrual_", "accrual.", 1)
            .replacen("trigger_", "trigger.", 1)
            .replacen("storage_", "storage.", 1)
            .into()
    })
}

fn cron_secret_provider() -> Env {
    Env::raw()
        .only(&["CRON_SECRET"])
        .map(|_| "trigger.bearer_token".into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::from_toml_str("").unwrap();
        assert_eq!(config.log_level, "info");
        assert_eq!(config.accrual.default_maturation_hours, 24);
        assert_eq!(config.accrual.max_concurrency, 8);
        assert_eq!(config.trigger.port, 8080);
        assert!(config.trigger.bearer_token.is_none());
        assert!(config.storage.db_path.is_none());
    }

    #[test]
    fn test_full_toml() {
        let toml = r#"
log_level = "debug"

[accrual]
default_maturation_hours = 12
reference_utc_offset_minutes = 180
max_concurrency = 2

[trigger]
bind_address = "0.0.0.0"
port = 9000
bearer_token = "s3cret"

[storage]
db_path = "/var/lib/packledger"
"#;
        let config = EngineConfig::from_toml_str(toml).unwrap();
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.accrual.default_maturation_hours, 12);
        assert_eq!(config.trigger.bearer_token.as_deref(), Some("s3cret"));
        assert_eq!(
            config.storage.db_path.as_deref(),
            Some(Path::new("/var/lib/packledger"))
        );

        let settings = config.engine_settings().unwrap();
        assert_eq!(settings.max_concurrency, 2);
        assert_eq!(settings.calendar.offset().local_minus_utc(), 180 * 60);
    }

    #[test]
    fn test_unknown_field_rejected() {
        let result = EngineConfig::from_toml_str("[accrual]\nrate = 1\n");
        assert!(matches!(result, Err(EngineError::ConfigError(_))));
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let zero = EngineConfig::from_toml_str("[accrual]\nmax_concurrency = 0\n");
        assert!(matches!(zero, Err(EngineError::ValidationError(_))));

        let offset = EngineConfig::from_toml_str("[accrual]\nreference_utc_offset_minutes = 1000\n");
        assert!(matches!(offset, Err(EngineError::ValidationError(_))));

        let huge =
            EngineConfig::from_toml_str("[accrual]\ndefault_maturation_hours = 9000000000000000\n");
        assert!(matches!(huge, Err(EngineError::ValidationError(_))));

        let negative = EngineConfig::from_toml_str("[accrual]\ndefault_maturation_hours = -1\n");
        assert!(matches!(negative, Err(EngineError::ValidationError(_))));

        let blank = EngineConfig::from_toml_str("[trigger]\nbearer_token = \"  \"\n");
        assert!(matches!(blank, Err(EngineError::ValidationError(_))));
    }

    #[test]
    fn test_debug_redacts_token() {
        let config = TriggerConfig {
            bearer_token: Some("s3cret".to_string()),
            ..TriggerConfig::default()
        };
        let debug = format!("{config:?}");
        assert!(!debug.contains("s3cret"));
        assert!(debug.contains("[redacted]"));
    }
}
