//! Configuration management for opsgate

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::policy::types::TaskMode;
use crate::retention::FALLBACK_JURISDICTION;

/// Environment variable pointing at an explicit config file
pub const CONFIG_ENV: &str = "OPSGATE_CONFIG";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub gate: GateConfig,
    pub audit: AuditConfig,
    pub retention: RetentionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    /// Block requests that arrive without a whitelist
    pub require_whitelist: bool,
    pub default_mode: TaskMode,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            require_whitelist: true,
            default_mode: TaskMode::Sql,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Receipt log; receipts are not persisted when unset
    pub log_path: Option<PathBuf>,
    /// Mask string literals in logged statements
    pub redact_literals: bool,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            log_path: None,
            redact_literals: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    pub default_jurisdiction: String,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            default_jurisdiction: FALLBACK_JURISDICTION.to_string(),
        }
    }
}

impl Config {
    /// Load from `OPSGATE_CONFIG` or the default location
    pub fn load() -> Result<Self> {
        if let Some(path) = std::env::var_os(CONFIG_ENV) {
            return Self::load_from(Path::new(&path));
        }

        let config_path = Self::config_path()?;
        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            tracing::debug!("No config at {:?}, using defaults", config_path);
            Ok(Config::default())
        }
    }

    /// Load a specific config file
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config {}", path.display()))?;
        Ok(config)
    }

    /// Get the configuration file path
    pub fn config_path() -> Result<PathBuf> {
        if let Some(proj_dirs) = directories::ProjectDirs::from("", "", "opsgate") {
            Ok(proj_dirs.config_dir().join("config.toml"))
        } else {
            Ok(PathBuf::from("config.toml"))
        }
    }

    /// Save configuration to default location
    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(config_path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert!(config.gate.require_whitelist);
        assert!(config.audit.redact_literals);
        assert!(config.audit.log_path.is_none());
        assert_eq!(config.retention.default_jurisdiction, "US-GENERAL");
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: Config = toml::from_str(
            r#"
[gate]
require_whitelist = false

[audit]
log_path = "/var/log/opsgate/receipts.jsonl"
"#,
        )
        .unwrap();
        assert!(!config.gate.require_whitelist);
        assert_eq!(config.gate.default_mode, TaskMode::Sql);
        assert!(config.audit.redact_literals);
        assert_eq!(
            config.audit.log_path,
            Some(PathBuf::from("/var/log/opsgate/receipts.jsonl"))
        );
    }

    #[test]
    fn test_roundtrip_through_toml() {
        let mut config = Config::default();
        config.retention.default_jurisdiction = "GDPR".to_string();
        let text = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed.retention.default_jurisdiction, "GDPR");
    }
}
