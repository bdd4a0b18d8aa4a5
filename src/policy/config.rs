use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::policy::types::{TaskMode, WhitelistEntry};

/// Category of a client configuration rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RuleCategory {
    #[serde(rename = "SQL Security")]
    SqlSecurity,
    #[serde(rename = "Data Access")]
    DataAccess,
    #[serde(rename = "PII Protection")]
    PiiProtection,
    Operations,
    Audit,
    #[serde(other)]
    Other,
}

impl fmt::Display for RuleCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RuleCategory::SqlSecurity => "SQL Security",
            RuleCategory::DataAccess => "Data Access",
            RuleCategory::PiiProtection => "PII Protection",
            RuleCategory::Operations => "Operations",
            RuleCategory::Audit => "Audit",
            RuleCategory::Other => "Other",
        };
        write!(f, "{}", s)
    }
}

/// One structured rule from a client's compliance configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigurationRule {
    pub id: String,
    pub category: RuleCategory,
    pub rule: String,
    #[serde(default = "default_confidence")]
    pub confidence: f64,
    #[serde(default)]
    pub source: String,
    /// Signature names or table names this rule is about; empty means all
    #[serde(default)]
    pub applies_to: Vec<String>,
}

fn default_confidence() -> f64 {
    1.0
}

impl ConfigurationRule {
    /// True when `applies_to` is empty or names one of `subjects`
    pub fn applies_to_any<'a, I>(&self, subjects: I) -> bool
    where
        I: IntoIterator<Item = &'a str>,
    {
        if self.applies_to.is_empty() {
            return true;
        }
        subjects
            .into_iter()
            .any(|s| self.applies_to.iter().any(|a| a.eq_ignore_ascii_case(s)))
    }
}

/// A client's compliance configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientConfig {
    pub client_id: String,
    #[serde(default)]
    pub client_name: Option<String>,
    #[serde(default)]
    pub jurisdiction: Option<String>,
    #[serde(default)]
    pub mode: TaskMode,
    #[serde(default)]
    pub whitelist: Vec<WhitelistEntry>,
    #[serde(default)]
    pub rules: Vec<ConfigurationRule>,
}

impl ClientConfig {
    /// Whitelist as passed to the decision engine; `None` when none is configured
    pub fn whitelist(&self) -> Option<&[WhitelistEntry]> {
        if self.whitelist.is_empty() {
            None
        } else {
            Some(&self.whitelist)
        }
    }
}

/// Parse a client config file
pub fn load_from(path: &Path) -> Result<ClientConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read client config {}", path.display()))?;
    let config: ClientConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse client config {}", path.display()))?;
    tracing::debug!(
        "Loaded client config {} ({} tables, {} rules)",
        config.client_id,
        config.whitelist.len(),
        config.rules.len()
    );
    Ok(config)
}

/// Loads a client's configuration from user and workspace locations
pub struct ClientConfigLoader {
    user_dir: PathBuf,
    workspace_dir: Option<PathBuf>,
}

impl ClientConfigLoader {
    pub fn new(workspace_dir: Option<&Path>) -> Self {
        let user_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("opsgate")
            .join("clients");

        let workspace_dir = workspace_dir.map(|w| w.join(".opsgate/clients"));

        Self {
            user_dir,
            workspace_dir,
        }
    }

    /// Loader rooted at explicit directories
    pub fn with_dirs(user_dir: PathBuf, workspace_dir: Option<PathBuf>) -> Self {
        Self {
            user_dir,
            workspace_dir,
        }
    }

    fn user_path(&self, client_id: &str) -> PathBuf {
        self.user_dir.join(format!("{}.toml", client_id))
    }

    fn workspace_path(&self, client_id: &str) -> Option<PathBuf> {
        self.workspace_dir
            .as_ref()
            .map(|d| d.join(format!("{}.toml", client_id)))
    }

    /// Load and merge configs (workspace overrides user)
    pub fn load(&self, client_id: &str) -> Result<ClientConfig> {
        let user_path = self.user_path(client_id);
        let user = if user_path.exists() {
            Some(load_from(&user_path)?)
        } else {
            tracing::debug!("No user client config at {:?}", user_path);
            None
        };

        let workspace = match self.workspace_path(client_id) {
            Some(path) if path.exists() => Some(load_from(&path)?),
            _ => None,
        };

        let merged = match (user, workspace) {
            (None, None) => anyhow::bail!("No configuration found for client '{}'", client_id),
            (Some(user), None) => user,
            (None, Some(workspace)) => workspace,
            (Some(mut merged), Some(workspace)) => {
                if workspace.client_name.is_some() {
                    merged.client_name = workspace.client_name;
                }
                if workspace.jurisdiction.is_some() {
                    merged.jurisdiction = workspace.jurisdiction;
                }
                merged.mode = workspace.mode;
                if !workspace.whitelist.is_empty() {
                    merged.whitelist = workspace.whitelist;
                }
                // Workspace rules override user rules by id
                for ws_rule in workspace.rules {
                    merged.rules.retain(|r| r.id != ws_rule.id);
                    merged.rules.push(ws_rule);
                }
                merged
            }
        };

        if merged.client_id != client_id {
            tracing::warn!(
                "Client config for '{}' declares client_id '{}'",
                client_id,
                merged.client_id
            );
        }

        Ok(merged)
    }
}
