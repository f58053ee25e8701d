//! Service configuration
//!
//! Everything the server needs at startup lives in one YAML-loadable
//! `PilotConfig`. Cloud credentials are never read ad hoc at call time:
//! `EnvironmentConfig` names the recognized variables and `capture` snapshots
//! them from the process environment exactly once, at construction, so the
//! deploy driver only ever sees an explicit map.

use crate::errors::PilotError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

fn default_bind_addr() -> String {
    "127.0.0.1:3000".to_string()
}

fn default_terraform_bin() -> String {
    "terraform".to_string()
}

fn default_api_base() -> String {
    crate::github::DEFAULT_API_BASE.to_string()
}

fn default_forward_vars() -> Vec<String> {
    [
        "AWS_ACCESS_KEY_ID",
        "AWS_SECRET_ACCESS_KEY",
        "AWS_SESSION_TOKEN",
        "AWS_REGION",
        "AWS_DEFAULT_REGION",
        "GOOGLE_APPLICATION_CREDENTIALS",
        "GOOGLE_PROJECT",
        "ARM_CLIENT_ID",
        "ARM_CLIENT_SECRET",
        "ARM_SUBSCRIPTION_ID",
        "ARM_TENANT_ID",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// Top-level configuration for the tfpilot service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PilotConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    /// Name (or path) of the provisioning executable.
    #[serde(default = "default_terraform_bin")]
    pub terraform_bin: String,
    /// Root directory for per-deployment working directories. Defaults to a
    /// directory under the user data dir when unset.
    #[serde(default)]
    pub workspace_dir: Option<PathBuf>,
    #[serde(default)]
    pub github: GithubSettings,
    #[serde(default)]
    pub environment: EnvironmentConfig,
    /// Optional backend state configuration written into every deployment
    /// directory as `backend.tf.json`.
    #[serde(default)]
    pub backend: Option<BackendConfig>,
}

impl Default for PilotConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            terraform_bin: default_terraform_bin(),
            workspace_dir: None,
            github: GithubSettings::default(),
            environment: EnvironmentConfig::default(),
            backend: None,
        }
    }
}

impl PilotConfig {
    /// Load a configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, PilotError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            PilotError::Config(format!(
                "Failed to read config file {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        serde_yaml::from_str(&content)
            .map_err(|e| PilotError::Config(format!("Invalid configuration: {}", e)))
    }

    /// Load from the given path when present, otherwise fall back to defaults.
    pub fn load_or_default(path: Option<&str>) -> Result<Self, PilotError> {
        match path {
            Some(p) => Self::from_file(p),
            None => Ok(Self::default()),
        }
    }
}

/// GitHub API access settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GithubSettings {
    /// API base URL, overridable for mock servers in tests.
    #[serde(default = "default_api_base")]
    pub api_base: String,
    /// Optional bearer token for private repositories and higher rate limits.
    #[serde(default)]
    pub token: Option<String>,
}

impl Default for GithubSettings {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            token: None,
        }
    }
}

/// Allowlist of credential environment variables forwarded to the
/// provisioning executable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvironmentConfig {
    #[serde(default = "default_forward_vars")]
    pub forward: Vec<String>,
    /// Extra variables set verbatim in the child environment.
    #[serde(default)]
    pub variables: BTreeMap<String, String>,
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            forward: default_forward_vars(),
            variables: BTreeMap::new(),
        }
    }
}

impl EnvironmentConfig {
    /// Snapshot the recognized variables from the process environment.
    ///
    /// Called once at startup; absent variables are simply not captured.
    pub fn capture(&self) -> HashMap<String, String> {
        let mut captured: HashMap<String, String> = HashMap::new();
        for name in &self.forward {
            if let Ok(value) = std::env::var(name) {
                captured.insert(name.clone(), value);
            }
        }
        for (name, value) in &self.variables {
            captured.insert(name.clone(), value.clone());
        }
        captured
    }
}

/// Backend state configuration for the provisioning executable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(rename = "type")]
    pub backend_type: String,
    #[serde(default)]
    pub settings: BTreeMap<String, String>,
}
