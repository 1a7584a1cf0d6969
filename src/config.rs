//! Run configuration
//!
//! One YAML file describes one reconciliation: where the controller lives,
//! which fabric and resource kind to reconcile, the declared verb, and the
//! desired entries.

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::client::ControllerVersion;
use crate::error::{Error, Result};

/// Declared reconciliation verb
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReconcileState {
    /// Create and additively update, never delete
    #[default]
    Merged,
    /// Create and update to exactly the declared attributes
    Replaced,
    /// Like `Replaced`, and delete everything not declared
    Overridden,
    /// Delete declared entries, or everything when none are declared
    Deleted,
    /// Read-only lookup
    Query,
}

impl ReconcileState {
    /// Strict states compare lists by length and do not inherit omitted fields
    pub fn is_strict(&self) -> bool {
        matches!(self, ReconcileState::Replaced | ReconcileState::Overridden)
    }

    /// States that require every identity field on each desired entry
    pub fn requires_full_identity(&self) -> bool {
        matches!(
            self,
            ReconcileState::Merged | ReconcileState::Replaced | ReconcileState::Overridden
        )
    }
}

impl fmt::Display for ReconcileState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReconcileState::Merged => write!(f, "merged"),
            ReconcileState::Replaced => write!(f, "replaced"),
            ReconcileState::Overridden => write!(f, "overridden"),
            ReconcileState::Deleted => write!(f, "deleted"),
            ReconcileState::Query => write!(f, "query"),
        }
    }
}

impl FromStr for ReconcileState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "merged" => Ok(ReconcileState::Merged),
            "replaced" => Ok(ReconcileState::Replaced),
            "overridden" => Ok(ReconcileState::Overridden),
            "deleted" => Ok(ReconcileState::Deleted),
            "query" => Ok(ReconcileState::Query),
            other => Err(Error::ConfigError(format!("unknown state '{other}'"))),
        }
    }
}

/// Retry budget for convergence polling
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollSettings {
    pub max_attempts: u32,
    #[serde(rename = "interval_secs", with = "duration_secs")]
    pub interval: Duration,
}

impl PollSettings {
    pub const fn new(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts,
            interval,
        }
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_secs)
    }
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_domain() -> String {
    "local".to_string()
}

/// Controller connection settings
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ControllerSettings {
    pub url: String,
    #[serde(default)]
    pub username: String,
    /// Environment variable holding the password
    #[serde(default)]
    pub password_env: Option<String>,
    /// Environment variable holding a pre-issued session token
    #[serde(default)]
    pub token_env: Option<String>,
    #[serde(default = "default_domain")]
    pub domain: String,
    #[serde(default)]
    pub verify_tls: bool,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub version: ControllerVersion,
}

impl ControllerSettings {
    /// Session token from the configured environment variable, if any
    pub fn token(&self) -> Result<Option<String>> {
        match &self.token_env {
            Some(var) => std::env::var(var)
                .map(Some)
                .map_err(|_| Error::ConfigError(format!("environment variable {var} is not set"))),
            None => Ok(None),
        }
    }

    /// Password from the configured environment variable
    pub fn password(&self) -> Result<String> {
        let var = self.password_env.as_deref().ok_or_else(|| {
            Error::ConfigError("controller needs either password_env or token_env".to_string())
        })?;
        std::env::var(var)
            .map_err(|_| Error::ConfigError(format!("environment variable {var} is not set")))
    }
}

/// Complete description of one reconciliation run
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    pub controller: ControllerSettings,
    pub fabric: String,
    pub kind: String,
    #[serde(default)]
    pub state: ReconcileState,
    /// Overrides the resource kind's default poll budget
    #[serde(default)]
    pub poll: Option<PollSettings>,
    /// Desired entries, in the controller's field names
    #[serde(default)]
    pub config: Vec<Value>,
}

impl RunConfig {
    pub fn from_yaml(text: &str) -> Result<Self> {
        let config: RunConfig = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml(&text)
    }

    pub fn validate(&self) -> Result<()> {
        if self.fabric.trim().is_empty() {
            return Err(Error::ConfigError("fabric must not be empty".to_string()));
        }
        if self.controller.url.trim().is_empty() {
            return Err(Error::ConfigError(
                "controller.url must not be empty".to_string(),
            ));
        }
        if let Some(poll) = &self.poll {
            if poll.max_attempts == 0 {
                return Err(Error::ConfigError(
                    "poll.max_attempts must be at least 1".to_string(),
                ));
            }
        }
        // an empty `overridden` run deletes everything, like `deleted`
        if matches!(self.state, ReconcileState::Merged | ReconcileState::Replaced)
            && self.config.is_empty()
        {
            return Err(Error::ConfigError(format!(
                "state '{}' needs at least one config entry",
                self.state
            )));
        }
        Ok(())
    }
}
