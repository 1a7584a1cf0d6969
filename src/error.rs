//! Error types for the fabric reconciler
//!
//! Every fatal condition of a reconciliation run maps to one variant here.
//! Already-applied controller calls are never rolled back, so each variant
//! carries enough context (object identity, endpoint, raw envelope) for the
//! caller to decide whether a re-run is needed.

use thiserror::Error;

use crate::client::Envelope;

#[derive(Error, Debug)]
pub enum Error {
    /// Desired state is malformed; raised before any mutation
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Network or authentication failure reported by the controller client
    #[error("Transport error on {method} {path}: {message}")]
    TransportError {
        method: String,
        path: String,
        message: String,
    },

    /// The controller answered an apply, save or deploy call with a non-success envelope
    #[error("Controller rejected {operation} ({context}): {envelope}")]
    ControllerResponseError {
        operation: String,
        context: String,
        envelope: Box<Envelope>,
    },

    /// Independent deploy units failed for a kind that tolerates partial deployment
    #[error("Deployment failed in fabric {fabric}: {}", failures.join("; "))]
    DeployError {
        fabric: String,
        failures: Vec<String>,
    },

    /// Switches never reported a synchronized status within the retry budget
    #[error(
        "Switches in fabric {fabric} not in sync after {attempts} attempt(s): {}",
        outstanding.join(", ")
    )]
    ConvergenceTimeout {
        fabric: String,
        attempts: u32,
        outstanding: Vec<String>,
    },

    /// The resolved controller version has no endpoint for this resource kind
    #[error("Resource kind {kind} is not supported by controller version {version}")]
    UnsupportedKind { kind: String, version: String },

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    /// Build a `ControllerResponseError` from a rejected envelope
    pub fn rejected(
        operation: impl Into<String>,
        context: impl Into<String>,
        envelope: Envelope,
    ) -> Self {
        Error::ControllerResponseError {
            operation: operation.into(),
            context: context.into(),
            envelope: Box::new(envelope),
        }
    }

    /// Whether re-running the whole reconciliation may succeed without
    /// changing the desired state
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            Error::TransportError { .. } | Error::ConvergenceTimeout { .. } | Error::HttpError(_)
        )
    }

    /// Short category label used in logs and the CLI error report
    pub fn kind_label(&self) -> &'static str {
        match self {
            Error::ValidationError(_) => "validation",
            Error::TransportError { .. } | Error::HttpError(_) => "transport",
            Error::ControllerResponseError { .. } => "controller_response",
            Error::DeployError { .. } => "deploy",
            Error::ConvergenceTimeout { .. } => "convergence_timeout",
            Error::UnsupportedKind { .. } => "unsupported_kind",
            Error::ConfigError(_)
            | Error::SerializationError(_)
            | Error::YamlError(_)
            | Error::IoError(_) => "config",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_convergence_timeout_names_outstanding_switches() {
        let err = Error::ConvergenceTimeout {
            fabric: "site-a".to_string(),
            attempts: 10,
            outstanding: vec!["10.0.0.1".to_string(), "10.0.0.2".to_string()],
        };
        let msg = err.to_string();
        assert!(msg.contains("site-a"));
        assert!(msg.contains("10 attempt(s)"));
        assert!(msg.contains("10.0.0.1, 10.0.0.2"));
        assert!(err.is_retriable());
        assert_eq!(err.kind_label(), "convergence_timeout");
    }

    #[test]
    fn test_rejected_carries_envelope() {
        let envelope = Envelope::new("POST", "/fabrics/a/config-save", 500, "Internal Error")
            .with_data(json!({"error": "boom"}));
        let err = Error::rejected("config-save", "fabric a", envelope);
        let msg = err.to_string();
        assert!(msg.contains("config-save"));
        assert!(msg.contains("/fabrics/a/config-save"));
        assert!(msg.contains("500"));
        assert!(!err.is_retriable());
    }

    #[test]
    fn test_validation_is_not_retriable() {
        let err = Error::ValidationError("missing peerOneId".to_string());
        assert!(!err.is_retriable());
        assert_eq!(err.kind_label(), "validation");
    }
}
