//! Controller client capability
//!
//! The reconciliation core only needs four request verbs and one response
//! envelope. Transport concerns (authentication, TLS, timeouts) belong to
//! the implementations in this module, never to the core.

pub mod endpoints;
pub mod mock;
pub mod rest;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

pub use endpoints::{resolve_endpoints, ControllerVersion, EndpointProvider};
pub use mock::{RecordedCall, ScriptedClient};
pub use rest::RestClient;

/// Status code the controller uses for a successful call
pub const STATUS_OK: u16 = 200;

/// Response envelope returned by every controller call
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub status_code: u16,
    pub message: String,
    pub method: String,
    pub path: String,
    #[serde(default)]
    pub data: Value,
}

impl Envelope {
    pub fn new(
        method: impl Into<String>,
        path: impl Into<String>,
        status_code: u16,
        message: impl Into<String>,
    ) -> Self {
        Self {
            status_code,
            message: message.into(),
            method: method.into(),
            path: path.into(),
            data: Value::Null,
        }
    }

    /// Attach a payload
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }

    pub fn is_success(&self) -> bool {
        self.status_code == STATUS_OK
    }

    /// Array payload of a collection endpoint, if any
    pub fn items(&self) -> Option<&Vec<Value>> {
        self.data.as_array()
    }
}

impl fmt::Display for Envelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} -> {} {}",
            self.method, self.path, self.status_code, self.message
        )?;
        if !self.data.is_null() {
            write!(f, " {}", self.data)?;
        }
        Ok(())
    }
}

/// Abstract request/response capability of the fabric controller
///
/// One session is reused for every call of a run; calls are never issued
/// concurrently against it.
#[async_trait]
pub trait ControllerClient: Send + Sync {
    async fn get(&self, path: &str) -> Result<Envelope>;

    async fn post(&self, path: &str, body: Option<&Value>) -> Result<Envelope>;

    async fn put(&self, path: &str, body: &Value) -> Result<Envelope>;

    async fn delete(&self, path: &str, body: Option<&Value>) -> Result<Envelope>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_envelope_success() {
        assert!(Envelope::new("GET", "/x", 200, "OK").is_success());
        assert!(!Envelope::new("GET", "/x", 404, "Not Found").is_success());
        assert!(!Envelope::new("GET", "/x", 201, "Created").is_success());
    }

    #[test]
    fn test_envelope_items() {
        let env = Envelope::new("GET", "/x", 200, "OK").with_data(json!([{"a": 1}]));
        assert_eq!(env.items().map(Vec::len), Some(1));
        let env = Envelope::new("GET", "/x", 200, "OK").with_data(json!({"a": 1}));
        assert!(env.items().is_none());
    }

    #[test]
    fn test_envelope_display_includes_data() {
        let env =
            Envelope::new("PUT", "/pairs/S1", 400, "Bad Request").with_data(json!("bad profile"));
        let text = env.to_string();
        assert_eq!(text, "PUT /pairs/S1 -> 400 Bad Request \"bad profile\"");
    }
}
