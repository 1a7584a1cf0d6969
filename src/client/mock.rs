//! Scripted controller client for tests and dry runs.
//!
//! Records every call and serves pre-configured envelopes, making it easy
//! to drive the reconciliation flow deterministically.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::Value;

use super::{ControllerClient, Envelope};
use crate::error::{Error, Result};

/// One call observed by the scripted client
#[derive(Clone, Debug, PartialEq)]
pub struct RecordedCall {
    pub method: String,
    pub path: String,
    pub body: Option<Value>,
}

type RouteKey = (String, String);

/// A test-double that records calls and serves routed envelopes.
///
/// Each route holds a queue of responses; the last one repeats once the
/// queue is drained. Unrouted calls answer `200 OK` with no data.
#[derive(Default)]
pub struct ScriptedClient {
    routes: Mutex<HashMap<RouteKey, VecDeque<Envelope>>>,
    failures: Mutex<HashSet<RouteKey>>,
    calls: Mutex<Vec<RecordedCall>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl ScriptedClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a response for a method and path
    pub fn route(&self, method: &str, path: &str, envelope: Envelope) {
        lock(&self.routes)
            .entry((method.to_string(), path.to_string()))
            .or_default()
            .push_back(envelope);
    }

    /// Queue a `200 OK` response carrying `data`
    pub fn route_ok(&self, method: &str, path: &str, data: Value) {
        self.route(
            method,
            path,
            Envelope::new(method, path, 200, "OK").with_data(data),
        );
    }

    /// Make every call to a method and path fail at the transport level
    pub fn fail_transport(&self, method: &str, path: &str) {
        lock(&self.failures).insert((method.to_string(), path.to_string()));
    }

    /// All calls made so far, in order
    pub fn calls(&self) -> Vec<RecordedCall> {
        lock(&self.calls).clone()
    }

    /// Calls made with the given method
    pub fn calls_with(&self, method: &str) -> Vec<RecordedCall> {
        lock(&self.calls)
            .iter()
            .filter(|c| c.method == method)
            .cloned()
            .collect()
    }

    /// Number of calls made to a method and path
    pub fn count(&self, method: &str, path: &str) -> usize {
        lock(&self.calls)
            .iter()
            .filter(|c| c.method == method && c.path == path)
            .count()
    }

    /// Forget recorded calls, keeping routes
    pub fn clear_calls(&self) {
        lock(&self.calls).clear();
    }

    fn respond(&self, method: &str, path: &str, body: Option<&Value>) -> Result<Envelope> {
        lock(&self.calls).push(RecordedCall {
            method: method.to_string(),
            path: path.to_string(),
            body: body.cloned(),
        });

        let key = (method.to_string(), path.to_string());
        if lock(&self.failures).contains(&key) {
            return Err(Error::TransportError {
                method: method.to_string(),
                path: path.to_string(),
                message: "connection refused".to_string(),
            });
        }

        let mut routes = lock(&self.routes);
        let envelope = match routes.get_mut(&key) {
            Some(queue) if queue.len() > 1 => queue.pop_front(),
            Some(queue) => queue.front().cloned(),
            None => None,
        };
        Ok(envelope.unwrap_or_else(|| Envelope::new(method, path, 200, "OK")))
    }
}

#[async_trait]
impl ControllerClient for ScriptedClient {
    async fn get(&self, path: &str) -> Result<Envelope> {
        self.respond("GET", path, None)
    }

    async fn post(&self, path: &str, body: Option<&Value>) -> Result<Envelope> {
        self.respond("POST", path, body)
    }

    async fn put(&self, path: &str, body: &Value) -> Result<Envelope> {
        self.respond("PUT", path, Some(body))
    }

    async fn delete(&self, path: &str, body: Option<&Value>) -> Result<Envelope> {
        self.respond("DELETE", path, body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_queue_drains_then_repeats_last() {
        let client = ScriptedClient::new();
        client.route_ok("GET", "/a", json!(1));
        client.route_ok("GET", "/a", json!(2));

        assert_eq!(client.get("/a").await.unwrap().data, json!(1));
        assert_eq!(client.get("/a").await.unwrap().data, json!(2));
        assert_eq!(client.get("/a").await.unwrap().data, json!(2));
        assert_eq!(client.count("GET", "/a"), 3);
    }

    #[tokio::test]
    async fn test_unrouted_call_succeeds_and_is_recorded() {
        let client = ScriptedClient::new();
        let body = json!([{"id": 1}]);
        let env = client.post("/b", Some(&body)).await.unwrap();
        assert!(env.is_success());
        assert_eq!(
            client.calls(),
            vec![RecordedCall {
                method: "POST".to_string(),
                path: "/b".to_string(),
                body: Some(body),
            }]
        );
    }

    #[tokio::test]
    async fn test_transport_failure() {
        let client = ScriptedClient::new();
        client.fail_transport("GET", "/c");
        let err = client.get("/c").await.unwrap_err();
        assert!(matches!(err, Error::TransportError { .. }));
    }
}
