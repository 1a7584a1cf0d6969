//! HTTP transport for the controller REST API
//!
//! Wraps a `reqwest::Client` that carries the session token on every call.
//! HTTP-level failures other than authentication are returned as envelopes
//! so the core can decide what a non-success status means for each call.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::{Client, Method, StatusCode};
use serde_json::{json, Value};
use tracing::{debug, info};

use super::{ControllerClient, Envelope};
use crate::config::ControllerSettings;
use crate::error::{Error, Result};

const LOGIN_PATH: &str = "/login";
const USER_AGENT: &str = concat!("fabric-reconciler/", env!("CARGO_PKG_VERSION"));

/// REST client bound to one controller session
pub struct RestClient {
    http_client: Client,
    base_url: String,
}

impl RestClient {
    /// Build a client from connection settings, logging in when no token is supplied
    pub async fn connect(settings: &ControllerSettings) -> Result<Self> {
        let base_url = settings.url.trim_end_matches('/').to_string();
        let timeout = Duration::from_secs(settings.timeout_secs);

        let token = match settings.token()? {
            Some(token) => token,
            None => {
                let password = settings.password()?;
                login(&base_url, timeout, settings, &password).await?
            }
        };

        info!("Connected to controller at {}", base_url);
        Self::build(&base_url, &token, timeout, settings.verify_tls)
    }

    /// Build a client around an existing session token
    pub fn with_token(base_url: &str, token: &str, timeout: Duration) -> Result<Self> {
        Self::build(base_url.trim_end_matches('/'), token, timeout, true)
    }

    fn build(base_url: &str, token: &str, timeout: Duration, verify_tls: bool) -> Result<Self> {
        let mut headers = HeaderMap::new();
        let bearer = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|e| Error::ConfigError(format!("invalid session token: {e}")))?;
        headers.insert(AUTHORIZATION, bearer);

        let http_client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .danger_accept_invalid_certs(!verify_tls)
            .build()
            .map_err(Error::HttpError)?;

        Ok(Self {
            http_client,
            base_url: base_url.to_string(),
        })
    }

    async fn send(&self, method: Method, path: &str, body: Option<&Value>) -> Result<Envelope> {
        let url = format!("{}{}", self.base_url, path);
        debug!("{} {}", method, url);

        let mut request = self.http_client.request(method.clone(), &url);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| transport_error(&method, path, e.to_string()))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(transport_error(
                &method,
                path,
                format!("authentication rejected ({status})"),
            ));
        }

        let text = response
            .text()
            .await
            .map_err(|e| transport_error(&method, path, e.to_string()))?;

        let data = if text.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).unwrap_or(Value::String(text))
        };

        let envelope = Envelope::new(
            method.as_str(),
            path,
            status.as_u16(),
            status.canonical_reason().unwrap_or("Unknown"),
        )
        .with_data(data);

        debug!(
            "{} {} returned {}",
            envelope.method, envelope.path, envelope.status_code
        );
        Ok(envelope)
    }
}

#[async_trait]
impl ControllerClient for RestClient {
    async fn get(&self, path: &str) -> Result<Envelope> {
        self.send(Method::GET, path, None).await
    }

    async fn post(&self, path: &str, body: Option<&Value>) -> Result<Envelope> {
        self.send(Method::POST, path, body).await
    }

    async fn put(&self, path: &str, body: &Value) -> Result<Envelope> {
        self.send(Method::PUT, path, Some(body)).await
    }

    async fn delete(&self, path: &str, body: Option<&Value>) -> Result<Envelope> {
        self.send(Method::DELETE, path, body).await
    }
}

fn transport_error(method: &Method, path: &str, message: String) -> Error {
    Error::TransportError {
        method: method.to_string(),
        path: path.to_string(),
        message,
    }
}

/// Obtain a session token with username/password credentials
async fn login(
    base_url: &str,
    timeout: Duration,
    settings: &ControllerSettings,
    password: &str,
) -> Result<String> {
    let client = Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .danger_accept_invalid_certs(!settings.verify_tls)
        .build()
        .map_err(Error::HttpError)?;

    let body = json!({
        "userName": settings.username,
        "userPasswd": password,
        "domain": settings.domain,
    });

    let response = client
        .post(format!("{base_url}{LOGIN_PATH}"))
        .json(&body)
        .send()
        .await
        .map_err(|e| transport_error(&Method::POST, LOGIN_PATH, e.to_string()))?;

    if !response.status().is_success() {
        return Err(transport_error(
            &Method::POST,
            LOGIN_PATH,
            format!("login failed with HTTP {}", response.status()),
        ));
    }

    let json: Value = response
        .json()
        .await
        .map_err(|e| transport_error(&Method::POST, LOGIN_PATH, e.to_string()))?;

    json.get("jwttoken")
        .or_else(|| json.get("token"))
        .and_then(Value::as_str)
        .map(String::from)
        .ok_or_else(|| {
            transport_error(
                &Method::POST,
                LOGIN_PATH,
                "login response carried no token".to_string(),
            )
        })
}
