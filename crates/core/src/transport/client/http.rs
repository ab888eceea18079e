//! HTTP client for the IS-04 node API and IS-05 connection API
//!
//! # Usage
//!
//! ```ignore
//! use nmos_conformance::transport::client::http::HttpConnectionClient;
//!
//! let client = HttpConnectionClient::new("http://192.0.2.10:8080", &config.http)?;
//! let senders = snapshot_all(&client, &client, Role::Sender).await?.resources;
//! ```

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::config::HttpConfig;
use crate::error::{Error, Result};
use crate::resource::Role;
use crate::transport::{PatchResponse, ResourceSource, TransportParamsEndpoint};

/// Endpoint of a single Sender or Receiver in the connection API
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionEndpoint {
    /// `/constraints`
    Constraints,
    /// `/staged`
    Staged,
    /// `/active`
    Active,
}

impl fmt::Display for ConnectionEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionEndpoint::Constraints => write!(f, "constraints"),
            ConnectionEndpoint::Staged => write!(f, "staged"),
            ConnectionEndpoint::Active => write!(f, "active"),
        }
    }
}

/// HTTP client for one device
pub struct HttpConnectionClient {
    /// Node base URL, e.g. `http://192.0.2.10:8080`
    base_url: Url,

    /// API version path segment
    api_version: String,

    /// Reqwest HTTP client
    client: reqwest::Client,
}

impl HttpConnectionClient {
    /// Create a client for the device at `base_url`
    pub fn new(base_url: &str, config: &HttpConfig) -> Result<Self> {
        if base_url.is_empty() {
            return Err(Error::ConfigError("HTTP base_url cannot be empty".to_string()));
        }

        let parsed = Url::parse(base_url)
            .map_err(|e| Error::ConfigError(format!("invalid base_url '{}': {}", base_url, e)))?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(Error::ConfigError(format!(
                "HTTP base_url must start with http:// or https://, got: {}",
                base_url
            )));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Transport(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            base_url: parsed,
            api_version: config.api_version.clone(),
            client,
        })
    }

    /// Create a client from configuration, which must carry a base URL
    pub fn from_config(config: &HttpConfig) -> Result<Self> {
        let base_url = config
            .base_url
            .as_deref()
            .ok_or_else(|| Error::ConfigError("http.base_url is not set".to_string()))?;
        Self::new(base_url, config)
    }

    fn join(&self, path: &str) -> Result<Url> {
        let base = self.base_url.as_str().trim_end_matches('/');
        Url::parse(&format!("{}{}", base, path))
            .map_err(|e| Error::ConfigError(format!("invalid URL for path '{}': {}", path, e)))
    }

    /// URL of a connection API endpoint
    pub fn connection_url(&self, role: Role, id: &str, endpoint: ConnectionEndpoint) -> Result<Url> {
        self.join(&format!(
            "/x-nmos/connection/{}/single/{}/{}/{}",
            self.api_version,
            role.collection(),
            id,
            endpoint
        ))
    }

    /// URL of a node API resource collection
    pub fn node_url(&self, role: Role) -> Result<Url> {
        self.join(&format!("/x-nmos/node/{}/{}", self.api_version, role.collection()))
    }

    /// Resolve an href that may be relative to the node
    fn resolve(&self, href: &str) -> Result<Url> {
        match Url::parse(href) {
            Ok(url) => Ok(url),
            Err(url::ParseError::RelativeUrlWithoutBase) => self
                .base_url
                .join(href)
                .map_err(|e| Error::ConfigError(format!("invalid href '{}': {}", href, e))),
            Err(e) => Err(Error::ConfigError(format!("invalid href '{}': {}", href, e))),
        }
    }

    async fn get(&self, url: Url) -> Result<reqwest::Response> {
        debug!("GET {}", url);
        let response = self.client.get(url.clone()).send().await?;
        if !response.status().is_success() {
            return Err(Error::Http {
                status: response.status().as_u16(),
                url: url.to_string(),
            });
        }
        Ok(response)
    }

    async fn get_json(&self, url: Url) -> Result<Value> {
        let response = self.get(url).await?;
        Ok(response.json::<Value>().await?)
    }
}

#[async_trait]
impl ResourceSource for HttpConnectionClient {
    async fn fetch_resources(&self, role: Role) -> Result<Vec<Value>> {
        let url = self.node_url(role)?;
        match self.get_json(url.clone()).await? {
            Value::Array(items) => Ok(items),
            other => Err(Error::Other(format!(
                "expected an array from {}, got {}",
                url, other
            ))),
        }
    }

    async fn fetch_text(&self, href: &str) -> Result<String> {
        let url = self.resolve(href)?;
        let response = self.get(url).await?;
        Ok(response.text().await?)
    }
}

#[async_trait]
impl TransportParamsEndpoint for HttpConnectionClient {
    async fn get_constraints(&self, role: Role, id: &str) -> Result<Value> {
        self.get_json(self.connection_url(role, id, ConnectionEndpoint::Constraints)?)
            .await
    }

    async fn get_staged(&self, role: Role, id: &str) -> Result<Value> {
        self.get_json(self.connection_url(role, id, ConnectionEndpoint::Staged)?)
            .await
    }

    async fn get_active(&self, role: Role, id: &str) -> Result<Value> {
        self.get_json(self.connection_url(role, id, ConnectionEndpoint::Active)?)
            .await
    }

    async fn patch_staged(&self, role: Role, id: &str, body: &Value) -> Result<PatchResponse> {
        let url = self.connection_url(role, id, ConnectionEndpoint::Staged)?;
        debug!("PATCH {}", url);
        let response = self.client.patch(url).json(body).send().await?;
        let status = response.status().as_u16();
        let body = response.json::<Value>().await.unwrap_or(Value::Null);
        Ok(PatchResponse { status, body })
    }
}
