//! Configuration for conformance validation

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::resource::Role;

/// Which state of leg 0 supplies the reference key set for leg parity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LegParityReference {
    /// Every state of leg *i* is compared against leg 0's constraints keys
    Constraints,
    /// Every state of leg *i* is compared against leg 0's active keys
    Active,
    /// Each state of leg *i* is compared against the same state of leg 0
    PerState,
}

impl Default for LegParityReference {
    fn default() -> Self {
        LegParityReference::Constraints
    }
}

/// HTTP settings for [`crate::transport::client::http::HttpConnectionClient`]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Base URL of the device, e.g. `http://192.0.2.10:8080`
    pub base_url: Option<String>,

    /// Per-request timeout in seconds
    pub timeout_secs: u64,

    /// IS-04 / IS-05 API version path segment
    pub api_version: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout_secs: 30,
            api_version: "v1.1".to_string(),
        }
    }
}

/// Validator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidatorConfig {
    /// Prefix of vendor-extension parameters exempt from triple parity
    pub extension_prefix: String,

    /// Parameters whose values legitimately differ between redundant legs
    pub leg_specific_parameters: Vec<String>,

    /// Leg-parity reference state for Senders
    pub sender_leg_reference: LegParityReference,

    /// Leg-parity reference state for Receivers
    pub receiver_leg_reference: LegParityReference,

    /// Treat a staged value of `"auto"` as satisfying any constraint
    pub allow_auto_in_staged: bool,

    /// Enumeration member meaning "feature disabled"
    pub disabled_sentinel: String,

    /// Value written by the activation harness to provoke a rejection
    pub invalid_value_marker: String,

    /// Device access
    pub http: HttpConfig,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            extension_prefix: "x_".to_string(),
            leg_specific_parameters: [
                "source_ip",
                "destination_ip",
                "source_port",
                "destination_port",
                "interface_ip",
                "multicast_ip",
                "rtcp_destination_ip",
                "rtcp_destination_port",
                "rtcp_source_port",
                "fec_destination_ip",
                "fec1D_destination_port",
                "fec2D_destination_port",
                "fec1D_source_port",
                "fec2D_source_port",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            sender_leg_reference: LegParityReference::Constraints,
            receiver_leg_reference: LegParityReference::Constraints,
            allow_auto_in_staged: true,
            disabled_sentinel: "NULL".to_string(),
            invalid_value_marker: "this-is-an-invalid-value".to_string(),
            http: HttpConfig::default(),
        }
    }
}

impl ValidatorConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a TOML document
    pub fn from_toml_str(s: &str) -> Result<Self> {
        Ok(toml::from_str(s)?)
    }

    /// Parse a JSON document
    pub fn from_json_str(s: &str) -> Result<Self> {
        serde_json::from_str(s).map_err(|e| Error::ConfigError(e.to_string()))
    }

    /// Load from a file; `.toml` files are parsed as TOML, anything else as JSON
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => Self::from_toml_str(&content),
            _ => Self::from_json_str(&content),
        }
    }

    /// Set the vendor-extension prefix
    pub fn with_extension_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.extension_prefix = prefix.into();
        self
    }

    /// Replace the list of leg-specific parameters
    pub fn with_leg_specific_parameters(mut self, params: Vec<String>) -> Self {
        self.leg_specific_parameters = params;
        self
    }

    /// Set the leg-parity reference for one role
    pub fn with_leg_reference(mut self, role: Role, reference: LegParityReference) -> Self {
        match role {
            Role::Sender => self.sender_leg_reference = reference,
            Role::Receiver => self.receiver_leg_reference = reference,
        }
        self
    }

    /// Enable or disable the `"auto"` staged-value allowance
    pub fn with_auto_in_staged(mut self, allow: bool) -> Self {
        self.allow_auto_in_staged = allow;
        self
    }

    /// Set the device base URL
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.http.base_url = Some(url.into());
        self
    }

    /// Leg-parity reference for a role
    pub fn leg_reference(&self, role: Role) -> LegParityReference {
        match role {
            Role::Sender => self.sender_leg_reference,
            Role::Receiver => self.receiver_leg_reference,
        }
    }
}
