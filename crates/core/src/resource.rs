//! Resource snapshots
//!
//! A [`Resource`] is assembled from the IS-04 Sender/Receiver document and
//! the IS-05 constraints, staged and active documents fetched for it. It is
//! never mutated by the checks; the activation harness re-fetches instead.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::capabilities::{CapabilitySet, ParameterConstraints, ParameterValues};
use crate::error::{Error, Result};

/// Role of a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Sender
    Sender,
    /// Receiver
    Receiver,
}

impl Role {
    /// Path segment used by the IS-04 and IS-05 APIs
    pub fn collection(&self) -> &'static str {
        match self {
            Role::Sender => "senders",
            Role::Receiver => "receivers",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Sender => write!(f, "sender"),
            Role::Receiver => write!(f, "receiver"),
        }
    }
}

/// Transport of a resource, parsed from its IS-04 `transport` URN
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    /// `urn:x-nmos:transport:rtp`
    Rtp,
    /// `urn:x-nmos:transport:rtp.mcast`
    RtpMulticast,
    /// `urn:x-nmos:transport:rtp.ucast`
    RtpUnicast,
    /// `urn:x-nmos:transport:usb`
    Usb,
    /// `urn:x-nmos:transport:ndi`
    Ndi,
    /// `urn:x-nmos:transport:websocket`
    Websocket,
    /// `urn:x-nmos:transport:mqtt`
    Mqtt,
    /// Anything else, keeping the full URN
    Other(String),
}

const TRANSPORT_NAMESPACE: &str = "urn:x-nmos:transport:";

impl TransportKind {
    /// Parse a transport URN; unknown or vendor URNs become [`TransportKind::Other`]
    pub fn from_urn(urn: &str) -> Self {
        let Some(name) = urn.strip_prefix(TRANSPORT_NAMESPACE) else {
            return TransportKind::Other(urn.to_string());
        };
        match name {
            "rtp" => TransportKind::Rtp,
            "rtp.mcast" => TransportKind::RtpMulticast,
            "rtp.ucast" => TransportKind::RtpUnicast,
            "usb" => TransportKind::Usb,
            "ndi" => TransportKind::Ndi,
            "websocket" => TransportKind::Websocket,
            "mqtt" => TransportKind::Mqtt,
            _ => TransportKind::Other(urn.to_string()),
        }
    }

    /// Whether this is one of the RTP transports
    pub fn is_rtp(&self) -> bool {
        matches!(
            self,
            TransportKind::Rtp | TransportKind::RtpMulticast | TransportKind::RtpUnicast
        )
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransportKind::Rtp => "rtp",
            TransportKind::RtpMulticast => "rtp.mcast",
            TransportKind::RtpUnicast => "rtp.ucast",
            TransportKind::Usb => "usb",
            TransportKind::Ndi => "ndi",
            TransportKind::Websocket => "websocket",
            TransportKind::Mqtt => "mqtt",
            TransportKind::Other(urn) => return write!(f, "{}", urn),
        };
        write!(f, "{}{}", TRANSPORT_NAMESPACE, name)
    }
}

/// Constraints, staged and active values of one transport leg
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LegState {
    /// Declared constraints
    pub constraints: ParameterConstraints,
    /// Staged values
    pub staged: ParameterValues,
    /// Active values
    pub active: ParameterValues,
}

/// Which of the three per-leg states a finding is about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateKind {
    /// The constraints endpoint
    Constraints,
    /// The staged endpoint
    Staged,
    /// The active endpoint
    Active,
}

impl fmt::Display for StateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StateKind::Constraints => write!(f, "constraints"),
            StateKind::Staged => write!(f, "staged"),
            StateKind::Active => write!(f, "active"),
        }
    }
}

impl LegState {
    /// Key set of one state
    pub fn keys(&self, state: StateKind) -> Vec<&String> {
        match state {
            StateKind::Constraints => self.constraints.keys().collect(),
            StateKind::Staged => self.staged.keys().collect(),
            StateKind::Active => self.active.keys().collect(),
        }
    }

    /// Concrete value of a parameter in staged or active
    pub fn value(&self, state: StateKind, key: &str) -> Option<&Value> {
        match state {
            StateKind::Constraints => None,
            StateKind::Staged => self.staged.get(key),
            StateKind::Active => self.active.get(key),
        }
    }
}

/// IS-05 `transport_file` of an active or staged document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransportFile {
    /// File contents, typically SDP text
    #[serde(default)]
    pub data: Option<String>,
    /// MIME type
    #[serde(rename = "type", default)]
    pub file_type: Option<String>,
}

/// IS-05 staged or active document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EndpointDocument {
    /// Whether the resource is enabled
    #[serde(default)]
    pub master_enable: bool,
    /// One parameter mapping per leg
    #[serde(default)]
    pub transport_params: Vec<ParameterValues>,
    /// Receiver transport file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transport_file: Option<TransportFile>,
    /// Activation object, kept opaque
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activation: Option<Value>,
}

impl EndpointDocument {
    /// Value of a parameter on one leg
    pub fn param(&self, leg: usize, key: &str) -> Option<&Value> {
        self.transport_params.get(leg).and_then(|p| p.get(key))
    }
}

/// Per-leg transport parameter state of a resource
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransportParameterState {
    /// Legs, primary first
    pub legs: Vec<LegState>,
}

impl TransportParameterState {
    /// Build from separately fetched endpoint documents
    ///
    /// Fails when the three documents disagree on the number of legs.
    pub fn from_endpoints(
        constraints: Vec<ParameterConstraints>,
        staged: &EndpointDocument,
        active: &EndpointDocument,
    ) -> Result<Self> {
        if constraints.len() != staged.transport_params.len()
            || constraints.len() != active.transport_params.len()
        {
            return Err(Error::LegCountMismatch {
                constraints: constraints.len(),
                staged: staged.transport_params.len(),
                active: active.transport_params.len(),
            });
        }

        let legs = constraints
            .into_iter()
            .zip(staged.transport_params.iter())
            .zip(active.transport_params.iter())
            .map(|((constraints, staged), active)| LegState {
                constraints,
                staged: staged.clone(),
                active: active.clone(),
            })
            .collect();
        Ok(Self { legs })
    }

    /// Number of legs
    pub fn leg_count(&self) -> usize {
        self.legs.len()
    }
}

/// A Sender or Receiver snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resource {
    /// Resource id
    pub id: String,
    /// Sender or Receiver
    pub role: Role,
    /// IS-04 transport URN
    pub transport: String,
    /// Constraint sets from `caps.constraint_sets`
    #[serde(default)]
    pub capabilities: CapabilitySet,
    /// IS-04 `privacy` attribute, if advertised
    #[serde(default)]
    pub privacy: Option<bool>,
    /// Sender `manifest_href`
    #[serde(default)]
    pub manifest_href: Option<String>,
    /// Per-leg transport parameters
    pub transport_state: TransportParameterState,
    /// Staged `master_enable`
    pub staged_master_enable: bool,
    /// Active `master_enable`
    pub active_master_enable: bool,
    /// SDP text, from the manifest (Senders) or the active transport file (Receivers)
    #[serde(default)]
    pub sdp: Option<String>,
    /// Raw IS-04 document, kept for schema validation
    #[serde(default)]
    pub document: Value,
}

impl Resource {
    /// Assemble a resource from its IS-04 and IS-05 documents
    pub fn from_documents(
        role: Role,
        document: Value,
        constraints: &Value,
        staged: &Value,
        active: &Value,
    ) -> Result<Self> {
        let id = document
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::invalid_resource("(unknown)", "missing 'id'"))?
            .to_string();
        let transport = document
            .get("transport")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::invalid_resource(&id, "missing 'transport'"))?
            .to_string();

        let capabilities = match document.get("caps").and_then(|c| c.get("constraint_sets")) {
            Some(sets) => serde_json::from_value(sets.clone())
                .map_err(|e| Error::invalid_resource(&id, format!("constraint_sets: {}", e)))?,
            None => Vec::new(),
        };

        let constraints: Vec<ParameterConstraints> = serde_json::from_value(constraints.clone())?;
        let staged: EndpointDocument = serde_json::from_value(staged.clone())?;
        let active: EndpointDocument = serde_json::from_value(active.clone())?;
        let transport_state = TransportParameterState::from_endpoints(constraints, &staged, &active)?;

        let sdp = match role {
            Role::Receiver => active.transport_file.as_ref().and_then(|f| f.data.clone()),
            Role::Sender => None,
        };

        Ok(Self {
            privacy: document.get("privacy").and_then(Value::as_bool),
            manifest_href: document
                .get("manifest_href")
                .and_then(Value::as_str)
                .map(str::to_string),
            id,
            role,
            transport,
            capabilities,
            transport_state,
            staged_master_enable: staged.master_enable,
            active_master_enable: active.master_enable,
            sdp,
            document,
        })
    }

    /// Attach SDP text fetched from `manifest_href`
    pub fn with_sdp(mut self, sdp: impl Into<String>) -> Self {
        self.sdp = Some(sdp.into());
        self
    }

    /// Parsed transport
    pub fn transport_kind(&self) -> TransportKind {
        TransportKind::from_urn(&self.transport)
    }

    /// Number of legs
    pub fn leg_count(&self) -> usize {
        self.transport_state.leg_count()
    }
}
