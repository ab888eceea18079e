//! SDP cross-validation
//!
//! Re-derives transport parameters from the SDP transport file and
//! reconciles them with the live IS-05 state. The privacy attribute is
//!
//! ```text
//! a=privacy:protocol=RTP;mode=AES-128-CTR;iv=...;key_generator=...;key_version=...;key_id=...
//! ```
//!
//! at session level (once) or media level (once per leg).

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::capabilities::{ParameterConstraints, ParameterValues};
use crate::resource::Role;
use crate::rules::{
    HexLength, PRIVACY_IV, PRIVACY_KEY_GENERATOR, PRIVACY_KEY_ID, PRIVACY_KEY_VERSION, PRIVACY_MODE,
    PRIVACY_PROTOCOL,
};

/// Full IV counter header extension
pub const PEP_FULL_IV_COUNTER: &str = "urn:ietf:params:rtp-hdrext:PEP-Full-IV-Counter";
/// Short IV counter header extension
pub const PEP_SHORT_IV_COUNTER: &str = "urn:ietf:params:rtp-hdrext:PEP-Short-IV-Counter";
/// HDCP equivalent of [`PEP_FULL_IV_COUNTER`]
pub const HDCP_FULL_IV_COUNTER: &str = "urn:ietf:params:rtp-hdrext:HDCP-Full-IV-Counter-metadata";
/// HDCP equivalent of [`PEP_SHORT_IV_COUNTER`]
pub const HDCP_SHORT_IV_COUNTER: &str = "urn:ietf:params:rtp-hdrext:HDCP-Short-IV-Counter-metadata";

/// SDP text split into session and media regions
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SdpDocument {
    lines: Vec<String>,
}

impl SdpDocument {
    /// Split into lines, dropping carriage returns and blank lines
    pub fn parse(text: &str) -> Self {
        let lines = text
            .split('\n')
            .map(|l| l.trim_end_matches('\r'))
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect();
        Self { lines }
    }

    /// All lines in order
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Lines before the first `m=` line
    pub fn session_lines(&self) -> &[String] {
        let end = self
            .lines
            .iter()
            .position(|l| l.starts_with("m="))
            .unwrap_or(self.lines.len());
        &self.lines[..end]
    }

    /// Number of `m=` sections
    pub fn media_count(&self) -> usize {
        self.lines.iter().filter(|l| l.starts_with("m=")).count()
    }

    /// Values of every `a=<name>:` attribute with the region it appears in
    pub fn attributes<'a>(&'a self, name: &str) -> Vec<(AttributeScope, &'a str)> {
        let prefix = format!("a={}:", name);
        let mut scope = AttributeScope::Session;
        let mut media = 0;
        let mut found = Vec::new();

        for line in &self.lines {
            if line.starts_with("m=") {
                scope = AttributeScope::Media(media);
                media += 1;
                continue;
            }
            if let Some(value) = line.strip_prefix(&prefix) {
                found.push((scope, value));
            }
        }
        found
    }
}

/// Where an attribute was found
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeScope {
    /// Before the first `m=` line
    Session,
    /// In the media section with this index
    Media(usize),
}

/// How an SDP sub-parameter is checked against the IS-05 constraint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum SubParameterCheck {
    /// Must be a member of the constraint enumeration for both roles
    Enumerated,
    /// Enumeration member on the owning side, hex of this length elsewhere
    KeyMaterial {
        /// Required hex length on the dependent side
        hex_length: HexLength,
        /// Role that pins the value
        authoritative: Role,
    },
}

/// One `name=value` part of an SDP attribute
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SdpSubParameter {
    /// Name inside the attribute
    pub name: String,
    /// IS-05 transport parameter it mirrors
    pub parameter: String,
    /// Constraint check
    pub check: SubParameterCheck,
}

/// An SDP attribute mirroring a bundle of transport parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SdpAttributeSpec {
    /// Attribute name, without `a=` and `:`
    pub attribute: String,
    /// Allowed sub-parameters
    pub sub_parameters: Vec<SdpSubParameter>,
}

impl SdpAttributeSpec {
    /// The PEP `a=privacy` attribute
    pub fn privacy() -> Self {
        let enumerated = |name: &str, parameter: &str| SdpSubParameter {
            name: name.to_string(),
            parameter: parameter.to_string(),
            check: SubParameterCheck::Enumerated,
        };
        let key = |name: &str, parameter: &str, length: usize| SdpSubParameter {
            name: name.to_string(),
            parameter: parameter.to_string(),
            check: SubParameterCheck::KeyMaterial {
                hex_length: HexLength::Exact(length),
                authoritative: Role::Sender,
            },
        };

        Self {
            attribute: "privacy".to_string(),
            sub_parameters: vec![
                enumerated("protocol", PRIVACY_PROTOCOL),
                enumerated("mode", PRIVACY_MODE),
                key("iv", PRIVACY_IV, 16),
                key("key_generator", PRIVACY_KEY_GENERATOR, 32),
                key("key_version", PRIVACY_KEY_VERSION, 8),
                enumerated("key_id", PRIVACY_KEY_ID),
            ],
        }
    }

    fn sub_parameter(&self, name: &str) -> Option<&SdpSubParameter> {
        self.sub_parameters.iter().find(|s| s.name == name)
    }
}

/// One occurrence of an attribute
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedAttribute {
    /// Session or media level
    pub scope: AttributeScope,
    /// Sub-parameters by SDP name
    pub params: BTreeMap<String, String>,
}

/// SDP disagreement with the live state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum SdpViolation {
    /// Sub-parameter not defined for the attribute
    UnknownSubParameter {
        /// Attribute name
        attribute: String,
        /// Offending sub-parameter
        name: String,
    },
    /// Sub-parameter absent from an occurrence
    MissingSubParameter {
        /// Attribute name
        attribute: String,
        /// Missing sub-parameter
        name: String,
    },
    /// Value outside the IS-05 constraint
    OutsideConstraint {
        /// Transport parameter
        parameter: String,
        /// SDP value
        value: String,
    },
    /// Value is not hex of the required length
    InvalidHex {
        /// Transport parameter
        parameter: String,
        /// SDP value
        value: String,
    },
    /// SDP value differs from the active value
    ActiveMismatch {
        /// Transport parameter
        parameter: String,
        /// SDP value
        value: String,
        /// Active value
        active: Value,
    },
    /// Wrong number of session and media occurrences
    Occurrence {
        /// Attribute name
        attribute: String,
        /// Session-level count
        session: usize,
        /// Media-level count
        media: usize,
        /// Number of legs
        legs: usize,
    },
    /// IV counter header extension not declared
    MissingHeaderExtension {
        /// Either of the accepted URIs
        uri: String,
    },
    /// IV counter header extension with a direction other than `sendonly`
    ExtmapDirection {
        /// Extension URI
        uri: String,
        /// Declared direction
        direction: String,
    },
    /// Privacy attribute present without privacy, or the reverse
    PrivacyPresence {
        /// Whether privacy is on
        expected: bool,
        /// Whether an attribute was found
        found: bool,
    },
}

impl fmt::Display for SdpViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SdpViolation::UnknownSubParameter { attribute, name } => {
                write!(f, "{} attribute parameter {} is invalid", attribute, name)
            }
            SdpViolation::MissingSubParameter { attribute, name } => {
                write!(f, "{} attribute lacks parameter {}", attribute, name)
            }
            SdpViolation::OutsideConstraint { parameter, value } => {
                write!(f, "{} value {} is not within constraints", parameter, value)
            }
            SdpViolation::InvalidHex { parameter, value } => {
                write!(f, "{} value {} is not valid hex", parameter, value)
            }
            SdpViolation::ActiveMismatch {
                parameter,
                value,
                active,
            } => write!(
                f,
                "{} value {} is not matching active value {}",
                parameter, value, active
            ),
            SdpViolation::Occurrence {
                attribute,
                session,
                media,
                legs,
            } => write!(
                f,
                "{} attribute found {} times at session level, {} at media level, with {} legs",
                attribute, session, media, legs
            ),
            SdpViolation::MissingHeaderExtension { uri } => {
                write!(f, "extmap for {} is missing", uri)
            }
            SdpViolation::ExtmapDirection { uri, direction } => {
                write!(f, "extmap {} direction is {} and must be sendonly", uri, direction)
            }
            SdpViolation::PrivacyPresence { expected, found } => write!(
                f,
                "privacy attribute {} but privacy is {}",
                if *found { "present" } else { "absent" },
                expected
            ),
        }
    }
}

/// Collect every occurrence of an attribute, splitting its sub-parameters
pub fn extract_attribute(
    sdp: &SdpDocument,
    spec: &SdpAttributeSpec,
) -> Result<Vec<ExtractedAttribute>, SdpViolation> {
    let mut extracted = Vec::new();

    for (scope, value) in sdp.attributes(&spec.attribute) {
        let mut params = BTreeMap::new();
        for part in value.split(';') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            let (name, value) = part.split_once('=').unwrap_or((part, ""));
            let name = name.trim();
            if spec.sub_parameter(name).is_none() {
                return Err(SdpViolation::UnknownSubParameter {
                    attribute: spec.attribute.clone(),
                    name: name.to_string(),
                });
            }
            params.insert(name.to_string(), value.trim().to_string());
        }
        extracted.push(ExtractedAttribute { scope, params });
    }
    Ok(extracted)
}

/// Reconcile extracted occurrences with the constraints and active values of leg 0
pub fn cross_check(
    spec: &SdpAttributeSpec,
    extracted: &[ExtractedAttribute],
    active: &ParameterValues,
    constraints: &ParameterConstraints,
    legs: usize,
    role: Role,
) -> Result<(), SdpViolation> {
    for occurrence in extracted {
        for sub in &spec.sub_parameters {
            let value = occurrence
                .params
                .get(&sub.name)
                .ok_or_else(|| SdpViolation::MissingSubParameter {
                    attribute: spec.attribute.clone(),
                    name: sub.name.clone(),
                })?;
            check_constraint(sub, value, constraints, role)?;

            let active_value = active.get(&sub.parameter).cloned().unwrap_or(Value::Null);
            if active_value.as_str() != Some(value.as_str()) {
                return Err(SdpViolation::ActiveMismatch {
                    parameter: sub.parameter.clone(),
                    value: value.clone(),
                    active: active_value,
                });
            }
        }
    }

    let session = extracted
        .iter()
        .filter(|e| e.scope == AttributeScope::Session)
        .count();
    let media = extracted.len() - session;
    let valid = (session == 1 && media == 0) || (session == 0 && media == legs && legs > 0);
    if !valid {
        return Err(SdpViolation::Occurrence {
            attribute: spec.attribute.clone(),
            session,
            media,
            legs,
        });
    }
    Ok(())
}

fn check_constraint(
    sub: &SdpSubParameter,
    value: &str,
    constraints: &ParameterConstraints,
    role: Role,
) -> Result<(), SdpViolation> {
    let enumerated = || {
        let member = constraints
            .get(&sub.parameter)
            .map(|c| c.enumerates(&Value::String(value.to_string())))
            .unwrap_or(false);
        if member {
            Ok(())
        } else {
            Err(SdpViolation::OutsideConstraint {
                parameter: sub.parameter.clone(),
                value: value.to_string(),
            })
        }
    };

    match &sub.check {
        SubParameterCheck::Enumerated => enumerated(),
        SubParameterCheck::KeyMaterial { authoritative, .. } if *authoritative == role => enumerated(),
        SubParameterCheck::KeyMaterial { hex_length, .. } => {
            if hex_length.accepts(value) {
                Ok(())
            } else {
                Err(SdpViolation::InvalidHex {
                    parameter: sub.parameter.clone(),
                    value: value.to_string(),
                })
            }
        }
    }
}

/// Require the IV counter header extensions when the active protocol is RTP-based
pub fn check_header_extensions(sdp: &SdpDocument, active_protocol: Option<&str>) -> Result<(), SdpViolation> {
    if !matches!(active_protocol, Some("RTP") | Some("RTP_KV")) {
        return Ok(());
    }

    let mut found_full = false;
    let mut found_short = false;

    for (_, value) in sdp.attributes("extmap") {
        // <id>[/<direction>] <uri> [<attributes>]
        let Some((id, rest)) = value.split_once(' ') else {
            continue;
        };
        let uri = rest.split_whitespace().next().unwrap_or("");
        let is_full = uri == PEP_FULL_IV_COUNTER || uri == HDCP_FULL_IV_COUNTER;
        let is_short = uri == PEP_SHORT_IV_COUNTER || uri == HDCP_SHORT_IV_COUNTER;
        if !is_full && !is_short {
            continue;
        }

        if let Some((_, direction)) = id.split_once('/') {
            if direction != "sendonly" {
                return Err(SdpViolation::ExtmapDirection {
                    uri: uri.to_string(),
                    direction: direction.to_string(),
                });
            }
        }
        found_full |= is_full;
        found_short |= is_short;
    }

    if !found_full {
        return Err(SdpViolation::MissingHeaderExtension {
            uri: PEP_FULL_IV_COUNTER.to_string(),
        });
    }
    if !found_short {
        return Err(SdpViolation::MissingHeaderExtension {
            uri: PEP_SHORT_IV_COUNTER.to_string(),
        });
    }
    Ok(())
}

/// A privacy attribute must be present exactly when privacy is on
pub fn check_privacy_presence(sdp: &SdpDocument, privacy: bool) -> Result<(), SdpViolation> {
    let found = !sdp.attributes("privacy").is_empty();
    if found != privacy {
        return Err(SdpViolation::PrivacyPresence {
            expected: privacy,
            found,
        });
    }
    Ok(())
}
