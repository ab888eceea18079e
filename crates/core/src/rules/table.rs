//! Rule table
//!
//! Requiredness, allowed values and key-material formats are data, not code.
//! [`RuleTable::default`] carries the IS-05 and privacy-encryption rules; a
//! table can also be deserialized from TOML or JSON to add vendor bundles.

use std::collections::BTreeSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;
use crate::resource::{LegState, Role, StateKind, TransportKind};

use super::{RuleViolation, RuleViolationKind};

/// Privacy protocol parameter
pub const PRIVACY_PROTOCOL: &str = "ext_privacy_protocol";
/// Privacy mode parameter
pub const PRIVACY_MODE: &str = "ext_privacy_mode";
/// Initialization vector parameter
pub const PRIVACY_IV: &str = "ext_privacy_iv";
/// Key generator parameter
pub const PRIVACY_KEY_GENERATOR: &str = "ext_privacy_key_generator";
/// Key version parameter
pub const PRIVACY_KEY_VERSION: &str = "ext_privacy_key_version";
/// Pre-shared key id parameter
pub const PRIVACY_KEY_ID: &str = "ext_privacy_key_id";
/// ECDH curve parameter
pub const PRIVACY_ECDH_CURVE: &str = "ext_privacy_ecdh_curve";
/// Sender ECDH public key
pub const PRIVACY_ECDH_SENDER_PUBLIC_KEY: &str = "ext_privacy_ecdh_sender_public_key";
/// Receiver ECDH public key
pub const PRIVACY_ECDH_RECEIVER_PUBLIC_KEY: &str = "ext_privacy_ecdh_receiver_public_key";

/// Prefix shared by every privacy parameter
pub const PRIVACY_PREFIX: &str = "ext_privacy_";
/// Prefix shared by the ECDH parameters
pub const ECDH_PREFIX: &str = "ext_privacy_ecdh_";
/// Prefix of registered IS-05 extension parameters
pub const REGISTERED_EXTENSION_PREFIX: &str = "ext_";

/// Group of transports a rule applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportFamily {
    /// rtp, rtp.mcast and rtp.ucast
    Rtp,
    /// usb
    Usb,
    /// ndi
    Ndi,
    /// websocket
    Websocket,
    /// mqtt
    Mqtt,
}

impl TransportFamily {
    /// Whether a transport belongs to this family
    pub fn matches(&self, kind: &TransportKind) -> bool {
        match self {
            TransportFamily::Rtp => kind.is_rtp(),
            TransportFamily::Usb => *kind == TransportKind::Usb,
            TransportFamily::Ndi => *kind == TransportKind::Ndi,
            TransportFamily::Websocket => *kind == TransportKind::Websocket,
            TransportFamily::Mqtt => *kind == TransportKind::Mqtt,
        }
    }
}

/// An empty family list applies to every transport
fn applies(families: &[TransportFamily], kind: &TransportKind) -> bool {
    families.is_empty() || families.iter().any(|f| f.matches(kind))
}

/// An empty role list applies to both roles
fn applies_to_role(roles: &[Role], role: Role) -> bool {
    roles.is_empty() || roles.contains(&role)
}

/// A bundle of parameters that becomes mandatory once any key with the
/// trigger prefix is present
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscriminatorRule {
    /// Bundle name used in findings
    pub name: String,
    /// Presence of a key with this prefix triggers the bundle
    pub trigger_prefix: String,
    /// Keys required once triggered
    pub mandatory: Vec<String>,
    /// Transports the bundle exists on
    #[serde(default)]
    pub transports: Vec<TransportFamily>,
    /// Roles the bundle exists on
    #[serde(default)]
    pub roles: Vec<Role>,
}

/// Values a parameter may take on a transport
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllowedValueRule {
    /// Parameter name
    pub parameter: String,
    /// Transports the rule applies to
    #[serde(default)]
    pub transports: Vec<TransportFamily>,
    /// Allowed values
    pub values: Vec<Value>,
}

/// Protocols a transport must support and may advertise
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtocolRequirement {
    /// Transports the requirement applies to
    pub transports: Vec<TransportFamily>,
    /// Protocol every device on the transport supports
    pub required: String,
    /// Protocols a device on the transport may list
    pub permitted: Vec<String>,
}

/// Modes available to a group of protocols
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModeFamily {
    /// Applies when every listed protocol belongs to this group
    pub protocols: Vec<String>,
    /// Mode every device using these protocols supports
    pub required: String,
    /// Modes usable without ECDH
    pub modes: Vec<String>,
    /// Modes usable only with an ECDH curve
    #[serde(default)]
    pub ecdh_modes: Vec<String>,
}

/// Required length of a hexadecimal value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HexLength {
    /// Exactly this many characters
    Exact(usize),
    /// At least this many characters
    AtLeast(usize),
}

impl HexLength {
    /// Whether `s` is hexadecimal of the required length
    pub fn accepts(&self, s: &str) -> bool {
        let length_ok = match *self {
            HexLength::Exact(n) => s.len() == n,
            HexLength::AtLeast(n) => s.len() >= n,
        };
        length_ok && s.chars().all(|c| c.is_ascii_hexdigit())
    }

    /// Pattern a constraint is expected to declare for this format
    pub fn canonical_pattern(&self) -> String {
        match *self {
            HexLength::Exact(n) => format!("^[0-9a-fA-F]{{{}}}$", n),
            HexLength::AtLeast(n) => format!("^[0-9a-fA-F]{{{},}}$", n),
        }
    }
}

impl std::fmt::Display for HexLength {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HexLength::Exact(n) => write!(f, "{} hex characters", n),
            HexLength::AtLeast(n) => write!(f, "at least {} hex characters", n),
        }
    }
}

/// How the non-authoritative role constrains a key-material parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DependentPolicy {
    /// Should accept any value; enumerations and odd patterns are warnings
    AnyValue,
    /// Lists every acceptable value
    EnumeratedSet,
}

/// Format and ownership of a key-material parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyMaterialRule {
    /// Parameter name
    pub parameter: String,
    /// Required hexadecimal length
    pub hex_length: HexLength,
    /// Role that owns the value and pins it
    pub authoritative: Role,
    /// How the other role constrains it
    pub dependent_policy: DependentPolicy,
    /// Only present when ECDH parameters are
    #[serde(default)]
    pub requires_ecdh: bool,
}

impl KeyMaterialRule {
    fn new(
        parameter: &str,
        hex_length: HexLength,
        authoritative: Role,
        dependent_policy: DependentPolicy,
        requires_ecdh: bool,
    ) -> Self {
        Self {
            parameter: parameter.to_string(),
            hex_length,
            authoritative,
            dependent_policy,
            requires_ecdh,
        }
    }
}

/// IS-05 core parameters of a transport and role
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaseParameterRule {
    /// Transports the set applies to
    pub transports: Vec<TransportFamily>,
    /// Role the set applies to
    pub role: Role,
    /// Core parameters
    pub parameters: Vec<String>,
}

/// Mandatory keys and untriggered bundles for one leg
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequiredParameters {
    /// Keys that must be present
    pub mandatory: BTreeSet<String>,
    /// Bundles that apply to the transport but were not triggered
    pub optional_groups: Vec<BTreeSet<String>>,
}

/// Protocol-conditioned rules
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleTable {
    /// Bundles keyed by trigger prefix
    pub discriminators: Vec<DiscriminatorRule>,
    /// Allowed values per parameter and transport
    pub allowed_values: Vec<AllowedValueRule>,
    /// Protocol support per transport
    pub protocol_requirements: Vec<ProtocolRequirement>,
    /// Mode support per protocol group
    pub mode_families: Vec<ModeFamily>,
    /// Curve every ECDH implementation supports
    pub required_curve: String,
    /// Key-material formats and ownership
    pub key_material: Vec<KeyMaterialRule>,
    /// IS-05 core parameter sets
    pub base_parameters: Vec<BaseParameterRule>,
    /// Enumeration member meaning "disabled"
    pub sentinel: String,
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| s.to_string()).collect()
}

fn json_strings(values: &[&str]) -> Vec<Value> {
    values.iter().map(|s| Value::String(s.to_string())).collect()
}

const RTP_MODES: &[&str] = &[
    "AES-128-CTR",
    "AES-256-CTR",
    "AES-128-CTR_CMAC-64",
    "AES-256-CTR_CMAC-64",
    "AES-128-CTR_CMAC-64-AAD",
    "AES-256-CTR_CMAC-64-AAD",
];

const USB_MODES: &[&str] = &["AES-128-CTR_CMAC-64-AAD", "AES-256-CTR_CMAC-64-AAD"];

const CURVES: &[&str] = &["secp256r1", "secp521r1", "25519", "448", "NULL"];

fn ecdh_variants(modes: &[&str]) -> Vec<String> {
    modes.iter().map(|m| format!("ECDH_{}", m)).collect()
}

impl Default for RuleTable {
    fn default() -> Self {
        let mut all_modes: Vec<String> = strings(RTP_MODES);
        all_modes.extend(ecdh_variants(RTP_MODES));
        all_modes.push("NULL".to_string());

        Self {
            discriminators: vec![
                DiscriminatorRule {
                    name: "privacy".to_string(),
                    trigger_prefix: PRIVACY_PREFIX.to_string(),
                    mandatory: strings(&[
                        PRIVACY_PROTOCOL,
                        PRIVACY_MODE,
                        PRIVACY_IV,
                        PRIVACY_KEY_GENERATOR,
                        PRIVACY_KEY_VERSION,
                        PRIVACY_KEY_ID,
                    ]),
                    transports: Vec::new(),
                    roles: Vec::new(),
                },
                DiscriminatorRule {
                    name: "privacy_ecdh".to_string(),
                    trigger_prefix: ECDH_PREFIX.to_string(),
                    mandatory: strings(&[
                        PRIVACY_ECDH_CURVE,
                        PRIVACY_ECDH_SENDER_PUBLIC_KEY,
                        PRIVACY_ECDH_RECEIVER_PUBLIC_KEY,
                    ]),
                    transports: Vec::new(),
                    roles: Vec::new(),
                },
                DiscriminatorRule {
                    name: "fec".to_string(),
                    trigger_prefix: "fec_".to_string(),
                    mandatory: strings(&[
                        "fec_enabled",
                        "fec_destination_ip",
                        "fec_mode",
                        "fec_type",
                        "fec_block_width",
                        "fec_block_height",
                        "fec1D_destination_port",
                        "fec1D_source_port",
                        "fec2D_destination_port",
                        "fec2D_source_port",
                    ]),
                    transports: vec![TransportFamily::Rtp],
                    roles: vec![Role::Sender],
                },
                DiscriminatorRule {
                    name: "fec".to_string(),
                    trigger_prefix: "fec_".to_string(),
                    mandatory: strings(&[
                        "fec_enabled",
                        "fec_destination_ip",
                        "fec_mode",
                        "fec1D_destination_port",
                        "fec2D_destination_port",
                    ]),
                    transports: vec![TransportFamily::Rtp],
                    roles: vec![Role::Receiver],
                },
                DiscriminatorRule {
                    name: "rtcp".to_string(),
                    trigger_prefix: "rtcp_".to_string(),
                    mandatory: strings(&[
                        "rtcp_enabled",
                        "rtcp_destination_ip",
                        "rtcp_destination_port",
                        "rtcp_source_port",
                    ]),
                    transports: vec![TransportFamily::Rtp],
                    roles: vec![Role::Sender],
                },
                DiscriminatorRule {
                    name: "rtcp".to_string(),
                    trigger_prefix: "rtcp_".to_string(),
                    mandatory: strings(&["rtcp_enabled", "rtcp_destination_ip", "rtcp_destination_port"]),
                    transports: vec![TransportFamily::Rtp],
                    roles: vec![Role::Receiver],
                },
            ],
            allowed_values: vec![
                AllowedValueRule {
                    parameter: PRIVACY_PROTOCOL.to_string(),
                    transports: vec![TransportFamily::Ndi],
                    values: json_strings(&["NULL"]),
                },
                AllowedValueRule {
                    parameter: PRIVACY_PROTOCOL.to_string(),
                    transports: vec![TransportFamily::Usb],
                    values: json_strings(&["NULL", "USB", "USB_KV"]),
                },
                AllowedValueRule {
                    parameter: PRIVACY_PROTOCOL.to_string(),
                    transports: vec![TransportFamily::Rtp],
                    values: json_strings(&["NULL", "RTP", "RTP_KV"]),
                },
                AllowedValueRule {
                    parameter: PRIVACY_ECDH_CURVE.to_string(),
                    transports: Vec::new(),
                    values: json_strings(CURVES),
                },
                AllowedValueRule {
                    parameter: PRIVACY_MODE.to_string(),
                    transports: Vec::new(),
                    values: all_modes.into_iter().map(Value::String).collect(),
                },
            ],
            protocol_requirements: vec![
                ProtocolRequirement {
                    transports: vec![TransportFamily::Rtp],
                    required: "RTP".to_string(),
                    permitted: strings(&["RTP", "RTP_KV"]),
                },
                ProtocolRequirement {
                    transports: vec![TransportFamily::Usb],
                    required: "USB_KV".to_string(),
                    permitted: strings(&["USB", "USB_KV"]),
                },
            ],
            mode_families: vec![
                ModeFamily {
                    protocols: strings(&["RTP", "RTP_KV"]),
                    required: "AES-128-CTR".to_string(),
                    modes: strings(RTP_MODES),
                    ecdh_modes: ecdh_variants(RTP_MODES),
                },
                ModeFamily {
                    protocols: strings(&["USB", "USB_KV"]),
                    required: "AES-128-CTR_CMAC-64-AAD".to_string(),
                    modes: strings(USB_MODES),
                    ecdh_modes: ecdh_variants(USB_MODES),
                },
            ],
            required_curve: "secp256r1".to_string(),
            key_material: vec![
                KeyMaterialRule::new(
                    PRIVACY_IV,
                    HexLength::Exact(16),
                    Role::Sender,
                    DependentPolicy::AnyValue,
                    false,
                ),
                KeyMaterialRule::new(
                    PRIVACY_KEY_GENERATOR,
                    HexLength::Exact(32),
                    Role::Sender,
                    DependentPolicy::AnyValue,
                    false,
                ),
                KeyMaterialRule::new(
                    PRIVACY_KEY_VERSION,
                    HexLength::Exact(8),
                    Role::Sender,
                    DependentPolicy::AnyValue,
                    false,
                ),
                KeyMaterialRule::new(
                    PRIVACY_KEY_ID,
                    HexLength::Exact(16),
                    Role::Sender,
                    DependentPolicy::EnumeratedSet,
                    false,
                ),
                KeyMaterialRule::new(
                    PRIVACY_ECDH_SENDER_PUBLIC_KEY,
                    HexLength::AtLeast(2),
                    Role::Sender,
                    DependentPolicy::AnyValue,
                    true,
                ),
                KeyMaterialRule::new(
                    PRIVACY_ECDH_RECEIVER_PUBLIC_KEY,
                    HexLength::AtLeast(2),
                    Role::Receiver,
                    DependentPolicy::AnyValue,
                    true,
                ),
            ],
            base_parameters: vec![
                BaseParameterRule {
                    transports: vec![TransportFamily::Rtp],
                    role: Role::Sender,
                    parameters: strings(&[
                        "source_ip",
                        "destination_ip",
                        "destination_port",
                        "source_port",
                        "rtp_enabled",
                    ]),
                },
                BaseParameterRule {
                    transports: vec![TransportFamily::Rtp],
                    role: Role::Receiver,
                    parameters: strings(&[
                        "source_ip",
                        "multicast_ip",
                        "interface_ip",
                        "destination_port",
                        "rtp_enabled",
                    ]),
                },
                BaseParameterRule {
                    transports: vec![TransportFamily::Websocket],
                    role: Role::Sender,
                    parameters: strings(&["connection_uri", "connection_authorization"]),
                },
                BaseParameterRule {
                    transports: vec![TransportFamily::Websocket],
                    role: Role::Receiver,
                    parameters: strings(&["connection_uri", "connection_authorization"]),
                },
                BaseParameterRule {
                    transports: vec![TransportFamily::Mqtt],
                    role: Role::Sender,
                    parameters: strings(&[
                        "destination_host",
                        "destination_port",
                        "broker_topic",
                        "broker_protocol",
                        "broker_authorization",
                        "connection_status_broker_topic",
                    ]),
                },
                BaseParameterRule {
                    transports: vec![TransportFamily::Mqtt],
                    role: Role::Receiver,
                    parameters: strings(&[
                        "source_host",
                        "source_port",
                        "broker_topic",
                        "broker_protocol",
                        "broker_authorization",
                        "connection_status_broker_topic",
                    ]),
                },
            ],
            sentinel: "NULL".to_string(),
        }
    }
}

impl RuleTable {
    /// Parse a TOML table
    pub fn from_toml_str(s: &str) -> Result<Self> {
        Ok(toml::from_str(s)?)
    }

    /// Parse a JSON table
    pub fn from_json_str(s: &str) -> Result<Self> {
        Ok(serde_json::from_str(s)?)
    }

    /// Load a table file, TOML by extension and JSON otherwise
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => Self::from_toml_str(&text),
            _ => Self::from_json_str(&text),
        }
    }

    /// Use a different disabled sentinel
    pub fn with_sentinel(mut self, sentinel: impl Into<String>) -> Self {
        self.sentinel = sentinel.into();
        self
    }

    /// Bundles applicable to a transport and role
    fn bundles<'a>(
        &'a self,
        transport: &'a TransportKind,
        role: Role,
    ) -> impl Iterator<Item = &'a DiscriminatorRule> + 'a {
        self.discriminators
            .iter()
            .filter(move |d| applies(&d.transports, transport) && applies_to_role(&d.roles, role))
    }

    /// Mandatory keys given the discriminator keys present on a leg
    pub fn required_parameters<S: AsRef<str>>(
        &self,
        transport: &TransportKind,
        role: Role,
        present: &[S],
    ) -> RequiredParameters {
        let mut required = RequiredParameters::default();
        for bundle in self.bundles(transport, role) {
            let triggered = present
                .iter()
                .any(|k| k.as_ref().starts_with(&bundle.trigger_prefix));
            let keys: BTreeSet<String> = bundle.mandatory.iter().cloned().collect();
            if triggered {
                required.mandatory.extend(keys);
            } else {
                required.optional_groups.push(keys);
            }
        }
        required
    }

    /// Report mandatory keys missing from any of the three states of a leg
    pub fn check_mandatory(
        &self,
        transport: &TransportKind,
        role: Role,
        leg_index: usize,
        leg: &LegState,
    ) -> Vec<RuleViolation> {
        let present: Vec<&String> = leg.constraints.keys().collect();
        let required = self.required_parameters(transport, role, &present);

        let mut violations = Vec::new();
        for key in &required.mandatory {
            for state in [StateKind::Constraints, StateKind::Staged, StateKind::Active] {
                let found = match state {
                    StateKind::Constraints => leg.constraints.contains_key(key),
                    StateKind::Staged => leg.staged.contains_key(key),
                    StateKind::Active => leg.active.contains_key(key),
                };
                if !found {
                    violations.push(RuleViolation::new(
                        Some(leg_index),
                        key.as_str(),
                        RuleViolationKind::MissingParameter { state },
                        format!("required transport parameter {} not found in {}", key, state),
                    ));
                }
            }
        }
        violations
    }

    /// Values a parameter may take on a transport, if the table restricts it
    pub fn allowed_values(&self, transport: &TransportKind, parameter: &str) -> Option<Vec<Value>> {
        self.allowed_values
            .iter()
            .find(|r| r.parameter == parameter && applies(&r.transports, transport))
            .map(|r| r.values.clone())
    }

    /// Protocol requirement for a transport
    pub fn protocol_requirement(&self, transport: &TransportKind) -> Option<&ProtocolRequirement> {
        self.protocol_requirements
            .iter()
            .find(|r| applies(&r.transports, transport))
    }

    /// Mode family covering every protocol in `protocols`
    pub fn mode_family<S: AsRef<str>>(&self, protocols: &[S]) -> Option<&ModeFamily> {
        self.mode_families.iter().find(|family| {
            protocols
                .iter()
                .all(|p| family.protocols.iter().any(|fp| fp == p.as_ref()))
        })
    }

    /// Every mode known to the table, optionally with ECDH variants
    pub fn known_modes(&self, ecdh: bool) -> BTreeSet<String> {
        let mut modes = BTreeSet::new();
        for family in &self.mode_families {
            modes.extend(family.modes.iter().cloned());
            if ecdh {
                modes.extend(family.ecdh_modes.iter().cloned());
            }
        }
        modes.insert(self.sentinel.clone());
        modes
    }

    /// Key-material rule for a parameter
    pub fn key_material_rule(&self, parameter: &str) -> Option<&KeyMaterialRule> {
        self.key_material.iter().find(|r| r.parameter == parameter)
    }

    /// Key regenerated by a role on every deactivation
    pub fn ephemeral_key(&self, role: Role) -> Option<&str> {
        self.key_material
            .iter()
            .find(|r| r.requires_ecdh && r.authoritative == role)
            .map(|r| r.parameter.as_str())
    }

    /// Violation when the sentinel shares an enumeration with other members
    pub fn check_sentinel_exclusive(
        &self,
        leg: Option<usize>,
        parameter: &str,
        members: &[Value],
    ) -> Option<RuleViolation> {
        let has_sentinel = members
            .iter()
            .any(|m| m.as_str() == Some(self.sentinel.as_str()));
        if has_sentinel && members.len() != 1 {
            return Some(RuleViolation::new(
                leg,
                parameter,
                RuleViolationKind::SentinelNotExclusive,
                format!(
                    "{} constraint cannot allow other values if '{}' is allowed",
                    parameter, self.sentinel
                ),
            ));
        }
        None
    }

    /// IS-05 core parameters of a transport and role
    pub fn base_parameters(&self, transport: &TransportKind, role: Role) -> Option<BTreeSet<String>> {
        self.base_parameters
            .iter()
            .find(|r| r.role == role && applies(&r.transports, transport))
            .map(|r| r.parameters.iter().cloned().collect())
    }

    /// Check the constraint keys of a leg form a valid combination: the core
    /// set plus any fully present bundles
    ///
    /// Registered `ext_` extensions and vendor keys starting with
    /// `extension_prefix` are left to the other checks.
    pub fn check_parameter_combination(
        &self,
        transport: &TransportKind,
        role: Role,
        leg_index: usize,
        leg: &LegState,
        extension_prefix: &str,
    ) -> Vec<RuleViolation> {
        let Some(mut expected) = self.base_parameters(transport, role) else {
            return Vec::new();
        };

        let is_extension = |k: &str| {
            k.starts_with(REGISTERED_EXTENSION_PREFIX)
                || (!extension_prefix.is_empty() && k.starts_with(extension_prefix))
        };
        let present: BTreeSet<&String> = leg
            .constraints
            .keys()
            .filter(|k| !is_extension(k.as_str()))
            .collect();
        let present_list: Vec<&String> = present.iter().copied().collect();
        expected.extend(
            self.required_parameters(transport, role, &present_list)
                .mandatory
                .into_iter()
                .filter(|k| !is_extension(k.as_str())),
        );

        let mut violations: Vec<RuleViolation> = expected
            .iter()
            .filter(|k| !present.contains(k))
            .map(|k| {
                RuleViolation::new(
                    Some(leg_index),
                    k.as_str(),
                    RuleViolationKind::MissingParameter {
                        state: StateKind::Constraints,
                    },
                    format!("core transport parameter {} not found in constraints", k),
                )
            })
            .collect();
        violations.extend(present.iter().filter(|k| !expected.contains(**k)).map(|k| {
            RuleViolation::new(
                Some(leg_index),
                k.as_str(),
                RuleViolationKind::UnexpectedParameter,
                format!("{} is not part of any valid parameter combination for {}", k, transport),
            )
        }));
        violations
    }
}
