//! Registered parameter dictionary
//!
//! Names found here are known to the NMOS Parameter Registers. Anything in a
//! registered namespace but missing from the dictionary is reported as a
//! warning, never as a failure.

use std::collections::BTreeSet;

use serde_json::Value;

use crate::error::{Error, Result};

use super::error::{Warning, WarningKind};

/// Capability parameters from the NMOS Capabilities register
const CAPABILITY_PARAMETERS: &[&str] = &[
    "urn:x-nmos:cap:format:media_type",
    "urn:x-nmos:cap:format:grain_rate",
    "urn:x-nmos:cap:format:frame_width",
    "urn:x-nmos:cap:format:frame_height",
    "urn:x-nmos:cap:format:interlace_mode",
    "urn:x-nmos:cap:format:colorspace",
    "urn:x-nmos:cap:format:transfer_characteristic",
    "urn:x-nmos:cap:format:color_sampling",
    "urn:x-nmos:cap:format:component_depth",
    "urn:x-nmos:cap:format:channel_count",
    "urn:x-nmos:cap:format:sample_rate",
    "urn:x-nmos:cap:format:sample_depth",
    "urn:x-nmos:cap:format:event_type",
    "urn:x-nmos:cap:format:profile",
    "urn:x-nmos:cap:format:level",
    "urn:x-nmos:cap:format:sublevel",
    "urn:x-nmos:cap:format:bit_rate",
    "urn:x-nmos:cap:format:constant_bit_rate",
    "urn:x-nmos:cap:transport:bit_rate",
    "urn:x-nmos:cap:transport:packet_time",
    "urn:x-nmos:cap:transport:max_packet_time",
    "urn:x-nmos:cap:transport:st2110_21_sender_type",
    "urn:x-nmos:cap:transport:packet_transmission_mode",
    "urn:x-nmos:cap:transport:privacy",
];

/// Extended transport parameters registered for IS-05
const TRANSPORT_EXTENSIONS: &[&str] = &[
    "ext_privacy_protocol",
    "ext_privacy_mode",
    "ext_privacy_iv",
    "ext_privacy_key_generator",
    "ext_privacy_key_version",
    "ext_privacy_key_id",
    "ext_privacy_ecdh_sender_public_key",
    "ext_privacy_ecdh_receiver_public_key",
    "ext_privacy_ecdh_curve",
];

/// Set of registered parameter names
#[derive(Debug, Clone, Default)]
pub struct ParameterRegistry {
    names: BTreeSet<String>,
}

impl ParameterRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in capability and transport-extension names
    pub fn nmos() -> Self {
        Self::from_names(CAPABILITY_PARAMETERS.iter().chain(TRANSPORT_EXTENSIONS))
    }

    /// Build from a list of names
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            names: names.into_iter().map(|n| n.as_ref().to_string()).collect(),
        }
    }

    /// Build from the `properties` of a register schema
    pub fn from_schema(schema: &Value) -> Result<Self> {
        let properties = schema
            .get("properties")
            .and_then(Value::as_object)
            .ok_or_else(|| Error::ConfigError("registry schema has no 'properties'".to_string()))?;
        Ok(Self::from_names(properties.keys()))
    }

    /// Register an additional name
    pub fn register(&mut self, name: impl Into<String>) {
        self.names.insert(name.into());
    }

    /// Merge another registry into this one
    pub fn extend(&mut self, other: &ParameterRegistry) {
        self.names.extend(other.names.iter().cloned());
    }

    /// Check if a name is registered
    pub fn is_registered(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    /// Number of registered names
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Warn about names under `namespace` that are not registered
    pub fn check_names<'a, I>(&self, names: I, namespace: &str) -> Vec<Warning>
    where
        I: IntoIterator<Item = &'a String>,
    {
        names
            .into_iter()
            .filter(|name| name.starts_with(namespace) && !self.is_registered(name))
            .map(|name| {
                Warning::new(
                    WarningKind::UnregisteredParameter,
                    name.as_str(),
                    format!("parameter '{}' is not in the registered dictionary", name),
                )
            })
            .collect()
    }
}
