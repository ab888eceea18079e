//! Protocol rule engine
//!
//! Which parameters are mandatory and which values they may take depends on
//! the transport, the role and a discriminator prefix (`ext_privacy_`,
//! `fec_`, ...). Those rules live in a [`RuleTable`]; the checks here walk
//! the table rather than hard-coding per-role branches.
//!
//! # Example
//!
//! ```rust,ignore
//! use nmos_conformance::rules::{GenericValueContext, RuleTable};
//!
//! let table = RuleTable::default();
//! let ctx = GenericValueContext::new(TransportKind::Rtp, Role::Sender, 0);
//! let outcome = table.validate_generic_values(&ctx, &leg.constraints, &leg.staged, &leg.active);
//! assert!(outcome.ok());
//! ```

pub mod privacy;
pub mod table;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::resource::StateKind;
use crate::validation::Warning;

pub use privacy::{
    check_unique_ivs, duplicate_iv_warning, shared_ivs, GenericValueContext, PRIVACY_CAPABILITY,
};
pub use table::{
    AllowedValueRule, BaseParameterRule, DependentPolicy, DiscriminatorRule, HexLength,
    KeyMaterialRule, ModeFamily, ProtocolRequirement, RequiredParameters, RuleTable,
    TransportFamily, ECDH_PREFIX, PRIVACY_ECDH_CURVE, PRIVACY_ECDH_RECEIVER_PUBLIC_KEY,
    PRIVACY_ECDH_SENDER_PUBLIC_KEY, PRIVACY_IV, PRIVACY_KEY_GENERATOR, PRIVACY_KEY_ID,
    PRIVACY_KEY_VERSION, PRIVACY_MODE, PRIVACY_PREFIX, PRIVACY_PROTOCOL,
};

/// What rule was broken
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum RuleViolationKind {
    /// A mandatory parameter is absent
    MissingParameter {
        /// State lacking it
        state: StateKind,
    },
    /// A parameter outside every valid combination
    UnexpectedParameter,
    /// The constraint must be an enumeration
    NotEnumerated,
    /// The enumeration must list at least one value
    EmptyEnumeration,
    /// Enumeration members and values must be strings
    NotAString,
    /// Value not known for this parameter at all
    UnknownValue,
    /// The disabled sentinel shares the enumeration with other values
    SentinelNotExclusive,
    /// Sentinel used in one parameter but not in the one it depends on
    SentinelMismatch,
    /// A value every implementation must support is missing
    MissingRequiredValue,
    /// Value not permitted for this transport or protocol
    NotPermitted,
    /// Staged or active value outside the constraint
    OutsideConstraint {
        /// Staged or active
        state: StateKind,
    },
    /// The owning role must pin the value with a single-member enumeration
    NotReadOnly,
    /// Value is not hexadecimal of the required length
    InvalidHex,
    /// Privacy capability is not a single boolean
    InvalidCapability,
    /// Privacy capability disagrees with the transport parameters
    CapabilityMismatch,
    /// `privacy` attribute disagrees with the transport parameters
    PrivacyAttributeMismatch,
}

/// A rule finding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleViolation {
    /// Leg index, when the finding is about one leg
    pub leg: Option<usize>,
    /// Parameter or capability name
    pub parameter: String,
    /// Violation kind
    pub kind: RuleViolationKind,
    /// Human-readable message
    pub message: String,
}

impl RuleViolation {
    /// Create a finding
    pub fn new(
        leg: Option<usize>,
        parameter: impl Into<String>,
        kind: RuleViolationKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            leg,
            parameter: parameter.into(),
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for RuleViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.leg {
            Some(leg) => write!(f, "leg {}: {}", leg, self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

/// Violations and warnings of one rule pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuleOutcome {
    /// Hard failures
    pub violations: Vec<RuleViolation>,
    /// Soft failures
    pub warnings: Vec<Warning>,
}

impl RuleOutcome {
    /// True when no violation was found
    pub fn ok(&self) -> bool {
        self.violations.is_empty()
    }

    /// Fold another outcome into this one
    pub fn merge(&mut self, other: RuleOutcome) {
        self.violations.extend(other.violations);
        self.warnings.extend(other.warnings);
    }
}
