//! NMOS Conformance - transport-parameter and capability validation
//!
//! This crate checks the declared state of NMOS Senders and Receivers:
//! capability constraint sets, the constraints/staged/active transport
//! parameter triple of every leg, privacy (PEP) protocol rules, the live
//! behaviour of the staged endpoint, and the SDP transport file.
//!
//! # Architecture
//!
//! - [`capabilities`] canonicalizes constraints and compares capability sets
//! - [`consistency`] cross-checks the per-leg parameter triple
//! - [`rules`] applies transport- and discriminator-driven rule tables
//! - [`activation`] drives bounded write-then-read cycles on a device
//! - [`sdp`] re-derives parameters from the SDP text and reconciles them
//! - [`validator`] runs a resource snapshot through all of the above
//!
//! Device access goes through the traits in [`transport`]; an HTTP
//! implementation lives in [`transport::client::http`].
//!
//! # Example
//!
//! ```ignore
//! use nmos_conformance::{ConformanceValidator, Resource, ValidatorConfig};
//!
//! let validator = ConformanceValidator::new(ValidatorConfig::default());
//! let report = validator.validate_resource(&resource);
//! for violation in report.violations() {
//!     println!("{}", violation);
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod activation;
pub mod capabilities;
pub mod config;
pub mod consistency;
pub mod error;
pub mod resource;
pub mod rules;
pub mod sdp;
pub mod transport;
pub mod validation;
pub mod validator;

pub use capabilities::{
    canonicalize, canonicalize_set, equivalent, CanonicalConstraint, CanonicalConstraintSet,
    CapabilitySet, ConstraintSet, ParameterConstraint, Rational,
};
pub use config::{LegParityReference, ValidatorConfig};
pub use consistency::{ConsistencyChecker, ConsistencyResult, ConsistencyViolation};
pub use error::{Error, Result};
pub use resource::{LegState, Resource, Role, TransportKind, TransportParameterState};
pub use rules::{RuleOutcome, RuleTable, RuleViolation};
pub use validation::{ValidationOutcome, ValidationReport, Violation, Warning, WarningKind};
pub use validator::ConformanceValidator;

/// Initialize tracing for binaries and test harnesses that embed the validator
///
/// Honours `RUST_LOG`, defaulting to `info`. Returns an error if a global
/// subscriber is already installed.
pub fn init() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .try_init()
        .map_err(|e| Error::Other(format!("tracing already initialized: {}", e)))?;

    tracing::info!("NMOS conformance validator initialized");
    Ok(())
}
