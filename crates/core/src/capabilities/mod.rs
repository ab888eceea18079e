//! Capability constraints
//!
//! Senders and Receivers advertise capabilities as an ordered list of
//! constraint sets (BCP-004-01). The same constraint objects appear on the
//! IS-05 constraints endpoint, so the types here are shared by every check in
//! the crate.
//!
//! # Example
//!
//! ```rust,ignore
//! use nmos_conformance::capabilities::{equivalent, ConstraintSet};
//!
//! let a: Vec<ConstraintSet> = serde_json::from_value(json!([
//!     {"urn:x-nmos:cap:format:grain_rate": {"enum": [{"numerator": 25}]}}
//! ]))?;
//! let b: Vec<ConstraintSet> = serde_json::from_value(json!([
//!     {"urn:x-nmos:cap:format:grain_rate": {"enum": [25]}, "urn:x-nmos:cap:meta:enabled": true}
//! ]))?;
//! assert!(equivalent(&a, &b));
//! ```

pub mod canonical;
pub mod constraints;
pub mod equivalence;
pub mod validation;

pub use canonical::{
    canonical_value, canonicalize, canonicalize_set, CanonicalConstraint, CanonicalConstraintSet,
    CanonicalValue,
};
pub use constraints::{
    CapabilitySet, ConstraintMiss, ConstraintSet, ParameterConstraint, ParameterConstraints,
    ParameterValues, Rational, META_ENABLED, META_LABEL, META_PREFERENCE,
};
pub use equivalence::equivalent;
pub use validation::{
    validate_capability_set, CapabilityReport, CapabilityViolation, CapabilityViolationKind,
};
