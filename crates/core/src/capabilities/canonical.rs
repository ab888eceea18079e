//! Canonical forms for constraints and constraint sets
//!
//! Two descriptions of the same capability may differ only in how numbers are
//! written (`25`, `25.0`, `{"numerator": 50, "denominator": 2}`) or in whether
//! defaulted metadata is spelled out. Canonicalization removes those
//! differences so that derived equality becomes semantic equality.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde_json::Value;

use super::constraints::{ConstraintSet, ParameterConstraint, Rational};

/// JSON value with every number and rational object collapsed to a [`Rational`]
#[derive(Debug, Clone, PartialEq)]
pub enum CanonicalValue {
    /// `null`
    Null,
    /// Boolean
    Bool(bool),
    /// Exact number
    Number(Rational),
    /// Number with no exact rational form (out of range)
    Float(f64),
    /// String
    String(String),
    /// Array, order preserved
    Array(Vec<CanonicalValue>),
    /// Object that is not rational-shaped
    Object(BTreeMap<String, CanonicalValue>),
}

impl CanonicalValue {
    /// Numeric ordering; `None` when either side is not a number
    pub fn compare(&self, other: &CanonicalValue) -> Option<Ordering> {
        match (self, other) {
            (CanonicalValue::Number(a), CanonicalValue::Number(b)) => Some(a.cmp(b)),
            (CanonicalValue::Float(a), CanonicalValue::Float(b)) => a.partial_cmp(b),
            (CanonicalValue::Number(a), CanonicalValue::Float(b)) => to_f64(a).partial_cmp(b),
            (CanonicalValue::Float(a), CanonicalValue::Number(b)) => a.partial_cmp(&to_f64(b)),
            _ => None,
        }
    }
}

fn to_f64(r: &Rational) -> f64 {
    r.numerator as f64 / r.denominator as f64
}

/// Canonical form of a JSON value
pub fn canonical_value(value: &Value) -> CanonicalValue {
    match value {
        Value::Null => CanonicalValue::Null,
        Value::Bool(b) => CanonicalValue::Bool(*b),
        Value::Number(n) => match Rational::from_value(value) {
            Some(r) => CanonicalValue::Number(r),
            None => CanonicalValue::Float(n.as_f64().unwrap_or(f64::NAN)),
        },
        Value::String(s) => CanonicalValue::String(s.clone()),
        Value::Array(items) => CanonicalValue::Array(items.iter().map(canonical_value).collect()),
        Value::Object(map) => match Rational::from_object(map) {
            Some(r) => CanonicalValue::Number(r),
            None => CanonicalValue::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), canonical_value(v)))
                    .collect(),
            ),
        },
    }
}

/// Canonical form of a [`ParameterConstraint`]
#[derive(Debug, Clone, PartialEq)]
pub enum CanonicalConstraint {
    /// Any value
    Unconstrained,
    /// Allowed values, order preserved
    Enumeration(Vec<CanonicalValue>),
    /// Inclusive bounds
    Range {
        /// Lower bound
        minimum: Option<CanonicalValue>,
        /// Upper bound
        maximum: Option<CanonicalValue>,
    },
    /// Regular expression, compared textually
    Pattern(String),
}

/// Canonical form of a [`ConstraintSet`] with metadata defaults filled in
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalConstraintSet {
    /// Label, if any
    pub label: Option<String>,
    /// Preference, 0 when absent
    pub preference: i64,
    /// Enabled flag, true when absent
    pub enabled: bool,
    /// Canonical parameter constraints
    pub constraints: BTreeMap<String, CanonicalConstraint>,
    /// Remaining metadata, untouched apart from number canonicalization
    pub other_meta: BTreeMap<String, CanonicalValue>,
}

/// Canonicalize a single constraint; never fails
pub fn canonicalize(constraint: &ParameterConstraint) -> CanonicalConstraint {
    match constraint {
        ParameterConstraint::Unconstrained => CanonicalConstraint::Unconstrained,
        ParameterConstraint::Enumeration(values) => {
            CanonicalConstraint::Enumeration(values.iter().map(canonical_value).collect())
        }
        ParameterConstraint::Range { minimum, maximum } => CanonicalConstraint::Range {
            minimum: minimum.as_ref().map(canonical_value),
            maximum: maximum.as_ref().map(canonical_value),
        },
        ParameterConstraint::Pattern(p) => CanonicalConstraint::Pattern(p.clone()),
    }
}

/// Canonicalize a constraint set, default-filling preference and enabled
pub fn canonicalize_set(set: &ConstraintSet) -> CanonicalConstraintSet {
    CanonicalConstraintSet {
        label: set.label.clone(),
        preference: set.preference.unwrap_or(0),
        enabled: set.enabled.unwrap_or(true),
        constraints: set
            .constraints
            .iter()
            .map(|(k, c)| (k.clone(), canonicalize(c)))
            .collect(),
        other_meta: set
            .other_meta
            .iter()
            .map(|(k, v)| (k.clone(), canonical_value(v)))
            .collect(),
    }
}
