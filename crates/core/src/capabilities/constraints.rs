//! Constraint types shared by capabilities and transport parameters
//!
//! A [`ParameterConstraint`] is the IS-05 / BCP-004 constraint object
//! (`enum`, `minimum`, `maximum`, `pattern`) reduced to the single form the
//! checks care about. Values stay as `serde_json::Value` so that strings,
//! booleans, integers and rationals can share one representation.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::canonical::canonical_value;

/// Concrete staged or active values of one leg, keyed by parameter name
pub type ParameterValues = BTreeMap<String, Value>;

/// Declared constraints of one leg, keyed by parameter name
pub type ParameterConstraints = BTreeMap<String, ParameterConstraint>;

/// Namespace of reserved constraint-set metadata keys
pub const META_PREFIX: &str = "urn:x-nmos:cap:meta:";
/// Constraint set label
pub const META_LABEL: &str = "urn:x-nmos:cap:meta:label";
/// Constraint set preference, -100..=100, default 0
pub const META_PREFERENCE: &str = "urn:x-nmos:cap:meta:preference";
/// Constraint set enabled flag, default true
pub const META_ENABLED: &str = "urn:x-nmos:cap:meta:enabled";

// =============================================================================
// Rational
// =============================================================================

/// Rational number as used by NMOS (`{"numerator": n, "denominator": d}`)
///
/// Values built through [`Rational::new`] are reduced and carry a positive
/// denominator, so derived equality is numeric equality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rational {
    /// Numerator
    pub numerator: i64,
    /// Denominator, 1 when omitted on the wire
    #[serde(default = "default_denominator")]
    pub denominator: i64,
}

fn default_denominator() -> i64 {
    1
}

fn gcd(mut a: i128, mut b: i128) -> i128 {
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a.abs()
}

impl Rational {
    /// Build a reduced rational; `None` when the denominator is zero
    pub fn new(numerator: i64, denominator: i64) -> Option<Self> {
        Self::reduce(numerator as i128, denominator as i128)
    }

    fn reduce(mut n: i128, mut d: i128) -> Option<Self> {
        if d == 0 {
            return None;
        }
        if d < 0 {
            n = -n;
            d = -d;
        }
        let g = gcd(n, d).max(1);
        let (n, d) = (n / g, d / g);
        Some(Self {
            numerator: i64::try_from(n).ok()?,
            denominator: i64::try_from(d).ok()?,
        })
    }

    /// Integer value
    pub fn integer(n: i64) -> Self {
        Self {
            numerator: n,
            denominator: 1,
        }
    }

    /// Exact rational for a finite float, via its shortest decimal form
    ///
    /// `0.1` becomes 1/10 rather than the binary expansion of the double.
    pub fn from_f64(f: f64) -> Option<Self> {
        if !f.is_finite() {
            return None;
        }
        let text = f.to_string();
        let (negative, digits) = match text.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, text.as_str()),
        };
        let (int_part, frac_part) = digits.split_once('.').unwrap_or((digits, ""));
        if int_part.len() + frac_part.len() > 36 {
            return None;
        }
        let mut numerator: i128 = format!("{}{}", int_part, frac_part).parse().ok()?;
        if negative {
            numerator = -numerator;
        }
        let denominator = 10i128.checked_pow(frac_part.len() as u32)?;
        Self::reduce(numerator, denominator)
    }

    /// Rational view of a JSON value: integers, floats and rational objects
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Some(Self::integer(i))
                } else if n.is_u64() {
                    None
                } else {
                    n.as_f64().and_then(Self::from_f64)
                }
            }
            Value::Object(map) => Self::from_object(map),
            _ => None,
        }
    }

    /// Rational view of `{numerator, denominator?}` with no other keys
    pub fn from_object(map: &Map<String, Value>) -> Option<Self> {
        if map.keys().any(|k| k != "numerator" && k != "denominator") {
            return None;
        }
        let numerator = map.get("numerator")?.as_i64()?;
        let denominator = match map.get("denominator") {
            Some(d) => d.as_i64()?,
            None => 1,
        };
        Self::new(numerator, denominator)
    }
}

impl PartialOrd for Rational {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Rational {
    /// Cross-multiplied comparison; denominators are positive after reduction
    fn cmp(&self, other: &Self) -> Ordering {
        let lhs = self.numerator as i128 * other.denominator as i128;
        let rhs = other.numerator as i128 * self.denominator as i128;
        lhs.cmp(&rhs)
    }
}

impl fmt::Display for Rational {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.denominator == 1 {
            write!(f, "{}", self.numerator)
        } else {
            write!(f, "{}/{}", self.numerator, self.denominator)
        }
    }
}

// =============================================================================
// Parameter Constraint
// =============================================================================

/// Constraint on a single parameter
///
/// # JSON Representations
///
/// - **Unconstrained**: `{}` (or only a `description`)
/// - **Enumeration**: `{"enum": ["RTP", "RTP_KV"]}`
/// - **Range**: `{"minimum": 5000, "maximum": 5999}` (either bound optional)
/// - **Pattern**: `{"pattern": "^[0-9a-fA-F]{16}$"}`
///
/// An enumeration takes precedence over bounds, and bounds over a pattern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawConstraint", into = "RawConstraint")]
pub enum ParameterConstraint {
    /// Any value is allowed
    Unconstrained,
    /// Only the listed values are allowed
    Enumeration(Vec<Value>),
    /// Inclusive bounds
    Range {
        /// Lower bound
        minimum: Option<Value>,
        /// Upper bound
        maximum: Option<Value>,
    },
    /// Values must be strings matching the regular expression
    Pattern(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct RawConstraint {
    #[serde(rename = "enum", default, skip_serializing_if = "Option::is_none")]
    enumeration: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    minimum: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    maximum: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pattern: Option<String>,
}

impl From<RawConstraint> for ParameterConstraint {
    fn from(raw: RawConstraint) -> Self {
        if let Some(values) = raw.enumeration {
            ParameterConstraint::Enumeration(values)
        } else if raw.minimum.is_some() || raw.maximum.is_some() {
            ParameterConstraint::Range {
                minimum: raw.minimum,
                maximum: raw.maximum,
            }
        } else if let Some(pattern) = raw.pattern {
            ParameterConstraint::Pattern(pattern)
        } else {
            ParameterConstraint::Unconstrained
        }
    }
}

impl From<ParameterConstraint> for RawConstraint {
    fn from(constraint: ParameterConstraint) -> Self {
        let mut raw = RawConstraint::default();
        match constraint {
            ParameterConstraint::Unconstrained => {}
            ParameterConstraint::Enumeration(values) => raw.enumeration = Some(values),
            ParameterConstraint::Range { minimum, maximum } => {
                raw.minimum = minimum;
                raw.maximum = maximum;
            }
            ParameterConstraint::Pattern(p) => raw.pattern = Some(p),
        }
        raw
    }
}

/// Why a value does not satisfy a constraint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintMiss {
    /// Value is not a member of the enumeration
    NotInEnumeration,
    /// Value differs from the single value of a read-only enumeration
    ReadOnlyMismatch,
    /// Value is below the declared minimum
    BelowMinimum,
    /// Value is above the declared maximum
    AboveMaximum,
    /// Value cannot be ordered against the bounds
    NotComparable,
    /// String does not match the pattern
    PatternMismatch,
    /// Pattern is not a valid regular expression
    InvalidPattern(String),
    /// Pattern constraints only apply to strings
    NotAString,
}

impl fmt::Display for ConstraintMiss {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstraintMiss::NotInEnumeration => write!(f, "not in enumeration"),
            ConstraintMiss::ReadOnlyMismatch => write!(f, "differs from read-only value"),
            ConstraintMiss::BelowMinimum => write!(f, "below minimum"),
            ConstraintMiss::AboveMaximum => write!(f, "above maximum"),
            ConstraintMiss::NotComparable => write!(f, "not comparable with bounds"),
            ConstraintMiss::PatternMismatch => write!(f, "does not match pattern"),
            ConstraintMiss::InvalidPattern(e) => write!(f, "invalid pattern: {}", e),
            ConstraintMiss::NotAString => write!(f, "pattern applied to non-string"),
        }
    }
}

impl ParameterConstraint {
    /// Enumeration of allowed values, if this is an enumeration
    pub fn enumeration(&self) -> Option<&[Value]> {
        match self {
            ParameterConstraint::Enumeration(values) => Some(values),
            _ => None,
        }
    }

    /// Pattern string, if this is a pattern constraint
    pub fn pattern(&self) -> Option<&str> {
        match self {
            ParameterConstraint::Pattern(p) => Some(p),
            _ => None,
        }
    }

    /// A size-1 enumeration pins the parameter to one value
    pub fn is_read_only(&self) -> bool {
        matches!(self, ParameterConstraint::Enumeration(values) if values.len() == 1)
    }

    /// Whether the enumeration contains `value` after canonicalization
    pub fn enumerates(&self, value: &Value) -> bool {
        let Some(values) = self.enumeration() else {
            return false;
        };
        let wanted = canonical_value(value);
        values.iter().any(|v| canonical_value(v) == wanted)
    }

    /// Check a concrete value against the constraint
    pub fn check(&self, value: &Value) -> Result<(), ConstraintMiss> {
        match self {
            ParameterConstraint::Unconstrained => Ok(()),
            ParameterConstraint::Enumeration(values) => {
                if self.enumerates(value) {
                    Ok(())
                } else if values.len() == 1 {
                    Err(ConstraintMiss::ReadOnlyMismatch)
                } else {
                    Err(ConstraintMiss::NotInEnumeration)
                }
            }
            ParameterConstraint::Range { minimum, maximum } => {
                let actual = canonical_value(value);
                if let Some(min) = minimum {
                    match actual.compare(&canonical_value(min)) {
                        Some(Ordering::Less) => return Err(ConstraintMiss::BelowMinimum),
                        None => return Err(ConstraintMiss::NotComparable),
                        _ => {}
                    }
                }
                if let Some(max) = maximum {
                    match actual.compare(&canonical_value(max)) {
                        Some(Ordering::Greater) => return Err(ConstraintMiss::AboveMaximum),
                        None => return Err(ConstraintMiss::NotComparable),
                        _ => {}
                    }
                }
                Ok(())
            }
            ParameterConstraint::Pattern(pattern) => {
                let Some(s) = value.as_str() else {
                    return Err(ConstraintMiss::NotAString);
                };
                let re = Regex::new(pattern)
                    .map_err(|e| ConstraintMiss::InvalidPattern(e.to_string()))?;
                if re.is_match(s) {
                    Ok(())
                } else {
                    Err(ConstraintMiss::PatternMismatch)
                }
            }
        }
    }

    /// Whether a range has minimum > maximum
    pub fn is_empty_range(&self) -> bool {
        match self {
            ParameterConstraint::Range {
                minimum: Some(min),
                maximum: Some(max),
            } => matches!(
                canonical_value(min).compare(&canonical_value(max)),
                Some(Ordering::Greater)
            ),
            _ => false,
        }
    }
}

// =============================================================================
// Constraint Set
// =============================================================================

/// One admissible configuration alternative
///
/// Parameter keys are namespaced (`urn:x-nmos:cap:format:...`); the reserved
/// `urn:x-nmos:cap:meta:` keys are lifted into dedicated fields. Unknown
/// metadata keys are preserved in `other_meta`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Map<String, Value>", into = "Map<String, Value>")]
pub struct ConstraintSet {
    /// `urn:x-nmos:cap:meta:label`
    pub label: Option<String>,
    /// `urn:x-nmos:cap:meta:preference`
    pub preference: Option<i64>,
    /// `urn:x-nmos:cap:meta:enabled`
    pub enabled: Option<bool>,
    /// Parameter constraints
    pub constraints: BTreeMap<String, ParameterConstraint>,
    /// Metadata keys with no dedicated field
    pub other_meta: BTreeMap<String, Value>,
}

impl ConstraintSet {
    /// Whether the set is enabled, defaulting to true
    pub fn is_enabled(&self) -> bool {
        self.enabled.unwrap_or(true)
    }

    /// Add a parameter constraint
    pub fn with_constraint(mut self, key: impl Into<String>, constraint: ParameterConstraint) -> Self {
        self.constraints.insert(key.into(), constraint);
        self
    }

    /// A set with no real parameter constraint
    pub fn is_metadata_only(&self) -> bool {
        self.constraints.is_empty()
    }
}

impl TryFrom<Map<String, Value>> for ConstraintSet {
    type Error = String;

    fn try_from(map: Map<String, Value>) -> Result<Self, Self::Error> {
        let mut set = ConstraintSet::default();
        for (key, value) in map {
            match key.as_str() {
                META_LABEL => {
                    set.label = Some(
                        value
                            .as_str()
                            .ok_or_else(|| format!("{} must be a string", META_LABEL))?
                            .to_string(),
                    )
                }
                META_PREFERENCE => {
                    set.preference = Some(
                        value
                            .as_i64()
                            .ok_or_else(|| format!("{} must be an integer", META_PREFERENCE))?,
                    )
                }
                META_ENABLED => {
                    set.enabled = Some(
                        value
                            .as_bool()
                            .ok_or_else(|| format!("{} must be a boolean", META_ENABLED))?,
                    )
                }
                k if k.starts_with(META_PREFIX) => {
                    set.other_meta.insert(key, value);
                }
                _ => {
                    let constraint: ParameterConstraint = serde_json::from_value(value)
                        .map_err(|e| format!("constraint '{}': {}", key, e))?;
                    set.constraints.insert(key, constraint);
                }
            }
        }
        Ok(set)
    }
}

impl From<ConstraintSet> for Map<String, Value> {
    fn from(set: ConstraintSet) -> Self {
        let mut map = Map::new();
        if let Some(label) = set.label {
            map.insert(META_LABEL.to_string(), Value::String(label));
        }
        if let Some(preference) = set.preference {
            map.insert(META_PREFERENCE.to_string(), Value::from(preference));
        }
        if let Some(enabled) = set.enabled {
            map.insert(META_ENABLED.to_string(), Value::Bool(enabled));
        }
        map.extend(set.other_meta);
        for (key, constraint) in set.constraints {
            map.insert(
                key,
                serde_json::to_value(constraint).unwrap_or(Value::Object(Map::new())),
            );
        }
        map
    }
}

/// Ordered disjunction of constraint sets
pub type CapabilitySet = Vec<ConstraintSet>;
