//! Validation finding types
//!
//! Structured records for schema violations and warnings. Detection code
//! builds these; formatting for display happens in `Display`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// JSON-schema constraint that a document violated
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SchemaConstraint {
    /// Value has wrong JSON type
    Type,
    /// Required property is missing
    Required,
    /// Numeric value below minimum
    Minimum,
    /// Numeric value above maximum
    Maximum,
    /// Value not in allowed enum set
    Enum,
    /// String doesn't match regex pattern
    Pattern,
    /// Array has fewer items than minimum
    MinItems,
    /// Array has more items than maximum
    MaxItems,
    /// Object has properties not allowed by schema
    AdditionalProperties,
    /// Value doesn't match format (e.g. "uri", "ipv4")
    Format,
    /// Other JSON Schema constraint
    Other(String),
}

impl SchemaConstraint {
    /// Human-readable description of this constraint type
    pub fn description(&self) -> &str {
        match self {
            SchemaConstraint::Type => "type mismatch",
            SchemaConstraint::Required => "required property missing",
            SchemaConstraint::Minimum => "value below minimum",
            SchemaConstraint::Maximum => "value above maximum",
            SchemaConstraint::Enum => "value not in allowed set",
            SchemaConstraint::Pattern => "string doesn't match pattern",
            SchemaConstraint::MinItems => "array has too few items",
            SchemaConstraint::MaxItems => "array has too many items",
            SchemaConstraint::AdditionalProperties => "unexpected property",
            SchemaConstraint::Format => "invalid format",
            SchemaConstraint::Other(_) => "constraint violation",
        }
    }
}

impl fmt::Display for SchemaConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemaConstraint::Other(s) => write!(f, "{}", s),
            _ => write!(f, "{}", self.description()),
        }
    }
}

/// A document failed structural validation against a registered schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaViolation {
    /// Schema the document was validated against
    pub schema: String,
    /// JSON pointer to the offending value
    pub path: String,
    /// Constraint violated
    pub constraint: SchemaConstraint,
    /// Expected value description
    pub expected: String,
    /// Actual value
    pub received: String,
    /// Complete message
    pub message: String,
}

impl SchemaViolation {
    /// Create a violation with an auto-generated message
    pub fn new(
        schema: impl Into<String>,
        path: impl Into<String>,
        constraint: SchemaConstraint,
        expected: impl Into<String>,
        received: impl Into<String>,
    ) -> Self {
        let schema = schema.into();
        let path = path.into();
        let expected = expected.into();
        let received = received.into();

        let message = Self::format_message(&schema, &path, &constraint, &expected, &received);

        Self {
            schema,
            path,
            constraint,
            expected,
            received,
            message,
        }
    }

    fn format_message(
        schema: &str,
        path: &str,
        constraint: &SchemaConstraint,
        expected: &str,
        received: &str,
    ) -> String {
        let location = path.trim_start_matches('/').replace('/', ".");
        let location = if location.is_empty() {
            "(root)".to_string()
        } else {
            format!("'{}'", location)
        };

        match constraint {
            SchemaConstraint::Required => {
                format!("{}: required {} is missing", schema, expected)
            }
            SchemaConstraint::Type => format!(
                "{}: {} expected type '{}', got {}",
                schema, location, expected, received
            ),
            SchemaConstraint::Enum => format!(
                "{}: {} must be one of [{}], got {}",
                schema, location, expected, received
            ),
            SchemaConstraint::Pattern => format!(
                "{}: {} must match pattern '{}', got {}",
                schema, location, expected, received
            ),
            SchemaConstraint::AdditionalProperties => {
                format!("{}: {} contains unexpected property {}", schema, location, received)
            }
            other => format!(
                "{}: {} {}: expected {}, got {}",
                schema, location, other, expected, received
            ),
        }
    }
}

impl fmt::Display for SchemaViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// Warning category
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    /// Parameter name not found in the registered dictionary
    UnregisteredParameter,
    /// Dependent role constrains a parameter that should accept any value
    OverConstrained,
    /// Declared pattern differs from the canonical one for the parameter
    UnexpectedPattern,
    /// Range whose minimum exceeds its maximum
    EmptyRange,
    /// Some constraint sets carry labels and others do not
    InconsistentLabels,
    /// Several Senders share the same IV
    DuplicateIv,
}

impl fmt::Display for WarningKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WarningKind::UnregisteredParameter => "unregistered_parameter",
            WarningKind::OverConstrained => "over_constrained",
            WarningKind::UnexpectedPattern => "unexpected_pattern",
            WarningKind::EmptyRange => "empty_range",
            WarningKind::InconsistentLabels => "inconsistent_labels",
            WarningKind::DuplicateIv => "duplicate_iv",
        };
        write!(f, "{}", s)
    }
}

/// A non-fatal finding
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Warning {
    /// Category
    pub kind: WarningKind,
    /// Parameter the warning is about, when there is one
    pub parameter: Option<String>,
    /// Warning message
    pub message: String,
}

impl Warning {
    /// Create a warning about a parameter
    pub fn new(kind: WarningKind, parameter: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            parameter: Some(parameter.into()),
            message: message.into(),
        }
    }

    /// Create a warning not tied to one parameter
    pub fn general(kind: WarningKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            parameter: None,
            message: message.into(),
        }
    }
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)
    }
}
