//! Validation findings and the per-resource report
//!
//! Every check in the crate produces structured findings rather than errors.
//! A [`ValidationReport`] collects them for one resource and reduces them to
//! a [`ValidationOutcome`].

pub mod error;
pub mod registry;
pub mod schema_validator;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use error::{SchemaConstraint, SchemaViolation, Warning, WarningKind};
pub use registry::ParameterRegistry;
pub use schema_validator::SchemaValidator;

use crate::activation::MutationViolation;
use crate::capabilities::CapabilityViolation;
use crate::consistency::ConsistencyViolation;
use crate::rules::RuleViolation;
use crate::sdp::SdpViolation;

/// Any hard finding, grouped by the component that produced it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "source", content = "detail")]
pub enum Violation {
    /// JSON-schema failure of the IS-04 document
    Structural(SchemaViolation),
    /// Constraints/staged/active disagreement
    Consistency(ConsistencyViolation),
    /// Protocol rule failure
    Rule(RuleViolation),
    /// Capability set failure
    Capability(CapabilityViolation),
    /// Observed side effect of a write was wrong
    Mutation(MutationViolation),
    /// SDP disagreement with the live state
    Sdp(SdpViolation),
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Violation::Structural(v) => write!(f, "schema: {}", v),
            Violation::Consistency(v) => write!(f, "consistency: {}", v),
            Violation::Rule(v) => write!(f, "rule: {}", v),
            Violation::Capability(v) => write!(f, "capability: {}", v),
            Violation::Mutation(v) => write!(f, "mutation: {}", v),
            Violation::Sdp(v) => write!(f, "sdp: {}", v),
        }
    }
}

impl From<SchemaViolation> for Violation {
    fn from(v: SchemaViolation) -> Self {
        Violation::Structural(v)
    }
}

impl From<ConsistencyViolation> for Violation {
    fn from(v: ConsistencyViolation) -> Self {
        Violation::Consistency(v)
    }
}

impl From<RuleViolation> for Violation {
    fn from(v: RuleViolation) -> Self {
        Violation::Rule(v)
    }
}

impl From<CapabilityViolation> for Violation {
    fn from(v: CapabilityViolation) -> Self {
        Violation::Capability(v)
    }
}

impl From<MutationViolation> for Violation {
    fn from(v: MutationViolation) -> Self {
        Violation::Mutation(v)
    }
}

impl From<SdpViolation> for Violation {
    fn from(v: SdpViolation) -> Self {
        Violation::Sdp(v)
    }
}

/// Overall result of validating one resource
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationOutcome {
    /// No findings at all
    Valid,
    /// Only warnings
    PartiallyValid {
        /// Non-fatal findings
        warnings: Vec<Warning>,
    },
    /// At least one violation
    Invalid {
        /// Hard findings
        violations: Vec<Violation>,
        /// Non-fatal findings
        warnings: Vec<Warning>,
    },
}

impl ValidationOutcome {
    /// Check if the resource passed (warnings allowed)
    pub fn is_ok(&self) -> bool {
        !matches!(self, ValidationOutcome::Invalid { .. })
    }
}

/// Findings collected for one resource
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationReport {
    /// Resource the findings are about
    pub resource_id: String,
    violations: Vec<Violation>,
    warnings: Vec<Warning>,
}

impl ValidationReport {
    /// Empty report for a resource
    pub fn new(resource_id: impl Into<String>) -> Self {
        Self {
            resource_id: resource_id.into(),
            ..Default::default()
        }
    }

    /// Record a violation
    pub fn push_violation(&mut self, violation: impl Into<Violation>) {
        self.violations.push(violation.into());
    }

    /// Record a warning
    pub fn push_warning(&mut self, warning: Warning) {
        self.warnings.push(warning);
    }

    /// Record many violations
    pub fn extend_violations<I, V>(&mut self, violations: I)
    where
        I: IntoIterator<Item = V>,
        V: Into<Violation>,
    {
        self.violations.extend(violations.into_iter().map(Into::into));
    }

    /// Record many warnings
    pub fn extend_warnings(&mut self, warnings: impl IntoIterator<Item = Warning>) {
        self.warnings.extend(warnings);
    }

    /// Merge another report's findings into this one
    pub fn merge(&mut self, other: ValidationReport) {
        self.violations.extend(other.violations);
        self.warnings.extend(other.warnings);
    }

    /// True when no violation was recorded
    pub fn is_ok(&self) -> bool {
        self.violations.is_empty()
    }

    /// Recorded violations
    pub fn violations(&self) -> &[Violation] {
        &self.violations
    }

    /// Recorded warnings
    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    /// Reduce to an outcome
    pub fn outcome(&self) -> ValidationOutcome {
        match (self.violations.is_empty(), self.warnings.is_empty()) {
            (true, true) => ValidationOutcome::Valid,
            (true, false) => ValidationOutcome::PartiallyValid {
                warnings: self.warnings.clone(),
            },
            (false, _) => ValidationOutcome::Invalid {
                violations: self.violations.clone(),
                warnings: self.warnings.clone(),
            },
        }
    }
}
