//! Structural checks on a capability set
//!
//! Reports constraint sets that carry no real constraint, preferences out of
//! range, and (as warnings) empty ranges, unregistered parameters and labels
//! used on some sets but not others.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::validation::{ParameterRegistry, Warning, WarningKind};

use super::constraints::ConstraintSet;

/// Namespace whose parameter names must be registered
const REGISTERED_NAMESPACE: &str = "urn:x-nmos:";

/// What is wrong with a constraint set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityViolationKind {
    /// Only metadata keys, no parameter constraint
    MetadataOnly,
    /// Preference outside -100..=100
    PreferenceOutOfRange,
}

/// A constraint set failed a structural check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityViolation {
    /// Index within the capability set
    pub set_index: usize,
    /// Violation kind
    pub kind: CapabilityViolationKind,
}

impl fmt::Display for CapabilityViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            CapabilityViolationKind::MetadataOnly => write!(
                f,
                "constraint set {} has no parameter constraint",
                self.set_index
            ),
            CapabilityViolationKind::PreferenceOutOfRange => write!(
                f,
                "constraint set {} preference must be within -100..=100",
                self.set_index
            ),
        }
    }
}

/// Result of [`validate_capability_set`]
#[derive(Debug, Clone, Default)]
pub struct CapabilityReport {
    /// Hard failures
    pub violations: Vec<CapabilityViolation>,
    /// Soft failures
    pub warnings: Vec<Warning>,
}

impl CapabilityReport {
    /// Check if no violation was found
    pub fn is_valid(&self) -> bool {
        self.violations.is_empty()
    }
}

/// Check every constraint set of a capability set
pub fn validate_capability_set(sets: &[ConstraintSet], registry: &ParameterRegistry) -> CapabilityReport {
    let mut report = CapabilityReport::default();

    for (index, set) in sets.iter().enumerate() {
        if set.is_metadata_only() {
            report.violations.push(CapabilityViolation {
                set_index: index,
                kind: CapabilityViolationKind::MetadataOnly,
            });
        }
        if let Some(preference) = set.preference {
            if !(-100..=100).contains(&preference) {
                report.violations.push(CapabilityViolation {
                    set_index: index,
                    kind: CapabilityViolationKind::PreferenceOutOfRange,
                });
            }
        }

        // Disabled alternatives are not advertised, so their content is not judged
        if !set.is_enabled() {
            continue;
        }

        for (name, constraint) in &set.constraints {
            if constraint.is_empty_range() {
                report.warnings.push(Warning::new(
                    WarningKind::EmptyRange,
                    name.as_str(),
                    format!(
                        "constraint set {}: '{}' has minimum greater than maximum",
                        index, name
                    ),
                ));
            }
        }

        report
            .warnings
            .extend(registry.check_names(set.constraints.keys(), REGISTERED_NAMESPACE));
    }

    let labelled = sets.iter().filter(|s| s.label.is_some()).count();
    if labelled != 0 && labelled != sets.len() {
        report.warnings.push(Warning::general(
            WarningKind::InconsistentLabels,
            format!("{} of {} constraint sets are labelled", labelled, sets.len()),
        ));
    }

    report
}
