//! Cross-state consistency of transport parameters
//!
//! For every leg the constraints, staged and active mappings are checked in
//! four steps: triple parity, leg parity against leg 0, membership of the
//! staged and active values in the declared constraint, and read-only
//! pinning. The first violation of a leg ends that leg's analysis; the other
//! legs are still checked.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::capabilities::{canonical_value, canonicalize, ConstraintMiss, ParameterConstraint};
use crate::config::{LegParityReference, ValidatorConfig};
use crate::resource::{LegState, Role, StateKind};

const STATES: [StateKind; 3] = [StateKind::Constraints, StateKind::Staged, StateKind::Active];

/// What kind of inconsistency was found
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum ConsistencyViolationKind {
    /// Parameter is present in other states of the leg but not in this one
    MissingInState {
        /// State lacking the parameter
        state: StateKind,
    },
    /// Key set of this state differs from the leg-0 reference
    LegKeyMismatch {
        /// State whose key set differs
        state: StateKind,
    },
    /// Value differs from leg 0
    LegValueMismatch {
        /// State whose value differs
        state: StateKind,
    },
    /// Value does not satisfy the declared constraint
    OutsideConstraint {
        /// Staged or active
        state: StateKind,
        /// How it missed
        miss: ConstraintMiss,
    },
}

/// A consistency finding tagged with leg and parameter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsistencyViolation {
    /// Leg index
    pub leg: usize,
    /// Parameter name
    pub parameter: String,
    /// Violation kind
    pub kind: ConsistencyViolationKind,
}

impl ConsistencyViolation {
    /// Whether this is a membership failure, read-only pinning included
    pub fn is_membership(&self) -> bool {
        matches!(self.kind, ConsistencyViolationKind::OutsideConstraint { .. })
    }
}

impl fmt::Display for ConsistencyViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ConsistencyViolationKind::MissingInState { state } => write!(
                f,
                "leg {}: '{}' missing from {}",
                self.leg, self.parameter, state
            ),
            ConsistencyViolationKind::LegKeyMismatch { state } => write!(
                f,
                "leg {}: {} key set differs from leg 0 at '{}'",
                self.leg, state, self.parameter
            ),
            ConsistencyViolationKind::LegValueMismatch { state } => write!(
                f,
                "leg {}: {} value of '{}' differs from leg 0",
                self.leg, state, self.parameter
            ),
            ConsistencyViolationKind::OutsideConstraint { state, miss } => write!(
                f,
                "leg {}: {} value of '{}' {}",
                self.leg, state, self.parameter, miss
            ),
        }
    }
}

/// Outcome of a consistency check
#[derive(Debug, Clone, PartialEq)]
pub enum ConsistencyResult {
    /// No inconsistency
    Ok,
    /// One or more inconsistencies
    Violations(Vec<ConsistencyViolation>),
}

impl ConsistencyResult {
    fn from_vec(violations: Vec<ConsistencyViolation>) -> Self {
        if violations.is_empty() {
            ConsistencyResult::Ok
        } else {
            ConsistencyResult::Violations(violations)
        }
    }

    /// Check if no inconsistency was found
    pub fn is_ok(&self) -> bool {
        matches!(self, ConsistencyResult::Ok)
    }

    /// Violations, empty when ok
    pub fn violations(&self) -> &[ConsistencyViolation] {
        match self {
            ConsistencyResult::Ok => &[],
            ConsistencyResult::Violations(v) => v,
        }
    }

    /// Consume into the list of violations
    pub fn into_violations(self) -> Vec<ConsistencyViolation> {
        match self {
            ConsistencyResult::Ok => Vec::new(),
            ConsistencyResult::Violations(v) => v,
        }
    }
}

/// Checker for the per-leg constraints/staged/active triple
#[derive(Debug, Clone)]
pub struct ConsistencyChecker {
    extension_prefix: String,
    leg_specific: BTreeSet<String>,
    reference: LegParityReference,
    allow_auto_in_staged: bool,
}

impl Default for ConsistencyChecker {
    fn default() -> Self {
        Self::new(&ValidatorConfig::default(), Role::Sender)
    }
}

impl ConsistencyChecker {
    /// Create a checker for resources of `role`
    pub fn new(config: &ValidatorConfig, role: Role) -> Self {
        Self {
            extension_prefix: config.extension_prefix.clone(),
            leg_specific: config.leg_specific_parameters.iter().cloned().collect(),
            reference: config.leg_reference(role),
            allow_auto_in_staged: config.allow_auto_in_staged,
        }
    }

    /// Override the leg-parity reference
    pub fn with_reference(mut self, reference: LegParityReference) -> Self {
        self.reference = reference;
        self
    }

    fn is_extension(&self, key: &str) -> bool {
        !self.extension_prefix.is_empty() && key.starts_with(&self.extension_prefix)
    }

    fn parity_keys<'a>(&self, leg: &'a LegState, state: StateKind) -> BTreeSet<&'a str> {
        leg.keys(state)
            .into_iter()
            .map(String::as_str)
            .filter(|k| !self.is_extension(k))
            .collect()
    }

    /// Check every leg; violations are accumulated across legs
    pub fn check(&self, legs: &[LegState]) -> ConsistencyResult {
        let violations: Vec<ConsistencyViolation> = legs
            .iter()
            .enumerate()
            .filter_map(|(index, leg)| {
                let violation = self.check_leg(index, leg, &legs[0]);
                if let Some(v) = &violation {
                    debug!("consistency: {}", v);
                }
                violation
            })
            .collect();
        ConsistencyResult::from_vec(violations)
    }

    fn check_leg(&self, index: usize, leg: &LegState, first: &LegState) -> Option<ConsistencyViolation> {
        let violation = |parameter: &str, kind| ConsistencyViolation {
            leg: index,
            parameter: parameter.to_string(),
            kind,
        };

        // Triple parity
        let key_sets: Vec<BTreeSet<&str>> = STATES.iter().map(|s| self.parity_keys(leg, *s)).collect();
        let union: BTreeSet<&str> = key_sets.iter().flatten().copied().collect();
        for key in &union {
            if let Some(position) = key_sets.iter().position(|set| !set.contains(key)) {
                return Some(violation(
                    *key,
                    ConsistencyViolationKind::MissingInState {
                        state: STATES[position],
                    },
                ));
            }
        }

        // Leg parity: key sets, then values
        if index > 0 {
            for (position, state) in STATES.iter().enumerate() {
                let reference = match self.reference {
                    LegParityReference::Constraints => self.parity_keys(first, StateKind::Constraints),
                    LegParityReference::Active => self.parity_keys(first, StateKind::Active),
                    LegParityReference::PerState => self.parity_keys(first, *state),
                };
                if let Some(key) = key_sets[position].symmetric_difference(&reference).next() {
                    return Some(violation(*key, ConsistencyViolationKind::LegKeyMismatch { state: *state }));
                }
            }

            for (key, constraint) in &leg.constraints {
                if self.leg_specific.contains(key) {
                    continue;
                }
                if let Some(state) = value_mismatch(key, leg, first, constraint) {
                    return Some(violation(key.as_str(), ConsistencyViolationKind::LegValueMismatch { state }));
                }
            }
        }

        // Membership, with read-only pinning reported by the constraint itself
        for (key, constraint) in &leg.constraints {
            for state in [StateKind::Staged, StateKind::Active] {
                let Some(value) = leg.value(state, key) else {
                    continue;
                };
                if state == StateKind::Staged && self.allow_auto_in_staged && value == "auto" {
                    continue;
                }
                if let Err(miss) = constraint.check(value) {
                    return Some(violation(
                        key.as_str(),
                        ConsistencyViolationKind::OutsideConstraint { state, miss },
                    ));
                }
            }
        }

        None
    }

    /// Cross-leg agreement restricted to parameters starting with `prefix`
    ///
    /// Unlike [`check`](Self::check), leg-specific parameters are not exempt:
    /// a bundle is expected to be identical on every leg.
    pub fn check_bundle_across_legs(&self, legs: &[LegState], prefix: &str) -> ConsistencyResult {
        let Some(first) = legs.first() else {
            return ConsistencyResult::Ok;
        };

        let mut violations = Vec::new();
        for (index, leg) in legs.iter().enumerate().skip(1) {
            let found = leg
                .constraints
                .iter()
                .filter(|(key, _)| key.starts_with(prefix))
                .find_map(|(key, constraint)| {
                    let kind = if !first.constraints.contains_key(key) {
                        ConsistencyViolationKind::LegKeyMismatch {
                            state: StateKind::Constraints,
                        }
                    } else {
                        ConsistencyViolationKind::LegValueMismatch {
                            state: value_mismatch(key, leg, first, constraint)?,
                        }
                    };
                    Some(ConsistencyViolation {
                        leg: index,
                        parameter: key.clone(),
                        kind,
                    })
                });
            if let Some(v) = found {
                debug!("bundle '{}': {}", prefix, v);
                violations.push(v);
            }
        }
        ConsistencyResult::from_vec(violations)
    }
}

/// First state in which `key` differs between `leg` and `first`
fn value_mismatch(
    key: &str,
    leg: &LegState,
    first: &LegState,
    constraint: &ParameterConstraint,
) -> Option<StateKind> {
    if let Some(reference) = first.constraints.get(key) {
        if canonicalize(constraint) != canonicalize(reference) {
            return Some(StateKind::Constraints);
        }
    }
    for state in [StateKind::Staged, StateKind::Active] {
        if let (Some(a), Some(b)) = (leg.value(state, key), first.value(state, key)) {
            if canonical_value(a) != canonical_value(b) {
                return Some(state);
            }
        }
    }
    None
}
