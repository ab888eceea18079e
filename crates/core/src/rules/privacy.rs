//! Privacy-encryption value rules
//!
//! Walks the protocol, curve, mode and key-material checks for one leg. Each
//! of them stops at its own first failure; the others still run.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;
use tracing::debug;

use crate::capabilities::{ParameterConstraint, ParameterConstraints, ParameterValues};
use crate::resource::{Resource, Role, StateKind, TransportKind};
use crate::validation::{Warning, WarningKind};

use super::table::{
    DependentPolicy, HexLength, KeyMaterialRule, RuleTable, ECDH_PREFIX, PRIVACY_ECDH_CURVE,
    PRIVACY_IV, PRIVACY_MODE, PRIVACY_PROTOCOL,
};
use super::{RuleOutcome, RuleViolation, RuleViolationKind};

/// Capability advertising privacy encryption
pub const PRIVACY_CAPABILITY: &str = "urn:x-nmos:cap:transport:privacy";

/// Public keys of a device without ECDH support are this long
const NULL_KEY_LENGTH: HexLength = HexLength::Exact(2);

type Check = std::result::Result<(), RuleViolation>;

/// What the generic value checks need to know about the resource
#[derive(Debug, Clone, PartialEq)]
pub struct GenericValueContext {
    /// Transport of the resource
    pub transport: TransportKind,
    /// Sender or Receiver
    pub role: Role,
    /// Leg being checked
    pub leg: usize,
    /// ECDH parameters are present
    pub elliptic: bool,
    /// Active `master_enable`
    pub master_enable: bool,
}

impl GenericValueContext {
    /// Context for an enabled resource without ECDH parameters
    pub fn new(transport: TransportKind, role: Role, leg: usize) -> Self {
        Self {
            transport,
            role,
            leg,
            elliptic: false,
            master_enable: true,
        }
    }

    /// Derive the ECDH flag from the constraint keys of the leg
    pub fn with_constraints(mut self, constraints: &ParameterConstraints) -> Self {
        self.elliptic = constraints.keys().any(|k| k.starts_with(ECDH_PREFIX));
        self
    }

    /// Set the active `master_enable`
    pub fn with_master_enable(mut self, master_enable: bool) -> Self {
        self.master_enable = master_enable;
        self
    }

    /// Whether this role owns a key-material parameter
    pub fn is_authoritative(&self, rule: &KeyMaterialRule) -> bool {
        self.role == rule.authoritative
    }

    fn violation(
        &self,
        parameter: &str,
        kind: RuleViolationKind,
        message: impl Into<String>,
    ) -> RuleViolation {
        RuleViolation::new(
            Some(self.leg),
            parameter,
            kind,
            format!("{}: {}", self.role, message.into()),
        )
    }
}

fn describe(values: &[Value]) -> String {
    Value::Array(values.to_vec()).to_string()
}

/// Enumeration members of a parameter constraint, which must exist
fn enumeration<'a>(
    ctx: &GenericValueContext,
    constraints: &'a ParameterConstraints,
    parameter: &str,
) -> std::result::Result<&'a [Value], RuleViolation> {
    let constraint = constraints.get(parameter).ok_or_else(|| {
        ctx.violation(
            parameter,
            RuleViolationKind::MissingParameter {
                state: StateKind::Constraints,
            },
            format!("{} has no constraint", parameter),
        )
    })?;
    constraint.enumeration().ok_or_else(|| {
        ctx.violation(
            parameter,
            RuleViolationKind::NotEnumerated,
            format!("{} constraint must enumerate the supported values", parameter),
        )
    })
}

fn string_members<'a>(
    ctx: &GenericValueContext,
    parameter: &str,
    members: &'a [Value],
) -> std::result::Result<Vec<&'a str>, RuleViolation> {
    members
        .iter()
        .map(|m| {
            m.as_str().ok_or_else(|| {
                ctx.violation(
                    parameter,
                    RuleViolationKind::NotAString,
                    format!("{} constraint value must be string", parameter),
                )
            })
        })
        .collect()
}

fn state_value<'a>(
    ctx: &GenericValueContext,
    values: &'a ParameterValues,
    state: StateKind,
    parameter: &str,
) -> std::result::Result<&'a Value, RuleViolation> {
    values.get(parameter).ok_or_else(|| {
        ctx.violation(
            parameter,
            RuleViolationKind::MissingParameter { state },
            format!("{} not found in {}", parameter, state),
        )
    })
}

/// Staged and active values must both be enumeration members
fn check_states_in(
    ctx: &GenericValueContext,
    parameter: &str,
    members: &[Value],
    staged: &ParameterValues,
    active: &ParameterValues,
) -> Check {
    for (state, values) in [(StateKind::Staged, staged), (StateKind::Active, active)] {
        let value = state_value(ctx, values, state, parameter)?;
        if !members.contains(value) {
            return Err(ctx.violation(
                parameter,
                RuleViolationKind::OutsideConstraint { state },
                format!(
                    "{} {} value {} is not within constraints {}",
                    parameter,
                    state,
                    value,
                    describe(members)
                ),
            ));
        }
    }
    Ok(())
}

/// Staged and active values must both be hexadecimal strings of `length`
fn check_states_hex(
    ctx: &GenericValueContext,
    parameter: &str,
    length: HexLength,
    staged: &ParameterValues,
    active: &ParameterValues,
) -> Check {
    for (state, values) in [(StateKind::Staged, staged), (StateKind::Active, active)] {
        let value = state_value(ctx, values, state, parameter)?;
        if !value.as_str().map(|s| length.accepts(s)).unwrap_or(false) {
            return Err(ctx.violation(
                parameter,
                RuleViolationKind::OutsideConstraint { state },
                format!("{} {} value {} must be {}", parameter, state, value, length),
            ));
        }
    }
    Ok(())
}

fn contains_str(members: &[&str], wanted: &str) -> bool {
    members.iter().any(|m| *m == wanted)
}

impl RuleTable {
    /// Every protocol the table knows, plus the sentinel
    pub fn known_protocols(&self) -> BTreeSet<String> {
        let mut protocols: BTreeSet<String> = self
            .protocol_requirements
            .iter()
            .flat_map(|r| r.permitted.iter().cloned())
            .collect();
        protocols.insert(self.sentinel.clone());
        protocols
    }

    /// Whether the curve constraint declares ECDH support
    pub fn ecdh_supported(&self, constraints: &ParameterConstraints) -> bool {
        match constraints.get(PRIVACY_ECDH_CURVE).and_then(ParameterConstraint::enumeration) {
            Some(curves) => {
                !curves.is_empty() && !curves.iter().any(|c| c.as_str() == Some(self.sentinel.as_str()))
            }
            None => false,
        }
    }

    /// Whether the mode constraint enumerates the sentinel
    pub fn null_mode(&self, constraints: &ParameterConstraints) -> bool {
        constraints
            .get(PRIVACY_MODE)
            .map(|c| c.enumerates(&Value::String(self.sentinel.clone())))
            .unwrap_or(false)
    }

    /// Run the privacy value checklist on one leg
    pub fn validate_generic_values(
        &self,
        ctx: &GenericValueContext,
        constraints: &ParameterConstraints,
        staged: &ParameterValues,
        active: &ParameterValues,
    ) -> RuleOutcome {
        let mut outcome = RuleOutcome::default();
        let ecdh = ctx.elliptic && self.ecdh_supported(constraints);

        let mut checks: Vec<(&str, Check)> = vec![(
            PRIVACY_PROTOCOL,
            self.check_protocol(ctx, constraints, staged, active),
        )];
        if ctx.elliptic {
            checks.push((
                PRIVACY_ECDH_CURVE,
                self.check_curve(ctx, constraints, staged, active),
            ));
        }
        checks.push((
            PRIVACY_MODE,
            self.check_mode(ctx, ecdh, constraints, staged, active),
        ));
        for rule in &self.key_material {
            if rule.requires_ecdh && !ctx.elliptic {
                continue;
            }
            let result = if rule.requires_ecdh && !ecdh {
                self.check_null_key(ctx, rule, constraints)
            } else if ctx.is_authoritative(rule) {
                self.check_authoritative_key(ctx, rule, constraints, staged, active)
            } else {
                self.check_dependent_key(ctx, rule, constraints, staged, active, &mut outcome.warnings)
            };
            checks.push((rule.parameter.as_str(), result));
        }

        for (parameter, result) in checks {
            match result {
                Ok(()) => debug!("leg {} {} ok", ctx.leg, parameter),
                Err(violation) => outcome.violations.push(violation),
            }
        }
        outcome
    }

    fn check_protocol(
        &self,
        ctx: &GenericValueContext,
        constraints: &ParameterConstraints,
        staged: &ParameterValues,
        active: &ParameterValues,
    ) -> Check {
        let parameter = PRIVACY_PROTOCOL;
        let members = enumeration(ctx, constraints, parameter)?;
        if members.is_empty() {
            return Err(ctx.violation(
                parameter,
                RuleViolationKind::EmptyEnumeration,
                format!("{} constraint must allow at least one value", parameter),
            ));
        }
        let names = string_members(ctx, parameter, members)?;
        let known = self.known_protocols();
        if let Some(unknown) = names.iter().find(|n| !known.contains(**n)) {
            return Err(ctx.violation(
                parameter,
                RuleViolationKind::UnknownValue,
                format!("{} constraint value {} must be one of {:?}", parameter, unknown, known),
            ));
        }

        if let Some(v) = self.check_sentinel_exclusive(Some(ctx.leg), parameter, members) {
            return Err(v);
        }
        if !contains_str(&names, &self.sentinel) {
            if let Some(requirement) = self.protocol_requirement(&ctx.transport) {
                if !contains_str(&names, &requirement.required) {
                    return Err(ctx.violation(
                        parameter,
                        RuleViolationKind::MissingRequiredValue,
                        format!(
                            "{} constraint must allow '{}' for transport {}",
                            parameter, requirement.required, ctx.transport
                        ),
                    ));
                }
                if let Some(other) = names
                    .iter()
                    .find(|n| !requirement.permitted.iter().any(|p| p.as_str() == **n))
                {
                    return Err(ctx.violation(
                        parameter,
                        RuleViolationKind::NotPermitted,
                        format!(
                            "{} constraint value {} is not permitted for transport {}",
                            parameter, other, ctx.transport
                        ),
                    ));
                }
            }
        }

        check_states_in(ctx, parameter, members, staged, active)?;

        if let Some(allowed) = self.allowed_values(&ctx.transport, parameter) {
            for (state, values) in [(StateKind::Staged, staged), (StateKind::Active, active)] {
                let value = state_value(ctx, values, state, parameter)?;
                if !allowed.contains(value) {
                    return Err(ctx.violation(
                        parameter,
                        RuleViolationKind::NotPermitted,
                        format!(
                            "invalid {} protocol {}, expecting one of {}",
                            state,
                            value,
                            describe(&allowed)
                        ),
                    ));
                }
            }
        }
        Ok(())
    }

    fn check_curve(
        &self,
        ctx: &GenericValueContext,
        constraints: &ParameterConstraints,
        staged: &ParameterValues,
        active: &ParameterValues,
    ) -> Check {
        let parameter = PRIVACY_ECDH_CURVE;
        // an empty curve enumeration is allowed
        let members = enumeration(ctx, constraints, parameter)?;
        let names = string_members(ctx, parameter, members)?;
        if let Some(allowed) = self.allowed_values(&ctx.transport, parameter) {
            if let Some(unknown) = members.iter().find(|m| !allowed.contains(m)) {
                return Err(ctx.violation(
                    parameter,
                    RuleViolationKind::UnknownValue,
                    format!(
                        "{} constraint value {} must be one of {}",
                        parameter,
                        unknown,
                        describe(&allowed)
                    ),
                ));
            }
        }

        if contains_str(&names, &self.sentinel) {
            if let Some(v) = self.check_sentinel_exclusive(Some(ctx.leg), parameter, members) {
                return Err(v);
            }
        } else if !contains_str(&names, &self.required_curve) {
            return Err(ctx.violation(
                parameter,
                RuleViolationKind::MissingRequiredValue,
                format!("{} constraint must allow '{}'", parameter, self.required_curve),
            ));
        }

        check_states_in(ctx, parameter, members, staged, active)
    }

    fn check_mode(
        &self,
        ctx: &GenericValueContext,
        ecdh: bool,
        constraints: &ParameterConstraints,
        staged: &ParameterValues,
        active: &ParameterValues,
    ) -> Check {
        let parameter = PRIVACY_MODE;
        let members = enumeration(ctx, constraints, parameter)?;
        if members.is_empty() {
            return Err(ctx.violation(
                parameter,
                RuleViolationKind::EmptyEnumeration,
                format!("{} constraint must allow at least one value", parameter),
            ));
        }
        let names = string_members(ctx, parameter, members)?;
        let known = self.known_modes(ecdh);
        if let Some(unknown) = names.iter().find(|n| !known.contains(**n)) {
            return Err(ctx.violation(
                parameter,
                RuleViolationKind::UnknownValue,
                format!("{} constraint value {} must be one of {:?}", parameter, unknown, known),
            ));
        }

        let protocols: Vec<&str> = constraints
            .get(PRIVACY_PROTOCOL)
            .and_then(ParameterConstraint::enumeration)
            .map(|values| values.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();

        if contains_str(&names, &self.sentinel) {
            let null_protocol = protocols.len() == 1 && protocols[0] == self.sentinel;
            if !null_protocol {
                return Err(ctx.violation(
                    parameter,
                    RuleViolationKind::SentinelMismatch,
                    format!(
                        "{} constraint must match protocol if '{}' is allowed",
                        parameter, self.sentinel
                    ),
                ));
            }
            if let Some(v) = self.check_sentinel_exclusive(Some(ctx.leg), parameter, members) {
                return Err(v);
            }
        } else if !protocols.is_empty() {
            if let Some(family) = self.mode_family(&protocols) {
                if !contains_str(&names, &family.required) {
                    return Err(ctx.violation(
                        parameter,
                        RuleViolationKind::MissingRequiredValue,
                        format!(
                            "{} constraint must allow '{}' for protocol {:?}",
                            parameter, family.required, protocols
                        ),
                    ));
                }
                let permitted = |n: &str| {
                    family.modes.iter().any(|m| m == n) || (ecdh && family.ecdh_modes.iter().any(|m| m == n))
                };
                if let Some(other) = names.iter().find(|n| !permitted(**n)) {
                    return Err(ctx.violation(
                        parameter,
                        RuleViolationKind::NotPermitted,
                        format!(
                            "{} constraint value {} is not permitted for protocol {:?}",
                            parameter, other, protocols
                        ),
                    ));
                }
            }
        }

        check_states_in(ctx, parameter, members, staged, active)
    }

    fn check_authoritative_key(
        &self,
        ctx: &GenericValueContext,
        rule: &KeyMaterialRule,
        constraints: &ParameterConstraints,
        staged: &ParameterValues,
        active: &ParameterValues,
    ) -> Check {
        let parameter = rule.parameter.as_str();
        let members = enumeration(ctx, constraints, parameter)?;
        if members.len() != 1 {
            return Err(ctx.violation(
                parameter,
                RuleViolationKind::NotReadOnly,
                format!(
                    "{} constraint must allow exactly one value for read-only parameters",
                    parameter
                ),
            ));
        }
        let names = string_members(ctx, parameter, members)?;
        if !rule.hex_length.accepts(names[0]) {
            return Err(ctx.violation(
                parameter,
                RuleViolationKind::InvalidHex,
                format!("{} constraint must be {}", parameter, rule.hex_length),
            ));
        }
        check_states_in(ctx, parameter, members, staged, active)
    }

    fn check_dependent_key(
        &self,
        ctx: &GenericValueContext,
        rule: &KeyMaterialRule,
        constraints: &ParameterConstraints,
        staged: &ParameterValues,
        active: &ParameterValues,
        warnings: &mut Vec<Warning>,
    ) -> Check {
        let parameter = rule.parameter.as_str();
        match rule.dependent_policy {
            DependentPolicy::AnyValue => {
                match constraints.get(parameter) {
                    Some(ParameterConstraint::Enumeration(_)) => warnings.push(Warning::new(
                        WarningKind::OverConstrained,
                        parameter,
                        format!("{} {}: constraint should allow any value", ctx.role, parameter),
                    )),
                    Some(ParameterConstraint::Pattern(pattern))
                        if *pattern != rule.hex_length.canonical_pattern() =>
                    {
                        warnings.push(Warning::new(
                            WarningKind::UnexpectedPattern,
                            parameter,
                            format!(
                                "{} {}: constraint pattern should be '{}'",
                                ctx.role,
                                parameter,
                                rule.hex_length.canonical_pattern()
                            ),
                        ))
                    }
                    Some(_) => {}
                    None => {
                        return Err(ctx.violation(
                            parameter,
                            RuleViolationKind::MissingParameter {
                                state: StateKind::Constraints,
                            },
                            format!("{} has no constraint", parameter),
                        ))
                    }
                }
                check_states_hex(ctx, parameter, HexLength::AtLeast(2), staged, active)
            }
            DependentPolicy::EnumeratedSet => {
                let members = enumeration(ctx, constraints, parameter)?;
                if members.is_empty() {
                    return Err(ctx.violation(
                        parameter,
                        RuleViolationKind::EmptyEnumeration,
                        format!("{} constraint must allow at least one value", parameter),
                    ));
                }
                let names = string_members(ctx, parameter, members)?;
                if names.iter().any(|n| !rule.hex_length.accepts(n)) {
                    return Err(ctx.violation(
                        parameter,
                        RuleViolationKind::InvalidHex,
                        format!("{} constraint members must be {}", parameter, rule.hex_length),
                    ));
                }
                if ctx.master_enable {
                    check_states_in(ctx, parameter, members, staged, active)?;
                }
                Ok(())
            }
        }
    }

    /// Without ECDH a public-key constraint holds at most the null key
    fn check_null_key(
        &self,
        ctx: &GenericValueContext,
        rule: &KeyMaterialRule,
        constraints: &ParameterConstraints,
    ) -> Check {
        let parameter = rule.parameter.as_str();
        let Some(members) = constraints.get(parameter).and_then(ParameterConstraint::enumeration) else {
            return Ok(());
        };
        if members.len() > 1 {
            return Err(ctx.violation(
                parameter,
                RuleViolationKind::NotReadOnly,
                format!(
                    "{} constraint must not allow more than the null key without ECDH",
                    parameter
                ),
            ));
        }
        let names = string_members(ctx, parameter, members)?;
        if names.iter().any(|n| !NULL_KEY_LENGTH.accepts(n)) {
            return Err(ctx.violation(
                parameter,
                RuleViolationKind::InvalidHex,
                format!("{} constraint must be the {} null key", parameter, NULL_KEY_LENGTH),
            ));
        }
        Ok(())
    }

    /// Check the privacy capability and `privacy` attribute against the mode
    /// constraint of leg 0
    pub fn check_privacy_capability(&self, resource: &Resource) -> Vec<RuleViolation> {
        let Some(leg) = resource.transport_state.legs.first() else {
            return Vec::new();
        };
        if !leg.constraints.contains_key(PRIVACY_MODE) {
            return Vec::new();
        }
        let null_mode = self.null_mode(&leg.constraints);
        let mut violations = Vec::new();

        for set in resource.capabilities.iter().filter(|s| s.is_enabled()) {
            let Some(capability) = set.constraints.get(PRIVACY_CAPABILITY) else {
                continue;
            };
            let Some(members) = capability.enumeration() else {
                continue;
            };
            if members.len() != 1 {
                violations.push(RuleViolation::new(
                    None,
                    PRIVACY_CAPABILITY,
                    RuleViolationKind::InvalidCapability,
                    format!("{} {}: invalid privacy capability {}", resource.role, resource.id, describe(members)),
                ));
                continue;
            }
            match members[0].as_bool() {
                None => violations.push(RuleViolation::new(
                    None,
                    PRIVACY_CAPABILITY,
                    RuleViolationKind::InvalidCapability,
                    format!("{} {}: privacy capability must be of type bool", resource.role, resource.id),
                )),
                Some(value) if value == null_mode => violations.push(RuleViolation::new(
                    None,
                    PRIVACY_CAPABILITY,
                    RuleViolationKind::CapabilityMismatch,
                    format!(
                        "{} {}: privacy capability must match privacy transport parameters",
                        resource.role, resource.id
                    ),
                )),
                Some(_) => {}
            }
        }

        if resource.privacy == Some(null_mode) {
            violations.push(RuleViolation::new(
                None,
                "privacy",
                RuleViolationKind::PrivacyAttributeMismatch,
                format!(
                    "{} {}: privacy attribute must match privacy transport parameters",
                    resource.role, resource.id
                ),
            ));
        }
        violations
    }
}

/// Senders sharing an active IV, keyed by IV
pub fn shared_ivs(resources: &[Resource]) -> BTreeMap<String, Vec<String>> {
    let mut owners: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for resource in resources.iter().filter(|r| r.role == Role::Sender) {
        let ivs: BTreeSet<&str> = resource
            .transport_state
            .legs
            .iter()
            .filter_map(|leg| leg.active.get(PRIVACY_IV).and_then(Value::as_str))
            .collect();
        for iv in ivs {
            owners.entry(iv.to_string()).or_default().push(resource.id.clone());
        }
    }
    owners.retain(|_, ids| ids.len() > 1);
    owners
}

/// Warning for one IV shared by several Senders
pub fn duplicate_iv_warning(iv: &str, ids: &[String]) -> Warning {
    Warning::new(
        WarningKind::DuplicateIv,
        PRIVACY_IV,
        format!("iv {} is shared by senders {}", iv, ids.join(", ")),
    )
}

/// Warn about Senders sharing an active IV
pub fn check_unique_ivs(resources: &[Resource]) -> Vec<Warning> {
    shared_ivs(resources)
        .iter()
        .map(|(iv, ids)| duplicate_iv_warning(iv, ids))
        .collect()
}
