//! Conformance validator
//!
//! Runs a resource snapshot through every static check and collects the
//! findings in one [`ValidationReport`]. The live checks of
//! [`crate::activation`] need a device and are run separately.

use tracing::{debug, info};

use crate::capabilities::validate_capability_set;
use crate::config::ValidatorConfig;
use crate::consistency::ConsistencyChecker;
use crate::resource::{LegState, Resource};
use crate::rules::{
    duplicate_iv_warning, shared_ivs, GenericValueContext, RuleTable, PRIVACY_PREFIX,
    PRIVACY_PROTOCOL,
};
use crate::sdp::{
    check_header_extensions, check_privacy_presence, cross_check, extract_attribute,
    SdpAttributeSpec, SdpDocument,
};
use crate::validation::{ParameterRegistry, SchemaValidator, ValidationReport};

/// Static conformance checks for Senders and Receivers
pub struct ConformanceValidator {
    config: ValidatorConfig,
    schemas: SchemaValidator,
    registry: ParameterRegistry,
    table: RuleTable,
    privacy_attribute: SdpAttributeSpec,
}

fn has_privacy(leg: &LegState) -> bool {
    leg.constraints.keys().any(|k| k.starts_with(PRIVACY_PREFIX))
}

impl ConformanceValidator {
    /// Create a validator with the built-in rule table and parameter registry
    pub fn new(config: ValidatorConfig) -> Self {
        let table = RuleTable::default().with_sentinel(config.disabled_sentinel.clone());
        Self {
            config,
            schemas: SchemaValidator::empty(),
            registry: ParameterRegistry::nmos(),
            table,
            privacy_attribute: SdpAttributeSpec::privacy(),
        }
    }

    /// Check IS-04 documents against the schemas registered as `sender` and `receiver`
    pub fn with_schema_validator(mut self, schemas: SchemaValidator) -> Self {
        self.schemas = schemas;
        self
    }

    /// Replace the parameter registry
    pub fn with_registry(mut self, registry: ParameterRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Replace the rule table
    pub fn with_rule_table(mut self, table: RuleTable) -> Self {
        self.table = table;
        self
    }

    /// Rule table in use
    pub fn rule_table(&self) -> &RuleTable {
        &self.table
    }

    /// Run every static check on one resource
    pub fn validate_resource(&self, resource: &Resource) -> ValidationReport {
        info!("Validating {} {}", resource.role, resource.id);
        let mut report = ValidationReport::new(&resource.id);

        if let Err(violations) = self.schemas.validate(&resource.role.to_string(), &resource.document) {
            debug!("{} {}: {} schema violations", resource.role, resource.id, violations.len());
            report.extend_violations(violations);
            return report;
        }

        let role = resource.role;
        let transport = resource.transport_kind();
        let legs = &resource.transport_state.legs;
        let checker = ConsistencyChecker::new(&self.config, role);

        debug!("{} {}: consistency", role, resource.id);
        report.extend_violations(checker.check(legs).into_violations());

        debug!("{} {}: mandatory parameters", role, resource.id);
        for (index, leg) in legs.iter().enumerate() {
            report.extend_violations(self.table.check_mandatory(&transport, role, index, leg));
            report.extend_violations(self.table.check_parameter_combination(
                &transport,
                role,
                index,
                leg,
                &self.config.extension_prefix,
            ));
        }

        debug!("{} {}: generic values", role, resource.id);
        for (index, leg) in legs.iter().enumerate().filter(|(_, leg)| has_privacy(leg)) {
            let ctx = GenericValueContext::new(transport.clone(), role, index)
                .with_constraints(&leg.constraints)
                .with_master_enable(resource.active_master_enable);
            let outcome = self
                .table
                .validate_generic_values(&ctx, &leg.constraints, &leg.staged, &leg.active);
            report.extend_violations(outcome.violations);
            report.extend_warnings(outcome.warnings);
        }

        report.extend_violations(
            checker
                .check_bundle_across_legs(legs, PRIVACY_PREFIX)
                .into_violations(),
        );

        report.extend_violations(self.table.check_privacy_capability(resource));

        let capabilities = validate_capability_set(&resource.capabilities, &self.registry);
        report.extend_violations(capabilities.violations);
        report.extend_warnings(capabilities.warnings);

        if resource.active_master_enable {
            if let Some(text) = &resource.sdp {
                self.check_sdp(resource, text, &mut report);
            }
        }

        debug!(
            "{} {}: {} violations, {} warnings",
            role,
            resource.id,
            report.violations().len(),
            report.warnings().len()
        );
        report
    }

    fn check_sdp(&self, resource: &Resource, text: &str, report: &mut ValidationReport) {
        let Some(leg) = resource.transport_state.legs.first() else {
            return;
        };
        debug!("{} {}: sdp", resource.role, resource.id);

        let sdp = SdpDocument::parse(text);
        let privacy = resource
            .privacy
            .unwrap_or_else(|| has_privacy(leg) && !self.table.null_mode(&leg.constraints));

        if let Err(v) = check_privacy_presence(&sdp, privacy) {
            report.push_violation(v);
            return;
        }
        if !privacy {
            return;
        }

        let checked = extract_attribute(&sdp, &self.privacy_attribute).and_then(|extracted| {
            cross_check(
                &self.privacy_attribute,
                &extracted,
                &leg.active,
                &leg.constraints,
                resource.leg_count(),
                resource.role,
            )
        });
        if let Err(v) = checked {
            report.push_violation(v);
        }

        let protocol = leg.active.get(PRIVACY_PROTOCOL).and_then(|v| v.as_str());
        if let Err(v) = check_header_extensions(&sdp, protocol) {
            report.push_violation(v);
        }
    }

    /// Validate every resource, then warn about IVs shared between Senders
    pub fn validate_all(&self, resources: &[Resource]) -> Vec<ValidationReport> {
        let mut reports: Vec<ValidationReport> =
            resources.iter().map(|r| self.validate_resource(r)).collect();

        for (iv, ids) in shared_ivs(resources) {
            let warning = duplicate_iv_warning(&iv, &ids);
            for report in reports.iter_mut().filter(|r| ids.contains(&r.resource_id)) {
                report.push_warning(warning.clone());
            }
        }

        info!(
            "Validated {} resources, {} failed",
            reports.len(),
            reports.iter().filter(|r| !r.is_ok()).count()
        );
        reports
    }
}
