//! Activation mutation harness
//!
//! Drives bounded write-then-read cycles against the staged endpoint of one
//! resource and checks the observed side effects. Each write is a single
//! `activate_immediate` PATCH followed by a read-back of staged and active;
//! the pair runs under a per-resource lock so concurrent checks on the same
//! resource cannot interleave.
//!
//! Transport failures are returned as [`Error`]; wrong device behaviour is a
//! [`MutationViolation`].

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::ValidatorConfig;
use crate::error::{Error, Result};
use crate::resource::{EndpointDocument, Resource, StateKind};
use crate::rules::{RuleTable, PRIVACY_MODE, PRIVACY_PREFIX, PRIVACY_PROTOCOL};
use crate::transport::TransportParamsEndpoint;

/// Which legs a write addresses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LegTarget {
    /// The same value on every leg
    All,
    /// One leg; the others get an empty object
    Leg(usize),
}

/// Body of a staged PATCH
#[derive(Debug, Clone, PartialEq)]
pub struct StagedPatch {
    master_enable: bool,
    transport_params: Vec<Map<String, Value>>,
}

impl StagedPatch {
    /// Empty patch for a resource with `leg_count` legs
    pub fn new(leg_count: usize, master_enable: bool) -> Self {
        Self {
            master_enable,
            transport_params: vec![Map::new(); leg_count],
        }
    }

    /// Set a parameter on the targeted legs
    pub fn set(mut self, target: LegTarget, parameter: &str, value: Value) -> Self {
        match target {
            LegTarget::All => {
                for params in &mut self.transport_params {
                    params.insert(parameter.to_string(), value.clone());
                }
            }
            LegTarget::Leg(i) => {
                if let Some(params) = self.transport_params.get_mut(i) {
                    params.insert(parameter.to_string(), value);
                }
            }
        }
        self
    }

    /// JSON body with an immediate activation
    pub fn to_value(&self) -> Value {
        json!({
            "master_enable": self.master_enable,
            "activation": {"mode": "activate_immediate"},
            "transport_params": self.transport_params,
        })
    }
}

/// Staged and active documents read back after a write
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObservedState {
    /// Staged document
    pub staged: EndpointDocument,
    /// Active document
    pub active: EndpointDocument,
}

impl ObservedState {
    /// Value of a parameter on one leg of staged or active
    pub fn value(&self, state: StateKind, leg: usize, parameter: &str) -> Option<&Value> {
        match state {
            StateKind::Staged => self.staged.param(leg, parameter),
            StateKind::Active => self.active.param(leg, parameter),
            StateKind::Constraints => None,
        }
    }

    fn leg_count(&self) -> usize {
        self.staged.transport_params.len().min(self.active.transport_params.len())
    }
}

/// Result of one write-then-read cycle
#[derive(Debug, Clone, PartialEq)]
pub struct WriteOutcome {
    /// HTTP 200
    pub accepted: bool,
    /// Status returned by the PATCH
    pub status: u16,
    /// State after the write
    pub observed: ObservedState,
}

/// What the device did wrong
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum MutationViolationKind {
    /// A valid write was refused
    Rejected {
        /// Status returned
        status: u16,
    },
    /// An invalid write was accepted
    UnexpectedlyAccepted,
    /// Ephemeral key material survived a deactivation
    NotRegenerated {
        /// Where the old value was still observed
        state: StateKind,
    },
    /// A re-activation changed the value it wrote
    ValueChanged {
        /// Where the other value was observed
        state: StateKind,
    },
}

/// A wrong side effect of a write
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MutationViolation {
    /// Parameter written
    pub parameter: String,
    /// Value written
    pub value: Value,
    /// Leg the wrong state was observed on, if leg-specific
    pub leg: Option<usize>,
    /// Violation kind
    pub kind: MutationViolationKind,
}

impl MutationViolation {
    fn new(parameter: &str, value: &Value, leg: Option<usize>, kind: MutationViolationKind) -> Self {
        Self {
            parameter: parameter.to_string(),
            value: value.clone(),
            leg,
            kind,
        }
    }
}

impl fmt::Display for MutationViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(leg) = self.leg {
            write!(f, "leg {}: ", leg)?;
        }
        match self.kind {
            MutationViolationKind::Rejected { status } => write!(
                f,
                "writing {} = {} was rejected with status {}",
                self.parameter, self.value, status
            ),
            MutationViolationKind::UnexpectedlyAccepted => write!(
                f,
                "writing {} = {} was accepted but should be refused",
                self.parameter, self.value
            ),
            MutationViolationKind::NotRegenerated { state } => write!(
                f,
                "{} {} not regenerated on deactivation",
                state, self.parameter
            ),
            MutationViolationKind::ValueChanged { state } => write!(
                f,
                "{} {} differs from the written value {}",
                state, self.parameter, self.value
            ),
        }
    }
}

/// Write-then-read checks against one device
pub struct ActivationHarness<E: TransportParamsEndpoint + ?Sized> {
    endpoint: Arc<E>,
    config: ValidatorConfig,
    table: RuleTable,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl<E: TransportParamsEndpoint + ?Sized> ActivationHarness<E> {
    /// Create a harness with the built-in rule table
    pub fn new(endpoint: Arc<E>, config: ValidatorConfig) -> Self {
        let table = RuleTable::default().with_sentinel(config.disabled_sentinel.clone());
        Self {
            endpoint,
            config,
            table,
            locks: DashMap::new(),
        }
    }

    /// Use a custom rule table
    pub fn with_rule_table(mut self, table: RuleTable) -> Self {
        self.table = table;
        self
    }

    fn lock_for(&self, id: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Drop the lock of a resource once no write holds or waits on it
    fn release(&self, id: &str) {
        self.locks.remove_if(id, |_, lock| Arc::strong_count(lock) == 1);
    }

    /// Number of resources with a write in flight
    pub fn locked_resources(&self) -> usize {
        self.locks.len()
    }

    /// PATCH `body` and read back, serialized per resource
    async fn write(&self, resource: &Resource, body: &Value) -> Result<(u16, bool, ObservedState)> {
        let lock = self.lock_for(&resource.id);
        let result = {
            let _guard = lock.lock().await;
            match self.endpoint.patch_staged(resource.role, &resource.id, body).await {
                Ok(response) => self
                    .read_back(resource)
                    .await
                    .map(|observed| (response.status, response.is_accepted(), observed)),
                Err(e) => Err(e),
            }
        };
        drop(lock);
        self.release(&resource.id);
        result
    }

    async fn read_back(&self, resource: &Resource) -> Result<ObservedState> {
        let staged = self.endpoint.get_staged(resource.role, &resource.id).await?;
        let active = self.endpoint.get_active(resource.role, &resource.id).await?;
        Ok(ObservedState {
            staged: serde_json::from_value(staged)?,
            active: serde_json::from_value(active)?,
        })
    }

    /// PATCH one parameter with an immediate activation and read back the state
    pub async fn attempt_write(
        &self,
        resource: &Resource,
        leg: LegTarget,
        parameter: &str,
        value: Value,
        master_enable: bool,
    ) -> Result<WriteOutcome> {
        let leg_count = resource.leg_count();
        if let LegTarget::Leg(i) = leg {
            if i >= leg_count {
                return Err(Error::invalid_resource(
                    &resource.id,
                    format!("leg {} out of range, resource has {} legs", i, leg_count),
                ));
            }
        }

        let body = StagedPatch::new(leg_count, master_enable)
            .set(leg, parameter, value)
            .to_value();

        let (status, accepted, observed) = self.write(resource, &body).await?;
        debug!("{} {}: PATCH {} -> {}", resource.role, resource.id, parameter, status);

        Ok(WriteOutcome {
            accepted,
            status,
            observed,
        })
    }

    /// Write the privacy values of the snapshot back to staged
    ///
    /// The role's ephemeral key is left out since the device owns it. A
    /// refused restore is logged and reported as a rejection.
    pub async fn restore_staged(&self, resource: &Resource) -> Result<Vec<MutationViolation>> {
        let ephemeral = self.table.ephemeral_key(resource.role);
        let mut patch = StagedPatch::new(resource.leg_count(), resource.staged_master_enable);
        for (index, leg) in resource.transport_state.legs.iter().enumerate() {
            for (parameter, value) in &leg.staged {
                if parameter.starts_with(PRIVACY_PREFIX) && ephemeral != Some(parameter.as_str()) {
                    patch = patch.set(LegTarget::Leg(index), parameter, value.clone());
                }
            }
        }

        let (status, accepted, _) = self.write(resource, &patch.to_value()).await?;
        debug!("{} {}: restore staged -> {}", resource.role, resource.id, status);

        let violations = if accepted {
            Vec::new()
        } else {
            vec![MutationViolation::new(
                PRIVACY_PREFIX,
                &patch.to_value()["transport_params"],
                None,
                MutationViolationKind::Rejected { status },
            )]
        };
        self.record(resource, &violations);
        Ok(violations)
    }

    fn record(&self, resource: &Resource, violations: &[MutationViolation]) {
        for v in violations {
            warn!("{} {}: {}", resource.role, resource.id, v);
        }
    }

    /// Deactivate with the current ephemeral key and expect a new one everywhere
    ///
    /// Skipped (no findings) while the resource is active.
    pub async fn check_freshness(&self, resource: &Resource, parameter: &str) -> Result<Vec<MutationViolation>> {
        if resource.active_master_enable {
            debug!("{} {}: freshness of {} needs an inactive resource", resource.role, resource.id, parameter);
            return Ok(Vec::new());
        }

        let current = self.read_back(resource).await?;
        let Some(previous) = current.value(StateKind::Active, 0, parameter).cloned() else {
            return Ok(Vec::new());
        };

        let outcome = self
            .attempt_write(resource, LegTarget::All, parameter, previous.clone(), false)
            .await?;

        let mut violations = Vec::new();
        if !outcome.accepted {
            violations.push(MutationViolation::new(
                parameter,
                &previous,
                None,
                MutationViolationKind::Rejected { status: outcome.status },
            ));
        } else {
            for leg in 0..outcome.observed.leg_count() {
                for state in [StateKind::Staged, StateKind::Active] {
                    if outcome.observed.value(state, leg, parameter) == Some(&previous) {
                        violations.push(MutationViolation::new(
                            parameter,
                            &previous,
                            Some(leg),
                            MutationViolationKind::NotRegenerated { state },
                        ));
                    }
                }
            }
        }
        self.record(resource, &violations);
        Ok(violations)
    }

    /// Re-activate with `value` and expect it to be kept in staged and active
    pub async fn check_idempotence(
        &self,
        resource: &Resource,
        parameter: &str,
        value: &Value,
    ) -> Result<Vec<MutationViolation>> {
        let outcome = self
            .attempt_write(resource, LegTarget::All, parameter, value.clone(), true)
            .await?;

        let mut violations = Vec::new();
        if !outcome.accepted {
            violations.push(MutationViolation::new(
                parameter,
                value,
                None,
                MutationViolationKind::Rejected { status: outcome.status },
            ));
        } else {
            for leg in 0..outcome.observed.leg_count() {
                for state in [StateKind::Staged, StateKind::Active] {
                    if outcome.observed.value(state, leg, parameter) != Some(value) {
                        violations.push(MutationViolation::new(
                            parameter,
                            value,
                            Some(leg),
                            MutationViolationKind::ValueChanged { state },
                        ));
                    }
                }
            }
        }
        self.record(resource, &violations);
        Ok(violations)
    }

    /// Write `value` while inactive and expect a rejection
    pub async fn check_rejection(
        &self,
        resource: &Resource,
        parameter: &str,
        value: &Value,
    ) -> Result<Vec<MutationViolation>> {
        let outcome = self
            .attempt_write(resource, LegTarget::All, parameter, value.clone(), false)
            .await?;

        let violations = if outcome.accepted {
            vec![MutationViolation::new(
                parameter,
                value,
                None,
                MutationViolationKind::UnexpectedlyAccepted,
            )]
        } else {
            Vec::new()
        };
        self.record(resource, &violations);
        Ok(violations)
    }

    /// Write `value` while inactive and expect it to be accepted
    pub async fn check_accepts(
        &self,
        resource: &Resource,
        parameter: &str,
        value: &Value,
    ) -> Result<Vec<MutationViolation>> {
        let outcome = self
            .attempt_write(resource, LegTarget::All, parameter, value.clone(), false)
            .await?;

        let violations = if outcome.accepted {
            Vec::new()
        } else {
            vec![MutationViolation::new(
                parameter,
                value,
                None,
                MutationViolationKind::Rejected { status: outcome.status },
            )]
        };
        self.record(resource, &violations);
        Ok(violations)
    }

    /// Exercise every privacy parameter of a resource
    ///
    /// An active resource is only re-activated with its current values. An
    /// inactive one is also written with invalid values, every declared
    /// enumeration value, the sentinel (when privacy is on) and a freshness
    /// check of its ephemeral key, after which its staged privacy values are
    /// restored.
    pub async fn run_privacy_mutation_checks(&self, resource: &Resource) -> Result<Vec<MutationViolation>> {
        let Some(leg0) = resource.transport_state.legs.first() else {
            return Ok(Vec::new());
        };

        let parameters: BTreeSet<&String> = leg0
            .constraints
            .keys()
            .filter(|k| k.starts_with(PRIVACY_PREFIX))
            .collect();
        if parameters.is_empty() {
            debug!("{} {}: no privacy parameters", resource.role, resource.id);
            return Ok(Vec::new());
        }

        info!(
            "{} {}: privacy mutation checks ({})",
            resource.role,
            resource.id,
            if resource.active_master_enable { "active" } else { "inactive" }
        );

        let mut violations = Vec::new();

        if resource.active_master_enable {
            for parameter in &parameters {
                if let Some(value) = leg0.active.get(parameter.as_str()) {
                    violations.extend(self.check_idempotence(resource, parameter, value).await?);
                }
            }
            return Ok(violations);
        }

        let ephemeral = self.table.ephemeral_key(resource.role);
        let is_ephemeral = |p: &str| ephemeral == Some(p);

        for parameter in &parameters {
            if is_ephemeral(parameter.as_str()) {
                continue;
            }
            if let Some(value) = leg0.active.get(parameter.as_str()) {
                violations.extend(self.check_accepts(resource, parameter, value).await?);
            }
        }

        let invalid = Value::String(self.config.invalid_value_marker.clone());
        for parameter in &parameters {
            if leg0.constraints[parameter.as_str()].enumeration().is_some() {
                violations.extend(self.check_rejection(resource, parameter, &invalid).await?);
            }
        }

        for parameter in &parameters {
            if is_ephemeral(parameter.as_str()) {
                continue;
            }
            if let Some(members) = leg0.constraints[parameter.as_str()].enumeration() {
                for member in members {
                    violations.extend(self.check_accepts(resource, parameter, member).await?);
                }
            }
        }

        if !self.table.null_mode(&leg0.constraints) {
            let sentinel = Value::String(self.table.sentinel.clone());
            for parameter in [PRIVACY_PROTOCOL, PRIVACY_MODE] {
                if leg0.constraints.contains_key(parameter) {
                    violations.extend(self.check_rejection(resource, parameter, &sentinel).await?);
                }
            }
        }

        if self.table.ecdh_supported(&leg0.constraints) {
            if let Some(key) = ephemeral {
                violations.extend(self.check_freshness(resource, key).await?);
            }
        }

        violations.extend(self.restore_staged(resource).await?);
        Ok(violations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::Role;
    use crate::transport::PatchResponse;
    use async_trait::async_trait;
    use std::sync::Mutex as StdMutex;

    /// Device that accepts everything and never regenerates keys
    struct StuckDevice {
        staged: StdMutex<Value>,
        patches: StdMutex<Vec<Value>>,
    }

    impl StuckDevice {
        fn new(params: Value) -> Self {
            Self {
                staged: StdMutex::new(json!({"master_enable": false, "transport_params": [params]})),
                patches: StdMutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl TransportParamsEndpoint for StuckDevice {
        async fn get_constraints(&self, _role: Role, _id: &str) -> Result<Value> {
            Ok(json!([{}]))
        }

        async fn get_staged(&self, _role: Role, _id: &str) -> Result<Value> {
            Ok(self.staged.lock().unwrap().clone())
        }

        async fn get_active(&self, _role: Role, _id: &str) -> Result<Value> {
            Ok(self.staged.lock().unwrap().clone())
        }

        async fn patch_staged(&self, _role: Role, _id: &str, body: &Value) -> Result<PatchResponse> {
            self.patches.lock().unwrap().push(body.clone());
            Ok(PatchResponse {
                status: 200,
                body: Value::Null,
            })
        }
    }

    fn resource(legs: usize, active: bool) -> Resource {
        let constraints: Vec<Value> = (0..legs).map(|_| json!({})).collect();
        let params: Vec<Value> = (0..legs).map(|_| json!({})).collect();
        Resource::from_documents(
            Role::Sender,
            json!({"id": "s1", "transport": "urn:x-nmos:transport:rtp"}),
            &Value::Array(constraints),
            &json!({"master_enable": false, "transport_params": params}),
            &json!({"master_enable": active, "transport_params": params}),
        )
        .unwrap()
    }

    #[test]
    fn test_patch_body() {
        let body = StagedPatch::new(2, false)
            .set(LegTarget::Leg(1), "ext_privacy_iv", json!("00"))
            .to_value();
        assert_eq!(
            body,
            json!({
                "master_enable": false,
                "activation": {"mode": "activate_immediate"},
                "transport_params": [{}, {"ext_privacy_iv": "00"}]
            })
        );

        let body = StagedPatch::new(2, true)
            .set(LegTarget::All, "ext_privacy_mode", json!("AES-128-CTR"))
            .to_value();
        assert_eq!(body["transport_params"][0], body["transport_params"][1]);
    }

    #[test]
    fn test_leg_out_of_range() {
        let device = Arc::new(StuckDevice::new(json!({})));
        let harness = ActivationHarness::new(device, ValidatorConfig::default());
        let result = tokio_test::block_on(harness.attempt_write(
            &resource(1, false),
            LegTarget::Leg(1),
            "ext_privacy_iv",
            json!("00"),
            false,
        ));
        assert!(matches!(result, Err(Error::InvalidResource { .. })));
    }

    #[test]
    fn test_stuck_key_not_regenerated() {
        let key = "ext_privacy_ecdh_sender_public_key";
        let device = Arc::new(StuckDevice::new(json!({"ext_privacy_ecdh_sender_public_key": "abcd"})));
        let harness = ActivationHarness::new(device.clone(), ValidatorConfig::default());

        let violations = tokio_test::block_on(harness.check_freshness(&resource(1, false), key)).unwrap();
        assert_eq!(violations.len(), 2);
        assert!(violations.iter().any(|v| v.kind
            == MutationViolationKind::NotRegenerated {
                state: StateKind::Staged
            }));
        assert!(violations[0].to_string().contains("not regenerated"));

        let patches = device.patches.lock().unwrap();
        assert_eq!(patches.len(), 1);
        assert_eq!(patches[0]["master_enable"], json!(false));
        assert_eq!(patches[0]["transport_params"][0][key], json!("abcd"));
    }

    #[test]
    fn test_freshness_skipped_when_active() {
        let device = Arc::new(StuckDevice::new(json!({})));
        let harness = ActivationHarness::new(device.clone(), ValidatorConfig::default());
        let violations = tokio_test::block_on(
            harness.check_freshness(&resource(1, true), "ext_privacy_ecdh_sender_public_key"),
        )
        .unwrap();
        assert!(violations.is_empty());
        assert!(device.patches.lock().unwrap().is_empty());
    }

    #[test]
    fn test_accepting_everything_fails_rejection() {
        let device = Arc::new(StuckDevice::new(json!({})));
        let harness = ActivationHarness::new(device, ValidatorConfig::default());
        let violations = tokio_test::block_on(harness.check_rejection(
            &resource(1, false),
            "ext_privacy_protocol",
            &json!("this-is-an-invalid-value"),
        ))
        .unwrap();
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].kind, MutationViolationKind::UnexpectedlyAccepted);
    }

    #[test]
    fn test_violation_serde() {
        let v = MutationViolation::new(
            "ext_privacy_iv",
            &json!("00"),
            None,
            MutationViolationKind::Rejected { status: 400 },
        );
        let encoded = serde_json::to_value(&v).unwrap();
        assert_eq!(encoded["kind"], json!({"type": "rejected", "status": 400}));
    }
}
