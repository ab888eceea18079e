//! End-to-end validation of snapshots taken from an in-memory device

#[path = "../fixtures/mock_device.rs"]
mod mock_device;

use mock_device::{pep_receiver, pep_sdp, pep_sender, MockDevice, ResourceFixture, IV};
use nmos_conformance::consistency::ConsistencyViolationKind;
use nmos_conformance::resource::StateKind;
use nmos_conformance::transport::{snapshot_all, TransportParamsEndpoint};
use nmos_conformance::validation::{Violation, WarningKind};
use nmos_conformance::{ConformanceValidator, ConsistencyChecker, Role, ValidatorConfig};
use serde_json::json;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new("debug"))
        .with_test_writer()
        .try_init();
}

#[tokio::test]
async fn test_conformant_device_passes() {
    init_tracing();

    // GIVEN: A device with an active PEP Sender (with SDP) and an inactive PEP Receiver
    let device = MockDevice::new();
    device.add_resource(Role::Sender, pep_sender("s1", true, true));
    device.add_resource(Role::Receiver, pep_receiver("r1", false, true));
    device.add_text("/sdp/s1.sdp", &pep_sdp());

    // WHEN: Both collections are snapshotted and validated
    let senders = snapshot_all(&device, &device, Role::Sender).await.unwrap().resources;
    let receivers = snapshot_all(&device, &device, Role::Receiver).await.unwrap().resources;
    let validator = ConformanceValidator::new(ValidatorConfig::default());

    // THEN: The SDP was attached and nothing is reported
    assert_eq!(senders.len(), 1);
    assert!(senders[0].sdp.is_some());
    for report in validator.validate_all(&senders).iter().chain(validator.validate_all(&receivers).iter()) {
        assert!(report.is_ok(), "{}: {:?}", report.resource_id, report.violations());
    }
}

#[tokio::test]
async fn test_missing_manifest_leaves_sdp_unset() {
    let device = MockDevice::new();
    device.add_resource(Role::Sender, pep_sender("s1", true, false));

    let senders = snapshot_all(&device, &device, Role::Sender).await.unwrap().resources;
    assert!(senders[0].sdp.is_none());
}

#[tokio::test]
async fn test_two_leg_protocol_mismatch() {
    // GIVEN: Two legs that allow A or B, staged A/A, active A/B
    let device = MockDevice::new();
    device.add_resource(
        Role::Sender,
        ResourceFixture {
            document: json!({"id": "s2", "transport": "urn:x-nmos:transport:rtp"}),
            constraints: json!([
                {"ext_privacy_protocol": {"enum": ["A", "B"]}},
                {"ext_privacy_protocol": {"enum": ["A", "B"]}}
            ]),
            staged: json!({"master_enable": true, "transport_params": [
                {"ext_privacy_protocol": "A"}, {"ext_privacy_protocol": "A"}
            ]}),
            active: json!({"master_enable": true, "transport_params": [
                {"ext_privacy_protocol": "A"}, {"ext_privacy_protocol": "B"}
            ]}),
        },
    );

    // WHEN: The legs are cross-checked
    let senders = snapshot_all(&device, &device, Role::Sender).await.unwrap().resources;
    let checker = ConsistencyChecker::new(&ValidatorConfig::default(), Role::Sender);
    let result = checker.check(&senders[0].transport_state.legs);

    // THEN: Exactly one value mismatch on leg 1's active state
    let violations = result.violations();
    assert_eq!(violations.len(), 1);
    assert_eq!(violations[0].leg, 1);
    assert_eq!(violations[0].parameter, "ext_privacy_protocol");
    assert_eq!(
        violations[0].kind,
        ConsistencyViolationKind::LegValueMismatch {
            state: StateKind::Active
        }
    );
}

#[tokio::test]
async fn test_sdp_disagreeing_with_active_state() {
    // GIVEN: The Sender's SDP advertises a different IV than the active one
    let device = MockDevice::new();
    device.add_resource(Role::Sender, pep_sender("s1", true, false));
    device.add_text("/sdp/s1.sdp", &pep_sdp().replace(&format!("iv={}", IV), "iv=fedcba9876543210"));

    // WHEN
    let senders = snapshot_all(&device, &device, Role::Sender).await.unwrap().resources;
    let report = ConformanceValidator::new(ValidatorConfig::default()).validate_resource(&senders[0]);

    // THEN: A single SDP finding
    assert_eq!(report.violations().len(), 1);
    assert!(matches!(report.violations()[0], Violation::Sdp(_)));
}

#[tokio::test]
async fn test_privacy_capability_contradicting_parameters() {
    // GIVEN: A Sender claiming no privacy while its mode is not NULL
    let mut fixture = pep_sender("s1", false, false);
    fixture.document["privacy"] = json!(false);
    fixture.document["caps"]["constraint_sets"][0]["urn:x-nmos:cap:transport:privacy"] = json!({"enum": [false]});
    let device = MockDevice::new();
    device.add_resource(Role::Sender, fixture);

    // WHEN
    let senders = snapshot_all(&device, &device, Role::Sender).await.unwrap().resources;
    let report = ConformanceValidator::new(ValidatorConfig::default()).validate_resource(&senders[0]);

    // THEN: Both the capability and the attribute are flagged
    let rules: Vec<_> = report
        .violations()
        .iter()
        .filter_map(|v| match v {
            Violation::Rule(r) => Some(r.parameter.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(rules, vec!["urn:x-nmos:cap:transport:privacy", "privacy"]);
}

#[tokio::test]
async fn test_shared_iv_across_senders() {
    let device = MockDevice::new();
    device.add_resource(Role::Sender, pep_sender("s1", false, false));
    device.add_resource(Role::Sender, pep_sender("s2", false, false));

    let senders = snapshot_all(&device, &device, Role::Sender).await.unwrap().resources;
    let reports = ConformanceValidator::new(ValidatorConfig::default()).validate_all(&senders);

    for report in &reports {
        assert!(report.is_ok());
        assert!(report.warnings().iter().any(|w| w.kind == WarningKind::DuplicateIv));
    }
}

#[tokio::test]
async fn test_unknown_resource_is_an_error() {
    let device = MockDevice::new();
    let err = device.get_staged(Role::Sender, "missing").await.unwrap_err();
    assert!(matches!(err, nmos_conformance::Error::Http { status: 404, .. }));
}

#[tokio::test]
async fn test_malformed_resource_does_not_hide_others() {
    // GIVEN: A good Sender next to one declaring two constraint legs but one staged/active leg
    let device = MockDevice::new();
    device.add_resource(Role::Sender, pep_sender("good", false, false));
    let mut bad = pep_sender("bad", false, false);
    let leg = bad.constraints[0].clone();
    bad.constraints = json!([leg.clone(), leg]);
    device.add_resource(Role::Sender, bad);

    // WHEN
    let batch = snapshot_all(&device, &device, Role::Sender).await.unwrap();

    // THEN: The good Sender is still validated and the bad one is reported
    assert!(!batch.is_complete());
    assert_eq!(batch.resources.len(), 1);
    assert_eq!(batch.resources[0].id, "good");
    assert_eq!(batch.failures.len(), 1);
    assert_eq!(batch.failures[0].id, "bad");
    assert!(matches!(
        batch.failures[0].error,
        nmos_conformance::Error::LegCountMismatch { .. }
    ));

    let reports = ConformanceValidator::new(ValidatorConfig::default()).validate_all(&batch.resources);
    assert!(reports[0].is_ok(), "{:?}", reports[0].violations());
}

#[tokio::test]
async fn test_vendor_extension_prefix_is_exempt() {
    // GIVEN: Vendor keys declared only on the constraints endpoint
    let mut fixture = pep_sender("s1", false, false);
    fixture.constraints[0]["x_vendor_mode"] = json!({});
    fixture.constraints[0]["acme_gain"] = json!({});
    let device = MockDevice::new();
    device.add_resource(Role::Sender, fixture);
    let senders = snapshot_all(&device, &device, Role::Sender).await.unwrap().resources;

    // WHEN: Validated with the default prefix and with the vendor's own prefix
    let default_report = ConformanceValidator::new(ValidatorConfig::default()).validate_resource(&senders[0]);
    let acme_report = ConformanceValidator::new(ValidatorConfig::default().with_extension_prefix("acme_"))
        .validate_resource(&senders[0]);

    // THEN: Only the key outside the configured prefix is flagged
    let flagged = |report: &nmos_conformance::ValidationReport| -> Vec<String> {
        let mut parameters: Vec<String> = report
            .violations()
            .iter()
            .map(|v| match v {
                Violation::Consistency(c) => c.parameter.clone(),
                Violation::Rule(r) => r.parameter.clone(),
                other => panic!("unexpected {:?}", other),
            })
            .collect();
        parameters.dedup();
        parameters
    };
    assert_eq!(flagged(&default_report), vec!["acme_gain".to_string()]);
    assert_eq!(flagged(&acme_report), vec!["x_vendor_mode".to_string()]);
}
