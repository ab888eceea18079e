//! Activation mutation harness against an in-memory device

#[path = "../fixtures/mock_device.rs"]
mod mock_device;

use std::sync::Arc;

use mock_device::{pep_receiver, pep_sender, Behaviour, MockDevice, SENDER_KEY};
use nmos_conformance::activation::{ActivationHarness, LegTarget, MutationViolationKind};
use nmos_conformance::resource::StateKind;
use nmos_conformance::transport::snapshot_all;
use nmos_conformance::{Resource, Role, ValidatorConfig};
use serde_json::json;

const SENDER_PUBLIC_KEY: &str = "ext_privacy_ecdh_sender_public_key";

async fn sender_on(device: &Arc<MockDevice>, master_enable: bool, ecdh: bool) -> Resource {
    device.add_resource(Role::Sender, pep_sender("s1", master_enable, ecdh));
    snapshot_all(device.as_ref(), device.as_ref(), Role::Sender)
        .await
        .unwrap()
        .resources
        .remove(0)
}

#[tokio::test]
async fn test_attempt_write_round_trip() {
    // GIVEN: An inactive PEP Sender
    let device = Arc::new(MockDevice::new());
    let sender = sender_on(&device, false, false).await;
    let harness = ActivationHarness::new(device.clone(), ValidatorConfig::default());

    // WHEN: A valid mode is written
    let outcome = harness
        .attempt_write(&sender, LegTarget::All, "ext_privacy_mode", json!("AES-256-CTR"), false)
        .await
        .unwrap();

    // THEN: It is accepted, activated immediately and observed
    assert!(outcome.accepted);
    assert_eq!(outcome.status, 200);
    assert_eq!(
        outcome.observed.value(StateKind::Active, 0, "ext_privacy_mode"),
        Some(&json!("AES-256-CTR"))
    );

    let patches = device.patches();
    assert_eq!(patches.len(), 1);
    assert_eq!(patches[0]["activation"]["mode"], json!("activate_immediate"));
    assert_eq!(patches[0]["master_enable"], json!(false));
}

#[tokio::test]
async fn test_out_of_enum_write_rejected() {
    let device = Arc::new(MockDevice::new());
    let sender = sender_on(&device, false, false).await;
    let harness = ActivationHarness::new(device.clone(), ValidatorConfig::default());

    let outcome = harness
        .attempt_write(&sender, LegTarget::Leg(0), "ext_privacy_protocol", json!("USB"), false)
        .await
        .unwrap();
    assert!(!outcome.accepted);
    assert_eq!(outcome.status, 400);
    assert_eq!(
        outcome.observed.value(StateKind::Staged, 0, "ext_privacy_protocol"),
        Some(&json!("RTP"))
    );
}

#[tokio::test]
async fn test_conformant_inactive_sender() {
    // GIVEN: An inactive ECDH Sender on a well-behaved device
    let device = Arc::new(MockDevice::new());
    let sender = sender_on(&device, false, true).await;
    let harness = ActivationHarness::new(device.clone(), ValidatorConfig::default());

    // WHEN: The whole privacy mutation suite runs
    let violations = harness.run_privacy_mutation_checks(&sender).await.unwrap();

    // THEN: Nothing is reported and the key was rotated
    assert!(violations.is_empty(), "{:?}", violations);
    let active = device.active("s1");
    assert_ne!(active["transport_params"][0][SENDER_PUBLIC_KEY], json!(SENDER_KEY));
    assert!(device.patches().len() > 10);
}

#[tokio::test]
async fn test_conformant_active_sender_only_reactivates() {
    let device = Arc::new(MockDevice::new());
    let sender = sender_on(&device, true, true).await;
    let harness = ActivationHarness::new(device.clone(), ValidatorConfig::default());

    let violations = harness.run_privacy_mutation_checks(&sender).await.unwrap();
    assert!(violations.is_empty(), "{:?}", violations);

    // One re-activation per privacy parameter, all with master_enable set
    let patches = device.patches();
    assert_eq!(patches.len(), 9);
    assert!(patches.iter().all(|p| p["master_enable"] == json!(true)));
    assert_eq!(device.active("s1")["transport_params"][0][SENDER_PUBLIC_KEY], json!(SENDER_KEY));
}

#[tokio::test]
async fn test_stuck_key_detected() {
    // GIVEN: A device that never regenerates its ECDH key
    let device = Arc::new(MockDevice::with_behaviour(Behaviour {
        stuck_keys: true,
        ..Behaviour::default()
    }));
    let sender = sender_on(&device, false, true).await;
    let harness = ActivationHarness::new(device.clone(), ValidatorConfig::default());

    // WHEN
    let violations = harness.check_freshness(&sender, SENDER_PUBLIC_KEY).await.unwrap();

    // THEN: Both staged and active still hold the previous key
    let states: Vec<_> = violations
        .iter()
        .map(|v| match v.kind {
            MutationViolationKind::NotRegenerated { state } => state,
            other => panic!("unexpected {:?}", other),
        })
        .collect();
    assert_eq!(states, vec![StateKind::Staged, StateKind::Active]);
}

#[tokio::test]
async fn test_permissive_device_accepts_invalid_values() {
    // GIVEN: A device accepting anything
    let device = Arc::new(MockDevice::with_behaviour(Behaviour {
        accept_everything: true,
        ..Behaviour::default()
    }));
    let sender = sender_on(&device, false, false).await;
    let harness = ActivationHarness::new(device.clone(), ValidatorConfig::default());

    // WHEN
    let violations = harness.run_privacy_mutation_checks(&sender).await.unwrap();

    // THEN: Six invalid markers plus NULL protocol and NULL mode got through
    let accepted: Vec<&str> = violations
        .iter()
        .filter(|v| v.kind == MutationViolationKind::UnexpectedlyAccepted)
        .map(|v| v.parameter.as_str())
        .collect();
    assert_eq!(accepted.len(), 8);
    assert_eq!(accepted.iter().filter(|p| **p == "ext_privacy_protocol").count(), 2);
    assert_eq!(accepted.iter().filter(|p| **p == "ext_privacy_mode").count(), 2);
}

#[tokio::test]
async fn test_receiver_key_is_the_ephemeral_one() {
    let device = Arc::new(MockDevice::new());
    device.add_resource(Role::Receiver, pep_receiver("r1", false, true));
    let receiver = snapshot_all(device.as_ref(), device.as_ref(), Role::Receiver)
        .await
        .unwrap()
        .resources
        .remove(0);
    let harness = ActivationHarness::new(device.clone(), ValidatorConfig::default());

    let violations = harness.run_privacy_mutation_checks(&receiver).await.unwrap();
    assert!(violations.is_empty(), "{:?}", violations);

    // The freshness write carries the receiver key, the final restore does not
    let mut patches = device.patches();
    let restore = patches.pop().unwrap();
    let freshness = patches.pop().unwrap();
    assert!(freshness["transport_params"][0]
        .get("ext_privacy_ecdh_receiver_public_key")
        .is_some());
    assert!(restore["transport_params"][0]
        .get("ext_privacy_ecdh_receiver_public_key")
        .is_none());
    assert_eq!(restore["transport_params"][0][SENDER_PUBLIC_KEY], json!(SENDER_KEY));
}

#[tokio::test]
async fn test_staged_restored_after_mutation_checks() {
    // GIVEN: An inactive Sender whose staged mode and protocol get rewritten
    let device = Arc::new(MockDevice::new());
    let sender = sender_on(&device, false, false).await;
    let harness = ActivationHarness::new(device.clone(), ValidatorConfig::default());

    // WHEN
    let violations = harness.run_privacy_mutation_checks(&sender).await.unwrap();

    // THEN: The snapshot values are back and no lock is left behind
    assert!(violations.is_empty(), "{:?}", violations);
    let active = device.active("s1");
    assert_eq!(active["transport_params"][0]["ext_privacy_protocol"], json!("RTP"));
    assert_eq!(active["transport_params"][0]["ext_privacy_mode"], json!("AES-128-CTR"));
    assert_eq!(active["master_enable"], json!(false));
    assert_eq!(harness.locked_resources(), 0);
}

#[tokio::test]
async fn test_concurrent_writes_are_serialized() {
    let device = Arc::new(MockDevice::new());
    let sender = sender_on(&device, false, false).await;
    let harness = Arc::new(ActivationHarness::new(device.clone(), ValidatorConfig::default()));

    let mut handles = Vec::new();
    for mode in ["AES-128-CTR", "AES-256-CTR", "AES-128-CTR", "AES-256-CTR"] {
        let harness = harness.clone();
        let sender = sender.clone();
        handles.push(tokio::spawn(async move {
            let outcome = harness
                .attempt_write(&sender, LegTarget::All, "ext_privacy_mode", json!(mode), false)
                .await
                .unwrap();
            // The read-back belongs to this write, not to an interleaved one
            assert_eq!(
                outcome.observed.value(StateKind::Staged, 0, "ext_privacy_mode"),
                Some(&json!(mode))
            );
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }
    assert_eq!(device.patches().len(), 4);
    assert_eq!(harness.locked_resources(), 0);
}
