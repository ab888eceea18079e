//! In-memory NMOS device for integration tests
//!
//! Serves IS-04 documents and the IS-05 constraints/staged/active endpoints
//! from memory. A PATCH of staged is validated against the enumerations of
//! the constraints, applied, and activated immediately. Deactivating a
//! resource regenerates its ECDH public key unless the device is built with
//! [`Behaviour::stuck_keys`].
//!
//! # Usage
//!
//! ```ignore
//! let device = Arc::new(MockDevice::new());
//! device.add_resource(Role::Sender, pep_sender("s1", false, true));
//!
//! let batch = snapshot_all(device.as_ref(), device.as_ref(), Role::Sender).await?;
//! ```

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use nmos_conformance::error::{Error, Result};
use nmos_conformance::resource::Role;
use nmos_conformance::transport::{PatchResponse, ResourceSource, TransportParamsEndpoint};
use serde_json::{json, Map, Value};

pub const IV: &str = "0123456789abcdef";
pub const KEY_GENERATOR: &str = "0123456789abcdef0123456789abcdef";
pub const KEY_VERSION: &str = "00000001";
pub const KEY_ID: &str = "0011223344556677";
pub const SENDER_KEY: &str = "04a1b2c3d4";
pub const RECEIVER_KEY: &str = "04e5f6a7b8";

/// How the device misbehaves
#[derive(Debug, Clone, Copy, Default)]
pub struct Behaviour {
    /// Accept values outside the constraint enumerations
    pub accept_everything: bool,
    /// Keep the ECDH public key across deactivations
    pub stuck_keys: bool,
}

/// Documents of one resource
#[derive(Debug, Clone)]
pub struct ResourceFixture {
    pub document: Value,
    pub constraints: Value,
    pub staged: Value,
    pub active: Value,
}

struct Entry {
    role: Role,
    fixture: ResourceFixture,
}

#[derive(Default)]
struct DeviceState {
    resources: HashMap<String, Entry>,
    order: Vec<String>,
    texts: HashMap<String, String>,
    patches: Vec<Value>,
    generation: u64,
}

/// In-memory device implementing both device traits
#[derive(Default)]
pub struct MockDevice {
    behaviour: Behaviour,
    state: Mutex<DeviceState>,
}

fn ephemeral_key(role: Role) -> &'static str {
    match role {
        Role::Sender => "ext_privacy_ecdh_sender_public_key",
        Role::Receiver => "ext_privacy_ecdh_receiver_public_key",
    }
}

fn not_found(what: &str) -> Error {
    Error::Http {
        status: 404,
        url: what.to_string(),
    }
}

impl MockDevice {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_behaviour(behaviour: Behaviour) -> Self {
        Self {
            behaviour,
            ..Self::default()
        }
    }

    pub fn add_resource(&self, role: Role, fixture: ResourceFixture) {
        let id = fixture.document["id"].as_str().unwrap_or_default().to_string();
        let mut state = self.state.lock().unwrap();
        state.order.push(id.clone());
        state.resources.insert(id, Entry { role, fixture });
    }

    pub fn add_text(&self, href: &str, text: &str) {
        let mut state = self.state.lock().unwrap();
        state.texts.insert(href.to_string(), text.to_string());
    }

    /// Every PATCH body received so far
    pub fn patches(&self) -> Vec<Value> {
        self.state.lock().unwrap().patches.clone()
    }

    /// Current active document of a resource
    pub fn active(&self, id: &str) -> Value {
        self.state.lock().unwrap().resources[id].fixture.active.clone()
    }

    fn read(&self, role: Role, id: &str, pick: fn(&ResourceFixture) -> &Value) -> Result<Value> {
        let state = self.state.lock().unwrap();
        match state.resources.get(id) {
            Some(entry) if entry.role == role => Ok(pick(&entry.fixture).clone()),
            _ => Err(not_found(id)),
        }
    }
}

/// Whether `value` is allowed by the enumeration of `constraint`, if any
fn allowed(constraint: Option<&Value>, value: &Value) -> bool {
    match constraint.and_then(|c| c.get("enum")).and_then(Value::as_array) {
        Some(members) => members.contains(value),
        None => true,
    }
}

fn merge_params(target: &mut Value, leg: usize, params: &Map<String, Value>) {
    if let Some(existing) = target["transport_params"]
        .get_mut(leg)
        .and_then(Value::as_object_mut)
    {
        for (key, value) in params {
            existing.insert(key.clone(), value.clone());
        }
    }
}

#[async_trait]
impl TransportParamsEndpoint for MockDevice {
    async fn get_constraints(&self, role: Role, id: &str) -> Result<Value> {
        self.read(role, id, |f| &f.constraints)
    }

    async fn get_staged(&self, role: Role, id: &str) -> Result<Value> {
        self.read(role, id, |f| &f.staged)
    }

    async fn get_active(&self, role: Role, id: &str) -> Result<Value> {
        self.read(role, id, |f| &f.active)
    }

    async fn patch_staged(&self, role: Role, id: &str, body: &Value) -> Result<PatchResponse> {
        let behaviour = self.behaviour;
        let mut state = self.state.lock().unwrap();
        state.patches.push(body.clone());
        state.generation += 1;
        let generation = state.generation;

        let entry = match state.resources.get_mut(id) {
            Some(entry) if entry.role == role => entry,
            _ => return Err(not_found(id)),
        };
        let fixture = &mut entry.fixture;

        let legs: Vec<Map<String, Value>> = body["transport_params"]
            .as_array()
            .map(|legs| legs.iter().filter_map(|l| l.as_object().cloned()).collect())
            .unwrap_or_default();

        if !behaviour.accept_everything {
            for (index, params) in legs.iter().enumerate() {
                for (key, value) in params {
                    let constraint = fixture.constraints.get(index).and_then(|c| c.get(key));
                    if !allowed(constraint, value) {
                        return Ok(PatchResponse {
                            status: 400,
                            body: json!({"code": 400, "error": format!("{} not allowed", key)}),
                        });
                    }
                }
            }
        }

        for (index, params) in legs.iter().enumerate() {
            merge_params(&mut fixture.staged, index, params);
        }
        let master_enable = body["master_enable"].as_bool().unwrap_or(false);
        fixture.staged["master_enable"] = json!(master_enable);

        if !master_enable && !behaviour.stuck_keys {
            let key = ephemeral_key(role);
            let fresh = json!(format!("04{:08x}", generation));
            let legs = fixture.staged["transport_params"]
                .as_array()
                .map(Vec::len)
                .unwrap_or(0);
            for index in 0..legs {
                if fixture.staged["transport_params"][index].get(key).is_some() {
                    fixture.staged["transport_params"][index][key] = fresh.clone();
                }
                if let Some(c) = fixture.constraints.get_mut(index).and_then(|c| c.get_mut(key)) {
                    if c.get("enum").is_some() {
                        c["enum"] = json!([fresh.clone()]);
                    }
                }
            }
        }

        fixture.active = fixture.staged.clone();
        Ok(PatchResponse {
            status: 200,
            body: fixture.staged.clone(),
        })
    }
}

#[async_trait]
impl ResourceSource for MockDevice {
    async fn fetch_resources(&self, role: Role) -> Result<Vec<Value>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .order
            .iter()
            .filter_map(|id| state.resources.get(id))
            .filter(|e| e.role == role)
            .map(|e| e.fixture.document.clone())
            .collect())
    }

    async fn fetch_text(&self, href: &str) -> Result<String> {
        let state = self.state.lock().unwrap();
        state.texts.get(href).cloned().ok_or_else(|| not_found(href))
    }
}

fn pep_constraints(role: Role, ecdh: bool) -> Value {
    let key_material = |value: &str| match role {
        Role::Sender => json!({"enum": [value]}),
        Role::Receiver => json!({}),
    };
    let mut constraints = json!({
        "ext_privacy_protocol": {"enum": ["RTP", "RTP_KV"]},
        "ext_privacy_mode": {"enum": ["AES-128-CTR", "AES-256-CTR"]},
        "ext_privacy_iv": key_material(IV),
        "ext_privacy_key_generator": key_material(KEY_GENERATOR),
        "ext_privacy_key_version": key_material(KEY_VERSION),
        "ext_privacy_key_id": {"enum": [KEY_ID]}
    });
    if ecdh {
        let pinned = |value: &str| json!({"enum": [value]});
        let open = json!({"pattern": "^[0-9a-fA-F]{2,}$"});
        constraints["ext_privacy_ecdh_curve"] = json!({"enum": ["secp256r1"]});
        let (sender, receiver) = match role {
            Role::Sender => (pinned(SENDER_KEY), open),
            Role::Receiver => (open, pinned(RECEIVER_KEY)),
        };
        constraints["ext_privacy_ecdh_sender_public_key"] = sender;
        constraints["ext_privacy_ecdh_receiver_public_key"] = receiver;
    }
    constraints
}

fn pep_values(ecdh: bool) -> Value {
    let mut values = json!({
        "ext_privacy_protocol": "RTP",
        "ext_privacy_mode": "AES-128-CTR",
        "ext_privacy_iv": IV,
        "ext_privacy_key_generator": KEY_GENERATOR,
        "ext_privacy_key_version": KEY_VERSION,
        "ext_privacy_key_id": KEY_ID
    });
    if ecdh {
        values["ext_privacy_ecdh_curve"] = json!("secp256r1");
        values["ext_privacy_ecdh_sender_public_key"] = json!(SENDER_KEY);
        values["ext_privacy_ecdh_receiver_public_key"] = json!(RECEIVER_KEY);
    }
    values
}

fn with_core(mut base: Value, extra: Value) -> Value {
    if let (Some(base), Some(extra)) = (base.as_object_mut(), extra.as_object()) {
        for (k, v) in extra {
            base.insert(k.clone(), v.clone());
        }
    }
    base
}

/// Single-leg PEP Sender on `urn:x-nmos:transport:rtp`
pub fn pep_sender(id: &str, master_enable: bool, ecdh: bool) -> ResourceFixture {
    let constraints = with_core(
        json!({
            "source_ip": {},
            "destination_ip": {},
            "source_port": {},
            "destination_port": {},
            "rtp_enabled": {}
        }),
        pep_constraints(Role::Sender, ecdh),
    );
    let values = with_core(
        json!({
            "source_ip": "192.0.2.10",
            "destination_ip": "239.1.1.1",
            "source_port": 5004,
            "destination_port": 5004,
            "rtp_enabled": true
        }),
        pep_values(ecdh),
    );
    ResourceFixture {
        document: json!({
            "id": id,
            "transport": "urn:x-nmos:transport:rtp",
            "manifest_href": format!("/sdp/{}.sdp", id),
            "privacy": true,
            "caps": {"constraint_sets": [{"urn:x-nmos:cap:transport:privacy": {"enum": [true]}}]}
        }),
        constraints: json!([constraints]),
        staged: json!({"master_enable": master_enable, "transport_params": [values]}),
        active: json!({"master_enable": master_enable, "transport_params": [values]}),
    }
}

/// Single-leg PEP Receiver on `urn:x-nmos:transport:rtp`
pub fn pep_receiver(id: &str, master_enable: bool, ecdh: bool) -> ResourceFixture {
    let constraints = with_core(
        json!({
            "source_ip": {},
            "multicast_ip": {},
            "interface_ip": {},
            "destination_port": {},
            "rtp_enabled": {}
        }),
        pep_constraints(Role::Receiver, ecdh),
    );
    let values = with_core(
        json!({
            "source_ip": "192.0.2.10",
            "multicast_ip": "239.1.1.1",
            "interface_ip": "192.0.2.20",
            "destination_port": 5004,
            "rtp_enabled": true
        }),
        pep_values(ecdh),
    );
    ResourceFixture {
        document: json!({
            "id": id,
            "transport": "urn:x-nmos:transport:rtp",
            "privacy": true,
            "caps": {"constraint_sets": [{"urn:x-nmos:cap:transport:privacy": {"enum": [true]}}]}
        }),
        constraints: json!([constraints]),
        staged: json!({"master_enable": master_enable, "transport_params": [values]}),
        active: json!({"master_enable": master_enable, "transport_params": [values]}),
    }
}

/// Session-level SDP matching [`pep_sender`]
pub fn pep_sdp() -> String {
    format!(
        "v=0\r\n\
         o=- 1 1 IN IP4 192.0.2.10\r\n\
         s=pep\r\n\
         t=0 0\r\n\
         a=privacy:protocol=RTP; mode=AES-128-CTR; iv={}; key_generator={}; key_version={}; key_id={}\r\n\
         m=video 5004 RTP/AVP 96\r\n\
         c=IN IP4 239.1.1.1/64\r\n\
         a=extmap:1 urn:ietf:params:rtp-hdrext:PEP-Full-IV-Counter\r\n\
         a=extmap:2 urn:ietf:params:rtp-hdrext:PEP-Short-IV-Counter\r\n",
        IV, KEY_GENERATOR, KEY_VERSION, KEY_ID
    )
}
