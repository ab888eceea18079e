//! HTTP client against a local NMOS node served by axum

#[path = "../fixtures/mock_device.rs"]
mod mock_device;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use mock_device::{pep_sdp, pep_sender, MockDevice};
use nmos_conformance::config::HttpConfig;
use nmos_conformance::transport::client::HttpConnectionClient;
use nmos_conformance::transport::{snapshot_all, ResourceSource, TransportParamsEndpoint};
use nmos_conformance::{ConformanceValidator, Error, Role, ValidatorConfig};
use serde_json::{json, Value};
use tokio::net::TcpListener;

type Device = Arc<MockDevice>;

fn status_of(err: Error) -> StatusCode {
    match err {
        Error::Http { status, .. } => StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

async fn senders(State(device): State<Device>) -> Result<Json<Value>, StatusCode> {
    let documents = device.fetch_resources(Role::Sender).await.map_err(status_of)?;
    Ok(Json(Value::Array(documents)))
}

async fn constraints(State(device): State<Device>, Path(id): Path<String>) -> Result<Json<Value>, StatusCode> {
    device.get_constraints(Role::Sender, &id).await.map(Json).map_err(status_of)
}

async fn staged(State(device): State<Device>, Path(id): Path<String>) -> Result<Json<Value>, StatusCode> {
    device.get_staged(Role::Sender, &id).await.map(Json).map_err(status_of)
}

async fn patch_staged(
    State(device): State<Device>,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> Result<(StatusCode, Json<Value>), StatusCode> {
    let response = device.patch_staged(Role::Sender, &id, &body).await.map_err(status_of)?;
    let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    Ok((status, Json(response.body)))
}

async fn active(State(device): State<Device>, Path(id): Path<String>) -> Result<Json<Value>, StatusCode> {
    device.get_active(Role::Sender, &id).await.map(Json).map_err(status_of)
}

async fn transport_file(State(device): State<Device>, Path(file): Path<String>) -> Result<String, StatusCode> {
    device.fetch_text(&format!("/sdp/{}", file)).await.map_err(status_of)
}

async fn serve(device: Device) -> String {
    let app = Router::new()
        .route("/x-nmos/node/v1.1/senders", get(senders))
        .route("/x-nmos/connection/v1.1/single/senders/:id/constraints", get(constraints))
        .route(
            "/x-nmos/connection/v1.1/single/senders/:id/staged",
            get(staged).patch(patch_staged),
        )
        .route("/x-nmos/connection/v1.1/single/senders/:id/active", get(active))
        .route("/sdp/:file", get(transport_file))
        .with_state(device);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

async fn client_for(device: Device) -> HttpConnectionClient {
    let base_url = serve(device).await;
    HttpConnectionClient::new(&base_url, &HttpConfig::default()).unwrap()
}

#[tokio::test]
async fn test_snapshot_over_http() {
    // GIVEN: A node serving one active PEP Sender and its SDP
    let device = Arc::new(MockDevice::new());
    device.add_resource(Role::Sender, pep_sender("s1", true, false));
    device.add_text("/sdp/s1.sdp", &pep_sdp());
    let client = client_for(device).await;

    // WHEN: The Sender collection is snapshotted over HTTP
    let senders = snapshot_all(&client, &client, Role::Sender).await.unwrap().resources;

    // THEN: The relative manifest_href was resolved and the snapshot validates
    assert_eq!(senders.len(), 1);
    assert_eq!(senders[0].id, "s1");
    assert!(senders[0].sdp.as_deref().unwrap_or_default().contains("a=privacy:"));

    let report = ConformanceValidator::new(ValidatorConfig::default()).validate_resource(&senders[0]);
    assert!(report.is_ok(), "{:?}", report.violations());
}

#[tokio::test]
async fn test_missing_transport_file() {
    let device = Arc::new(MockDevice::new());
    device.add_resource(Role::Sender, pep_sender("s1", true, false));
    let client = client_for(device).await;

    let senders = snapshot_all(&client, &client, Role::Sender).await.unwrap().resources;
    assert!(senders[0].sdp.is_none());
}

#[tokio::test]
async fn test_unknown_resource_status() {
    let device = Arc::new(MockDevice::new());
    let client = client_for(device).await;

    let err = client.get_staged(Role::Sender, "missing").await.unwrap_err();
    match err {
        Error::Http { status, url } => {
            assert_eq!(status, 404);
            assert!(url.ends_with("/single/senders/missing/staged"));
        }
        other => panic!("unexpected error {:?}", other),
    }
}

#[tokio::test]
async fn test_patch_status_is_returned() {
    // GIVEN: An inactive Sender
    let device = Arc::new(MockDevice::new());
    device.add_resource(Role::Sender, pep_sender("s1", false, false));
    let client = client_for(device.clone()).await;

    // WHEN: A value outside the enumeration and then a valid one are patched
    let refused = client
        .patch_staged(
            Role::Sender,
            "s1",
            &json!({"master_enable": false, "transport_params": [{"ext_privacy_mode": "ROT13"}]}),
        )
        .await
        .unwrap();
    let accepted = client
        .patch_staged(
            Role::Sender,
            "s1",
            &json!({"master_enable": false, "transport_params": [{"ext_privacy_mode": "AES-256-CTR"}]}),
        )
        .await
        .unwrap();

    // THEN: The refusal is a status, not an error, and the bodies are JSON
    assert_eq!(refused.status, 400);
    assert!(!refused.is_accepted());
    assert_eq!(refused.body["code"], json!(400));
    assert!(accepted.is_accepted());
    assert_eq!(accepted.body["transport_params"][0]["ext_privacy_mode"], json!("AES-256-CTR"));
    assert_eq!(device.patches().len(), 2);
}
