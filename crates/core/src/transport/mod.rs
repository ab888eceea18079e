//! Device access
//!
//! The checks never talk to a device directly. IS-04 documents come from a
//! [`ResourceSource`] and the IS-05 endpoints of one resource from a
//! [`TransportParamsEndpoint`]. [`client::http::HttpConnectionClient`]
//! implements both over HTTP; tests use in-memory devices.

pub mod client;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::resource::{Resource, Role};

/// Response to a PATCH of the staged endpoint
#[derive(Debug, Clone, PartialEq)]
pub struct PatchResponse {
    /// HTTP status code
    pub status: u16,
    /// Response body, `Null` when it was not JSON
    pub body: Value,
}

impl PatchResponse {
    /// Only 200 counts as an accepted activation
    pub fn is_accepted(&self) -> bool {
        self.status == 200
    }
}

/// IS-04 resource listing
#[async_trait]
pub trait ResourceSource: Send + Sync {
    /// All Sender or Receiver documents of the node
    async fn fetch_resources(&self, role: Role) -> Result<Vec<Value>>;

    /// Body of a text resource such as a Sender `manifest_href`
    async fn fetch_text(&self, href: &str) -> Result<String>;
}

/// IS-05 single-resource endpoints
#[async_trait]
pub trait TransportParamsEndpoint: Send + Sync {
    /// Array of per-leg constraint objects
    async fn get_constraints(&self, role: Role, id: &str) -> Result<Value>;

    /// Staged document
    async fn get_staged(&self, role: Role, id: &str) -> Result<Value>;

    /// Active document
    async fn get_active(&self, role: Role, id: &str) -> Result<Value>;

    /// PATCH the staged document; non-200 statuses are returned, not raised
    async fn patch_staged(&self, role: Role, id: &str, body: &Value) -> Result<PatchResponse>;
}

/// Fetch the IS-05 state of one resource and assemble a snapshot
///
/// The Sender SDP is fetched from `manifest_href` only while the Sender is
/// active; a 404 leaves the snapshot without SDP.
pub async fn snapshot<S, E>(source: &S, endpoint: &E, role: Role, document: Value) -> Result<Resource>
where
    S: ResourceSource + ?Sized,
    E: TransportParamsEndpoint + ?Sized,
{
    let id = document
        .get("id")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::invalid_resource("(unknown)", "missing 'id'"))?
        .to_string();

    let constraints = endpoint.get_constraints(role, &id).await?;
    let staged = endpoint.get_staged(role, &id).await?;
    let active = endpoint.get_active(role, &id).await?;
    let mut resource = Resource::from_documents(role, document, &constraints, &staged, &active)?;

    if role == Role::Sender && resource.active_master_enable {
        if let Some(href) = resource.manifest_href.clone().filter(|h| !h.is_empty()) {
            match source.fetch_text(&href).await {
                Ok(sdp) => resource = resource.with_sdp(sdp),
                Err(Error::Http { status: 404, .. }) => {
                    debug!("{} {}: no transport file at {}", role, id, href);
                }
                Err(e) => return Err(e),
            }
        }
    }
    Ok(resource)
}

/// A resource whose snapshot could not be taken
#[derive(Debug)]
pub struct SnapshotFailure {
    /// Resource id, `(unknown)` when the document has none
    pub id: String,
    /// Why the snapshot failed
    pub error: Error,
}

/// Snapshots of every resource of a role
///
/// One malformed or unreachable resource does not hide the others; it is
/// listed in `failures` instead.
#[derive(Debug, Default)]
pub struct SnapshotBatch {
    /// Resources that were snapshotted
    pub resources: Vec<Resource>,
    /// Resources that could not be
    pub failures: Vec<SnapshotFailure>,
}

impl SnapshotBatch {
    /// Whether every listed resource was snapshotted
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Snapshot every resource of a role
///
/// Only a failure to list the resources is an error. Per-resource failures
/// are collected in [`SnapshotBatch::failures`].
pub async fn snapshot_all<S, E>(source: &S, endpoint: &E, role: Role) -> Result<SnapshotBatch>
where
    S: ResourceSource + ?Sized,
    E: TransportParamsEndpoint + ?Sized,
{
    let documents = source.fetch_resources(role).await?;
    info!("Found {} {} resources", documents.len(), role);

    let mut batch = SnapshotBatch {
        resources: Vec::with_capacity(documents.len()),
        failures: Vec::new(),
    };
    for document in documents {
        let id = document
            .get("id")
            .and_then(Value::as_str)
            .unwrap_or("(unknown)")
            .to_string();
        match snapshot(source, endpoint, role, document).await {
            Ok(resource) => batch.resources.push(resource),
            Err(error) => {
                warn!("{} {}: snapshot failed: {}", role, id, error);
                batch.failures.push(SnapshotFailure { id, error });
            }
        }
    }
    Ok(batch)
}
