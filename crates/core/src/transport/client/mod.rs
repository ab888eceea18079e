//! Clients for the device APIs
//!
//! Only HTTP is provided; the node and connection APIs are plain REST.

pub mod http;

pub use http::{ConnectionEndpoint, HttpConnectionClient};
