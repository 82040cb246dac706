//! Cloud provider integration.
//!
//! This module defines the provider interface the executor drives and the
//! HTTP client implementing it against the provider's REST API.

mod api;
mod http;

pub use api::{CloudProvider, CreatedResource, ResourceStatus};
pub use http::HttpCloudProvider;
