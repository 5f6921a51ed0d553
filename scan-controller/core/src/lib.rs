//! Core types shared by the scan controller's watch, dispatch, and transport
//! crates.

#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

mod kind;
mod namespace;
mod resource;
mod target;

pub use self::{
    kind::{InvalidKind, ResourceKind},
    namespace::{InvalidPattern, NamespaceFilter, Pattern},
    resource::{ResourceKey, Revision},
    target::TargetSpec,
};
use std::sync::Arc;

/// Requests a scan of a single resource from one scan backend.
#[async_trait::async_trait]
pub trait ScanClient: Send + Sync {
    async fn scan(
        &self,
        integration_id: &str,
        key: &ResourceKey,
        revision: &Revision,
    ) -> anyhow::Result<()>;
}

/// Builds the [`ScanClient`] handle for a registered endpoint.
///
/// Construction may fail (e.g. for a malformed endpoint); the failure is local
/// to that one registration.
pub trait NewScanClient: Send + Sync {
    fn new_client(&self, endpoint: &str, token: &str) -> anyhow::Result<Arc<dyn ScanClient>>;
}
