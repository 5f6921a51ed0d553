#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod duration;
pub mod integration;
mod owner;

pub use self::{
    duration::Interval,
    integration::{ScanIntegration, ScanIntegrationSpec, SecretKeyRef},
    owner::is_redundant_child,
};
pub use k8s_openapi::{
    api::{
        apps::v1::{DaemonSet, Deployment, ReplicaSet, StatefulSet},
        batch::v1::{CronJob, Job},
        core::v1::{Namespace, Pod, Secret, Service},
        networking::v1::Ingress,
    },
    apimachinery::pkg::apis::meta::v1::OwnerReference,
};
pub use kube::{
    api::{Api, ObjectMeta, ResourceExt},
    runtime::watcher,
    Client, Error, Resource,
};
use scan_controller_core::{ResourceKey, ResourceKind, Revision};

/// Builds the key identifying `resource`, or `None` if the object has no name.
pub fn resource_key<T>(kind: ResourceKind, resource: &T) -> Option<ResourceKey>
where
    T: Resource,
{
    let meta = resource.meta();
    let name = meta.name.clone()?;
    if kind.is_cluster_scoped() {
        return Some(ResourceKey::cluster(kind, name));
    }
    // Namespaced objects delivered by a cluster-wide watch always carry a
    // namespace; fall back to the API server's default just in case.
    let namespace = meta.namespace.clone().unwrap_or_else(|| "default".to_string());
    Some(ResourceKey::namespaced(kind, namespace, name))
}

pub fn revision<T>(resource: &T) -> Revision
where
    T: Resource,
{
    let meta = resource.meta();
    Revision {
        uid: meta.uid.clone(),
        resource_version: meta.resource_version.clone(),
    }
}
