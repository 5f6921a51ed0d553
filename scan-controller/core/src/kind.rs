use std::{fmt, str::FromStr};

/// The closed set of workload kinds that may be watched for changes.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceKind {
    Deployment,
    DaemonSet,
    StatefulSet,
    ReplicaSet,
    Pod,
    Job,
    CronJob,
    Service,
    Ingress,
    Namespace,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("unsupported resource type: {0}")]
pub struct InvalidKind(String);

// === impl ResourceKind ===

impl ResourceKind {
    /// Kinds watched when neither `--watch-all-resources` nor an explicit set
    /// of resource types is configured.
    pub const DEFAULT: [Self; 4] = [
        Self::Deployment,
        Self::DaemonSet,
        Self::StatefulSet,
        Self::ReplicaSet,
    ];

    pub const ALL: [Self; 10] = [
        Self::Deployment,
        Self::DaemonSet,
        Self::StatefulSet,
        Self::ReplicaSet,
        Self::Pod,
        Self::Job,
        Self::CronJob,
        Self::Service,
        Self::Ingress,
        Self::Namespace,
    ];

    /// Resolves the set of kinds to watch. An explicit override wins over
    /// `watch_all`; duplicates in the override are dropped.
    pub fn watched(watch_all: bool, overrides: &[Self]) -> Vec<Self> {
        if !overrides.is_empty() {
            let mut kinds = Vec::with_capacity(overrides.len());
            for kind in overrides {
                if !kinds.contains(kind) {
                    kinds.push(*kind);
                }
            }
            return kinds;
        }

        if watch_all {
            Self::ALL.to_vec()
        } else {
            Self::DEFAULT.to_vec()
        }
    }

    /// The Kubernetes `kind` name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Deployment => "Deployment",
            Self::DaemonSet => "DaemonSet",
            Self::StatefulSet => "StatefulSet",
            Self::ReplicaSet => "ReplicaSet",
            Self::Pod => "Pod",
            Self::Job => "Job",
            Self::CronJob => "CronJob",
            Self::Service => "Service",
            Self::Ingress => "Ingress",
            Self::Namespace => "Namespace",
        }
    }

    pub fn plural(&self) -> &'static str {
        match self {
            Self::Deployment => "deployments",
            Self::DaemonSet => "daemonsets",
            Self::StatefulSet => "statefulsets",
            Self::ReplicaSet => "replicasets",
            Self::Pod => "pods",
            Self::Job => "jobs",
            Self::CronJob => "cronjobs",
            Self::Service => "services",
            Self::Ingress => "ingresses",
            Self::Namespace => "namespaces",
        }
    }

    fn short_name(&self) -> &'static str {
        match self {
            Self::Deployment => "deploy",
            Self::DaemonSet => "ds",
            Self::StatefulSet => "sts",
            Self::ReplicaSet => "rs",
            Self::Pod => "po",
            Self::Job => "job",
            Self::CronJob => "cj",
            Self::Service => "svc",
            Self::Ingress => "ing",
            Self::Namespace => "ns",
        }
    }

    pub fn is_cluster_scoped(&self) -> bool {
        matches!(self, Self::Namespace)
    }

    /// Owner kinds whose own change notifications already represent a change
    /// to an object of this kind.
    pub fn redundant_owner_kinds(&self) -> &'static [&'static str] {
        match self {
            Self::Pod => &["ReplicaSet", "DaemonSet", "StatefulSet", "Job"],
            Self::ReplicaSet => &["Deployment"],
            Self::Job => &["CronJob"],
            _ => &[],
        }
    }

    /// Returns true if an object of this kind owned by `owner_kind` should be
    /// left to its owner's watch. The owner kind must be among `watched`.
    pub fn is_redundant_owner(&self, owner_kind: &str, watched: &[Self]) -> bool {
        self.redundant_owner_kinds().contains(&owner_kind)
            && watched.iter().any(|kind| kind.as_str() == owner_kind)
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = InvalidKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Self::ALL
            .into_iter()
            .find(|kind| {
                s.eq_ignore_ascii_case(kind.as_str())
                    || s.eq_ignore_ascii_case(kind.plural())
                    || s.eq_ignore_ascii_case(kind.short_name())
            })
            .ok_or_else(|| InvalidKind(s.to_string()))
    }
}
