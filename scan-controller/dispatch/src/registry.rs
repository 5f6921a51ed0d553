//! The set of registered scan targets.
//!
//! The target map is owned by a single task ([`Registry::run`]) and is only
//! reached through a cloneable [`Handle`]. Requests are applied in the order
//! the task receives them, so a snapshot requested after an `add` or `delete`
//! has completed always reflects it.

use crate::metrics::Metrics;
use scan_controller_core::{NamespaceFilter, NewScanClient, ScanClient, TargetSpec};
use std::{collections::HashMap, fmt, sync::Arc};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

/// A registered scan destination.
pub struct Target {
    pub key: String,
    pub endpoint: String,
    pub integration_id: String,
    pub filter: NamespaceFilter,
    pub client: Arc<dyn ScanClient>,
}

/// A point-in-time copy of the registered targets.
pub type Targets = Vec<Arc<Target>>;

pub struct Registry {
    requests: mpsc::Receiver<Request>,
    new_client: Arc<dyn NewScanClient>,
    targets: HashMap<String, Arc<Target>>,
    metrics: Metrics,
}

#[derive(Clone, Debug)]
pub struct Handle {
    tx: mpsc::Sender<Request>,
}

enum Request {
    Add {
        key: String,
        spec: TargetSpec,
        done: oneshot::Sender<()>,
    },
    Delete {
        key: String,
        done: oneshot::Sender<()>,
    },
    GetAll(oneshot::Sender<Targets>),
}

const REQUEST_BUFFER: usize = 64;

// === impl Registry ===

impl Registry {
    pub fn new(new_client: Arc<dyn NewScanClient>, metrics: Metrics) -> (Self, Handle) {
        let (tx, requests) = mpsc::channel(REQUEST_BUFFER);
        let registry = Self {
            requests,
            new_client,
            targets: HashMap::new(),
            metrics,
        };
        (registry, Handle { tx })
    }

    /// Serves requests until every [`Handle`] has been dropped.
    ///
    /// Once shutdown is signaled the registry keeps serving the handles that
    /// remain (e.g. a final flush) and releases the drain only after they
    /// are gone.
    pub async fn run(mut self, drain: drain::Watch) {
        let shutdown = drain.signaled();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                release = &mut shutdown => {
                    debug!("Draining");
                    release.release_after(self.serve()).await;
                    return;
                }
                req = self.requests.recv() => match req {
                    Some(req) => self.handle(req),
                    None => return,
                },
            }
        }
    }

    async fn serve(&mut self) {
        while let Some(req) = self.requests.recv().await {
            self.handle(req);
        }
        debug!("All handles released");
    }

    fn handle(&mut self, req: Request) {
        match req {
            Request::Add { key, spec, done } => {
                self.add(key, spec);
                let _ = done.send(());
            }
            Request::Delete { key, done } => {
                self.delete(&key);
                let _ = done.send(());
            }
            Request::GetAll(tx) => {
                let _ = tx.send(self.targets.values().cloned().collect());
            }
        }
    }

    fn add(&mut self, key: String, spec: TargetSpec) {
        let filter = spec.namespace_filter();
        for error in filter.invalid_patterns() {
            warn!(tenant = %key, %error, "Ignoring namespace pattern");
        }

        match self.new_client.new_client(&spec.endpoint, &spec.token) {
            Ok(client) => {
                let target = Arc::new(Target {
                    key: key.clone(),
                    endpoint: spec.endpoint,
                    integration_id: spec.integration_id,
                    filter,
                    client,
                });
                let endpoint = target.endpoint.clone();
                if self.targets.insert(key.clone(), target).is_some() {
                    info!(tenant = %key, %endpoint, "Updated scan target");
                } else {
                    info!(tenant = %key, %endpoint, "Registered scan target");
                }
                self.metrics.registration(true);
            }
            Err(error) => {
                // Fail closed: a target that could not be rebuilt must not
                // keep receiving scans with its previous configuration.
                let removed = self.targets.remove(&key).is_some();
                warn!(tenant = %key, endpoint = %spec.endpoint, %error, removed, "Failed to build scan client");
                self.metrics.registration(false);
            }
        }
        self.metrics.set_targets(self.targets.len());
    }

    fn delete(&mut self, key: &str) {
        if self.targets.remove(key).is_some() {
            info!(tenant = %key, "Removed scan target");
            self.metrics.set_targets(self.targets.len());
        }
    }
}

// === impl Handle ===

impl Handle {
    /// Registers or replaces the target for `key`.
    ///
    /// Returns once the registry has processed the request. Client
    /// construction errors are logged by the registry, not returned.
    pub async fn add(&self, key: impl Into<String>, spec: TargetSpec) {
        let (done, rx) = oneshot::channel();
        let req = Request::Add {
            key: key.into(),
            spec,
            done,
        };
        if self.tx.send(req).await.is_err() {
            debug!("Registry stopped; dropping registration");
            return;
        }
        let _ = rx.await;
    }

    /// Removes the target for `key`, if any.
    pub async fn delete(&self, key: impl Into<String>) {
        let (done, rx) = oneshot::channel();
        let req = Request::Delete {
            key: key.into(),
            done,
        };
        if self.tx.send(req).await.is_err() {
            debug!("Registry stopped; dropping deletion");
            return;
        }
        let _ = rx.await;
    }

    /// Returns a snapshot of all registered targets.
    ///
    /// The snapshot is empty once the registry has stopped.
    pub async fn get_all(&self) -> Targets {
        let (tx, rx) = oneshot::channel();
        if self.tx.send(Request::GetAll(tx)).await.is_err() {
            return Targets::new();
        }
        rx.await.unwrap_or_default()
    }
}

// === impl Target ===

impl fmt::Debug for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Target")
            .field("key", &self.key)
            .field("endpoint", &self.endpoint)
            .field("integration_id", &self.integration_id)
            .field("filter", &self.filter)
            .finish_non_exhaustive()
    }
}
