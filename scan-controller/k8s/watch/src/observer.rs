use futures::prelude::*;
use scan_controller_core::ResourceKind;
use scan_controller_dispatch::{Debouncer, Handle};
use scan_controller_k8s_api::{self as k8s, watcher, Resource, ResourceExt};
use std::sync::Arc;
use tracing::{debug, trace};

/// Forwards changes of a single resource kind to the debouncer.
#[derive(Clone)]
pub struct Observer {
    kind: ResourceKind,

    /// Every kind the controller watches; children of these are left to
    /// their owner's observer.
    watched: Arc<[ResourceKind]>,

    targets: Handle,
    debouncer: Debouncer,
}

impl Observer {
    pub fn new(
        kind: ResourceKind,
        watched: Arc<[ResourceKind]>,
        targets: Handle,
        debouncer: Debouncer,
    ) -> Self {
        Self {
            kind,
            watched,
            targets,
            debouncer,
        }
    }

    /// Consumes watch events until the stream ends or shutdown is signaled.
    ///
    /// The initial list is not a change and is skipped. Objects re-listed
    /// after a watch restart are forwarded, since they may have changed
    /// while the watch was down. Deletions are never scanned.
    pub async fn run<K, S>(self, events: S, drain: drain::Watch)
    where
        K: Resource,
        S: Stream<Item = watcher::Event<K>>,
    {
        tokio::pin!(events);
        let shutdown = drain.signaled();
        tokio::pin!(shutdown);

        let mut synced = false;
        loop {
            tokio::select! {
                event = events.next() => match event {
                    Some(watcher::Event::Apply(obj)) => self.observe(&obj).await,
                    Some(watcher::Event::InitApply(obj)) if synced => self.observe(&obj).await,
                    Some(watcher::Event::InitDone) => synced = true,
                    Some(watcher::Event::Init)
                    | Some(watcher::Event::InitApply(_))
                    | Some(watcher::Event::Delete(_)) => {}
                    None => {
                        debug!(kind = %self.kind, "Watch ended");
                        return;
                    }
                },

                _ = &mut shutdown => {
                    debug!(kind = %self.kind, "Shutdown");
                    return;
                }
            }
        }
    }

    pub(crate) async fn observe<K: Resource>(&self, obj: &K) {
        if k8s::is_redundant_child(self.kind, obj.owner_references(), &self.watched) {
            trace!(kind = %self.kind, name = %obj.name_any(), "Owned by a watched kind");
            return;
        }

        if self.targets.get_all().await.is_empty() {
            return;
        }

        let Some(key) = k8s::resource_key(self.kind, obj) else {
            return;
        };
        trace!(resource = %key, "Changed");
        self.debouncer.add(key, k8s::revision(obj));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::NewNoopClient;
    use scan_controller_core::TargetSpec;
    use scan_controller_dispatch::{Config, Metrics, Registry};
    use std::sync::Arc;

    struct Harness {
        targets: Handle,
        debouncer: Debouncer,
        _signal: drain::Signal,
    }

    impl Harness {
        fn spawn() -> Self {
            let (signal, drain) = drain::channel();
            let (registry, targets) = Registry::new(Arc::new(NewNoopClient), Metrics::default());
            tokio::spawn(registry.run(drain));
            let debouncer = Debouncer::new(Config::default(), targets.clone(), Metrics::default());
            Self {
                targets,
                debouncer,
                _signal: signal,
            }
        }

        async fn with_target() -> Self {
            let h = Self::spawn();
            h.targets
                .add(
                    "static",
                    TargetSpec {
                        endpoint: "http://scan.example.com".to_string(),
                        ..Default::default()
                    },
                )
                .await;
            h
        }

        fn observer(&self, kind: ResourceKind) -> Observer {
            self.observer_watching(kind, &ResourceKind::ALL)
        }

        fn observer_watching(&self, kind: ResourceKind, watched: &[ResourceKind]) -> Observer {
            Observer::new(
                kind,
                watched.into(),
                self.targets.clone(),
                self.debouncer.clone(),
            )
        }
    }

    fn pod(name: &str, owner: Option<&str>) -> k8s::Pod {
        k8s::Pod {
            metadata: k8s::ObjectMeta {
                namespace: Some("default".to_string()),
                name: Some(name.to_string()),
                uid: Some(format!("uid-{name}")),
                resource_version: Some("1".to_string()),
                owner_references: owner.map(|kind| {
                    vec![k8s::OwnerReference {
                        kind: kind.to_string(),
                        name: "parent".to_string(),
                        controller: Some(true),
                        ..Default::default()
                    }]
                }),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn bare_pod_is_queued() {
        let h = Harness::with_target().await;
        h.observer(ResourceKind::Pod)
            .observe(&pod("test1", None))
            .await;
        assert_eq!(h.debouncer.pending_len(), 1);
    }

    #[tokio::test]
    async fn owned_pod_is_skipped() {
        let h = Harness::with_target().await;
        let observer = h.observer(ResourceKind::Pod);
        observer.observe(&pod("rs-pod", Some("ReplicaSet"))).await;
        observer.observe(&pod("job-pod", Some("Job"))).await;
        assert_eq!(h.debouncer.pending_len(), 0);

        // Owners outside the redundant-owner table do not suppress the child.
        observer.observe(&pod("custom-pod", Some("Rollout"))).await;
        assert_eq!(h.debouncer.pending_len(), 1);
    }

    #[tokio::test]
    async fn pod_with_unwatched_owner_is_queued() {
        let h = Harness::with_target().await;
        let observer = h.observer_watching(ResourceKind::Pod, &[ResourceKind::Pod]);
        observer.observe(&pod("rs-pod", Some("ReplicaSet"))).await;
        observer.observe(&pod("job-pod", Some("Job"))).await;
        assert_eq!(h.debouncer.pending_len(), 2);
    }

    #[tokio::test]
    async fn nothing_queued_without_targets() {
        let h = Harness::spawn();
        h.observer(ResourceKind::Pod)
            .observe(&pod("test1", None))
            .await;
        assert_eq!(h.debouncer.pending_len(), 0);
    }

    #[tokio::test]
    async fn skips_initial_list_and_deletes() {
        let h = Harness::with_target().await;
        let events = stream::iter(vec![
            watcher::Event::Init,
            watcher::Event::InitApply(pod("listed", None)),
            watcher::Event::InitDone,
            watcher::Event::Apply(pod("changed", None)),
            watcher::Event::Delete(pod("deleted", None)),
            watcher::Event::Apply(pod("changed", None)),
        ]);
        let (_signal, drain) = drain::channel();
        h.observer(ResourceKind::Pod).run(events, drain).await;
        assert_eq!(h.debouncer.pending_len(), 1);
    }

    #[tokio::test]
    async fn forwards_relisted_objects() {
        let h = Harness::with_target().await;
        let events = stream::iter(vec![
            watcher::Event::Init,
            watcher::Event::InitApply(pod("listed", None)),
            watcher::Event::InitDone,
            // The watch restarts.
            watcher::Event::Init,
            watcher::Event::InitApply(pod("relisted", None)),
            watcher::Event::InitApply(pod("owned", Some("ReplicaSet"))),
            watcher::Event::InitDone,
        ]);
        let (_signal, drain) = drain::channel();
        h.observer(ResourceKind::Pod).run(events, drain).await;
        assert_eq!(h.debouncer.pending_len(), 1);
    }

    #[tokio::test]
    async fn stops_on_shutdown() {
        let h = Harness::with_target().await;
        let (signal, drain) = drain::channel();
        let task = tokio::spawn(
            h.observer(ResourceKind::Pod)
                .run(stream::pending::<watcher::Event<k8s::Pod>>(), drain),
        );
        signal.drain().await;
        task.await.expect("observer must not panic");
    }
}
