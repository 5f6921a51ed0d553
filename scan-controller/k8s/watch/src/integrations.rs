use futures::prelude::*;
use scan_controller_core::TargetSpec;
use scan_controller_dispatch::Handle;
use scan_controller_k8s_api::{
    self as k8s, watcher, Api, ResourceExt, ScanIntegration, ScanIntegrationSpec, SecretKeyRef,
};
use std::{collections::HashSet, sync::Arc};
use tracing::{debug, info, warn};

/// Looks up the API token referenced by an integration.
#[async_trait::async_trait]
pub trait TokenSource: Send + Sync {
    async fn token(&self, namespace: &str, secret: &SecretKeyRef) -> anyhow::Result<String>;
}

/// Reads tokens from Kubernetes Secrets.
#[derive(Clone)]
pub struct SecretTokens(k8s::Client);

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("secret {namespace}/{name} has no key {key:?}")]
    MissingKey {
        namespace: String,
        name: String,
        key: String,
    },

    #[error("secret {namespace}/{name} key {key:?} is not valid UTF-8")]
    NotUtf8 {
        namespace: String,
        name: String,
        key: String,
    },
}

/// Reconciles `ScanIntegration` resources into registry entries.
pub struct Integrations {
    targets: Handle,
    tokens: Arc<dyn TokenSource>,

    /// Keys this reconciler has registered.
    known: HashSet<String>,

    /// Keys seen during an in-progress (re)list.
    listing: Option<HashSet<String>>,
}

/// The registry key of an integration, `namespace/name`.
pub fn integration_key(integration: &ScanIntegration) -> String {
    format!(
        "{}/{}",
        integration.namespace().unwrap_or_default(),
        integration.name_any()
    )
}

pub fn target_spec(spec: &ScanIntegrationSpec, token: String) -> TargetSpec {
    TargetSpec {
        endpoint: spec.endpoint.clone(),
        token,
        integration_id: spec.integration_id.clone(),
        namespaces: spec.namespaces.clone(),
        namespaces_exclude: spec.namespaces_exclude.clone(),
    }
}

// === impl SecretTokens ===

impl SecretTokens {
    pub fn new(client: k8s::Client) -> Self {
        Self(client)
    }
}

#[async_trait::async_trait]
impl TokenSource for SecretTokens {
    async fn token(&self, namespace: &str, secret: &SecretKeyRef) -> anyhow::Result<String> {
        let api = Api::<k8s::Secret>::namespaced(self.0.clone(), namespace);
        let obj = api.get(&secret.name).await?;
        let bytes = obj
            .data
            .and_then(|mut data| data.remove(&secret.key))
            .ok_or_else(|| TokenError::MissingKey {
                namespace: namespace.to_string(),
                name: secret.name.clone(),
                key: secret.key.clone(),
            })?;
        let token = String::from_utf8(bytes.0).map_err(|_| TokenError::NotUtf8 {
            namespace: namespace.to_string(),
            name: secret.name.clone(),
            key: secret.key.clone(),
        })?;
        Ok(token.trim().to_string())
    }
}

// === impl Integrations ===

impl Integrations {
    pub fn new(targets: Handle, tokens: Arc<dyn TokenSource>) -> Self {
        Self {
            targets,
            tokens,
            known: HashSet::new(),
            listing: None,
        }
    }

    /// Applies watch events until the stream ends or shutdown is signaled.
    pub async fn run<S>(mut self, events: S, drain: drain::Watch)
    where
        S: Stream<Item = watcher::Event<ScanIntegration>>,
    {
        tokio::pin!(events);
        let shutdown = drain.signaled();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                event = events.next() => match event {
                    Some(event) => self.handle(event).await,
                    None => {
                        debug!("Watch ended");
                        return;
                    }
                },

                _ = &mut shutdown => {
                    debug!("Shutdown");
                    return;
                }
            }
        }
    }

    async fn handle(&mut self, event: watcher::Event<ScanIntegration>) {
        match event {
            watcher::Event::Apply(integration) => self.apply(&integration).await,
            watcher::Event::Delete(integration) => {
                let key = integration_key(&integration);
                info!(integration = %key, "Deleted");
                self.delete(key).await;
            }
            watcher::Event::Init => {
                self.listing = Some(HashSet::new());
            }
            watcher::Event::InitApply(integration) => {
                if let Some(listing) = self.listing.as_mut() {
                    listing.insert(integration_key(&integration));
                }
                self.apply(&integration).await;
            }
            watcher::Event::InitDone => {
                let listed = self.listing.take().unwrap_or_default();
                let stale = self
                    .known
                    .iter()
                    .filter(|key| !listed.contains(*key))
                    .cloned()
                    .collect::<Vec<_>>();
                for key in stale {
                    info!(integration = %key, "No longer exists");
                    self.delete(key).await;
                }
            }
        }
    }

    async fn apply(&mut self, integration: &ScanIntegration) {
        let key = integration_key(integration);
        let spec = &integration.spec;
        if !spec.enabled {
            info!(integration = %key, "Disabled");
            return self.delete(key).await;
        }

        let token = match spec.token_secret_ref.as_ref() {
            None => String::new(),
            Some(secret) => {
                let namespace = integration.namespace().unwrap_or_default();
                match self.tokens.token(&namespace, secret).await {
                    Ok(token) => token,
                    Err(error) => {
                        warn!(integration = %key, %error, "Failed to read API token");
                        return self.delete(key).await;
                    }
                }
            }
        };

        debug!(integration = %key, endpoint = %spec.endpoint, "Applying");
        self.targets.add(key.clone(), target_spec(spec, token)).await;
        self.known.insert(key);
    }

    async fn delete(&mut self, key: String) {
        self.known.remove(&key);
        self.targets.delete(key).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::NewNoopClient;
    use maplit::{btreeset, hashmap};
    use scan_controller_dispatch::{Metrics, Registry};
    use std::collections::{BTreeSet, HashMap};

    /// Tokens keyed by `(namespace, secret, key)`.
    struct FakeTokens(HashMap<(String, String, String), String>);

    #[async_trait::async_trait]
    impl TokenSource for FakeTokens {
        async fn token(&self, namespace: &str, secret: &SecretKeyRef) -> anyhow::Result<String> {
            self.0
                .get(&(
                    namespace.to_string(),
                    secret.name.clone(),
                    secret.key.clone(),
                ))
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("secret not found"))
        }
    }

    fn spawn() -> (Integrations, Handle, drain::Signal) {
        let (signal, drain) = drain::channel();
        let (registry, targets) = Registry::new(Arc::new(NewNoopClient), Metrics::default());
        tokio::spawn(registry.run(drain));
        let tokens = FakeTokens(hashmap! {
            ("tenants".to_string(), "acme-scan".to_string(), "token".to_string()) => "s3cr3t".to_string(),
        });
        let integrations = Integrations::new(targets.clone(), Arc::new(tokens));
        (integrations, targets, signal)
    }

    fn integration(name: &str, enabled: bool, secret: Option<&str>) -> ScanIntegration {
        let mut si = ScanIntegration::new(
            name,
            ScanIntegrationSpec {
                enabled,
                endpoint: format!("https://{name}.example.com/v1/scans"),
                integration_id: format!("{name}-id"),
                token_secret_ref: secret.map(|name| SecretKeyRef {
                    name: name.to_string(),
                    key: "token".to_string(),
                }),
                namespaces: vec!["web-*".to_string()],
                namespaces_exclude: vec![],
            },
        );
        si.metadata.namespace = Some("tenants".to_string());
        si
    }

    async fn registered(targets: &Handle) -> BTreeSet<String> {
        targets
            .get_all()
            .await
            .iter()
            .map(|t| t.key.clone())
            .collect()
    }

    #[test]
    fn builds_target_spec() {
        let si = integration("acme", true, Some("acme-scan"));
        assert_eq!(integration_key(&si), "tenants/acme");
        assert_eq!(
            target_spec(&si.spec, "s3cr3t".to_string()),
            TargetSpec {
                endpoint: "https://acme.example.com/v1/scans".to_string(),
                token: "s3cr3t".to_string(),
                integration_id: "acme-id".to_string(),
                namespaces: vec!["web-*".to_string()],
                namespaces_exclude: vec![],
            }
        );
    }

    #[tokio::test]
    async fn registers_enabled_integrations() {
        let (mut integrations, targets, _signal) = spawn();
        integrations
            .handle(watcher::Event::Apply(integration("acme", true, Some("acme-scan"))))
            .await;
        integrations
            .handle(watcher::Event::Apply(integration("initech", true, None)))
            .await;
        assert_eq!(
            registered(&targets).await,
            btreeset! {"tenants/acme".to_string(), "tenants/initech".to_string()}
        );

        let all = targets.get_all().await;
        let acme = all.iter().find(|t| t.key == "tenants/acme").unwrap();
        assert_eq!(acme.endpoint, "https://acme.example.com/v1/scans");
        assert_eq!(acme.integration_id, "acme-id");
    }

    #[tokio::test]
    async fn disabling_unregisters() {
        let (mut integrations, targets, _signal) = spawn();
        integrations
            .handle(watcher::Event::Apply(integration("acme", true, Some("acme-scan"))))
            .await;
        integrations
            .handle(watcher::Event::Apply(integration("acme", false, Some("acme-scan"))))
            .await;
        assert!(registered(&targets).await.is_empty());
    }

    #[tokio::test]
    async fn unreadable_token_unregisters() {
        let (mut integrations, targets, _signal) = spawn();
        integrations
            .handle(watcher::Event::Apply(integration("acme", true, Some("acme-scan"))))
            .await;
        integrations
            .handle(watcher::Event::Apply(integration("acme", true, Some("missing"))))
            .await;
        assert!(registered(&targets).await.is_empty());
    }

    #[tokio::test]
    async fn deletes() {
        let (mut integrations, targets, _signal) = spawn();
        let si = integration("acme", true, Some("acme-scan"));
        integrations.handle(watcher::Event::Apply(si.clone())).await;
        integrations.handle(watcher::Event::Delete(si.clone())).await;
        assert!(registered(&targets).await.is_empty());
        // Repeated deletes are harmless.
        integrations.handle(watcher::Event::Delete(si)).await;
        assert!(registered(&targets).await.is_empty());
    }

    #[tokio::test]
    async fn relist_removes_vanished_integrations() {
        let (integrations, targets, _signal) = spawn();
        let events = stream::iter(vec![
            watcher::Event::Init,
            watcher::Event::InitApply(integration("acme", true, Some("acme-scan"))),
            watcher::Event::InitApply(integration("initech", true, None)),
            watcher::Event::InitDone,
            // The watch restarts after initech was deleted.
            watcher::Event::Init,
            watcher::Event::InitApply(integration("acme", true, Some("acme-scan"))),
            watcher::Event::InitDone,
        ]);
        let (_run_signal, drain) = drain::channel();
        integrations.run(events, drain).await;
        assert_eq!(
            registered(&targets).await,
            btreeset! {"tenants/acme".to_string()}
        );
    }
}
