use crate::{
    core::{ResourceKind, TargetSpec},
    dispatch::{self, Debouncer, Metrics, Registry},
    k8s::{self, watcher, Client, Resource},
    watch::{Integrations, Observer, SecretTokens},
};
use anyhow::{bail, Result};
use clap::Parser;
use futures::prelude::*;
use prometheus_client::registry::Registry as Prometheus;
use scan_controller_http::NewHttpClient;
use std::{num::NonZeroUsize, sync::Arc};
use tracing::{info, info_span, warn, Instrument};

/// Registry key of the target configured on the command line.
const STATIC_TARGET: &str = "static";

#[derive(Parser)]
#[clap(name = "scan-controller", about = "Triggers scans of changed workloads")]
pub struct Args {
    #[clap(
        long,
        default_value = "scan_controller=info,warn",
        env = "SCAN_CONTROLLER_LOG"
    )]
    log_level: kubert::LogFilter,

    #[clap(long, default_value = "plain")]
    log_format: kubert::LogFormat,

    #[clap(flatten)]
    client: kubert::ClientArgs,

    #[clap(flatten)]
    admin: kubert::AdminArgs,

    /// Quiet period after the last change before scans are dispatched.
    #[clap(long, default_value = "10s")]
    debounce_interval: k8s::Interval,

    /// Minimum time between two dispatches. `0` disables the limit.
    #[clap(long, default_value = "2m")]
    minimum_scan_interval: k8s::Interval,

    /// Watch every supported resource type rather than only workload
    /// controllers.
    #[clap(long)]
    watch_all_resources: bool,

    /// Explicit, comma-separated list of resource types to watch.
    #[clap(long, value_delimiter = ',')]
    resource_types: Vec<ResourceKind>,

    /// Namespace globs scanned by the static target.
    #[clap(long, value_delimiter = ',')]
    namespaces: Vec<String>,

    /// Namespace globs never scanned by the static target.
    #[clap(long, value_delimiter = ',')]
    namespaces_exclude: Vec<String>,

    /// Scan API URL of a target that is always registered.
    #[clap(long, env = "SCAN_CONTROLLER_ENDPOINT")]
    scan_endpoint: Option<String>,

    #[clap(
        long,
        env = "SCAN_CONTROLLER_TOKEN",
        default_value = "",
        hide_env_values = true
    )]
    scan_token: String,

    #[clap(long, env = "SCAN_CONTROLLER_INTEGRATION_ID", default_value = "")]
    integration_id: String,

    /// Timeout of a single scan request.
    #[clap(long, default_value = "30s")]
    scan_timeout: k8s::Interval,

    #[clap(long, default_value = "16")]
    max_concurrent_dispatches: NonZeroUsize,

    /// Disables registration of targets from ScanIntegration resources.
    #[clap(long)]
    integrations_disabled: bool,
}

impl Args {
    #[inline]
    pub async fn parse_and_run() -> Result<()> {
        Self::parse().run().await
    }

    pub async fn run(self) -> Result<()> {
        let Self {
            log_level,
            log_format,
            client,
            admin,
            debounce_interval,
            minimum_scan_interval,
            watch_all_resources,
            resource_types,
            namespaces,
            namespaces_exclude,
            scan_endpoint,
            scan_token,
            integration_id,
            scan_timeout,
            max_concurrent_dispatches,
            integrations_disabled,
        } = self;

        let kinds = ResourceKind::watched(watch_all_resources, &resource_types);
        let new_client = NewHttpClient::new(scan_timeout.as_duration())?;

        let mut prom = <Prometheus>::default();
        let metrics = Metrics::register(prom.sub_registry_with_prefix("scan_dispatch"));
        let rt_metrics = kubert::RuntimeMetrics::register(prom.sub_registry_with_prefix("kube"));

        let mut runtime = kubert::Runtime::builder()
            .with_log(log_level, log_format)
            .with_metrics(rt_metrics)
            .with_admin(admin.into_builder().with_prometheus(prom))
            .with_client(client)
            .build()
            .await?;

        // The registry outlives the shutdown signal until every handle,
        // including the debouncer's final flush, is gone.
        let (registry, targets) = Registry::new(Arc::new(new_client), metrics.clone());
        tokio::spawn(
            registry
                .run(runtime.shutdown_handle())
                .instrument(info_span!("registry")),
        );

        let debouncer = Debouncer::new(
            dispatch::Config {
                debounce_interval: debounce_interval.as_duration(),
                min_interval: minimum_scan_interval.as_duration(),
                suppress_initial_flush: true,
                max_concurrent_dispatches: max_concurrent_dispatches.get(),
            },
            targets.clone(),
            metrics,
        );
        tokio::spawn(
            debouncer
                .clone()
                .run(runtime.shutdown_handle())
                .instrument(info_span!("debouncer")),
        );

        if let Some(endpoint) = scan_endpoint {
            info!(%endpoint, "Registering static target");
            let spec = TargetSpec {
                endpoint,
                token: scan_token,
                integration_id,
                namespaces,
                namespaces_exclude,
            };
            targets.add(STATIC_TARGET, spec).await;
        }

        // Spawn resource watches.

        info!(kinds = ?kinds, "Watching resources");
        let watched: Arc<[ResourceKind]> = kinds.into();
        for &kind in watched.iter() {
            let observer =
                Observer::new(kind, watched.clone(), targets.clone(), debouncer.clone());
            let drain = runtime.shutdown_handle();
            let config = watcher::Config::default();
            let task = match kind {
                ResourceKind::Deployment => observer
                    .run(runtime.watch_all::<k8s::Deployment>(config), drain)
                    .boxed(),
                ResourceKind::DaemonSet => observer
                    .run(runtime.watch_all::<k8s::DaemonSet>(config), drain)
                    .boxed(),
                ResourceKind::StatefulSet => observer
                    .run(runtime.watch_all::<k8s::StatefulSet>(config), drain)
                    .boxed(),
                ResourceKind::ReplicaSet => observer
                    .run(runtime.watch_all::<k8s::ReplicaSet>(config), drain)
                    .boxed(),
                ResourceKind::Pod => observer
                    .run(runtime.watch_all::<k8s::Pod>(config), drain)
                    .boxed(),
                ResourceKind::Job => observer
                    .run(runtime.watch_all::<k8s::Job>(config), drain)
                    .boxed(),
                ResourceKind::CronJob => observer
                    .run(runtime.watch_all::<k8s::CronJob>(config), drain)
                    .boxed(),
                ResourceKind::Service => observer
                    .run(runtime.watch_all::<k8s::Service>(config), drain)
                    .boxed(),
                ResourceKind::Ingress => observer
                    .run(runtime.watch_all::<k8s::Ingress>(config), drain)
                    .boxed(),
                ResourceKind::Namespace => observer
                    .run(runtime.watch_all::<k8s::Namespace>(config), drain)
                    .boxed(),
            };
            tokio::spawn(task.instrument(info_span!("observer", %kind)));
        }

        if integrations_disabled {
            info!("ScanIntegration resources are ignored");
        } else if api_resource_exists::<k8s::ScanIntegration>(&runtime.client()).await {
            let integrations =
                runtime.watch_all::<k8s::ScanIntegration>(watcher::Config::default());
            let tokens = Arc::new(SecretTokens::new(runtime.client()));
            tokio::spawn(
                Integrations::new(targets.clone(), tokens)
                    .run(integrations, runtime.shutdown_handle())
                    .instrument(info_span!("scanintegrations")),
            );
        } else {
            warn!("ScanIntegration resource kind not found, skipping watches");
        }

        // Handles held here would keep the registry from draining.
        drop((targets, debouncer));

        // Block the main thread on the shutdown signal. Once it fires, wait for the background tasks to
        // complete before exiting.
        if runtime.run().await.is_err() {
            bail!("Aborted");
        }

        Ok(())
    }
}

async fn api_resource_exists<T>(client: &Client) -> bool
where
    T: Resource,
    T::DynamicType: Default,
{
    let dt = Default::default();
    client
        .list_api_group_resources(&T::api_version(&dt))
        .await
        .ok()
        .iter()
        .flat_map(|r| r.resources.iter())
        .any(|r| r.kind == T::kind(&dt))
}
