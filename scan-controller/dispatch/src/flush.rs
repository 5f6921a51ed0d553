use crate::{metrics::Metrics, registry::Target};
use futures::prelude::*;
use scan_controller_core::{ResourceKey, Revision};
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};
use tracing::{debug, trace, warn};

#[derive(Debug, Default)]
pub(crate) struct Summary {
    pub dispatched: usize,
    pub failed: usize,
    pub filtered: usize,
}

/// Sends one scan request per (target, resource) pair admitted by the
/// target's namespace filter.
///
/// Pairs are dispatched concurrently, up to `limit` at a time, and
/// independently: a failure is logged and never affects other pairs.
pub(crate) async fn dispatch(
    targets: &[Arc<Target>],
    batch: &HashMap<ResourceKey, Revision>,
    limit: usize,
    metrics: &Metrics,
) -> Summary {
    let dispatched = AtomicUsize::new(0);
    let failed = AtomicUsize::new(0);
    let mut filtered = 0;

    let mut calls = Vec::with_capacity(targets.len() * batch.len());
    for target in targets {
        for (key, revision) in batch {
            if target.filter.allows(key.namespace()) {
                calls.push((target, key, revision));
            } else {
                trace!(tenant = %target.key, resource = %key, "Filtered by namespace");
                metrics.filtered();
                filtered += 1;
            }
        }
    }

    stream::iter(calls)
        .for_each_concurrent(limit, |(target, key, revision)| {
            let (dispatched, failed) = (&dispatched, &failed);
            async move {
                match target
                    .client
                    .scan(&target.integration_id, key, revision)
                    .await
                {
                    Ok(()) => {
                        debug!(tenant = %target.key, resource = %key, "Dispatched scan");
                        metrics.dispatch(true);
                        dispatched.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(error) => {
                        warn!(tenant = %target.key, resource = %key, %error, "Failed to dispatch scan");
                        metrics.dispatch(false);
                        failed.fetch_add(1, Ordering::Relaxed);
                    }
                }
            }
        })
        .await;

    Summary {
        dispatched: dispatched.into_inner(),
        failed: failed.into_inner(),
        filtered,
    }
}
