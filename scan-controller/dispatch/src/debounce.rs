//! Coalesces bursts of resource changes into well-spaced flushes.
//!
//! Every [`Debouncer::add`] records the changed resource and pushes the flush
//! deadline out to `debounce_interval` from now, so a flush happens only
//! after a quiet period. A flush that would follow the previous one by less
//! than `min_interval` is rescheduled for the remaining time instead of being
//! dropped; changes recorded during that wait join the same pending set and
//! do not move the rescheduled deadline, which bounds the time between
//! flushes even when changes never stop.
//!
//! The very first flush is discarded: it consists of every object observed
//! while the watches were starting up.

use crate::{
    flush,
    metrics::{FlushOutcome, Metrics},
    registry,
};
use futures::future;
use parking_lot::Mutex;
use scan_controller_core::{ResourceKey, Revision};
use std::{collections::HashMap, sync::Arc};
use tokio::{
    sync::Notify,
    time::{self, Duration, Instant},
};
use tracing::{debug, info};

#[derive(Copy, Clone, Debug)]
pub struct Config {
    /// Quiet period after the last change before a flush.
    pub debounce_interval: Duration,

    /// Minimum time between two dispatching flushes. Zero disables the
    /// limit.
    pub min_interval: Duration,

    /// Discard the first flush after startup.
    pub suppress_initial_flush: bool,

    /// Maximum number of scan requests in flight during a flush.
    pub max_concurrent_dispatches: usize,
}

#[derive(Clone)]
pub struct Debouncer {
    inner: Arc<Inner>,
}

struct Inner {
    config: Config,
    state: Mutex<State>,
    changed: Notify,
    targets: registry::Handle,
    metrics: Metrics,
}

#[derive(Debug)]
struct State {
    pending: HashMap<ResourceKey, Revision>,
    deadline: Option<Instant>,
    rate_limited: bool,
    first_flush: bool,
    last_flush: Option<Instant>,
}

#[derive(Debug)]
enum Poll {
    /// Nothing to do (yet).
    Idle,
    Suppressed(usize),
    RateLimited { wait: Duration, pending: usize },
    Ready(HashMap<ResourceKey, Revision>),
}

// === impl Config ===

impl Default for Config {
    fn default() -> Self {
        Self {
            debounce_interval: Duration::from_secs(10),
            min_interval: Duration::from_secs(2 * 60),
            suppress_initial_flush: true,
            max_concurrent_dispatches: 16,
        }
    }
}

// === impl Debouncer ===

impl Debouncer {
    pub fn new(config: Config, targets: registry::Handle, metrics: Metrics) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                state: Mutex::new(State {
                    pending: HashMap::new(),
                    deadline: None,
                    rate_limited: false,
                    first_flush: true,
                    last_flush: None,
                }),
                changed: Notify::new(),
                targets,
                metrics,
            }),
        }
    }

    /// Records a changed resource. The latest revision for a key wins.
    pub fn add(&self, key: ResourceKey, revision: Revision) {
        let mut state = self.inner.state.lock();
        state.pending.insert(key, revision);
        if !state.rate_limited {
            state.deadline = Some(Instant::now() + self.inner.config.debounce_interval);
        }
        self.inner.metrics.set_pending(state.pending.len());
        drop(state);

        self.inner.changed.notify_one();
    }

    pub fn pending_len(&self) -> usize {
        self.inner.state.lock().pending.len()
    }

    /// Drives the flush timer until shutdown is signaled, then flushes
    /// whatever is still pending (ignoring the rate limit) before releasing
    /// the drain.
    pub async fn run(self, drain: drain::Watch) {
        let shutdown = drain.signaled();
        tokio::pin!(shutdown);

        loop {
            let deadline = self.inner.state.lock().deadline;
            tokio::select! {
                release = &mut shutdown => {
                    self.flush_on_shutdown().await;
                    drop(release);
                    return;
                }
                _ = self.inner.changed.notified() => {}
                _ = sleep_until(deadline) => self.on_timer().await,
            }
        }
    }

    async fn on_timer(&self) {
        match self.poll_flush(Instant::now()) {
            Poll::Idle => {}
            Poll::Suppressed(resources) => {
                debug!(resources, "Discarded initial flush");
                self.inner.metrics.flush(FlushOutcome::Suppressed);
            }
            Poll::RateLimited { wait, pending } => {
                debug!(?wait, pending, "Flush rate limited; rescheduling");
                self.inner.metrics.flush(FlushOutcome::RateLimited);
            }
            Poll::Ready(batch) => {
                self.inner.metrics.flush(FlushOutcome::Dispatched);
                self.dispatch(batch).await;
            }
        }
    }

    fn poll_flush(&self, now: Instant) -> Poll {
        let Inner {
            config, metrics, ..
        } = &*self.inner;
        let mut state = self.inner.state.lock();

        // An `add` may have pushed the deadline out after the timer fired.
        if state.deadline.is_some_and(|deadline| deadline > now) {
            return Poll::Idle;
        }
        state.deadline = None;

        if state.pending.is_empty() {
            state.rate_limited = false;
            return Poll::Idle;
        }

        if std::mem::replace(&mut state.first_flush, false) && config.suppress_initial_flush {
            let resources = state.pending.len();
            state.pending.clear();
            metrics.set_pending(0);
            return Poll::Suppressed(resources);
        }

        if let Some(last) = state.last_flush {
            let elapsed = now.saturating_duration_since(last);
            if elapsed < config.min_interval {
                let wait = config.min_interval - elapsed;
                state.deadline = Some(now + wait);
                state.rate_limited = true;
                return Poll::RateLimited {
                    wait,
                    pending: state.pending.len(),
                };
            }
        }

        state.rate_limited = false;
        state.last_flush = Some(now);
        metrics.set_pending(0);
        Poll::Ready(std::mem::take(&mut state.pending))
    }

    async fn flush_on_shutdown(&self) {
        let batch = {
            let mut state = self.inner.state.lock();
            state.deadline = None;
            if state.first_flush && self.inner.config.suppress_initial_flush {
                state.pending.clear();
                self.inner.metrics.set_pending(0);
                return;
            }
            state.last_flush = Some(Instant::now());
            std::mem::take(&mut state.pending)
        };
        self.inner.metrics.set_pending(0);
        if batch.is_empty() {
            return;
        }

        info!(resources = batch.len(), "Flushing pending changes before shutdown");
        self.inner.metrics.flush(FlushOutcome::Shutdown);
        self.dispatch(batch).await;
    }

    async fn dispatch(&self, batch: HashMap<ResourceKey, Revision>) {
        let targets = self.inner.targets.get_all().await;
        let summary = flush::dispatch(
            &targets,
            &batch,
            self.inner.config.max_concurrent_dispatches,
            &self.inner.metrics,
        )
        .await;
        info!(
            resources = batch.len(),
            targets = targets.len(),
            dispatched = summary.dispatched,
            failed = summary.failed,
            filtered = summary.filtered,
            "Flushed"
        );
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => time::sleep_until(deadline).await,
        None => future::pending().await,
    }
}
