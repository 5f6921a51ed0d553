use prometheus_client::{
    encoding::EncodeLabelSet,
    metrics::{counter::Counter, family::Family, gauge::Gauge},
    registry::Registry,
};

/// Dispatch engine metrics. The default value is unregistered.
#[derive(Clone, Debug, Default)]
pub struct Metrics {
    flushes: Family<OutcomeLabels, Counter>,
    dispatches: Family<ResultLabels, Counter>,
    registrations: Family<ResultLabels, Counter>,
    filtered: Counter,
    pending: Gauge,
    targets: Gauge,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum FlushOutcome {
    Dispatched,
    Suppressed,
    RateLimited,
    Shutdown,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct OutcomeLabels {
    outcome: &'static str,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct ResultLabels {
    result: &'static str,
}

// === impl Metrics ===

impl Metrics {
    pub fn register(reg: &mut Registry) -> Self {
        let flushes = Family::default();
        reg.register(
            "flushes",
            "Count of debounce timer firings by outcome",
            flushes.clone(),
        );

        let dispatches = Family::default();
        reg.register(
            "dispatches",
            "Count of scan requests sent to targets",
            dispatches.clone(),
        );

        let registrations = Family::default();
        reg.register(
            "registrations",
            "Count of target registrations",
            registrations.clone(),
        );

        let filtered = Counter::default();
        reg.register(
            "filtered",
            "Count of resource changes skipped by a target's namespace filter",
            filtered.clone(),
        );

        let pending = Gauge::default();
        reg.register(
            "pending",
            "Number of changed resources waiting for the next flush",
            pending.clone(),
        );

        let targets = Gauge::default();
        reg.register("targets", "Number of registered targets", targets.clone());

        Self {
            flushes,
            dispatches,
            registrations,
            filtered,
            pending,
            targets,
        }
    }

    pub(crate) fn flush(&self, outcome: FlushOutcome) {
        let outcome = match outcome {
            FlushOutcome::Dispatched => "dispatched",
            FlushOutcome::Suppressed => "suppressed",
            FlushOutcome::RateLimited => "rate_limited",
            FlushOutcome::Shutdown => "shutdown",
        };
        self.flushes.get_or_create(&OutcomeLabels { outcome }).inc();
    }

    pub(crate) fn dispatch(&self, ok: bool) {
        self.dispatches.get_or_create(&ResultLabels::new(ok)).inc();
    }

    pub(crate) fn registration(&self, ok: bool) {
        self.registrations.get_or_create(&ResultLabels::new(ok)).inc();
    }

    pub(crate) fn filtered(&self) {
        self.filtered.inc();
    }

    pub(crate) fn set_pending(&self, n: usize) {
        self.pending.set(n as i64);
    }

    pub(crate) fn set_targets(&self, n: usize) {
        self.targets.set(n as i64);
    }

    #[cfg(test)]
    pub(crate) fn pending(&self) -> i64 {
        self.pending.get()
    }
}

impl ResultLabels {
    fn new(ok: bool) -> Self {
        Self {
            result: if ok { "ok" } else { "error" },
        }
    }
}
