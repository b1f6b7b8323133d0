//! Fixed-delay poll loop shared by every metric family.

use crate::collectors::Collector;
use crate::collectors::capabilities::CapabilitySnapshot;
use crate::collectors::errors::ErrorSignal;
use crate::collectors::query::QueryExecutor;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info_span};
use tracing_futures::Instrument as _;

/// What a family needs to run its query.
#[derive(Clone, Debug)]
pub struct PollContext {
    pub executor: QueryExecutor,
    pub capabilities: CapabilitySnapshot,
}

/// Result of one poll cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CycleOutcome {
    /// A new generation with this many series was published.
    Published(usize),
    /// A required extension is missing; the family was cleared without querying.
    Skipped,
    /// The server lacks a relation or function the query needs; the family was cleared.
    Absent,
    /// The query failed; the previous generation was kept and the failure counted.
    Failed,
}

/// Drives one [`Collector`] on its own schedule.
pub struct Poller {
    collector: Arc<dyn Collector + Send + Sync>,
    ctx: PollContext,
    errors: ErrorSignal,
    // Serializes background and forced cycles of the same family.
    cycle: Mutex<()>,
}

impl Poller {
    #[must_use]
    pub fn new(
        collector: Arc<dyn Collector + Send + Sync>,
        ctx: PollContext,
        errors: ErrorSignal,
    ) -> Self {
        Self {
            collector,
            ctx,
            errors,
            cycle: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        self.collector.name()
    }

    #[must_use]
    pub fn collector(&self) -> &Arc<dyn Collector + Send + Sync> {
        &self.collector
    }

    /// Run a single cycle: gate on capabilities, query, publish or count the failure.
    pub async fn run_cycle(&self) -> CycleOutcome {
        let _cycle = self.cycle.lock().await;
        let name = self.collector.name();
        let gauge = self.collector.gauge();

        if let Some(extension) = self.collector.requires()
            && !self.ctx.capabilities.has(extension)
        {
            debug!(collector = name, %extension, "extension not installed; skipping");
            gauge.clear();
            return CycleOutcome::Skipped;
        }

        let span = info_span!("collector.collect", collector = name, otel.kind = "internal");
        let result = self.collector.collect(&self.ctx).instrument(span).await;

        match result.and_then(|samples| Ok(gauge.publish(samples)?)) {
            Ok(published) => {
                debug!(collector = name, series = published, "published generation");
                CycleOutcome::Published(published)
            }
            Err(e) if e.is_expected_absence() => {
                debug!(collector = name, error = %e, "required relation not available; clearing");
                gauge.clear();
                CycleOutcome::Absent
            }
            Err(e) => {
                self.errors.record(name, &e);
                CycleOutcome::Failed
            }
        }
    }

    /// Poll until `shutdown` fires, sleeping `interval` after the end of each cycle.
    ///
    /// With `delay_first` the loop sleeps before its first cycle.
    pub async fn run(
        self: Arc<Self>,
        interval: Duration,
        delay_first: bool,
        shutdown: CancellationToken,
    ) {
        let mut delay = delay_first;
        loop {
            if delay {
                tokio::select! {
                    () = shutdown.cancelled() => break,
                    () = tokio::time::sleep(interval) => {}
                }
            }
            delay = true;

            tokio::select! {
                () = shutdown.cancelled() => break,
                _ = self.run_cycle() => {}
            }
        }

        debug!(collector = self.name(), "poller stopped");
    }
}
