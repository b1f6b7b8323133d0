use crate::collectors::capabilities::{Capabilities, CapabilitySnapshot};
use crate::collectors::config::GaugesConfig;
use crate::collectors::errors::ErrorSignal;
use crate::collectors::family::GaugeFamily;
use crate::collectors::poller::{CycleOutcome, PollContext, Poller};
use crate::collectors::query::QueryExecutor;
use crate::collectors::version::VersionCollector;
use crate::collectors::{COLLECTOR_NAMES, Collector, all_factories};
use anyhow::{Context, Result, anyhow};
use prometheus::Registry;
use sqlx::PgPool;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// The collector engine.
///
/// Owns the shared pool handle, one [`Poller`] task per enabled family plus
/// the version probe, and the [`ErrorSignal`]. Pollers start in [`Gauges::new`]
/// and run until [`Gauges::shutdown`] or until the engine is dropped.
pub struct Gauges {
    config: Arc<GaugesConfig>,
    errors: ErrorSignal,
    capabilities: CapabilitySnapshot,
    probe: Arc<Poller>,
    pollers: Vec<Arc<Poller>>,
    shutdown: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Gauges {
    /// Build the engine, probe the server once and start every poller.
    ///
    /// The pool is shared, not owned: closing it stays with the caller.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid, a metric cannot be
    /// built, or the server cannot be reached. No poller is started then.
    #[instrument(skip(pool, config), level = "info", err, fields(namespace = %config.namespace))]
    pub async fn new(pool: PgPool, config: GaugesConfig) -> Result<Self> {
        config.validate()?;
        config.log_warnings();

        let errors = ErrorSignal::new(&config)?;
        let capabilities = CapabilitySnapshot::new();
        let ctx = PollContext {
            executor: QueryExecutor::new(pool, config.query_timeout),
            capabilities: capabilities.clone(),
        };

        let probe = Arc::new(Poller::new(
            Arc::new(VersionCollector::new(&config)?),
            ctx.clone(),
            errors.clone(),
        ));

        let factories = all_factories();
        let mut pollers = Vec::with_capacity(config.enabled_collectors.len());
        for name in COLLECTOR_NAMES {
            if !config.is_enabled(name) {
                continue;
            }

            let factory = factories
                .get(name)
                .ok_or_else(|| anyhow!("no factory for collector {name}"))?;
            let collector =
                factory(&config).with_context(|| format!("failed to build collector {name}"))?;

            debug!(collector = name, "collector enabled");
            pollers.push(Arc::new(Poller::new(
                Arc::new(collector),
                ctx.clone(),
                errors.clone(),
            )));
        }

        let max_connections = ctx.executor.pool().options().get_max_connections() as usize;
        let concurrent = pollers.len() + 1;
        if max_connections < concurrent {
            warn!(
                max_connections,
                pollers = concurrent,
                "pool is smaller than the number of pollers; queries will queue"
            );
        }

        ctx.executor
            .ping()
            .await
            .context("failed to reach the database")?;

        // Capabilities must be known before gated families run their first cycle.
        let outcome = probe.run_cycle().await;
        debug!(?outcome, "initial capability probe");

        let gauges = Self {
            config: Arc::new(config),
            errors,
            capabilities,
            probe,
            pollers,
            shutdown: CancellationToken::new(),
            tasks: Mutex::new(Vec::new()),
        };
        gauges.spawn().await;

        info!(
            version = %gauges.version(),
            collectors = ?gauges.families(),
            interval = ?gauges.config.poll_interval,
            "gauges started"
        );

        Ok(gauges)
    }

    async fn spawn(&self) {
        let interval = self.config.poll_interval;
        let mut tasks = self.tasks.lock().await;

        tasks.push(tokio::spawn(Arc::clone(&self.probe).run(
            interval,
            true,
            self.shutdown.clone(),
        )));

        for poller in &self.pollers {
            tasks.push(tokio::spawn(Arc::clone(poller).run(
                interval,
                false,
                self.shutdown.clone(),
            )));
        }
    }

    #[must_use]
    pub fn config(&self) -> &GaugesConfig {
        &self.config
    }

    #[must_use]
    pub const fn errors(&self) -> &ErrorSignal {
        &self.errors
    }

    /// Full server version string from the latest probe.
    #[must_use]
    pub fn version(&self) -> String {
        self.capabilities.load().version.clone()
    }

    #[must_use]
    pub fn capabilities(&self) -> Arc<Capabilities> {
        self.capabilities.load()
    }

    /// Gauge of an enabled family, or the version probe as `"version"`.
    #[must_use]
    pub fn family(&self, name: &str) -> Option<&GaugeFamily> {
        std::iter::once(&self.probe)
            .chain(&self.pollers)
            .find(|poller| poller.name() == name)
            .map(|poller| poller.collector().gauge())
    }

    /// Names of the enabled families, in polling order.
    #[must_use]
    pub fn families(&self) -> Vec<&'static str> {
        self.pollers.iter().map(|poller| poller.name()).collect()
    }

    /// Register the error signal, the probe and every family.
    ///
    /// # Errors
    ///
    /// Returns an error if any metric is already registered with `registry`.
    #[instrument(skip(self, registry), level = "info", err)]
    pub fn register_metrics(&self, registry: &Registry) -> Result<()> {
        registry.register(Box::new(self.errors.clone()))?;

        for poller in std::iter::once(&self.probe).chain(&self.pollers) {
            let collector = poller.collector();
            match collector.register_metrics(registry) {
                Ok(()) => debug!(collector = collector.name(), "registered metrics"),
                Err(e) => {
                    warn!(collector = collector.name(), error = %e, "failed to register metrics");
                    return Err(e);
                }
            }
        }

        Ok(())
    }

    /// Run one cycle of every poller now, probe first.
    ///
    /// Cycles already in flight finish before the forced ones start.
    pub async fn collect_once(&self) -> Vec<(&'static str, CycleOutcome)> {
        let mut outcomes = Vec::with_capacity(self.pollers.len() + 1);
        for poller in std::iter::once(&self.probe).chain(&self.pollers) {
            outcomes.push((poller.name(), poller.run_cycle().await));
        }
        outcomes
    }

    /// Stop every poller and wait for their tasks to finish.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();

        let tasks: Vec<JoinHandle<()>> = self.tasks.lock().await.drain(..).collect();
        for task in tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "poller task ended abnormally");
            }
        }

        info!("gauges stopped");
    }
}

impl Drop for Gauges {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
