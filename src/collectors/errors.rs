use crate::collectors::config::GaugesConfig;
use crate::collectors::query::QueryError;
use prometheus::core::{Collector as PromCollector, Desc};
use prometheus::proto::MetricFamily;
use prometheus::Gauge;
use tracing::warn;

/// Cumulative count of unexpected query failures across every poller.
///
/// Exposed as a single gauge series from construction on, starting at 0.
/// It is only ever incremented.
#[derive(Clone)]
pub struct ErrorSignal {
    errors: Gauge,
}

impl ErrorSignal {
    /// # Errors
    ///
    /// Returns an error if the namespace or a constant label is invalid.
    pub fn new(config: &GaugesConfig) -> prometheus::Result<Self> {
        let errors = Gauge::with_opts(config.opts(
            "postgresql_query_errors",
            "Number of failed queries since the collector started",
        ))?;

        Ok(Self { errors })
    }

    /// Count one failed poll cycle of `collector`.
    pub fn record(&self, collector: &str, error: &QueryError) {
        self.errors.inc();
        warn!(
            collector,
            kind = ?error.kind(),
            error = %error,
            total = self.errors.get(),
            "query failed"
        );
    }

    #[must_use]
    pub fn value(&self) -> f64 {
        self.errors.get()
    }
}

impl PromCollector for ErrorSignal {
    fn desc(&self) -> Vec<&Desc> {
        self.errors.desc()
    }

    fn collect(&self) -> Vec<MetricFamily> {
        self.errors.collect()
    }
}
