use crate::collectors::Collector;
use crate::collectors::config::GaugesConfig;
use crate::collectors::family::{GaugeFamily, Sample};
use crate::collectors::poller::PollContext;
use crate::collectors::query::QueryError;
use anyhow::Result;
use futures::future::BoxFuture;

const BACKENDS_QUERY: &str = "
    SELECT coalesce(state, 'unknown') AS state
         , count(*)::float8 AS backends
      FROM pg_stat_activity
     WHERE datname = current_database()
     GROUP BY 1
";

#[derive(sqlx::FromRow)]
struct BackendsRow {
    state: String,
    #[sqlx(default)]
    backends: Option<f64>,
}

/// Backends connected to the monitored database, by state.
///
/// States with no backends disappear from the output on the next cycle.
#[derive(Clone)]
pub struct BackendsCollector {
    backends: GaugeFamily,
}

impl BackendsCollector {
    /// # Errors
    ///
    /// Returns an error if the namespace or a constant label is invalid.
    pub fn new(config: &GaugesConfig) -> Result<Self> {
        let backends = GaugeFamily::new(
            config.opts(
                "postgresql_backends",
                "Number of backends connected to the database by state",
            ),
            &["state"],
        )?;

        Ok(Self { backends })
    }
}

impl Collector for BackendsCollector {
    fn name(&self) -> &'static str {
        "backends"
    }

    fn gauge(&self) -> &GaugeFamily {
        &self.backends
    }

    fn collect<'a>(
        &'a self,
        ctx: &'a PollContext,
    ) -> BoxFuture<'a, Result<Vec<Sample>, QueryError>> {
        Box::pin(async move {
            let rows = ctx
                .executor
                .fetch_all::<BackendsRow>(BACKENDS_QUERY, &[])
                .await?;

            Ok(rows
                .into_iter()
                .map(|row| Sample::new([row.state], row.backends.unwrap_or_default()))
                .collect())
        })
    }

    fn enabled_by_default(&self) -> bool {
        true
    }
}
