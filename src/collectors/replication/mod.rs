use crate::collectors::Collector;
use crate::collectors::config::GaugesConfig;
use crate::collectors::family::{GaugeFamily, Sample};
use crate::collectors::poller::PollContext;
use crate::collectors::query::QueryError;
use anyhow::Result;
use futures::future::BoxFuture;

// No row on a primary; NULL lag on a standby that has not replayed anything yet.
const REPLICATION_LAG_QUERY: &str = "
    SELECT extract(epoch FROM now() - pg_last_xact_replay_timestamp())::float8 AS lag_seconds
     WHERE pg_is_in_recovery()
";

#[derive(sqlx::FromRow)]
struct ReplicationLagRow {
    #[sqlx(default)]
    lag_seconds: Option<f64>,
}

/// Replay lag of a standby (opt-in; noop on primaries).
#[derive(Clone)]
pub struct ReplicationCollector {
    lag_seconds: GaugeFamily,
}

impl ReplicationCollector {
    /// # Errors
    ///
    /// Returns an error if the namespace or a constant label is invalid.
    pub fn new(config: &GaugesConfig) -> Result<Self> {
        let lag_seconds = GaugeFamily::new(
            config.opts(
                "postgresql_replication_lag_seconds",
                "Seconds since the last transaction replayed on this standby",
            ),
            &[],
        )?;

        Ok(Self { lag_seconds })
    }
}

impl Collector for ReplicationCollector {
    fn name(&self) -> &'static str {
        "replication"
    }

    fn gauge(&self) -> &GaugeFamily {
        &self.lag_seconds
    }

    fn collect<'a>(
        &'a self,
        ctx: &'a PollContext,
    ) -> BoxFuture<'a, Result<Vec<Sample>, QueryError>> {
        Box::pin(async move {
            let rows = ctx
                .executor
                .fetch_all::<ReplicationLagRow>(REPLICATION_LAG_QUERY, &[])
                .await?;

            Ok(rows
                .into_iter()
                .filter_map(|row| row.lag_seconds)
                .map(|lag| Sample::new(Vec::<String>::new(), lag.max(0.0)))
                .collect())
        })
    }

    fn enabled_by_default(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[allow(clippy::unwrap_used)]
    fn test_unlabeled_family_publishes_single_series() {
        let collector = ReplicationCollector::new(&GaugesConfig::default()).unwrap();
        assert!(!collector.enabled_by_default());

        let published = collector
            .gauge()
            .publish(vec![Sample::new(Vec::<String>::new(), 1.5)])
            .unwrap();
        assert_eq!(published, 1);
    }
}
