use crate::collectors::Collector;
use crate::collectors::config::GaugesConfig;
use crate::collectors::family::{GaugeFamily, Sample};
use crate::collectors::poller::PollContext;
use crate::collectors::query::QueryError;
use anyhow::Result;
use futures::future::BoxFuture;

const WRITING_USAGE_QUERY: &str = "
    SELECT coalesce(tup_inserted, 0)::float8 AS tup_inserted
         , coalesce(tup_updated, 0)::float8 AS tup_updated
         , coalesce(tup_deleted, 0)::float8 AS tup_deleted
      FROM pg_stat_database
     WHERE datname = current_database()
";

#[derive(sqlx::FromRow, Default)]
struct WritingUsageRow {
    #[sqlx(default)]
    tup_inserted: Option<f64>,
    #[sqlx(default)]
    tup_updated: Option<f64>,
    #[sqlx(default)]
    tup_deleted: Option<f64>,
}

impl WritingUsageRow {
    fn into_samples(self) -> Vec<Sample> {
        vec![
            Sample::new(["tup_inserted"], self.tup_inserted.unwrap_or_default()),
            Sample::new(["tup_updated"], self.tup_updated.unwrap_or_default()),
            Sample::new(["tup_deleted"], self.tup_deleted.unwrap_or_default()),
        ]
    }
}

/// Inserted, updated and deleted row counts of the current database.
///
/// Always three series; missing statistics read as zero.
#[derive(Clone)]
pub struct WritingUsageCollector {
    writing_usage: GaugeFamily,
}

impl WritingUsageCollector {
    /// # Errors
    ///
    /// Returns an error if a constant label is invalid.
    pub fn new(config: &GaugesConfig) -> Result<Self> {
        // Exposed without the namespace prefix; dashboards query it by this exact name.
        let writing_usage = GaugeFamily::new(
            config.unprefixed_opts(
                "postgresql_database_writing_usage",
                "Number of inserted, updated and deleted rows per database",
            ),
            &["stat"],
        )?;

        Ok(Self { writing_usage })
    }
}

impl Collector for WritingUsageCollector {
    fn name(&self) -> &'static str {
        "writing_usage"
    }

    fn gauge(&self) -> &GaugeFamily {
        &self.writing_usage
    }

    fn collect<'a>(
        &'a self,
        ctx: &'a PollContext,
    ) -> BoxFuture<'a, Result<Vec<Sample>, QueryError>> {
        Box::pin(async move {
            let row = ctx
                .executor
                .fetch_all::<WritingUsageRow>(WRITING_USAGE_QUERY, &[])
                .await?
                .into_iter()
                .next()
                .unwrap_or_default();

            Ok(row.into_samples())
        })
    }

    fn enabled_by_default(&self) -> bool {
        true
    }
}
