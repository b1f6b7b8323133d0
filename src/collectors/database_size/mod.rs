use crate::collectors::Collector;
use crate::collectors::config::GaugesConfig;
use crate::collectors::family::{GaugeFamily, Sample};
use crate::collectors::poller::PollContext;
use crate::collectors::query::QueryError;
use anyhow::Result;
use futures::future::BoxFuture;

const DATABASE_SIZE_QUERY: &str = "
    SELECT current_database() AS datname
         , pg_database_size(current_database())::float8 AS size_bytes
";

#[derive(sqlx::FromRow)]
struct DatabaseSizeRow {
    datname: String,
    #[sqlx(default)]
    size_bytes: Option<f64>,
}

/// On-disk size of the monitored database.
#[derive(Clone)]
pub struct DatabaseSizeCollector {
    size_bytes: GaugeFamily,
}

impl DatabaseSizeCollector {
    /// # Errors
    ///
    /// Returns an error if the namespace or a constant label is invalid.
    pub fn new(config: &GaugesConfig) -> Result<Self> {
        let size_bytes = GaugeFamily::new(
            config.opts(
                "postgresql_database_size_bytes",
                "Disk space used by the database in bytes",
            ),
            &["database"],
        )?;

        Ok(Self { size_bytes })
    }
}

impl Collector for DatabaseSizeCollector {
    fn name(&self) -> &'static str {
        "database_size"
    }

    fn gauge(&self) -> &GaugeFamily {
        &self.size_bytes
    }

    fn collect<'a>(
        &'a self,
        ctx: &'a PollContext,
    ) -> BoxFuture<'a, Result<Vec<Sample>, QueryError>> {
        Box::pin(async move {
            let rows = ctx
                .executor
                .fetch_all::<DatabaseSizeRow>(DATABASE_SIZE_QUERY, &[])
                .await?;

            Ok(rows
                .into_iter()
                .map(|row| Sample::new([row.datname], row.size_bytes.unwrap_or_default()))
                .collect())
        })
    }

    fn enabled_by_default(&self) -> bool {
        true
    }
}
