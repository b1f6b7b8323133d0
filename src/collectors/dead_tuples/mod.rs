use crate::collectors::Collector;
use crate::collectors::capabilities::Extension;
use crate::collectors::config::GaugesConfig;
use crate::collectors::family::{GaugeFamily, Sample};
use crate::collectors::poller::PollContext;
use crate::collectors::query::QueryError;
use anyhow::Result;
use futures::future::BoxFuture;

const DEAD_TUPLES_QUERY: &str = "
    SELECT n.nspname AS schemaname
         , c.relname AS relname
         , s.dead_tuple_percent::float8 AS dead_tuple_percent
      FROM pg_class c
      JOIN pg_namespace n ON n.oid = c.relnamespace
     CROSS JOIN LATERAL pgstattuple(c.oid) s
     WHERE c.relkind = 'r'
       AND c.relpersistence <> 't'
       AND n.nspname NOT IN ('pg_catalog', 'information_schema')
       AND n.nspname NOT LIKE 'pg_toast%'
";

#[derive(sqlx::FromRow)]
struct DeadTuplesRow {
    schemaname: String,
    relname: String,
    #[sqlx(default)]
    dead_tuple_percent: Option<f64>,
}

/// Dead tuple percentage per table (requires `pgstattuple`).
///
/// Emits no series at all while the extension is missing, so "not
/// measurable" stays distinguishable from "measured zero".
#[derive(Clone)]
pub struct DeadTuplesCollector {
    dead_tuples: GaugeFamily,
}

impl DeadTuplesCollector {
    /// # Errors
    ///
    /// Returns an error if the namespace or a constant label is invalid.
    pub fn new(config: &GaugesConfig) -> Result<Self> {
        let dead_tuples = GaugeFamily::new(
            config.opts(
                "postgresql_dead_tuples",
                "Percentage of dead tuples per table (pgstattuple)",
            ),
            &["schema", "table"],
        )?;

        Ok(Self { dead_tuples })
    }
}

impl Collector for DeadTuplesCollector {
    fn name(&self) -> &'static str {
        "dead_tuples"
    }

    fn gauge(&self) -> &GaugeFamily {
        &self.dead_tuples
    }

    fn requires(&self) -> Option<Extension> {
        Some(Extension::PgStatTuple)
    }

    fn collect<'a>(
        &'a self,
        ctx: &'a PollContext,
    ) -> BoxFuture<'a, Result<Vec<Sample>, QueryError>> {
        Box::pin(async move {
            let rows = ctx
                .executor
                .fetch_all::<DeadTuplesRow>(DEAD_TUPLES_QUERY, &[])
                .await?;

            Ok(rows
                .into_iter()
                .map(|row| {
                    Sample::new(
                        [row.schemaname, row.relname],
                        row.dead_tuple_percent.unwrap_or_default(),
                    )
                })
                .collect())
        })
    }

    fn enabled_by_default(&self) -> bool {
        true
    }
}
