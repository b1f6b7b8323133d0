use crate::collectors::Collector;
use crate::collectors::capabilities::{Capabilities, Extension};
use crate::collectors::config::GaugesConfig;
use crate::collectors::family::{GaugeFamily, Sample};
use crate::collectors::poller::PollContext;
use crate::collectors::query::{Param, QueryError, QueryExecutor};
use crate::collectors::util::normalize_version;
use anyhow::Result;
use futures::future::BoxFuture;
use prometheus::Registry;
use std::collections::BTreeSet;
use tracing::{debug, info, instrument};

const VERSION_QUERY: &str = "
    SELECT version() AS version
         , current_setting('server_version') AS server_version
         , current_setting('server_version_num')::bigint AS version_num
";

const EXTENSION_QUERY: &str =
    "SELECT exists(SELECT 1 FROM pg_extension WHERE extname = $1) AS installed";

#[derive(sqlx::FromRow)]
struct VersionRow {
    version: String,
    #[sqlx(default)]
    server_version: Option<String>,
    #[sqlx(default)]
    version_num: Option<i64>,
}

#[derive(sqlx::FromRow)]
struct ExtensionRow {
    installed: bool,
}

/// Version and capability probe.
///
/// Every cycle refreshes the shared capability snapshot other families gate
/// on, and exposes the server version plus one 0/1 series per known extension.
#[derive(Clone)]
pub struct VersionCollector {
    version_info: GaugeFamily,
    extension_installed: GaugeFamily,
}

impl VersionCollector {
    /// # Errors
    ///
    /// Returns an error if the namespace or a constant label is invalid.
    pub fn new(config: &GaugesConfig) -> Result<Self> {
        let version_info = GaugeFamily::new(
            config.opts(
                "postgresql_version_info",
                "PostgreSQL server version, value is always 1",
            ),
            &["version", "short_version"],
        )?;

        let extension_installed = GaugeFamily::new(
            config.opts(
                "postgresql_extension_installed",
                "Whether an optional extension is installed (1=installed, 0=absent)",
            ),
            &["extension"],
        )?;

        Ok(Self {
            version_info,
            extension_installed,
        })
    }

    /// Best-effort presence check; any failure means the extension is treated as absent.
    async fn is_installed(executor: &QueryExecutor, extension: Extension) -> bool {
        match executor
            .fetch_all::<ExtensionRow>(EXTENSION_QUERY, &[Param::Text(extension.name())])
            .await
        {
            Ok(rows) => rows.first().is_some_and(|row| row.installed),
            Err(e) => {
                debug!(%extension, error = %e, "extension check failed; treating as absent");
                false
            }
        }
    }

    #[must_use]
    pub const fn extension_installed(&self) -> &GaugeFamily {
        &self.extension_installed
    }
}

impl Collector for VersionCollector {
    fn name(&self) -> &'static str {
        "version"
    }

    fn gauge(&self) -> &GaugeFamily {
        &self.version_info
    }

    #[instrument(
        skip(self, registry),
        level = "info",
        err,
        fields(collector = "version")
    )]
    fn register_metrics(&self, registry: &Registry) -> Result<()> {
        registry.register(Box::new(self.version_info.clone()))?;
        registry.register(Box::new(self.extension_installed.clone()))?;
        Ok(())
    }

    fn collect<'a>(
        &'a self,
        ctx: &'a PollContext,
    ) -> BoxFuture<'a, Result<Vec<Sample>, QueryError>> {
        Box::pin(async move {
            let row = ctx
                .executor
                .fetch_all::<VersionRow>(VERSION_QUERY, &[])
                .await?
                .into_iter()
                .next()
                .ok_or(QueryError::Decode(sqlx::Error::RowNotFound))?;

            let server_version = row.server_version.unwrap_or_default();
            let (short_version, parsed_num) = normalize_version(&server_version);

            let mut extensions = BTreeSet::new();
            let mut installed = Vec::with_capacity(Extension::ALL.len());
            for extension in Extension::ALL {
                let present = Self::is_installed(&ctx.executor, extension).await;
                if present {
                    extensions.insert(extension);
                }
                installed.push(Sample::new(
                    [extension.name()],
                    if present { 1.0 } else { 0.0 },
                ));
            }

            let previous = ctx.capabilities.load();
            if previous.version != row.version || previous.extensions != extensions {
                info!(
                    version = %row.version,
                    extensions = ?extensions,
                    "server capabilities changed"
                );
            }

            ctx.capabilities.store(Capabilities {
                version: row.version.clone(),
                short_version: short_version.clone(),
                version_num: row.version_num.unwrap_or(parsed_num),
                extensions,
            });
            self.extension_installed.publish(installed)?;

            Ok(vec![Sample::new([row.version, short_version], 1.0)])
        })
    }

    fn enabled_by_default(&self) -> bool {
        true
    }
}
