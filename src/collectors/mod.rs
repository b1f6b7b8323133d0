use anyhow::Result;
use futures::future::BoxFuture;
use prometheus::Registry;
use std::collections::HashMap;

#[macro_use]
mod register_macro;

pub mod capabilities;
pub mod config;
pub mod errors;
pub mod family;
pub mod poller;
pub mod query;
pub mod registry;
pub mod util;
pub mod version;

use capabilities::Extension;
use config::GaugesConfig;
use family::{GaugeFamily, Sample};
use poller::PollContext;
use query::QueryError;

/// One metric family polled on its own schedule.
pub trait Collector {
    fn name(&self) -> &'static str;

    /// The gauge the poll loop publishes each generation into.
    fn gauge(&self) -> &GaugeFamily;

    /// Extension that must be installed before the family queries at all.
    fn requires(&self) -> Option<Extension> {
        None
    }

    /// Register metrics with the prometheus registry.
    ///
    /// # Errors
    ///
    /// Returns an error if any metric fails to register.
    fn register_metrics(&self, registry: &Registry) -> Result<()> {
        registry.register(Box::new(self.gauge().clone()))?;
        Ok(())
    }

    /// Run the family's query and return the next generation of samples.
    fn collect<'a>(
        &'a self,
        ctx: &'a PollContext,
    ) -> BoxFuture<'a, Result<Vec<Sample>, QueryError>>;

    fn enabled_by_default(&self) -> bool {
        false
    }
}

register_collectors! {
    dead_tuples => DeadTuplesCollector,
    writing_usage => WritingUsageCollector,
    database_size => DatabaseSizeCollector,
    backends => BackendsCollector,
    replication => ReplicationCollector,
}
