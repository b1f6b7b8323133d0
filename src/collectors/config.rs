use crate::collectors::{COLLECTOR_NAMES, enabled_by_default};
use anyhow::{Result, bail};
use prometheus::Opts;
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tracing::warn;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Settings shared by every poller of one engine.
#[derive(Clone, Debug)]
pub struct GaugesConfig {
    pub namespace: String,
    pub poll_interval: Duration,
    pub query_timeout: Duration,
    pub const_labels: HashMap<String, String>,
    pub enabled_collectors: HashSet<String>,
}

impl Default for GaugesConfig {
    fn default() -> Self {
        Self {
            namespace: String::new(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            query_timeout: DEFAULT_QUERY_TIMEOUT,
            const_labels: HashMap::new(),
            enabled_collectors: HashSet::new(),
        }
    }
}

impl GaugesConfig {
    #[must_use]
    pub fn new(namespace: &str, poll_interval: Duration, query_timeout: Duration) -> Self {
        Self {
            namespace: namespace.to_string(),
            poll_interval,
            query_timeout,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_namespace(mut self, namespace: &str) -> Self {
        self.namespace = namespace.to_string();
        self
    }

    #[must_use]
    pub fn with_labels(mut self, labels: HashMap<String, String>) -> Self {
        self.const_labels = labels;
        self
    }

    #[must_use]
    pub fn with_enabled(mut self, collectors: &[String]) -> Self {
        self.enabled_collectors = collectors.iter().cloned().collect();
        self
    }

    /// Enable every family that is on unless explicitly disabled.
    #[must_use]
    pub fn with_default_collectors(mut self) -> Self {
        self.enabled_collectors = COLLECTOR_NAMES
            .iter()
            .filter(|name| enabled_by_default(name))
            .map(|name| (*name).to_string())
            .collect();
        self
    }

    #[must_use]
    pub fn is_enabled(&self, name: &str) -> bool {
        self.enabled_collectors.contains(name)
    }

    /// Gauge options carrying the namespace and the constant labels.
    #[must_use]
    pub fn opts(&self, name: &str, help: &str) -> Opts {
        self.unprefixed_opts(name, help)
            .namespace(self.namespace.clone())
    }

    /// Gauge options for metric names that never take the namespace prefix.
    #[must_use]
    pub fn unprefixed_opts(&self, name: &str, help: &str) -> Opts {
        Opts::new(name, help).const_labels(self.const_labels.clone())
    }

    /// Reject configurations no poller could run with.
    ///
    /// # Errors
    ///
    /// Returns an error for unknown collector names or zero durations.
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval.is_zero() {
            bail!("poll interval must be greater than zero");
        }

        if self.query_timeout.is_zero() {
            bail!("query timeout must be greater than zero");
        }

        let mut unknown: Vec<&str> = self
            .enabled_collectors
            .iter()
            .map(String::as_str)
            .filter(|name| !COLLECTOR_NAMES.contains(name))
            .collect();

        if !unknown.is_empty() {
            unknown.sort_unstable();
            bail!(
                "unknown collectors: {} (available: {})",
                unknown.join(", "),
                COLLECTOR_NAMES.join(", ")
            );
        }

        Ok(())
    }

    /// Configuration problems that degrade behaviour without preventing startup.
    #[must_use]
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.query_timeout >= self.poll_interval {
            warnings.push(format!(
                "query timeout ({:?}) is not shorter than the poll interval ({:?}); cycles will run back to back",
                self.query_timeout, self.poll_interval
            ));
        }

        warnings
    }

    pub fn log_warnings(&self) {
        for warning in self.warnings() {
            warn!("{warning}");
        }
    }

    /// Number of concurrent pollers: every enabled family plus the version probe.
    #[must_use]
    pub fn poller_count(&self) -> usize {
        self.enabled_collectors.len() + 1
    }
}
