use arc_swap::ArcSwap;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

/// Optional extensions some families depend on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Extension {
    PgStatTuple,
    PgStatStatements,
}

impl Extension {
    pub const ALL: [Self; 2] = [Self::PgStatTuple, Self::PgStatStatements];

    /// Name as listed in `pg_extension.extname`.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::PgStatTuple => "pgstattuple",
            Self::PgStatStatements => "pg_stat_statements",
        }
    }
}

impl fmt::Display for Extension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What the probe last learned about the server.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub version: String,
    pub short_version: String,
    pub version_num: i64,
    pub extensions: BTreeSet<Extension>,
}

impl Capabilities {
    #[must_use]
    pub fn has(&self, extension: Extension) -> bool {
        self.extensions.contains(&extension)
    }
}

/// Shared, lock-free view of the latest [`Capabilities`].
///
/// The probe replaces the whole snapshot; readers get either the old or the
/// new one.
#[derive(Clone, Debug)]
pub struct CapabilitySnapshot {
    current: Arc<ArcSwap<Capabilities>>,
}

impl Default for CapabilitySnapshot {
    fn default() -> Self {
        Self::new()
    }
}

impl CapabilitySnapshot {
    #[must_use]
    pub fn new() -> Self {
        Self {
            current: Arc::new(ArcSwap::from_pointee(Capabilities::default())),
        }
    }

    #[must_use]
    pub fn load(&self) -> Arc<Capabilities> {
        self.current.load_full()
    }

    pub fn store(&self, capabilities: Capabilities) {
        self.current.store(Arc::new(capabilities));
    }

    #[must_use]
    pub fn has(&self, extension: Extension) -> bool {
        self.current.load().has(extension)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_names() {
        assert_eq!(Extension::PgStatTuple.name(), "pgstattuple");
        assert_eq!(Extension::PgStatStatements.to_string(), "pg_stat_statements");
    }

    #[test]
    fn test_snapshot_starts_empty() {
        let snapshot = CapabilitySnapshot::new();
        assert!(snapshot.load().version.is_empty());
        assert!(!snapshot.has(Extension::PgStatTuple));
    }

    #[test]
    fn test_store_replaces_whole_snapshot() {
        let snapshot = CapabilitySnapshot::new();
        let reader = snapshot.clone();

        snapshot.store(Capabilities {
            version: "PostgreSQL 16.2".to_string(),
            short_version: "16.2.0".to_string(),
            version_num: 160_002,
            extensions: BTreeSet::from([Extension::PgStatTuple]),
        });
        assert!(reader.has(Extension::PgStatTuple));

        // An extension dropped between probes must disappear.
        snapshot.store(Capabilities {
            version: "PostgreSQL 16.2".to_string(),
            ..Capabilities::default()
        });
        assert!(!reader.has(Extension::PgStatTuple));
        assert_eq!(reader.load().version, "PostgreSQL 16.2");
    }
}
