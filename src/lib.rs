//! PostgreSQL gauge collector.
//!
//! [`collectors::registry::Gauges`] owns a shared `PgPool`, runs one
//! fixed-delay polling task per metric family and exposes every family as a
//! Prometheus collector whose state is swapped atomically per poll cycle.

pub mod cli;
pub mod collectors;
pub mod exporter;

#[allow(clippy::pedantic)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}
