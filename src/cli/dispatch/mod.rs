use crate::{
    cli::actions::Action,
    collectors::{COLLECTOR_NAMES, config::GaugesConfig, enabled_by_default, util::parse_labels},
};
use anyhow::{Context, Result, anyhow};
use clap::ArgMatches;
use secrecy::SecretString;
use std::time::Duration;

/// # Errors
///
/// Returns an error if required arguments are missing or a `--label` is malformed
pub fn handler(matches: &ArgMatches) -> Result<Action> {
    let port = matches
        .get_one::<u16>("port")
        .copied()
        .ok_or_else(|| anyhow!("Port is required. Please provide it using the --port flag."))?;

    // None means auto-detect
    let listen = matches
        .get_one::<String>("listen")
        .map(std::string::ToString::to_string);

    let dsn = SecretString::from(
        matches
            .get_one::<String>("dsn")
            .cloned()
            .ok_or_else(|| anyhow!("DSN is required. Please provide it using the --dsn flag."))?,
    );

    Ok(Action::Run {
        port,
        listen,
        dsn,
        config: gauges_config(matches)?,
    })
}

fn gauges_config(matches: &ArgMatches) -> Result<GaugesConfig> {
    let namespace = matches
        .get_one::<String>("namespace")
        .map_or("", String::as_str);

    let poll_interval = matches
        .get_one::<u64>("poll-interval")
        .copied()
        .map(Duration::from_secs)
        .ok_or_else(|| anyhow!("--poll-interval is required"))?;

    let query_timeout = matches
        .get_one::<u64>("query-timeout")
        .copied()
        .map(Duration::from_secs)
        .ok_or_else(|| anyhow!("--query-timeout is required"))?;

    let labels: Vec<&str> = matches
        .get_many::<String>("label")
        .map(|vals| {
            vals.map(|s| s.trim())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default();

    let const_labels = parse_labels(&labels).context("invalid --label")?;

    Ok(GaugesConfig::new(namespace, poll_interval, query_timeout)
        .with_labels(const_labels)
        .with_enabled(&get_enabled_collectors(matches)))
}

#[must_use]
pub fn get_enabled_collectors(matches: &ArgMatches) -> Vec<String> {
    COLLECTOR_NAMES
        .iter()
        .filter(|&&name| {
            if matches.get_flag(&format!("no-collector.{name}")) {
                return false;
            }

            if matches.get_flag(&format!("collector.{name}")) {
                return true;
            }

            enabled_by_default(name)
        })
        .map(|&name| name.to_string())
        .collect()
}
