pub mod collectors;

use crate::built_info;
use crate::collectors::config::{DEFAULT_POLL_INTERVAL, DEFAULT_QUERY_TIMEOUT};
use clap::{
    Arg, ArgAction, ColorChoice, Command,
    builder::styling::{AnsiColor, Effects, Styles},
};

pub fn new() -> Command {
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default());

    let long_version: &'static str = Box::leak(
        built_info::GIT_COMMIT_HASH_SHORT
            .map_or_else(
                || env!("CARGO_PKG_VERSION").to_string(),
                |hash| format!("{} - {hash}", env!("CARGO_PKG_VERSION")),
            )
            .into_boxed_str(),
    );

    let default_interval: &'static str =
        Box::leak(DEFAULT_POLL_INTERVAL.as_secs().to_string().into_boxed_str());
    let default_timeout: &'static str =
        Box::leak(DEFAULT_QUERY_TIMEOUT.as_secs().to_string().into_boxed_str());

    let cmd = Command::new("pg_gauges")
        .about("PostgreSQL gauge collector for Prometheus")
        .version(env!("CARGO_PKG_VERSION"))
        .long_version(long_version)
        .color(ColorChoice::Auto)
        .styles(styles)
        .arg(
            Arg::new("port")
                .short('p')
                .long("port")
                .help("Port to listen on")
                .default_value("9187")
                .env("PG_GAUGES_PORT")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new("listen")
                .short('l')
                .long("listen")
                .help("IP address to bind to (default: [::]:port, falls back to 0.0.0.0:port)")
                .env("PG_GAUGES_LISTEN")
                .value_name("IP"),
        )
        .arg(
            Arg::new("dsn")
                .long("dsn")
                .help("PostgreSQL connection string")
                .default_value("postgresql://postgres@localhost:5432/postgres")
                .env("PG_GAUGES_DSN")
                .value_name("DSN"),
        )
        .arg(
            Arg::new("namespace")
                .short('n')
                .long("namespace")
                .help("Prefix for every exposed metric name")
                .default_value("")
                .env("PG_GAUGES_NAMESPACE"),
        )
        .arg(
            Arg::new("poll-interval")
                .long("poll-interval")
                .help("Seconds to wait between the end of one poll cycle and the next")
                .default_value(default_interval)
                .env("PG_GAUGES_POLL_INTERVAL")
                .value_name("SECONDS")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
        .arg(
            Arg::new("query-timeout")
                .long("query-timeout")
                .help("Seconds a single diagnostic query may run")
                .default_value(default_timeout)
                .env("PG_GAUGES_QUERY_TIMEOUT")
                .value_name("SECONDS")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
        .arg(
            Arg::new("label")
                .long("label")
                .help("Constant label added to every metric, as key=value (repeatable)")
                .env("PG_GAUGES_LABELS")
                .value_delimiter(',')
                .action(ArgAction::Append)
                .value_name("KEY=VALUE"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Verbosity level: -v info, -vv debug, -vvv trace")
                .action(ArgAction::Count),
        );

    collectors::add_collectors_args(cmd)
}
