pub mod run;

use crate::collectors::config::GaugesConfig;
use secrecy::SecretString;

#[derive(Debug)]
pub enum Action {
    Run {
        port: u16,
        listen: Option<String>,
        dsn: SecretString,
        config: GaugesConfig,
    },
}
