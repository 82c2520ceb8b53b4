use std::io;
use std::process::ExitCode;

use tracing::error;
use tracing_subscriber::EnvFilter;

use yubikey_session::report::write_report;
use yubikey_session::{Config, SessionClient};

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(io::stderr)
        .init();

    let client = match SessionClient::new(Config::default()) {
        Ok(client) => client,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let stdout = io::stdout();
    match write_report(&client, &mut stdout.lock()) {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
