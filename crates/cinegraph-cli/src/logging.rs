//! stderr logging. Answers go to stdout, so they stay pipeable.

use clap::ValueEnum;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

/// `-v` flags win over `RUST_LOG`; without either, the cinegraph crates log at info.
pub fn init(verbose: u8, format: LogFormat) {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("cinegraph=info")),
        1 => EnvFilter::new("cinegraph=debug"),
        _ => EnvFilter::new("cinegraph=trace"),
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    match format {
        LogFormat::Text => builder.with_target(false).init(),
        LogFormat::Json => builder.json().init(),
    }
}
