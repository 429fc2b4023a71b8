//! Logging setup.

use std::env;

use tracing::Level;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{EnvFilter, prelude::*};

/// Initializes logging to stderr, filtered by `RUST_LOG`.
pub fn init_tracing() {
    let (level, env_filter) = parse_rust_log();
    let format = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true);

    tracing_subscriber::registry()
        .with(format.with_filter(LevelFilter::from(level)))
        .with(env_filter)
        .init();
}

/// Returns the maximum log level and the filter directives derived from `RUST_LOG`.
pub fn parse_rust_log() -> (Level, EnvFilter) {
    // A bare level caps the output of the default directives below. Anything else is a full
    // filter and replaces them.
    let level = match env::var(EnvFilter::DEFAULT_ENV) {
        Ok(value) => match value.parse::<Level>() {
            Ok(level) => level,
            Err(_) => return (Level::TRACE, EnvFilter::new(value)),
        },
        Err(_) => Level::INFO,
    };

    // Upper bound per target, capped by `level` in the fmt layer.
    let env_filter = EnvFilter::new(
        "INFO,\
        hyper=WARN,\
        reqwest=WARN,\
        cartbench=TRACE,\
        ",
    );

    (level, env_filter)
}
