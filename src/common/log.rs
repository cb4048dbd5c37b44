//! Logger setup for the binary.
//!
//! Library code only talks to the `log` facade; this is the single place that
//! installs a backend.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use env_logger::{Builder, Target};
use log::LevelFilter;

use crate::common::error::{EvalError, EvalResult};

const RUST_LOG_ENV: &str = "RUST_LOG";

/// Level used for the crate's own records.
pub fn level_for(verbose: bool) -> LevelFilter {
    if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    }
}

/// Install `env_logger`, writing `LEVEL (timestamp): message` lines to stderr
/// or to `log_file`. `RUST_LOG` still takes precedence when set.
pub fn init(verbose: bool, log_file: Option<&Path>) -> EvalResult<()> {
    let mut builder = Builder::new();
    builder
        .filter_level(level_for(verbose))
        .format(|buf, record| {
            writeln!(
                buf,
                "{} ({}): {}",
                record.level(),
                buf.timestamp_seconds(),
                record.args()
            )
        });
    if let Ok(spec) = std::env::var(RUST_LOG_ENV) {
        builder.parse_filters(&spec);
    }

    if let Some(path) = log_file {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| EvalError::io(path, e))?;
        builder.target(Target::Pipe(Box::new(file)));
    } else {
        builder.target(Target::Stderr);
    }

    // A second init (tests, embedding) keeps the first logger.
    let _ = builder.try_init();
    Ok(())
}
