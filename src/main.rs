use std::process::ExitCode;

use clap::Parser;
use log::LevelFilter;

use evalstream::api::{execute, exit_code, Args};

fn main() -> ExitCode {
    match execute(Args::parse()) {
        Ok(_) => ExitCode::SUCCESS,
        Err(err) => {
            // no logger yet when the log file itself could not be opened
            if log::max_level() == LevelFilter::Off {
                eprintln!("error: {err:#}");
            } else {
                log::error!("{err:#}");
            }
            ExitCode::from(exit_code(&err))
        }
    }
}
