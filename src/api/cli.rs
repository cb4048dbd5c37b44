//! Command-line surface: flag parsing and the mapping from a finished run to
//! a process exit code.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;

use crate::common::config::{EvalCfg, DEFAULT_BATCH_SIZE};
use crate::common::error::EvalError;
use crate::common::log;
use crate::pipeline::driver::{run, RunSummary};
use crate::pipeline::progress::ProgressMode;

/// Evaluate a model on a dataset and report performance metrics per output.
#[derive(Parser, Debug, Clone)]
#[command(name = "evalstream", version)]
#[command(about = "Streaming evaluation of model predictions against labelled data", long_about = None)]
pub struct Args {
    /// Input dataset files
    #[arg(value_name = "DATA_FILES", required = true)]
    pub data_files: Vec<PathBuf>,

    /// Model files, merged in the given order
    #[arg(long, num_args = 1.., value_name = "FILE")]
    pub model_files: Vec<PathBuf>,

    /// Long-form metrics report (tab separated)
    #[arg(short = 'o', long, value_name = "FILE")]
    pub out_report: Option<PathBuf>,

    /// Raw predictions, labels and positions
    #[arg(long, value_name = "FILE")]
    pub out_data: Option<PathBuf>,

    /// Regular expressions selecting replicates
    #[arg(long, num_args = 1.., value_name = "REGEX")]
    pub replicate_names: Option<Vec<String>>,

    /// Maximum number of replicates
    #[arg(long)]
    pub nb_replicate: Option<usize>,

    /// Samples per batch
    #[arg(long, default_value_t = DEFAULT_BATCH_SIZE, env = "EVALSTREAM_BATCH_SIZE")]
    pub batch_size: usize,

    /// Maximum number of samples
    #[arg(long)]
    pub nb_sample: Option<usize>,

    /// More detailed log messages
    #[arg(long)]
    pub verbose: bool,

    /// Write log messages to file
    #[arg(long, value_name = "FILE")]
    pub log_file: Option<PathBuf>,
}

impl From<Args> for EvalCfg {
    fn from(args: Args) -> Self {
        Self {
            data_files: args.data_files,
            model_files: args.model_files,
            out_report: args.out_report,
            out_data: args.out_data,
            replicate_names: args.replicate_names,
            nb_replicate: args.nb_replicate,
            batch_size: args.batch_size,
            nb_sample: args.nb_sample,
            verbose: args.verbose,
            log_file: args.log_file,
        }
    }
}

/// Install logging, then run the evaluation with the wide table on stdout.
pub fn execute(args: Args) -> anyhow::Result<RunSummary> {
    let cfg = EvalCfg::from(args);
    log::init(cfg.verbose, cfg.log_file.as_deref()).context("initialising logging")?;
    let stdout = std::io::stdout();
    let summary = run(&cfg, ProgressMode::auto(), &mut stdout.lock()).context("evaluation failed")?;
    Ok(summary)
}

/// Process exit code for a failed run; errors from outside the crate map to 1.
pub fn exit_code(err: &anyhow::Error) -> u8 {
    err.downcast_ref::<EvalError>()
        .map_or(1, |e| e.code() as u8)
}
