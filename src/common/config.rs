//! Runtime configuration for one evaluation run.
//!
//! The CLI layer fills an [`EvalCfg`]; nothing downstream reads flags or the
//! environment directly.

use std::path::PathBuf;

use crate::common::error::{EvalError, EvalResult};

/// Default number of samples per batch.
pub const DEFAULT_BATCH_SIZE: usize = 128;

/// Snapshot of configuration values consumed by the pipeline.
#[derive(Clone, Debug)]
pub struct EvalCfg {
    pub data_files: Vec<PathBuf>,
    pub model_files: Vec<PathBuf>,
    /// Long-form TSV metrics report.
    pub out_report: Option<PathBuf>,
    /// Raw predictions, labels and positions.
    pub out_data: Option<PathBuf>,
    /// Regular expressions selecting replicate outputs.
    pub replicate_names: Option<Vec<String>>,
    pub nb_replicate: Option<usize>,
    pub batch_size: usize,
    /// Upper bound on the number of samples processed.
    pub nb_sample: Option<usize>,
    pub verbose: bool,
    pub log_file: Option<PathBuf>,
}

impl Default for EvalCfg {
    fn default() -> Self {
        Self {
            data_files: Vec::new(),
            model_files: Vec::new(),
            out_report: None,
            out_data: None,
            replicate_names: None,
            nb_replicate: None,
            batch_size: DEFAULT_BATCH_SIZE,
            nb_sample: None,
            verbose: false,
            log_file: None,
        }
    }
}

impl EvalCfg {
    /// Reject configurations that cannot start a run. No file is touched here.
    pub fn validate(&self) -> EvalResult<()> {
        if self.model_files.is_empty() {
            return Err(EvalError::config("No model files provided!"));
        }
        if self.data_files.is_empty() {
            return Err(EvalError::config("No data files provided!"));
        }
        if self.batch_size == 0 {
            return Err(EvalError::config("batch size must be positive"));
        }
        if self.nb_replicate == Some(0) {
            return Err(EvalError::config("nb_replicate must be positive"));
        }
        // leave the flag out for no cap
        if self.nb_sample == Some(0) {
            return Err(EvalError::config("nb_sample must be positive"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::error::ErrorCode;

    fn minimal() -> EvalCfg {
        EvalCfg {
            data_files: vec!["a.json".into()],
            model_files: vec!["m.json".into()],
            ..Default::default()
        }
    }

    #[test]
    fn minimal_config_is_valid() {
        let cfg = minimal();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.batch_size, 128);
    }

    #[test]
    fn missing_model_files_is_a_config_error() {
        let cfg = EvalCfg {
            model_files: Vec::new(),
            ..minimal()
        };
        let err = cfg.validate().unwrap_err();
        assert_eq!(err.code(), ErrorCode::Config);
        assert!(err.to_string().contains("No model files"));
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        let cfg = EvalCfg {
            batch_size: 0,
            ..minimal()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn zero_caps_are_rejected() {
        for cfg in [
            EvalCfg {
                nb_sample: Some(0),
                ..minimal()
            },
            EvalCfg {
                nb_replicate: Some(0),
                ..minimal()
            },
        ] {
            assert_eq!(cfg.validate().unwrap_err().code(), ErrorCode::Config);
        }
        let cfg = EvalCfg {
            nb_sample: Some(1),
            ..minimal()
        };
        assert!(cfg.validate().is_ok());
    }
}
