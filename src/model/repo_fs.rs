//! Filesystem format for model artefacts.
//!
//! A model file is a JSON document listing dense output heads. Several files
//! can be combined; their heads are appended in file order.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::common::error::{EvalError, EvalResult};

/// Activation applied to a head's dense layer.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    #[default]
    Sigmoid,
    Linear,
    Softmax,
}

/// One output head: `activation(weights · input + bias)`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HeadDef {
    pub name: String,
    /// Input column, flattened per sample.
    pub input: String,
    /// One row per unit.
    pub weights: Vec<Vec<f32>>,
    pub bias: Vec<f32>,
    #[serde(default)]
    pub activation: Activation,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModelFile {
    #[serde(default)]
    pub name: Option<String>,
    pub heads: Vec<HeadDef>,
}

pub fn read_model_file(path: &Path) -> EvalResult<ModelFile> {
    let file = File::open(path).map_err(|e| EvalError::io(path, e))?;
    serde_json::from_reader(BufReader::new(file))
        .map_err(|e| EvalError::model(format!("{}: {e}", path.display())))
}

pub fn write_model_file(path: &Path, model: &ModelFile) -> EvalResult<()> {
    let file = File::create(path).map_err(|e| EvalError::io(path, e))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, model)?;
    writer.flush().map_err(|e| EvalError::io(path, e))?;
    Ok(())
}
