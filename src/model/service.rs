//! Model loading and the dense reference model.

use std::collections::HashSet;
use std::path::PathBuf;

use ndarray::{Array1, Array2, ArrayD, Axis};

use crate::common::error::{EvalError, EvalResult};
use crate::data::domain::Columns;

use super::domain::{Model, OutputSpec};
use super::repo_fs::{read_model_file, Activation, HeadDef};

struct Head {
    input: String,
    weights: Array2<f32>,
    bias: Array1<f32>,
    activation: Activation,
}

impl Head {
    fn from_def(def: HeadDef) -> EvalResult<Self> {
        let units = def.weights.len();
        let width = def.weights.first().map_or(0, Vec::len);
        if units == 0 || def.weights.iter().any(|row| row.len() != width) {
            return Err(EvalError::model(format!(
                "head '{}': weights must be a non-empty rectangular matrix",
                def.name
            )));
        }
        if def.bias.len() != units {
            return Err(EvalError::model(format!(
                "head '{}': {} bias terms for {units} units",
                def.name,
                def.bias.len()
            )));
        }
        let flat: Vec<f32> = def.weights.into_iter().flatten().collect();
        Ok(Self {
            input: def.input,
            weights: Array2::from_shape_vec((units, width), flat)?,
            bias: Array1::from(def.bias),
            activation: def.activation,
        })
    }

    fn forward(&self, name: &str, inputs: &Columns) -> EvalResult<ArrayD<f32>> {
        let x = inputs
            .get(&self.input)
            .ok_or_else(|| EvalError::model(format!("head '{name}': missing input '{}'", self.input)))?;
        let n = x.shape().first().copied().unwrap_or(1);
        let width: usize = x.shape().iter().skip(1).product();
        if width != self.weights.ncols() {
            return Err(EvalError::model(format!(
                "head '{name}': input '{}' has {width} features, weights expect {}",
                self.input,
                self.weights.ncols()
            )));
        }

        let x = x.to_shape((n, width))?;
        let mut z = x.dot(&self.weights.t()) + &self.bias;
        match self.activation {
            Activation::Linear => {}
            Activation::Sigmoid => z.mapv_inplace(|v| 1.0 / (1.0 + (-v).exp())),
            Activation::Softmax => {
                for mut row in z.axis_iter_mut(Axis(0)) {
                    let max = row.fold(f32::NEG_INFINITY, |m, &v| m.max(v));
                    row.mapv_inplace(|v| (v - max).exp());
                    let sum = row.sum();
                    row.mapv_inplace(|v| v / sum);
                }
            }
        }
        Ok(z.into_dyn())
    }
}

/// Stack of independent dense heads, one per output.
pub struct LinearModel {
    name: String,
    inputs: Vec<String>,
    outputs: Vec<OutputSpec>,
    heads: Vec<Head>,
}

impl LinearModel {
    pub fn from_heads(name: impl Into<String>, defs: Vec<HeadDef>) -> EvalResult<Self> {
        let mut seen = HashSet::new();
        let mut inputs: Vec<String> = Vec::new();
        let mut outputs = Vec::with_capacity(defs.len());
        let mut heads = Vec::with_capacity(defs.len());

        for def in defs {
            if !seen.insert(def.name.clone()) {
                return Err(EvalError::model(format!("duplicate output '{}'", def.name)));
            }
            if !inputs.contains(&def.input) {
                inputs.push(def.input.clone());
            }
            outputs.push(OutputSpec::from_name(def.name.clone()));
            heads.push(Head::from_def(def)?);
        }

        Ok(Self {
            name: name.into(),
            inputs,
            outputs,
            heads,
        })
    }
}

impl Model for LinearModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn inputs(&self) -> &[String] {
        &self.inputs
    }

    fn outputs(&self) -> &[OutputSpec] {
        &self.outputs
    }

    fn predict(&self, inputs: &Columns) -> EvalResult<Vec<ArrayD<f32>>> {
        self.heads
            .iter()
            .zip(&self.outputs)
            .map(|(head, spec)| head.forward(&spec.name, inputs))
            .collect()
    }
}

/// Load and merge model files. An empty list is a configuration error.
pub fn load_model(files: &[PathBuf]) -> EvalResult<Box<dyn Model>> {
    if files.is_empty() {
        return Err(EvalError::config("No model files provided!"));
    }

    let mut name = None;
    let mut defs = Vec::new();
    for path in files {
        let file = read_model_file(path)?;
        name = name.or(file.name);
        defs.extend(file.heads);
    }
    let name = name.unwrap_or_else(|| {
        files[0]
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    });

    let model = LinearModel::from_heads(name, defs)?;
    log::debug!(
        "model '{}': {} inputs, {} outputs",
        model.name(),
        model.inputs().len(),
        model.outputs().len()
    );
    Ok(Box::new(model))
}
