//! Filesystem-backed dataset files and the raw result bundle.
//!
//! A dataset file is one JSON document holding every column for a chunk of
//! samples. Files are parsed whole, one at a time, as the readers reach them.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use serde::de::IgnoredAny;
use serde::{Deserialize, Serialize};

use crate::common::error::{EvalError, EvalResult};

use super::domain::{
    n_rows, Columns, EvalData, MetaBatch, MetaColumn, TensorData, CHROMO, POS,
};

/// On-disk layout of one dataset file.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DatasetFile {
    pub chromo: Vec<String>,
    pub pos: Vec<i64>,
    #[serde(default)]
    pub inputs: BTreeMap<String, TensorData>,
    #[serde(default)]
    pub outputs: BTreeMap<String, TensorData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weights: Option<BTreeMap<String, TensorData>>,
}

/// Parsed dataset with arrays ready for slicing.
#[derive(Clone, Debug)]
pub struct LoadedDataset {
    pub n_samples: usize,
    pub inputs: Columns,
    pub outputs: Columns,
    pub weights: Option<Columns>,
    pub meta: MetaBatch,
}

fn to_columns(
    raw: BTreeMap<String, TensorData>,
    n_samples: usize,
    path: &Path,
) -> EvalResult<Columns> {
    let mut out = Columns::new();
    for (name, tensor) in raw {
        let array = tensor.into_array()?;
        if array.ndim() == 0 || n_rows(&array) != n_samples {
            return Err(EvalError::data(format!(
                "{}: column '{name}' has shape {:?}, expected {n_samples} samples",
                path.display(),
                array.shape()
            )));
        }
        out.insert(name, array);
    }
    Ok(out)
}

/// Read a dataset file and check every column against the sample count.
pub fn load_dataset(path: &Path) -> EvalResult<LoadedDataset> {
    let file = File::open(path).map_err(|e| EvalError::io(path, e))?;
    let raw: DatasetFile = serde_json::from_reader(BufReader::new(file))?;

    let n_samples = raw.chromo.len();
    if raw.pos.len() != n_samples {
        return Err(EvalError::data(format!(
            "{}: {} chromosome entries but {} positions",
            path.display(),
            n_samples,
            raw.pos.len()
        )));
    }

    let mut meta = MetaBatch::new();
    meta.insert(CHROMO.to_string(), MetaColumn::Text(raw.chromo));
    meta.insert(POS.to_string(), MetaColumn::Int(raw.pos));

    Ok(LoadedDataset {
        n_samples,
        inputs: to_columns(raw.inputs, n_samples, path)?,
        outputs: to_columns(raw.outputs, n_samples, path)?,
        weights: raw
            .weights
            .map(|w| to_columns(w, n_samples, path))
            .transpose()?,
        meta,
    })
}

/// Sample count and output names of a dataset file.
#[derive(Clone, Debug, PartialEq)]
pub struct DatasetSummary {
    pub n_samples: usize,
    pub outputs: Vec<String>,
}

#[derive(Deserialize)]
struct SummaryFile {
    chromo: Vec<IgnoredAny>,
    #[serde(default)]
    outputs: BTreeMap<String, IgnoredAny>,
}

/// Scan a dataset file for its sample count and output names. No column is
/// materialised, so this is cheap next to [`load_dataset`].
pub fn read_summary(path: &Path) -> EvalResult<DatasetSummary> {
    let file = File::open(path).map_err(|e| EvalError::io(path, e))?;
    let raw: SummaryFile = serde_json::from_reader(BufReader::new(file))?;
    Ok(DatasetSummary {
        n_samples: raw.chromo.len(),
        outputs: raw.outputs.into_keys().collect(),
    })
}

/// Write a dataset file; used by fixtures and conversion tooling.
pub fn write_dataset(path: &Path, dataset: &DatasetFile) -> EvalResult<()> {
    let file = File::create(path).map_err(|e| EvalError::io(path, e))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer(&mut writer, dataset)?;
    writer.flush().map_err(|e| EvalError::io(path, e))?;
    Ok(())
}

/// Serialised form of [`EvalData`].
#[derive(Debug, Serialize, Deserialize)]
pub struct EvalBundle {
    pub preds: BTreeMap<String, TensorData>,
    pub outputs: BTreeMap<String, TensorData>,
    #[serde(flatten)]
    pub meta: BTreeMap<String, MetaColumn>,
}

impl From<&EvalData> for EvalBundle {
    fn from(data: &EvalData) -> Self {
        let tensors = |cols: &Columns| {
            cols.iter()
                .map(|(k, v)| (k.clone(), TensorData::from_array(v)))
                .collect()
        };
        Self {
            preds: tensors(&data.preds),
            outputs: tensors(&data.outputs),
            meta: data.meta.clone(),
        }
    }
}

/// Persist predictions, labels and positional fields to `path`.
pub fn write_eval_data(path: &Path, data: &EvalData) -> EvalResult<()> {
    let file = File::create(path).map_err(|e| EvalError::io(path, e))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer(&mut writer, &EvalBundle::from(data))?;
    writer.flush().map_err(|e| EvalError::io(path, e))?;
    log::debug!("wrote {} samples to {}", data.n_samples(), path.display());
    Ok(())
}

/// Read a bundle written by [`write_eval_data`].
pub fn read_eval_data(path: &Path) -> EvalResult<EvalData> {
    let file = File::open(path).map_err(|e| EvalError::io(path, e))?;
    let bundle: EvalBundle = serde_json::from_reader(BufReader::new(file))?;
    let arrays = |cols: BTreeMap<String, TensorData>| -> EvalResult<Columns> {
        cols.into_iter()
            .map(|(k, v)| Ok((k, v.into_array()?)))
            .collect()
    };
    Ok(EvalData {
        preds: arrays(bundle.preds)?,
        outputs: arrays(bundle.outputs)?,
        meta: bundle.meta,
    })
}
