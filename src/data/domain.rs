//! Core dataset definitions shared by readers, the accumulator and the writer.

use std::collections::BTreeMap;

use ndarray::{ArrayD, Axis, IxDyn};
use serde::{Deserialize, Serialize};

use crate::common::error::{EvalError, EvalResult};

/// Label value meaning "state not observed". Carried through untouched;
/// only the metric functions skip it.
pub const MASK: f32 = -1.0;

/// Chromosome field name.
pub const CHROMO: &str = "chromo";
/// Genomic position field name.
pub const POS: &str = "pos";
/// Auxiliary fields streamed alongside every batch.
pub const META_FIELDS: [&str; 2] = [CHROMO, POS];

/// Separator between output groups and leaf names, e.g. `cpg/BS27_1_SER`.
pub const GROUP_SEP: char = '/';

/// Named per-sample arrays; axis 0 is always the sample axis.
pub type Columns = BTreeMap<String, ArrayD<f32>>;

/// Serialised n-d array: row-major data plus shape.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TensorData {
    pub shape: Vec<usize>,
    pub data: Vec<f32>,
}

impl TensorData {
    pub fn into_array(self) -> EvalResult<ArrayD<f32>> {
        Ok(ArrayD::from_shape_vec(IxDyn(&self.shape), self.data)?)
    }

    pub fn from_array(array: &ArrayD<f32>) -> Self {
        Self {
            shape: array.shape().to_vec(),
            data: array.iter().copied().collect(),
        }
    }
}

/// Number of samples held by an array (length of axis 0).
pub fn n_rows(array: &ArrayD<f32>) -> usize {
    if array.ndim() == 0 {
        1
    } else {
        array.len_of(Axis(0))
    }
}

/// One chunk from the input/label store.
#[derive(Clone, Debug, Default)]
pub struct Batch {
    pub inputs: Columns,
    pub outputs: Columns,
    pub weights: Option<Columns>,
}

impl Batch {
    /// Sample count, taken from the first input (or output when there are none).
    pub fn len(&self) -> usize {
        self.inputs
            .values()
            .chain(self.outputs.values())
            .next()
            .map(n_rows)
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Values of one auxiliary field.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetaColumn {
    Int(Vec<i64>),
    Text(Vec<String>),
}

impl MetaColumn {
    pub fn len(&self) -> usize {
        match self {
            MetaColumn::Int(v) => v.len(),
            MetaColumn::Text(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Rows `start..end` as a new column.
    pub fn slice(&self, start: usize, end: usize) -> Self {
        match self {
            MetaColumn::Int(v) => MetaColumn::Int(v[start..end].to_vec()),
            MetaColumn::Text(v) => MetaColumn::Text(v[start..end].to_vec()),
        }
    }

    /// Append another column of the same variant.
    pub fn extend_from(&mut self, other: &MetaColumn) -> EvalResult<()> {
        match (self, other) {
            (MetaColumn::Int(a), MetaColumn::Int(b)) => a.extend_from_slice(b),
            (MetaColumn::Text(a), MetaColumn::Text(b)) => a.extend_from_slice(b),
            _ => return Err(EvalError::data("metadata column changed type between batches")),
        }
        Ok(())
    }
}

/// One chunk from the metadata store.
pub type MetaBatch = BTreeMap<String, MetaColumn>;

/// Batch and metadata for the same ordered samples.
#[derive(Clone, Debug)]
pub struct EvalBatch {
    pub batch: Batch,
    pub meta: MetaBatch,
}

impl EvalBatch {
    pub fn len(&self) -> usize {
        self.batch.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Finalised run data: one contiguous array per output and per field.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EvalData {
    pub preds: Columns,
    pub outputs: Columns,
    pub meta: BTreeMap<String, MetaColumn>,
}

impl EvalData {
    /// Sample count shared by every key (0 when empty).
    pub fn n_samples(&self) -> usize {
        self.outputs.values().next().map(n_rows).unwrap_or(0)
    }
}

/// Leaf of an output name: `cpg/BS27_1_SER` -> `BS27_1_SER`.
pub fn leaf_name(name: &str) -> &str {
    name.rsplit(GROUP_SEP).next().unwrap_or(name)
}
