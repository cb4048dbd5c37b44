//! Inference for one batch: call the model, map arrays to output names,
//! normalise shapes.

use ndarray::{ArrayD, Axis};

use crate::common::error::{AlignmentError, EvalResult};
use crate::data::domain::{n_rows, Batch};
use crate::model::domain::{Model, OutputSpec};

use super::domain::BatchPredictions;

/// Drop trailing unit axes (`[n, 1]` -> `[n]`, `[n, 4, 1]` -> `[n, 4]`).
/// The sample axis is always kept, even for a batch of one.
pub fn squeeze_trailing(mut array: ArrayD<f32>) -> ArrayD<f32> {
    while array.ndim() > 1 && array.shape()[array.ndim() - 1] == 1 {
        let last = array.ndim() - 1;
        array = array.index_axis_move(Axis(last), 0);
    }
    array
}

/// Run the model on `batch` and pair each selected output's prediction with
/// its label. `index` is the batch number, used in error reports.
pub fn predict_batch(
    model: &dyn Model,
    batch: Batch,
    selected: &[OutputSpec],
    index: usize,
) -> EvalResult<BatchPredictions> {
    let n = batch.len();
    let raw = model.predict(&batch.inputs)?;
    let declared = model.outputs();
    if raw.len() != declared.len() {
        return Err(AlignmentError::OutputCount {
            declared: declared.len(),
            returned: raw.len(),
        }
        .into());
    }

    let mut labels = batch.outputs;
    let mut out = BatchPredictions::default();
    for (spec, pred) in declared.iter().zip(raw) {
        if !selected.iter().any(|s| s.name == spec.name) {
            continue;
        }
        if n_rows(&pred) != n {
            return Err(AlignmentError::LengthMismatch {
                name: spec.name.clone(),
                expected: n,
                found: n_rows(&pred),
            }
            .into());
        }
        let label = labels
            .remove(&spec.name)
            .ok_or_else(|| AlignmentError::MissingOutput {
                batch: index,
                name: spec.name.clone(),
            })?;
        out.preds.insert(spec.name.clone(), squeeze_trailing(pred));
        out.labels.insert(spec.name.clone(), squeeze_trailing(label));
    }

    if let Some(name) = labels.into_keys().next() {
        return Err(AlignmentError::UnknownOutput { batch: index, name }.into());
    }
    Ok(out)
}
