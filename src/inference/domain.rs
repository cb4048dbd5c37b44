//! Per-batch inference results.

use crate::data::domain::Columns;

/// Predictions and labels for one batch, keyed by output name and squeezed to
/// their minimal per-sample rank.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BatchPredictions {
    pub preds: Columns,
    pub labels: Columns,
}

impl BatchPredictions {
    pub fn output_names(&self) -> impl Iterator<Item = &str> {
        self.preds.keys().map(String::as_str)
    }
}
