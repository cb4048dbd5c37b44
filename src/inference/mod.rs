//! Inference domain: per-batch prediction and shape normalisation.

pub mod domain;
pub mod service;

pub use domain::BatchPredictions;
pub use service::{predict_batch, squeeze_trailing};
