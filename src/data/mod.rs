//! Data domain: dataset files, chunked readers and the fused batch stream.

pub mod domain;
pub mod repo_fs;
pub mod service;

pub use domain::{Batch, EvalBatch, EvalData, MetaBatch, MetaColumn, MASK, META_FIELDS};
pub use service::{open_eval_stream, SyncedBatches};
