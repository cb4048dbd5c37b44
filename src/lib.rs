// lib.rs - streaming model evaluation
pub mod api;
pub mod common;
pub mod data;
pub mod evaluation;
pub mod inference;
pub mod model;
pub mod pipeline;

pub use common::{EvalCfg, EvalError, EvalResult};
pub use evaluation::{Report, WideReport};
pub use pipeline::{run, RunSummary};
