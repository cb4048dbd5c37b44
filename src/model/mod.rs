//! Model domain: output descriptors, the model contract and artefact loading.

pub mod domain;
pub mod repo_fs;
pub mod service;

pub use domain::{Model, OutputKind, OutputSpec};
pub use service::{load_model, LinearModel};
