//! Evaluation: metric catalogue, per-output dispatch and report formatting.

pub mod domain;
pub mod metrics;
pub mod service;

pub use domain::{Report, ReportRow, WideReport};
pub use metrics::Metric;
pub use service::{evaluate_outputs, unstack_report, write_report_tsv};
