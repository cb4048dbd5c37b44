//! Metric dispatch over finalised predictions and labels, plus report output.

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashSet};
use std::path::Path;

use csv::WriterBuilder;
use ndarray::ArrayD;

use crate::common::error::{AlignmentError, EvalError, EvalResult};
use crate::data::domain::{n_rows, Columns, MASK};
use crate::model::domain::{OutputKind, OutputSpec};

use super::domain::{ordered_metrics, Report, WideReport};
use super::metrics::{Metric, Observed, CAT_METRICS, CLA_METRICS, REG_METRICS};

/// Metrics computed for an output of the given kind (`n` is always added).
pub fn metrics_for(kind: OutputKind) -> &'static [Metric] {
    match kind {
        OutputKind::Binary => CLA_METRICS,
        OutputKind::Continuous => REG_METRICS,
        OutputKind::Categorical => CAT_METRICS,
    }
}

fn observed_flat(y: &ArrayD<f32>, z: &ArrayD<f32>) -> (Vec<f32>, Vec<f32>) {
    y.iter()
        .zip(z.iter())
        .filter(|(t, _)| **t != MASK)
        .map(|(t, p)| (*t, *p))
        .unzip()
}

fn observed_rows(y: &ArrayD<f32>, z: &ArrayD<f32>) -> EvalResult<(Vec<Vec<f32>>, Vec<Vec<f32>>)> {
    let n = n_rows(y);
    let k: usize = y.shape().iter().skip(1).product();
    let y = y.to_shape((n, k))?;
    let z = z.to_shape((n, k))?;
    Ok(y.outer_iter()
        .zip(z.outer_iter())
        .filter(|(t, _)| t.iter().all(|v| *v != MASK))
        .map(|(t, p)| (t.to_vec(), p.to_vec()))
        .unzip())
}

fn observed(y: &ArrayD<f32>, z: &ArrayD<f32>, kind: OutputKind) -> EvalResult<Observed> {
    Ok(match kind {
        OutputKind::Categorical => {
            let (y, z) = observed_rows(y, z)?;
            Observed::Rows { y, z }
        }
        OutputKind::Binary | OutputKind::Continuous => {
            let (y, z) = observed_flat(y, z);
            Observed::Flat { y, z }
        }
    })
}

/// Score one output. Samples labelled [`MASK`] are left out; `n` counts the
/// samples that remain.
pub fn evaluate(
    name: &str,
    y: &ArrayD<f32>,
    z: &ArrayD<f32>,
    kind: OutputKind,
) -> EvalResult<Vec<(Metric, f64)>> {
    if y.shape() != z.shape() {
        return Err(EvalError::data(format!(
            "'{name}': labels have shape {:?}, predictions {:?}",
            y.shape(),
            z.shape()
        )));
    }

    let obs = observed(y, z, kind)?;
    if obs.is_empty() {
        log::debug!("'{name}': every sample is masked");
    }
    metrics_for(kind)
        .iter()
        .chain(&[Metric::N])
        .map(|m| m.score(&obs).map(|v| (*m, v)))
        .collect()
}

/// One block of metrics per output, in the order of `specs`. Labels and
/// predictions must hold exactly the outputs `specs` describes, with the same
/// number of samples each.
pub fn evaluate_outputs(outputs: &Columns, preds: &Columns, specs: &[OutputSpec]) -> EvalResult<Report> {
    let known = |name: &String| specs.iter().any(|s| &s.name == name);
    let stray: BTreeSet<&str> = outputs
        .keys()
        .filter(|k| !preds.contains_key(*k) || !known(*k))
        .chain(preds.keys().filter(|k| !outputs.contains_key(*k) || !known(*k)))
        .chain(
            specs
                .iter()
                .map(|s| &s.name)
                .filter(|n| !outputs.contains_key(*n) || !preds.contains_key(*n)),
        )
        .map(String::as_str)
        .collect();
    if !stray.is_empty() {
        let names: Vec<&str> = stray.into_iter().collect();
        return Err(AlignmentError::KeyMismatch(names.join(", ")).into());
    }

    let mut report = Report::default();
    for spec in specs {
        let (y, z) = (&outputs[&spec.name], &preds[&spec.name]);
        if n_rows(y) != n_rows(z) {
            return Err(AlignmentError::LengthMismatch {
                name: spec.name.clone(),
                expected: n_rows(y),
                found: n_rows(z),
            }
            .into());
        }
        for (metric, value) in evaluate(&spec.name, y, z, spec.kind)? {
            report.push(&spec.name, metric, value);
        }
    }
    Ok(report)
}

/// Column that orders wide-report rows, and whether larger is better.
fn ranking_metric(metrics: &[Metric]) -> Option<(Metric, bool)> {
    [(Metric::Auc, true), (Metric::Mse, false), (Metric::Acc, true)]
        .into_iter()
        .find(|(m, _)| metrics.contains(m))
}

/// Best value first; missing and NaN cells last.
fn by_rank(a: Option<f64>, b: Option<f64>, descending: bool) -> Ordering {
    let (a, b) = (a.filter(|v| !v.is_nan()), b.filter(|v| !v.is_nan()));
    match (a, b) {
        (Some(x), Some(y)) if descending => y.total_cmp(&x),
        (Some(x), Some(y)) => x.total_cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Pivot the long report into one row per output. Values are copied as is.
/// Rows are ranked by `auc` (descending), else `mse` (ascending), else `acc`
/// (descending); ties keep name order.
pub fn unstack_report(report: &Report) -> WideReport {
    let metrics = ordered_metrics(
        report
            .rows
            .iter()
            .map(|r| r.metric)
            .collect::<HashSet<_>>(),
    );
    let outputs: BTreeSet<&str> = report.rows.iter().map(|r| r.output.as_str()).collect();

    let mut rows: Vec<(String, Vec<Option<f64>>)> = outputs
        .into_iter()
        .map(|output| {
            let cells = metrics.iter().map(|m| report.get(output, *m)).collect();
            (output.to_string(), cells)
        })
        .collect();
    if let Some((metric, descending)) = ranking_metric(&metrics) {
        if let Some(col) = metrics.iter().position(|m| *m == metric) {
            rows.sort_by(|a, b| by_rank(a.1[col], b.1[col], descending));
        }
    }
    WideReport { metrics, rows }
}

/// Write the long report as tab-separated values with a header line.
pub fn write_report_tsv(report: &Report, path: &Path) -> EvalResult<()> {
    let mut writer = WriterBuilder::new().delimiter(b'\t').from_path(path)?;
    writer.write_record(["output", "metric", "value"])?;
    for row in &report.rows {
        writer.write_record([
            row.output.as_str(),
            row.metric.name(),
            row.value.to_string().as_str(),
        ])?;
    }
    writer.flush().map_err(|e| EvalError::io(path, e))?;
    Ok(())
}
