//! Evaluation reports in long and wide form.

use std::fmt;

use super::metrics::{Metric, ALL_METRICS};

/// One `(output, metric, value)` record.
#[derive(Clone, Debug, PartialEq)]
pub struct ReportRow {
    pub output: String,
    pub metric: Metric,
    pub value: f64,
}

/// Long-form report, one row per output and metric.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Report {
    pub rows: Vec<ReportRow>,
}

impl Report {
    pub fn push(&mut self, output: &str, metric: Metric, value: f64) {
        self.rows.push(ReportRow {
            output: output.to_string(),
            metric,
            value,
        });
    }

    pub fn get(&self, output: &str, metric: Metric) -> Option<f64> {
        self.rows
            .iter()
            .find(|r| r.output == output && r.metric == metric)
            .map(|r| r.value)
    }
}

/// Wide-form view for display: one row per output, one column per metric.
/// Cells are `None` when the metric does not apply to that output.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct WideReport {
    pub metrics: Vec<Metric>,
    pub rows: Vec<(String, Vec<Option<f64>>)>,
}

impl WideReport {
    pub fn cell(&self, output: &str, metric: Metric) -> Option<f64> {
        let col = self.metrics.iter().position(|m| *m == metric)?;
        self.rows
            .iter()
            .find(|(name, _)| name == output)
            .and_then(|(_, cells)| cells[col])
    }
}

fn format_cell(metric: Metric, value: Option<f64>) -> String {
    match value {
        None => "NaN".to_string(),
        Some(v) if v.is_nan() => "NaN".to_string(),
        Some(v) if metric == Metric::N => format!("{v:.0}"),
        Some(v) => format!("{v:.6}"),
    }
}

impl fmt::Display for WideReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut table: Vec<Vec<String>> = Vec::with_capacity(self.rows.len() + 1);
        table.push(
            std::iter::once("output".to_string())
                .chain(self.metrics.iter().map(|m| m.name().to_string()))
                .collect(),
        );
        for (output, cells) in &self.rows {
            table.push(
                std::iter::once(output.clone())
                    .chain(
                        self.metrics
                            .iter()
                            .zip(cells)
                            .map(|(m, v)| format_cell(*m, *v)),
                    )
                    .collect(),
            );
        }

        let ncol = self.metrics.len() + 1;
        let widths: Vec<usize> = (0..ncol)
            .map(|c| table.iter().map(|row| row[c].len()).max().unwrap_or(0))
            .collect();

        for row in &table {
            let line: Vec<String> = row
                .iter()
                .enumerate()
                .map(|(c, cell)| {
                    if c == 0 {
                        format!("{cell:<width$}", width = widths[c])
                    } else {
                        format!("{cell:>width$}", width = widths[c])
                    }
                })
                .collect();
            writeln!(f, "{}", line.join("  ").trim_end())?;
        }
        Ok(())
    }
}

/// Metric columns present in `metrics`, in catalogue order.
pub fn ordered_metrics(metrics: impl IntoIterator<Item = Metric>) -> Vec<Metric> {
    let present: Vec<Metric> = metrics.into_iter().collect();
    ALL_METRICS
        .iter()
        .copied()
        .filter(|m| present.contains(m))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wide_report_renders_aligned_columns() {
        let wide = WideReport {
            metrics: vec![Metric::Auc, Metric::N],
            rows: vec![
                ("cpg/a".into(), vec![Some(0.75), Some(12.0)]),
                ("cpg/mean".into(), vec![None, Some(3.0)]),
            ],
        };
        let text = wide.to_string();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("output"));
        assert!(lines[1].contains("0.750000"));
        assert!(lines[1].ends_with("12"));
        assert!(lines[2].contains("NaN"));
        assert_eq!(wide.cell("cpg/a", Metric::N), Some(12.0));
        assert_eq!(wide.cell("cpg/mean", Metric::Auc), None);
    }

    #[test]
    fn metrics_are_ordered_by_catalogue() {
        let got = ordered_metrics([Metric::N, Metric::Mse, Metric::Auc, Metric::CatAcc]);
        assert_eq!(got, vec![Metric::CatAcc, Metric::Auc, Metric::Mse, Metric::N]);
    }
}
