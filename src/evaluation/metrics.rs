//! Metric catalogue.
//!
//! Binary and regression metrics take flat slices of observed samples;
//! categorical metrics take one row of class scores per sample. Inputs are
//! already stripped of masked labels. Undefined values (a single class for
//! AUC, zero variance for correlation, no samples) come back as `NaN`.

use std::fmt;

use crate::common::error::{EvalError, EvalResult};

/// Decision threshold for binary predictions.
pub const THRESHOLD: f32 = 0.5;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub enum Metric {
    CatAcc,
    Auc,
    Acc,
    Tpr,
    Tnr,
    F1,
    Mcc,
    Mse,
    Mad,
    Cor,
    /// Number of observed samples.
    N,
}

pub const CAT_METRICS: &[Metric] = &[Metric::CatAcc];
pub const CLA_METRICS: &[Metric] = &[
    Metric::Auc,
    Metric::Acc,
    Metric::Tpr,
    Metric::Tnr,
    Metric::F1,
    Metric::Mcc,
];
pub const REG_METRICS: &[Metric] = &[Metric::Mse, Metric::Mad, Metric::Cor];

/// Every metric, in report column order.
pub const ALL_METRICS: &[Metric] = &[
    Metric::CatAcc,
    Metric::Auc,
    Metric::Acc,
    Metric::Tpr,
    Metric::Tnr,
    Metric::F1,
    Metric::Mcc,
    Metric::Mse,
    Metric::Mad,
    Metric::Cor,
    Metric::N,
];

impl Metric {
    pub fn name(&self) -> &'static str {
        match self {
            Metric::CatAcc => "cat_acc",
            Metric::Auc => "auc",
            Metric::Acc => "acc",
            Metric::Tpr => "tpr",
            Metric::Tnr => "tnr",
            Metric::F1 => "f1",
            Metric::Mcc => "mcc",
            Metric::Mse => "mse",
            Metric::Mad => "mad",
            Metric::Cor => "cor",
            Metric::N => "n",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        ALL_METRICS.iter().copied().find(|m| m.name() == name)
    }

    /// Score observed pairs. Categorical accuracy needs class-score rows,
    /// every other metric except `n` needs one value per sample.
    pub fn score(&self, obs: &Observed) -> EvalResult<f64> {
        let value = match (self, obs) {
            (Metric::N, _) => obs.len() as f64,
            (Metric::CatAcc, Observed::Rows { y, z }) => cat_acc(y, z),
            (Metric::CatAcc, Observed::Flat { .. }) => {
                return Err(EvalError::data("cat_acc needs one row of class scores per sample"))
            }
            (_, Observed::Rows { .. }) => {
                return Err(EvalError::data(format!("{self} needs one value per sample")))
            }
            (Metric::Auc, Observed::Flat { y, z }) => auc(y, z),
            (Metric::Acc, Observed::Flat { y, z }) => acc(y, z),
            (Metric::Tpr, Observed::Flat { y, z }) => tpr(y, z),
            (Metric::Tnr, Observed::Flat { y, z }) => tnr(y, z),
            (Metric::F1, Observed::Flat { y, z }) => f1(y, z),
            (Metric::Mcc, Observed::Flat { y, z }) => mcc(y, z),
            (Metric::Mse, Observed::Flat { y, z }) => mse(y, z),
            (Metric::Mad, Observed::Flat { y, z }) => mad(y, z),
            (Metric::Cor, Observed::Flat { y, z }) => cor(y, z),
        };
        Ok(value)
    }
}

/// Label/prediction pairs left after masking.
#[derive(Clone, Debug, PartialEq)]
pub enum Observed {
    /// One value per sample.
    Flat { y: Vec<f32>, z: Vec<f32> },
    /// One row of class scores per sample.
    Rows { y: Vec<Vec<f32>>, z: Vec<Vec<f32>> },
}

impl Observed {
    /// Number of samples.
    pub fn len(&self) -> usize {
        match self {
            Observed::Flat { y, .. } => y.len(),
            Observed::Rows { y, .. } => y.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Default)]
struct Confusion {
    tp: f64,
    tn: f64,
    fp: f64,
    fn_: f64,
}

fn confusion(y: &[f32], z: &[f32]) -> Confusion {
    let mut c = Confusion::default();
    for (&t, &p) in y.iter().zip(z) {
        match (t >= THRESHOLD, p >= THRESHOLD) {
            (true, true) => c.tp += 1.0,
            (false, false) => c.tn += 1.0,
            (false, true) => c.fp += 1.0,
            (true, false) => c.fn_ += 1.0,
        }
    }
    c
}

fn ratio(num: f64, den: f64) -> f64 {
    if den == 0.0 {
        f64::NAN
    } else {
        num / den
    }
}

pub fn acc(y: &[f32], z: &[f32]) -> f64 {
    let c = confusion(y, z);
    ratio(c.tp + c.tn, y.len() as f64)
}

pub fn tpr(y: &[f32], z: &[f32]) -> f64 {
    let c = confusion(y, z);
    ratio(c.tp, c.tp + c.fn_)
}

pub fn tnr(y: &[f32], z: &[f32]) -> f64 {
    let c = confusion(y, z);
    ratio(c.tn, c.tn + c.fp)
}

pub fn f1(y: &[f32], z: &[f32]) -> f64 {
    let c = confusion(y, z);
    ratio(2.0 * c.tp, 2.0 * c.tp + c.fp + c.fn_)
}

/// Matthews correlation; 0 when any marginal is empty.
pub fn mcc(y: &[f32], z: &[f32]) -> f64 {
    if y.is_empty() {
        return f64::NAN;
    }
    let c = confusion(y, z);
    let den = ((c.tp + c.fp) * (c.tp + c.fn_) * (c.tn + c.fp) * (c.tn + c.fn_)).sqrt();
    if den == 0.0 {
        0.0
    } else {
        (c.tp * c.tn - c.fp * c.fn_) / den
    }
}

/// Area under the ROC curve from the rank-sum statistic; ties share their
/// average rank.
pub fn auc(y: &[f32], z: &[f32]) -> f64 {
    let n_pos = y.iter().filter(|&&t| t >= THRESHOLD).count();
    let n_neg = y.len() - n_pos;
    if n_pos == 0 || n_neg == 0 {
        return f64::NAN;
    }

    let mut order: Vec<usize> = (0..z.len()).collect();
    // total order: NaN predictions rank above every number
    order.sort_by(|&a, &b| z[a].total_cmp(&z[b]));

    let mut pos_rank_sum = 0.0;
    let mut i = 0;
    while i < order.len() {
        let mut j = i;
        while j + 1 < order.len() && z[order[j + 1]] == z[order[i]] {
            j += 1;
        }
        // ranks are 1-based
        let avg_rank = (i + j) as f64 / 2.0 + 1.0;
        for &k in &order[i..=j] {
            if y[k] >= THRESHOLD {
                pos_rank_sum += avg_rank;
            }
        }
        i = j + 1;
    }

    let n_pos = n_pos as f64;
    let n_neg = n_neg as f64;
    (pos_rank_sum - n_pos * (n_pos + 1.0) / 2.0) / (n_pos * n_neg)
}

pub fn mse(y: &[f32], z: &[f32]) -> f64 {
    let sum: f64 = y
        .iter()
        .zip(z)
        .map(|(&t, &p)| (t as f64 - p as f64).powi(2))
        .sum();
    ratio(sum, y.len() as f64)
}

/// Mean absolute deviation between labels and predictions.
pub fn mad(y: &[f32], z: &[f32]) -> f64 {
    let sum: f64 = y
        .iter()
        .zip(z)
        .map(|(&t, &p)| (t as f64 - p as f64).abs())
        .sum();
    ratio(sum, y.len() as f64)
}

/// Pearson correlation.
pub fn cor(y: &[f32], z: &[f32]) -> f64 {
    let n = y.len() as f64;
    if y.len() < 2 {
        return f64::NAN;
    }
    let my = y.iter().map(|&v| v as f64).sum::<f64>() / n;
    let mz = z.iter().map(|&v| v as f64).sum::<f64>() / n;
    let (mut sxy, mut sxx, mut syy) = (0.0, 0.0, 0.0);
    for (&t, &p) in y.iter().zip(z) {
        let dy = t as f64 - my;
        let dz = p as f64 - mz;
        sxy += dy * dz;
        sxx += dy * dy;
        syy += dz * dz;
    }
    ratio(sxy, (sxx * syy).sqrt())
}

fn argmax(row: &[f32]) -> usize {
    row.iter()
        .enumerate()
        .max_by(|a, b| a.1.total_cmp(b.1))
        .map_or(0, |(i, _)| i)
}

/// Fraction of rows whose most likely class matches the labelled class.
pub fn cat_acc(y: &[Vec<f32>], z: &[Vec<f32>]) -> f64 {
    let hits = y
        .iter()
        .zip(z)
        .filter(|(t, p)| argmax(t) == argmax(p))
        .count();
    ratio(hits as f64, y.len() as f64)
}
