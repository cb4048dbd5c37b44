//! Growing per-key containers for predictions, labels and metadata, and their
//! concatenation once streaming is over.

use std::collections::BTreeMap;

use ndarray::{concatenate, ArrayD, ArrayViewD, Axis};

use crate::common::error::{AlignmentError, EvalResult};
use crate::data::domain::{n_rows, Columns, EvalData, MetaBatch, MetaColumn};
use crate::inference::domain::BatchPredictions;

/// Appends one batch at a time, in arrival order. The output key set is either
/// given up front or taken from the first batch; afterwards every batch must
/// carry exactly that set, and exactly the configured metadata fields.
#[derive(Clone, Debug, Default)]
pub struct Accumulator {
    outputs: Option<Vec<String>>,
    fields: Vec<String>,
    preds: BTreeMap<String, Vec<ArrayD<f32>>>,
    labels: BTreeMap<String, Vec<ArrayD<f32>>>,
    meta: BTreeMap<String, Vec<MetaColumn>>,
    n_samples: usize,
    n_batches: usize,
}

impl Accumulator {
    /// Accumulator with a fixed output key set.
    pub fn new<I, S>(outputs: I, fields: &[&str]) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            outputs: Some(outputs.into_iter().map(Into::into).collect()),
            ..Self::discover(fields)
        }
    }

    /// Accumulator whose output key set is locked by the first batch.
    pub fn discover(fields: &[&str]) -> Self {
        Self {
            fields: fields.iter().map(|f| f.to_string()).collect(),
            ..Default::default()
        }
    }

    pub fn n_samples(&self) -> usize {
        self.n_samples
    }

    pub fn n_batches(&self) -> usize {
        self.n_batches
    }

    /// Output names, once known.
    pub fn output_names(&self) -> Option<&[String]> {
        self.outputs.as_deref()
    }

    fn check_keys(&self, batch: &BatchPredictions, meta: &MetaBatch, expected: &[String]) -> EvalResult<()> {
        let index = self.n_batches;
        for name in batch.preds.keys().chain(batch.labels.keys()) {
            if !expected.contains(name) {
                return Err(AlignmentError::UnknownOutput {
                    batch: index,
                    name: name.clone(),
                }
                .into());
            }
        }
        for name in expected {
            if !batch.preds.contains_key(name) || !batch.labels.contains_key(name) {
                return Err(AlignmentError::MissingOutput {
                    batch: index,
                    name: name.clone(),
                }
                .into());
            }
        }
        if let Some(name) = meta.keys().find(|k| !self.fields.contains(k)) {
            return Err(AlignmentError::UnknownField {
                batch: index,
                name: name.clone(),
            }
            .into());
        }
        if let Some(name) = self.fields.iter().find(|f| !meta.contains_key(*f)) {
            return Err(AlignmentError::MissingField {
                batch: index,
                name: name.clone(),
            }
            .into());
        }
        Ok(())
    }

    fn check_lengths(batch: &BatchPredictions, meta: &MetaBatch) -> EvalResult<usize> {
        let n = meta
            .values()
            .map(MetaColumn::len)
            .chain(batch.labels.values().map(n_rows))
            .next()
            .unwrap_or(0);
        let arrays = batch.preds.iter().chain(batch.labels.iter());
        for (name, array) in arrays {
            if n_rows(array) != n {
                return Err(AlignmentError::LengthMismatch {
                    name: name.clone(),
                    expected: n,
                    found: n_rows(array),
                }
                .into());
            }
        }
        if let Some((name, col)) = meta.iter().find(|(_, col)| col.len() != n) {
            return Err(AlignmentError::LengthMismatch {
                name: name.clone(),
                expected: n,
                found: col.len(),
            }
            .into());
        }
        Ok(n)
    }

    /// Append one batch. Nothing is stored when the batch is rejected.
    pub fn push(&mut self, batch: BatchPredictions, meta: MetaBatch) -> EvalResult<()> {
        let expected = match &self.outputs {
            Some(names) => names.clone(),
            None => batch.preds.keys().cloned().collect(),
        };
        self.check_keys(&batch, &meta, &expected)?;
        let n = Self::check_lengths(&batch, &meta)?;

        if self.outputs.is_none() {
            log::debug!("output set locked to {} names", expected.len());
            self.outputs = Some(expected);
        }
        for (name, array) in batch.preds {
            self.preds.entry(name).or_default().push(array);
        }
        for (name, array) in batch.labels {
            self.labels.entry(name).or_default().push(array);
        }
        for (name, col) in meta {
            self.meta.entry(name).or_default().push(col);
        }
        self.n_samples += n;
        self.n_batches += 1;
        Ok(())
    }

    /// Concatenate every key's batches in arrival order. Does not consume or
    /// change the accumulator, so repeated calls return equal data.
    pub fn finalize(&self) -> EvalResult<EvalData> {
        Ok(EvalData {
            preds: stack(&self.preds)?,
            outputs: stack(&self.labels)?,
            meta: self
                .meta
                .iter()
                .map(|(name, parts)| Ok((name.clone(), stack_meta(parts)?)))
                .collect::<EvalResult<_>>()?,
        })
    }
}

fn stack(parts: &BTreeMap<String, Vec<ArrayD<f32>>>) -> EvalResult<Columns> {
    parts
        .iter()
        .map(|(name, arrays)| {
            let views: Vec<ArrayViewD<'_, f32>> = arrays.iter().map(|a| a.view()).collect();
            Ok((name.clone(), concatenate(Axis(0), &views)?))
        })
        .collect()
}

fn stack_meta(parts: &[MetaColumn]) -> EvalResult<MetaColumn> {
    let mut iter = parts.iter();
    let mut out = match iter.next() {
        Some(first) => first.clone(),
        None => return Ok(MetaColumn::Int(Vec::new())),
    };
    for part in iter {
        out.extend_from(part)?;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::error::EvalError;
    use crate::data::domain::{CHROMO, MASK, META_FIELDS, POS};
    use ndarray::array;

    fn scored(entries: &[(&str, Vec<f32>, Vec<f32>)]) -> BatchPredictions {
        let mut out = BatchPredictions::default();
        for (name, preds, labels) in entries {
            out.preds
                .insert(name.to_string(), ArrayD::from_shape_vec(vec![preds.len()], preds.clone()).unwrap());
            out.labels
                .insert(name.to_string(), ArrayD::from_shape_vec(vec![labels.len()], labels.clone()).unwrap());
        }
        out
    }

    fn meta(pos: &[i64]) -> MetaBatch {
        let mut m = MetaBatch::new();
        m.insert(CHROMO.into(), MetaColumn::Text(vec!["1".into(); pos.len()]));
        m.insert(POS.into(), MetaColumn::Int(pos.to_vec()));
        m
    }

    #[test]
    fn two_batches_concatenate_in_order() {
        let mut acc = Accumulator::new(["cpg"], &META_FIELDS);
        acc.push(scored(&[("cpg", vec![0.1, 0.9], vec![0.0, 1.0])]), meta(&[1, 2]))
            .unwrap();
        acc.push(scored(&[("cpg", vec![0.4, 0.2], vec![MASK, 0.0])]), meta(&[3, 4]))
            .unwrap();

        let data = acc.finalize().unwrap();
        assert_eq!(data.outputs["cpg"], array![0.0f32, 1.0, MASK, 0.0].into_dyn());
        assert_eq!(data.preds["cpg"], array![0.1f32, 0.9, 0.4, 0.2].into_dyn());
        assert_eq!(data.meta[POS], MetaColumn::Int(vec![1, 2, 3, 4]));
        assert_eq!(data.n_samples(), 4);
        assert_eq!(acc.n_samples(), 4);
        assert_eq!(acc.n_batches(), 2);
    }

    #[test]
    fn finalize_is_idempotent() {
        let mut acc = Accumulator::discover(&META_FIELDS);
        acc.push(scored(&[("a", vec![0.3], vec![1.0])]), meta(&[9])).unwrap();
        acc.push(scored(&[("a", vec![0.7, 0.2], vec![0.0, 1.0])]), meta(&[10, 11]))
            .unwrap();
        assert_eq!(acc.finalize().unwrap(), acc.finalize().unwrap());
    }

    #[test]
    fn discovery_locks_key_set() {
        let mut acc = Accumulator::discover(&META_FIELDS);
        assert!(acc.output_names().is_none());
        acc.push(scored(&[("a", vec![0.3], vec![1.0])]), meta(&[1])).unwrap();
        assert_eq!(acc.output_names().unwrap(), &["a".to_string()]);

        let err = acc
            .push(
                scored(&[("a", vec![0.3], vec![1.0]), ("b", vec![0.3], vec![1.0])]),
                meta(&[2]),
            )
            .unwrap_err();
        assert!(matches!(
            err,
            EvalError::Alignment(AlignmentError::UnknownOutput { batch: 1, ref name }) if name == "b"
        ));

        let err = acc.push(BatchPredictions::default(), meta(&[2])).unwrap_err();
        assert!(matches!(
            err,
            EvalError::Alignment(AlignmentError::MissingOutput { batch: 1, .. })
        ));
        // rejected batches leave no trace
        assert_eq!(acc.n_samples(), 1);
        assert_eq!(acc.finalize().unwrap().preds["a"].len(), 1);
    }

    #[test]
    fn metadata_fields_are_fixed() {
        let mut acc = Accumulator::new(["a"], &META_FIELDS);
        let mut m = meta(&[1]);
        m.remove(CHROMO);
        let err = acc.push(scored(&[("a", vec![0.3], vec![1.0])]), m).unwrap_err();
        assert!(matches!(
            err,
            EvalError::Alignment(AlignmentError::MissingField { .. })
        ));

        let mut m = meta(&[1]);
        m.insert("strand".into(), MetaColumn::Text(vec!["+".into()]));
        let err = acc.push(scored(&[("a", vec![0.3], vec![1.0])]), m).unwrap_err();
        assert!(matches!(
            err,
            EvalError::Alignment(AlignmentError::UnknownField { .. })
        ));
    }

    #[test]
    fn ragged_batch_is_rejected() {
        let mut acc = Accumulator::new(["a"], &META_FIELDS);
        let err = acc
            .push(scored(&[("a", vec![0.3, 0.4], vec![1.0, 0.0])]), meta(&[1]))
            .unwrap_err();
        assert!(matches!(
            err,
            EvalError::Alignment(AlignmentError::LengthMismatch { expected: 1, found: 2, .. })
        ));
    }

    #[test]
    fn empty_accumulator_finalizes_to_nothing() {
        let acc = Accumulator::new(["a"], &META_FIELDS);
        let data = acc.finalize().unwrap();
        assert!(data.preds.is_empty());
        assert!(data.meta.is_empty());
        assert_eq!(data.n_samples(), 0);
    }
}
