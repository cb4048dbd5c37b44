mod common;

use evalstream::data::domain::{MetaBatch, MetaColumn, CHROMO, MASK, META_FIELDS, POS};
use evalstream::data::repo_fs::read_eval_data;
use evalstream::inference::BatchPredictions;
use evalstream::pipeline::{run, Accumulator, ProgressMode};
use ndarray::ArrayD;
use proptest::prelude::*;

const OUTPUTS: [&str; 2] = ["cpg/a", "cpg/mean"];

/// Rows of (prediction, label) per batch.
fn batches() -> impl Strategy<Value = Vec<Vec<(f32, f32)>>> {
    let label = prop_oneof![Just(0.0f32), Just(1.0), Just(MASK)];
    prop::collection::vec(prop::collection::vec((0.0f32..1.0, label), 1..5), 1..6)
}

fn scored(rows: &[(f32, f32)]) -> BatchPredictions {
    let column = |values: Vec<f32>| ArrayD::from_shape_vec(vec![values.len()], values).unwrap();
    let mut out = BatchPredictions::default();
    for name in OUTPUTS {
        out.preds
            .insert(name.into(), column(rows.iter().map(|r| r.0).collect()));
        out.labels
            .insert(name.into(), column(rows.iter().map(|r| r.1).collect()));
    }
    out
}

fn meta(first: i64, n: usize) -> MetaBatch {
    let mut m = MetaBatch::new();
    m.insert(CHROMO.into(), MetaColumn::Text(vec!["1".into(); n]));
    m.insert(POS.into(), MetaColumn::Int((first..first + n as i64).collect()));
    m
}

fn all_positions() -> Vec<i64> {
    common::samples().into_iter().flat_map(|(_, _, pos)| pos).collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn batch_size_does_not_change_results(batch_size in 1usize..7, cap in proptest::option::of(1usize..6)) {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = common::config(dir.path());
        cfg.batch_size = batch_size;
        cfg.nb_sample = cap;
        cfg.out_data = Some(dir.path().join("data.json"));
        let summary = run(&cfg, ProgressMode::Silent, &mut Vec::new()).unwrap();

        let expected = cap.unwrap_or(5).min(5);
        prop_assert_eq!(summary.n_samples, expected);

        let data = read_eval_data(cfg.out_data.as_ref().unwrap()).unwrap();
        let mut pos = all_positions();
        pos.truncate(expected);
        prop_assert_eq!(&data.meta[POS], &MetaColumn::Int(pos));
        for name in ["cpg/A", "cpg/B"] {
            prop_assert_eq!(data.preds[name].len(), expected);
            prop_assert_eq!(data.outputs[name].len(), expected);
        }

        let mut reference = common::config(dir.path());
        reference.batch_size = 5;
        reference.nb_sample = cap;
        let full = run(&reference, ProgressMode::Silent, &mut Vec::new()).unwrap();
        for (a, b) in summary.report.rows.iter().zip(&full.report.rows) {
            prop_assert_eq!(&a.output, &b.output);
            prop_assert!(a.value == b.value || (a.value.is_nan() && b.value.is_nan()));
        }
    }

    #[test]
    fn finalize_is_repeatable_and_keeps_rows(parts in batches(), discover in any::<bool>()) {
        let mut acc = if discover {
            Accumulator::discover(&META_FIELDS)
        } else {
            Accumulator::new(OUTPUTS, &META_FIELDS)
        };
        let mut next_pos = 0i64;
        for rows in &parts {
            acc.push(scored(rows), meta(next_pos, rows.len())).unwrap();
            next_pos += rows.len() as i64;
        }

        let first = acc.finalize().unwrap();
        let second = acc.finalize().unwrap();
        prop_assert_eq!(&first, &second);

        let all: Vec<(f32, f32)> = parts.concat();
        prop_assert_eq!(acc.n_samples(), all.len());
        prop_assert_eq!(acc.n_batches(), parts.len());
        prop_assert_eq!(first.n_samples(), all.len());
        prop_assert_eq!(&first.meta[POS], &MetaColumn::Int((0..next_pos).collect()));
        for name in OUTPUTS {
            let labels: Vec<f32> = first.outputs[name].iter().copied().collect();
            let preds: Vec<f32> = first.preds[name].iter().copied().collect();
            prop_assert_eq!(labels, all.iter().map(|r| r.1).collect::<Vec<_>>());
            prop_assert_eq!(preds, all.iter().map(|r| r.0).collect::<Vec<_>>());
        }
    }
}
