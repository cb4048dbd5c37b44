//! Fixtures shared by the integration tests: small dataset files and an
//! identity model over them.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use evalstream::data::domain::{TensorData, MASK};
use evalstream::data::repo_fs::{write_dataset, DatasetFile};
use evalstream::model::repo_fs::{write_model_file, Activation, HeadDef, ModelFile};
use evalstream::EvalCfg;

pub const REPLICATES: [&str; 2] = ["A", "B"];

/// Input `x` and labels per replicate, for two files of 3 and 2 samples.
pub fn samples() -> Vec<(Vec<f32>, Vec<Vec<f32>>, Vec<i64>)> {
    vec![
        (
            vec![0.2, 0.8, 0.6],
            vec![vec![0.0, 1.0, MASK], vec![1.0, 0.0, 1.0]],
            vec![10, 20, 30],
        ),
        (
            vec![0.1, 0.9],
            vec![vec![0.0, 1.0], vec![0.0, MASK]],
            vec![40, 50],
        ),
    ]
}

fn tensor(values: &[f32]) -> TensorData {
    TensorData {
        shape: vec![values.len()],
        data: values.to_vec(),
    }
}

pub fn write_data(dir: &Path) -> Vec<PathBuf> {
    samples()
        .into_iter()
        .enumerate()
        .map(|(i, (x, labels, pos))| {
            let mut inputs = BTreeMap::new();
            inputs.insert("x".to_string(), tensor(&x));
            let outputs = REPLICATES
                .iter()
                .zip(&labels)
                .map(|(name, y)| (format!("cpg/{name}"), tensor(y)))
                .collect();
            let file = DatasetFile {
                chromo: vec!["1".into(); pos.len()],
                pos,
                inputs,
                outputs,
                weights: None,
            };
            let path = dir.join(format!("data_{i}.json"));
            write_dataset(&path, &file).unwrap();
            path
        })
        .collect()
}

/// One linear head per replicate that returns `x` unchanged.
pub fn write_identity_model(dir: &Path) -> PathBuf {
    let heads = REPLICATES
        .iter()
        .map(|name| HeadDef {
            name: format!("cpg/{name}"),
            input: "x".into(),
            weights: vec![vec![1.0]],
            bias: vec![0.0],
            activation: Activation::Linear,
        })
        .collect();
    let path = dir.join("model.json");
    write_model_file(
        &path,
        &ModelFile {
            name: Some("identity".into()),
            heads,
        },
    )
    .unwrap();
    path
}

pub fn config(dir: &Path) -> EvalCfg {
    EvalCfg {
        data_files: write_data(dir),
        model_files: vec![write_identity_model(dir)],
        ..Default::default()
    }
}
