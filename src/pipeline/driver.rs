//! Run driver: load the model, open the data, stream batches through
//! inference into the accumulator, then report and persist.

use std::fmt;
use std::io::Write;
use std::path::Path;

use crate::common::config::EvalCfg;
use crate::common::error::{EvalError, EvalResult};
use crate::data::domain::{EvalBatch, EvalData, META_FIELDS};
use crate::data::repo_fs::write_eval_data;
use crate::data::service::{
    filter_replicates, get_nb_sample, get_replicate_names, open_eval_stream, select_outputs,
};
use crate::evaluation::domain::Report;
use crate::evaluation::service::{evaluate_outputs, unstack_report, write_report_tsv};
use crate::inference::service::predict_batch;
use crate::model::domain::{Model, OutputSpec};
use crate::model::service::load_model;

use super::accumulate::Accumulator;
use super::progress::{ProgressMode, ProgressReporter};

/// Stages of one run, in order.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RunState {
    Init,
    ModelLoaded,
    DataOpened,
    Streaming,
    Finalized,
    Reported,
    Done,
}

impl RunState {
    pub fn next(self) -> Option<Self> {
        match self {
            RunState::Init => Some(RunState::ModelLoaded),
            RunState::ModelLoaded => Some(RunState::DataOpened),
            RunState::DataOpened => Some(RunState::Streaming),
            RunState::Streaming => Some(RunState::Finalized),
            RunState::Finalized => Some(RunState::Reported),
            RunState::Reported => Some(RunState::Done),
            RunState::Done => None,
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunState::Init => "init",
            RunState::ModelLoaded => "model_loaded",
            RunState::DataOpened => "data_opened",
            RunState::Streaming => "streaming",
            RunState::Finalized => "finalized",
            RunState::Reported => "reported",
            RunState::Done => "done",
        };
        f.write_str(name)
    }
}

struct Stages {
    state: RunState,
}

impl Stages {
    fn new() -> Self {
        Self {
            state: RunState::Init,
        }
    }

    fn advance(&mut self) {
        if let Some(next) = self.state.next() {
            log::debug!("{} -> {}", self.state, next);
            self.state = next;
        }
    }
}

/// What a finished run produced.
#[derive(Clone, Debug)]
pub struct RunSummary {
    pub n_samples: usize,
    pub n_batches: usize,
    pub report: Report,
    pub final_state: RunState,
}

/// Pull fused batches, predict, accumulate. Stops when the stream ends or once
/// `limit` samples have been accumulated.
pub fn stream_batches<I>(
    model: &dyn Model,
    outputs: &[OutputSpec],
    batches: I,
    limit: Option<usize>,
    reporter: &mut dyn ProgressReporter,
) -> EvalResult<Accumulator>
where
    I: IntoIterator<Item = EvalResult<EvalBatch>>,
{
    let mut acc = Accumulator::new(outputs.iter().map(|o| o.name.clone()), &META_FIELDS);
    for (index, item) in batches.into_iter().enumerate() {
        if limit.is_some_and(|cap| acc.n_samples() >= cap) {
            break;
        }
        let EvalBatch { batch, meta } = item?;
        let n = batch.len();
        let scored = predict_batch(model, batch, outputs, index)?;
        acc.push(scored, meta)?;
        reporter.on_batch(n);
    }
    reporter.on_complete();
    Ok(acc)
}

/// [`stream_batches`] followed by finalisation.
pub fn stream_eval<I>(
    model: &dyn Model,
    outputs: &[OutputSpec],
    batches: I,
    reporter: &mut dyn ProgressReporter,
) -> EvalResult<EvalData>
where
    I: IntoIterator<Item = EvalResult<EvalBatch>>,
{
    stream_batches(model, outputs, batches, None, reporter)?.finalize()
}

/// Compute metrics for the outputs in `specs`, write the long report when
/// asked, print the wide one.
pub fn report(
    data: &EvalData,
    specs: &[OutputSpec],
    out_report: Option<&Path>,
    out: &mut dyn Write,
) -> EvalResult<Report> {
    let report = evaluate_outputs(&data.outputs, &data.preds, specs)?;
    if let Some(path) = out_report {
        write_report_tsv(&report, path)?;
        log::debug!("report written to {}", path.display());
    }
    let wide = unstack_report(&report);
    write!(out, "{wide}").map_err(|e| EvalError::io("<stdout>", e))?;
    Ok(report)
}

/// Full evaluation run as configured by `cfg`.
pub fn run(cfg: &EvalCfg, progress: ProgressMode, out: &mut dyn Write) -> EvalResult<RunSummary> {
    let mut stages = Stages::new();
    cfg.validate()?;

    log::info!("Loading model ...");
    let model = load_model(&cfg.model_files)?;
    stages.advance();

    log::info!("Loading data ...");
    let nb_sample = get_nb_sample(&cfg.data_files, cfg.nb_sample)?;
    let first = &cfg.data_files[0];
    let all_replicates = get_replicate_names(first, None, None)?;
    let replicates = filter_replicates(&all_replicates, cfg.replicate_names.as_deref(), cfg.nb_replicate)?;
    let outputs = select_outputs(model.outputs(), &all_replicates, &replicates);
    if outputs.is_empty() {
        return Err(EvalError::config("no model output left after replicate selection"));
    }
    log::debug!(
        "{} samples, {} of {} outputs selected",
        nb_sample,
        outputs.len(),
        model.outputs().len()
    );
    let stream = open_eval_stream(
        &cfg.data_files,
        model.inputs().to_vec(),
        &outputs,
        &META_FIELDS,
        nb_sample,
        cfg.batch_size,
    );
    stages.advance();

    log::info!("Predicting ...");
    stages.advance();
    let mut reporter = progress.reporter(nb_sample);
    let acc = stream_batches(model.as_ref(), &outputs, stream, Some(nb_sample), reporter.as_mut())?;

    let data = acc.finalize()?;
    stages.advance();

    let report = report(&data, &outputs, cfg.out_report.as_deref(), out)?;
    stages.advance();

    if let Some(path) = &cfg.out_data {
        write_eval_data(path, &data)?;
    }
    stages.advance();
    log::info!("Done!");

    Ok(RunSummary {
        n_samples: acc.n_samples(),
        n_batches: acc.n_batches(),
        report,
        final_state: stages.state,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::error::AlignmentError;
    use crate::data::domain::{Batch, Columns, MetaBatch, MetaColumn, CHROMO, MASK, POS};
    use crate::evaluation::metrics::Metric;
    use crate::model::domain::OutputKind;
    use ndarray::{array, ArrayD, Axis};

    /// Echoes input column `x` back as the prediction for every output.
    struct EchoModel {
        inputs: Vec<String>,
        outputs: Vec<OutputSpec>,
    }

    impl EchoModel {
        fn new(names: &[&str]) -> Self {
            Self {
                inputs: vec!["x".into()],
                outputs: names.iter().map(|n| OutputSpec::new(*n, OutputKind::Binary)).collect(),
            }
        }
    }

    impl Model for EchoModel {
        fn name(&self) -> &str {
            "echo"
        }
        fn inputs(&self) -> &[String] {
            &self.inputs
        }
        fn outputs(&self) -> &[OutputSpec] {
            &self.outputs
        }
        fn predict(&self, inputs: &Columns) -> EvalResult<Vec<ArrayD<f32>>> {
            let x = inputs["x"].clone().insert_axis(Axis(1));
            Ok(self.outputs.iter().map(|_| x.clone()).collect())
        }
    }

    #[derive(Default)]
    struct Recorder {
        batches: Vec<usize>,
        completed: bool,
    }

    impl ProgressReporter for Recorder {
        fn on_batch(&mut self, n: usize) {
            self.batches.push(n);
        }
        fn on_complete(&mut self) {
            self.completed = true;
        }
    }

    fn eval_batch(name: &str, preds: &[f32], labels: &[f32], first_pos: i64) -> EvalResult<EvalBatch> {
        let n = preds.len();
        let mut batch = Batch::default();
        batch
            .inputs
            .insert("x".into(), ArrayD::from_shape_vec(vec![n], preds.to_vec()).unwrap());
        batch.outputs.insert(
            name.into(),
            ArrayD::from_shape_vec(vec![n, 1], labels.to_vec()).unwrap(),
        );
        let mut meta = MetaBatch::new();
        meta.insert(CHROMO.into(), MetaColumn::Text(vec!["1".into(); n]));
        meta.insert(
            POS.into(),
            MetaColumn::Int((first_pos..first_pos + n as i64).collect()),
        );
        Ok(EvalBatch { batch, meta })
    }

    #[test]
    fn states_run_in_order() {
        let mut state = RunState::Init;
        let mut seen = vec![state];
        while let Some(next) = state.next() {
            state = next;
            seen.push(state);
        }
        assert_eq!(seen.len(), 7);
        assert_eq!(seen.last(), Some(&RunState::Done));
    }

    #[test]
    fn two_batch_scenario() {
        let model = EchoModel::new(&["cpg"]);
        let batches = vec![
            eval_batch("cpg", &[0.1, 0.9], &[0.0, 1.0], 0),
            eval_batch("cpg", &[0.4, 0.2], &[MASK, 0.0], 2),
        ];
        let mut rec = Recorder::default();
        let data = stream_eval(&model, model.outputs(), batches, &mut rec).unwrap();

        assert_eq!(data.outputs["cpg"], array![0.0f32, 1.0, MASK, 0.0].into_dyn());
        assert_eq!(data.preds["cpg"], array![0.1f32, 0.9, 0.4, 0.2].into_dyn());
        assert_eq!(data.meta[POS], MetaColumn::Int(vec![0, 1, 2, 3]));
        assert_eq!(rec.batches, vec![2, 2]);
        assert!(rec.completed);

        let mut out = Vec::new();
        let report = report(&data, model.outputs(), None, &mut out).unwrap();
        assert_eq!(report.get("cpg", Metric::N), Some(3.0));
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("output"));
        assert!(text.contains("cpg"));
    }

    #[test]
    fn limit_stops_streaming() {
        let model = EchoModel::new(&["cpg"]);
        let batches = vec![
            eval_batch("cpg", &[0.1, 0.9], &[0.0, 1.0], 0),
            eval_batch("cpg", &[0.4, 0.2], &[1.0, 0.0], 2),
            eval_batch("cpg", &[0.4, 0.2], &[1.0, 0.0], 4),
        ];
        let acc = stream_batches(&model, model.outputs(), batches, Some(4), &mut Recorder::default())
            .unwrap();
        assert_eq!(acc.n_samples(), 4);
        assert_eq!(acc.n_batches(), 2);
    }

    #[test]
    fn new_output_mid_stream_fails() {
        let model = EchoModel::new(&["cpg"]);
        let mut second = eval_batch("cpg", &[0.4], &[1.0], 1).unwrap();
        second
            .batch
            .outputs
            .insert("cpg/other".into(), ArrayD::zeros(vec![1, 1]));
        let batches = vec![eval_batch("cpg", &[0.1], &[0.0], 0), Ok(second)];
        let err = stream_batches(&model, model.outputs(), batches, None, &mut Recorder::default())
            .unwrap_err();
        assert!(matches!(
            err,
            EvalError::Alignment(AlignmentError::UnknownOutput { batch: 1, .. })
        ));
    }

    #[test]
    fn stream_errors_propagate() {
        let model = EchoModel::new(&["cpg"]);
        let batches = vec![
            eval_batch("cpg", &[0.1], &[0.0], 0),
            Err(EvalError::data("truncated file")),
        ];
        let mut rec = Recorder::default();
        let err = stream_batches(&model, model.outputs(), batches, None, &mut rec).unwrap_err();
        assert!(matches!(err, EvalError::Data(_)));
        assert_eq!(rec.batches, vec![1]);
        assert!(!rec.completed);
    }

    #[test]
    fn run_without_model_files_fails_before_reading() {
        let cfg = EvalCfg {
            data_files: vec!["/does/not/exist.json".into()],
            ..Default::default()
        };
        let err = run(&cfg, ProgressMode::Silent, &mut Vec::new()).unwrap_err();
        assert!(matches!(err, EvalError::Config(_)));
    }
}
