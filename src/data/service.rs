//! Batch sources: chunked readers over dataset files and the fused iterator
//! that keeps the label stream and the metadata stream in step.

use std::cell::{Cell, RefCell};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use ndarray::{ArrayD, Axis, Slice};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use regex::Regex;

use crate::common::error::{AlignmentError, EvalError, EvalResult};
use crate::model::domain::OutputSpec;

use super::domain::{leaf_name, Batch, Columns, EvalBatch, MetaBatch, GROUP_SEP};
use super::repo_fs::{load_dataset, read_summary, LoadedDataset};

/// Output group whose members are per-replicate targets.
pub const REPLICATE_GROUP: &str = "cpg";

/// Count the samples in `files`, optionally capped at `cap`.
pub fn get_nb_sample(files: &[PathBuf], cap: Option<usize>) -> EvalResult<usize> {
    let mut total = 0usize;
    for path in files {
        total += read_summary(path)?.n_samples;
        if cap.is_some_and(|c| total >= c) {
            break;
        }
    }
    Ok(cap.map_or(total, |c| total.min(c)))
}

/// Replicate names stored in `file`, filtered by `patterns` (a name is kept
/// when any pattern matches somewhere in it) and truncated to `nb_key`.
pub fn get_replicate_names(
    file: &Path,
    patterns: Option<&[String]>,
    nb_key: Option<usize>,
) -> EvalResult<Vec<String>> {
    let prefix = format!("{REPLICATE_GROUP}{GROUP_SEP}");
    let names: Vec<String> = read_summary(file)?
        .outputs
        .iter()
        .filter_map(|k| k.strip_prefix(&prefix))
        .map(str::to_string)
        .collect();
    filter_replicates(&names, patterns, nb_key)
}

/// Apply replicate patterns and the count limit to an already known list.
pub fn filter_replicates(
    names: &[String],
    patterns: Option<&[String]>,
    nb_key: Option<usize>,
) -> EvalResult<Vec<String>> {
    let regexes = patterns
        .unwrap_or_default()
        .iter()
        .map(|p| Regex::new(p))
        .collect::<Result<Vec<_>, _>>()?;
    let mut names: Vec<String> = names
        .iter()
        .filter(|leaf| regexes.is_empty() || regexes.iter().any(|re| re.is_match(leaf)))
        .cloned()
        .collect();
    if let Some(n) = nb_key {
        names.truncate(n);
    }
    Ok(names)
}

/// Model outputs that should be loaded: every non-replicate output, plus the
/// replicate outputs whose name survived the replicate filter.
pub fn select_outputs(
    model_outputs: &[OutputSpec],
    all_replicates: &[String],
    selected: &[String],
) -> Vec<OutputSpec> {
    model_outputs
        .iter()
        .filter(|spec| {
            let leaf = leaf_name(&spec.name);
            !all_replicates.iter().any(|r| r == leaf) || selected.iter().any(|r| r == leaf)
        })
        .cloned()
        .collect()
}

/// Iteration settings shared by both readers.
#[derive(Clone, Debug)]
pub struct ReaderSpec {
    pub nb_sample: usize,
    pub batch_size: usize,
    /// Restart from the first file after the last one.
    pub loop_forever: bool,
    /// Permute file order on every pass.
    pub shuffle: bool,
    pub seed: u64,
}

impl ReaderSpec {
    /// Deterministic single pass, as evaluation requires.
    pub fn single_pass(nb_sample: usize, batch_size: usize) -> Self {
        Self {
            nb_sample,
            batch_size,
            loop_forever: false,
            shuffle: false,
            seed: 0,
        }
    }
}

struct FileCursor {
    files: Vec<PathBuf>,
    order: Vec<usize>,
    pos: usize,
    shuffle: bool,
    rng: StdRng,
}

impl FileCursor {
    fn new(files: Vec<PathBuf>, shuffle: bool, seed: u64) -> Self {
        let order = (0..files.len()).collect();
        let mut cursor = Self {
            files,
            order,
            pos: 0,
            shuffle,
            rng: StdRng::seed_from_u64(seed),
        };
        cursor.restart();
        cursor
    }

    fn restart(&mut self) {
        self.pos = 0;
        if self.shuffle {
            self.order.shuffle(&mut self.rng);
        }
    }

    fn next_file(&mut self) -> Option<PathBuf> {
        let idx = *self.order.get(self.pos)?;
        self.pos += 1;
        Some(self.files[idx].clone())
    }
}

/// Most recently loaded dataset, shared by readers that walk the same files
/// in step so that each file is parsed and held once.
#[derive(Clone, Default)]
pub struct DatasetCache {
    slot: Rc<RefCell<Option<(PathBuf, Rc<LoadedDataset>)>>>,
    loads: Rc<Cell<usize>>,
}

impl DatasetCache {
    fn get(&self, path: &Path) -> EvalResult<Rc<LoadedDataset>> {
        if let Some((cached, ds)) = self.slot.borrow().as_ref() {
            if cached == path {
                return Ok(Rc::clone(ds));
            }
        }
        // release our hold on the previous file before parsing the next
        self.slot.borrow_mut().take();
        log::debug!("reading {}", path.display());
        let ds = Rc::new(load_dataset(path)?);
        self.loads.set(self.loads.get() + 1);
        *self.slot.borrow_mut() = Some((path.to_path_buf(), Rc::clone(&ds)));
        Ok(ds)
    }

    /// Files parsed through this cache so far.
    pub fn loads(&self) -> usize {
        self.loads.get()
    }
}

/// Walks the files and hands out `start..end` row ranges of the current one.
/// Batches never span two files, and the final batch is cut so that exactly
/// `nb_sample` rows come out of a pass.
struct ChunkReader {
    cursor: FileCursor,
    spec: ReaderSpec,
    cache: DatasetCache,
    current: Option<Rc<LoadedDataset>>,
    offset: usize,
    nb_seen: usize,
    done: bool,
}

impl ChunkReader {
    fn new(files: &[PathBuf], spec: ReaderSpec) -> Self {
        Self {
            cursor: FileCursor::new(files.to_vec(), spec.shuffle, spec.seed),
            spec,
            cache: DatasetCache::default(),
            current: None,
            offset: 0,
            nb_seen: 0,
            done: false,
        }
    }

    fn advance(&mut self) -> EvalResult<Option<(usize, usize)>> {
        loop {
            let remaining = self.spec.nb_sample.saturating_sub(self.nb_seen);
            if remaining > 0 {
                if let Some(ds) = &self.current {
                    if self.offset < ds.n_samples {
                        let start = self.offset;
                        let end = ds
                            .n_samples
                            .min(start + self.spec.batch_size)
                            .min(start + remaining);
                        self.offset = end;
                        self.nb_seen += end - start;
                        return Ok(Some((start, end)));
                    }
                }
                if let Some(path) = self.cursor.next_file() {
                    self.current = Some(self.cache.get(&path)?);
                    self.offset = 0;
                    continue;
                }
            }

            if !self.spec.loop_forever || self.nb_seen == 0 {
                return Ok(None);
            }
            self.cursor.restart();
            self.current = None;
            self.nb_seen = 0;
        }
    }

    /// Next row range together with the dataset it belongs to.
    fn next_chunk(&mut self) -> Option<EvalResult<(&LoadedDataset, usize, usize)>> {
        if self.done {
            return None;
        }
        match self.advance() {
            Ok(Some((start, end))) => self
                .current
                .as_ref()
                .map(|ds| Ok((&**ds, start, end))),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

fn slice_rows(array: &ArrayD<f32>, start: usize, end: usize) -> ArrayD<f32> {
    array
        .slice_axis(Axis(0), Slice::from(start..end))
        .to_owned()
}

fn pick(columns: &Columns, names: &[String], kind: &str, start: usize, end: usize) -> EvalResult<Columns> {
    names
        .iter()
        .map(|name| {
            columns
                .get(name)
                .map(|a| (name.clone(), slice_rows(a, start, end)))
                .ok_or_else(|| EvalError::data(format!("{kind} '{name}' not found in dataset")))
        })
        .collect()
}

/// Yields [`Batch`]es holding the named inputs and outputs.
pub struct BatchReader {
    chunks: ChunkReader,
    inputs: Vec<String>,
    outputs: Vec<String>,
}

impl BatchReader {
    pub fn new(files: &[PathBuf], inputs: Vec<String>, outputs: &[OutputSpec], spec: ReaderSpec) -> Self {
        Self {
            chunks: ChunkReader::new(files, spec),
            inputs,
            outputs: outputs.iter().map(|o| o.name.clone()).collect(),
        }
    }

    /// Load files through `cache` instead of a private one.
    pub fn with_cache(mut self, cache: DatasetCache) -> Self {
        self.chunks.cache = cache;
        self
    }
}

impl Iterator for BatchReader {
    type Item = EvalResult<Batch>;

    fn next(&mut self) -> Option<Self::Item> {
        let (inputs, outputs) = (&self.inputs, &self.outputs);
        let chunk = self.chunks.next_chunk()?;
        Some(chunk.and_then(|(ds, start, end)| {
            let weights = ds.weights.as_ref().map(|w| {
                outputs
                    .iter()
                    .filter_map(|name| w.get(name).map(|a| (name.clone(), slice_rows(a, start, end))))
                    .collect()
            });
            Ok(Batch {
                inputs: pick(&ds.inputs, inputs, "input", start, end)?,
                outputs: pick(&ds.outputs, outputs, "output", start, end)?,
                weights,
            })
        }))
    }
}

/// Yields the auxiliary per-sample fields for the same rows as [`BatchReader`].
pub struct MetaReader {
    chunks: ChunkReader,
    fields: Vec<String>,
}

impl MetaReader {
    pub fn new(files: &[PathBuf], fields: &[&str], spec: ReaderSpec) -> Self {
        Self {
            chunks: ChunkReader::new(files, spec),
            fields: fields.iter().map(|f| f.to_string()).collect(),
        }
    }

    /// Load files through `cache` instead of a private one.
    pub fn with_cache(mut self, cache: DatasetCache) -> Self {
        self.chunks.cache = cache;
        self
    }
}

impl Iterator for MetaReader {
    type Item = EvalResult<MetaBatch>;

    fn next(&mut self) -> Option<Self::Item> {
        let fields = &self.fields;
        let chunk = self.chunks.next_chunk()?;
        Some(chunk.and_then(|(ds, start, end)| {
            fields
                .iter()
                .map(|f| {
                    ds.meta
                        .get(f)
                        .map(|col| (f.clone(), col.slice(start, end)))
                        .ok_or_else(|| EvalError::data(format!("field '{f}' not found in dataset")))
                })
                .collect()
        }))
    }
}

/// Zips a batch stream and a metadata stream into one record per step,
/// failing as soon as the two disagree.
pub struct SyncedBatches<B, M> {
    batches: B,
    meta: M,
    index: usize,
    done: bool,
}

impl<B, M> SyncedBatches<B, M>
where
    B: Iterator<Item = EvalResult<Batch>>,
    M: Iterator<Item = EvalResult<MetaBatch>>,
{
    pub fn new(batches: B, meta: M) -> Self {
        Self {
            batches,
            meta,
            index: 0,
            done: false,
        }
    }

    fn step(&mut self) -> Option<EvalResult<EvalBatch>> {
        let batch = self.index;
        let item: EvalResult<EvalBatch> = match (self.batches.next(), self.meta.next()) {
            (None, None) => return None,
            (Some(Err(e)), _) | (_, Some(Err(e))) => Err(e),
            (Some(Ok(_)), None) => Err(AlignmentError::StreamExhausted {
                batch,
                stream: "metadata",
            }
            .into()),
            (None, Some(Ok(_))) => Err(AlignmentError::StreamExhausted {
                batch,
                stream: "data",
            }
            .into()),
            (Some(Ok(data)), Some(Ok(meta))) => {
                let primary = data.len();
                match meta.values().find(|col| col.len() != primary) {
                    Some(col) => Err(AlignmentError::BatchSizeMismatch {
                        batch,
                        primary,
                        meta: col.len(),
                    }
                    .into()),
                    None => Ok(EvalBatch { batch: data, meta }),
                }
            }
        };
        self.index += 1;
        Some(item)
    }
}

impl<B, M> Iterator for SyncedBatches<B, M>
where
    B: Iterator<Item = EvalResult<Batch>>,
    M: Iterator<Item = EvalResult<MetaBatch>>,
{
    type Item = EvalResult<EvalBatch>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let item = self.step();
        if !matches!(item, Some(Ok(_))) {
            self.done = true;
        }
        item
    }
}

/// Both readers over `files`, single pass, bound to the selected outputs and
/// sharing one loaded copy of each file.
pub fn open_eval_stream(
    files: &[PathBuf],
    inputs: Vec<String>,
    outputs: &[OutputSpec],
    meta_fields: &[&str],
    nb_sample: usize,
    batch_size: usize,
) -> SyncedBatches<BatchReader, MetaReader> {
    let spec = ReaderSpec::single_pass(nb_sample, batch_size);
    let cache = DatasetCache::default();
    SyncedBatches::new(
        BatchReader::new(files, inputs, outputs, spec.clone()).with_cache(cache.clone()),
        MetaReader::new(files, meta_fields, spec).with_cache(cache),
    )
}
