//! Chain storage.
//!
//! Accumulated walker positions and log-posteriors live in growable
//! in-memory arrays ([`Chain`] and [`ProbStore`]) with index-based writes.
//! Capacity is grown once per batch of iterations rather than per step.
//! A configured sink additionally mirrors each appended iteration to disk:
//! [`TextSink`] appends plain rows of positions, [`StructuredSink`] flushes
//! a full [`RunContainer`] with run metadata and the generator snapshot so
//! an interrupted run can be resumed from the last fully written iteration.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::{Error, Result};
use crate::guess::Guess;
use crate::rng::RandomState;

/// On-disk representation of chain output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Append-only text rows of walker positions
    Text,
    /// A structured container with metadata, arrays and the generator state
    Structured,
}

/// Run metadata persisted by the structured sink
#[derive(Debug, Clone)]
pub(crate) struct RunMeta {
    pub npars: usize,
    pub nwalkers: usize,
    pub scale: f64,
    pub fixedinds: Vec<usize>,
    pub fixedvals: Vec<f64>,
    pub postargs: Option<serde_json::Value>,
}

/// Accumulated walker positions, iteration-major.
///
/// Capacity and recorded length are tracked separately: [`extend`] grows
/// the backing array ahead of a batch, [`record`] marks an iteration as
/// written. The accessors only ever expose recorded iterations, so an
/// aborted run never shows pre-grown zero rows as chain data.
///
/// [`extend`]: #method.extend
/// [`record`]: #method.record
#[derive(Debug, Default)]
pub struct Chain {
    data: Vec<f64>,
    nparams: usize,
    nwalkers: usize,
    capacity: usize,
    niterations: usize,
}

impl Chain {
    /// An empty chain; capacity is added with [`extend`](#method.extend)
    pub fn new(nparams: usize, nwalkers: usize) -> Chain {
        Chain {
            nparams,
            nwalkers,
            capacity: 0,
            niterations: 0,
            data: Vec::new(),
        }
    }

    /// Grow capacity by `additional` iterations in one allocation
    pub fn extend(&mut self, additional: usize) {
        self.capacity += additional;
        self.data.resize(self.nparams * self.nwalkers * self.capacity, 0f64);
    }

    /// Drop all recorded iterations and capacity
    pub fn clear(&mut self) {
        self.capacity = 0;
        self.niterations = 0;
        self.data.clear();
    }

    /// Number of recorded iterations
    pub fn niterations(&self) -> usize {
        self.niterations
    }

    /// Mark every iteration up to and including `iteration_idx` as recorded
    pub fn record(&mut self, iteration_idx: usize) {
        assert!(iteration_idx < self.capacity);
        self.niterations = self.niterations.max(iteration_idx + 1);
    }

    /// Write one parameter value
    pub fn set(&mut self, param_idx: usize, walker_idx: usize, iteration_idx: usize, value: f64) {
        assert!(param_idx < self.nparams);
        assert!(walker_idx < self.nwalkers);
        assert!(iteration_idx < self.capacity);

        let idx = self.index(param_idx, walker_idx, iteration_idx);

        self.data[idx] = value;
    }

    /// Read one parameter value
    pub fn get(&self, param_idx: usize, walker_idx: usize, iteration_idx: usize) -> f64 {
        assert!(param_idx < self.nparams);
        assert!(walker_idx < self.nwalkers);
        assert!(iteration_idx < self.niterations);

        let idx = self.index(param_idx, walker_idx, iteration_idx);

        self.data[idx]
    }

    /// Overwrite one walker's position at one iteration
    pub fn set_params(&mut self, walker_idx: usize, iteration_idx: usize, newdata: &[f64]) {
        assert_eq!(newdata.len(), self.nparams);
        for (idx, value) in newdata.iter().enumerate() {
            self.set(idx, walker_idx, iteration_idx, *value);
        }
    }

    /// Flatten the chain into one `Guess` per walker per iteration
    pub fn flatchain(&self) -> Vec<Guess> {
        let mut out = Vec::with_capacity(self.niterations * self.nwalkers);
        let mut buffer = vec![0f64; self.nparams];
        for iter in 0..self.niterations {
            for walker in 0..self.nwalkers {
                for (i, value) in buffer.iter_mut().enumerate() {
                    *value = self.get(i, walker, iter);
                }
                out.push(Guess {
                    values: buffer.clone(),
                });
            }
        }
        out
    }

    /// Raw iteration-major data, recorded iterations only
    pub fn as_slice(&self) -> &[f64] {
        &self.data[..self.niterations * self.nwalkers * self.nparams]
    }

    fn index(&self, param_idx: usize, walker_idx: usize, iteration_idx: usize) -> usize {
        (iteration_idx * self.nwalkers * self.nparams) + (walker_idx * self.nparams) + param_idx
    }
}

/// Accumulated per-walker log-posteriors, iteration-major.
///
/// Tracks capacity and recorded length separately, exactly as [`Chain`]
/// does.
#[derive(Debug, Default)]
pub struct ProbStore {
    data: Vec<f64>,
    nwalkers: usize,
    capacity: usize,
    niterations: usize,
}

impl ProbStore {
    /// An empty store; capacity is added with [`extend`](#method.extend)
    pub fn new(nwalkers: usize) -> ProbStore {
        ProbStore {
            nwalkers,
            capacity: 0,
            niterations: 0,
            data: Vec::new(),
        }
    }

    /// Grow capacity by `additional` iterations in one allocation
    pub fn extend(&mut self, additional: usize) {
        self.capacity += additional;
        self.data.resize(self.nwalkers * self.capacity, 0f64);
    }

    /// Drop all recorded iterations and capacity
    pub fn clear(&mut self) {
        self.capacity = 0;
        self.niterations = 0;
        self.data.clear();
    }

    /// Number of recorded iterations
    pub fn niterations(&self) -> usize {
        self.niterations
    }

    /// Mark every iteration up to and including `iteration_idx` as recorded
    pub fn record(&mut self, iteration_idx: usize) {
        assert!(iteration_idx < self.capacity);
        self.niterations = self.niterations.max(iteration_idx + 1);
    }

    /// Write one log-posterior value
    pub fn set(&mut self, walker_idx: usize, iteration_idx: usize, value: f64) {
        assert!(walker_idx < self.nwalkers);
        assert!(
            iteration_idx < self.capacity,
            "iteration index {}, capacity: {}",
            iteration_idx,
            self.capacity
        );

        let idx = self.index(walker_idx, iteration_idx);

        self.data[idx] = value;
    }

    /// Read one log-posterior value
    pub fn get(&self, walker_idx: usize, iteration_idx: usize) -> f64 {
        assert!(walker_idx < self.nwalkers);
        assert!(iteration_idx < self.niterations);

        let idx = self.index(walker_idx, iteration_idx);

        self.data[idx]
    }

    /// Overwrite every walker's log-posterior at one iteration
    pub fn set_probs(&mut self, iteration_idx: usize, newdata: &[f64]) {
        assert_eq!(newdata.len(), self.nwalkers);
        for (idx, value) in newdata.iter().enumerate() {
            self.set(idx, iteration_idx, *value);
        }
    }

    /// Raw iteration-major data, recorded iterations only
    pub fn as_slice(&self) -> &[f64] {
        &self.data[..self.niterations * self.nwalkers]
    }

    fn index(&self, walker_idx: usize, iteration_idx: usize) -> usize {
        (iteration_idx * self.nwalkers) + walker_idx
    }
}

/// Append-only text destination: one tab-separated row of position values
/// per walker per iteration, flushed every step
#[derive(Debug)]
pub(crate) struct TextSink {
    path: PathBuf,
    clobber: bool,
}

impl TextSink {
    pub fn new(path: PathBuf, clobber: bool) -> TextSink {
        TextSink { path, clobber }
    }

    pub fn reset(&self) -> Result<()> {
        if self.clobber && self.path.exists() {
            fs::remove_file(&self.path)?;
        }
        Ok(())
    }

    pub fn append(&self, positions: &[Guess]) -> Result<()> {
        let mut file = fs::OpenOptions::new()
            .append(true)
            .create(true)
            .open(&self.path)?;
        for walker in positions {
            let mut row = String::with_capacity(walker.values.len() * 18);
            for value in &walker.values {
                row.push_str(&format_scientific(*value));
                row.push('\t');
            }
            row.push('\n');
            file.write_all(row.as_bytes())?;
        }
        file.flush()?;
        Ok(())
    }
}

/// `%10.8e`-style scientific notation: a signed, two-digit exponent, which
/// the standard `{:e}` formatter does not produce
fn format_scientific(value: f64) -> String {
    let raw = format!("{:.8e}", value);
    if let Some((mantissa, exponent)) = raw.split_once('e') {
        if let Ok(exp) = exponent.parse::<i32>() {
            return format!("{}e{:+03}", mantissa, exp);
        }
    }
    raw
}

/// The on-disk container written by the structured sink.
///
/// Array layouts match the in-memory stores: `chain` is
/// `[iteration][walker][param]` and `lnprob` is `[iteration][walker]`,
/// both flattened.
#[derive(Debug, Serialize, Deserialize)]
pub struct RunContainer {
    /// Dimensionality of the parameter space
    pub npars: usize,
    /// Number of walkers in the ensemble
    pub nwalkers: usize,
    /// Proposal scale parameter `a`
    pub scale: f64,
    /// Indices of pinned parameters
    pub fixedinds: Vec<usize>,
    /// Values the pinned parameters are held at
    pub fixedvals: Vec<f64>,
    /// Accepted proposal count per walker
    pub naccepted: Vec<usize>,
    /// Number of completed iterations in `chain` and `lnprob`
    pub iterations: usize,
    /// Flattened walker positions, `[iteration][walker][param]`
    pub chain: Vec<f64>,
    /// Flattened log-posteriors, `[iteration][walker]`
    pub lnprob: Vec<f64>,
    /// Random stream snapshot taken after the last recorded iteration
    pub rstate: RandomState,
    /// Posterior auxiliary data as described by the model
    pub postargs: Option<serde_json::Value>,
}

impl RunContainer {
    /// Read a container back from disk
    pub fn load<P: AsRef<Path>>(path: P) -> Result<RunContainer> {
        let raw = fs::read_to_string(path.as_ref())?;
        serde_json::from_str(&raw).map_err(|e| Error::Storage(e.to_string()))
    }

    /// The final recorded ensemble, for resuming an interrupted run.
    /// `None` if the container holds no completed iterations.
    pub fn last_step(&self) -> Option<(Vec<Guess>, Vec<f64>, RandomState)> {
        if self.iterations == 0 {
            return None;
        }
        let t = self.iterations - 1;
        let positions = (0..self.nwalkers)
            .map(|walker| {
                let start = (t * self.nwalkers + walker) * self.npars;
                Guess::new(&self.chain[start..start + self.npars])
            })
            .collect();
        let lnprob = self.lnprob[t * self.nwalkers..(t + 1) * self.nwalkers].to_vec();
        Some((positions, lnprob, self.rstate.clone()))
    }
}

/// Structured destination: the whole [`RunContainer`] is rewritten on every
/// appended iteration, via a temporary file so a crash mid-write leaves the
/// previous flush intact
#[derive(Debug)]
pub(crate) struct StructuredSink {
    path: PathBuf,
    clobber: bool,
}

impl StructuredSink {
    pub fn new(path: PathBuf, clobber: bool) -> StructuredSink {
        StructuredSink { path, clobber }
    }

    pub fn reset(
        &self,
        meta: &RunMeta,
        chain: &Chain,
        lnprob: &ProbStore,
        naccepted: &[usize],
        rstate: &RandomState,
    ) -> Result<()> {
        if !self.clobber && self.path.exists() {
            return Ok(());
        }
        self.flush(meta, chain, lnprob, naccepted, 0, rstate)
    }

    pub fn flush(
        &self,
        meta: &RunMeta,
        chain: &Chain,
        lnprob: &ProbStore,
        naccepted: &[usize],
        iterations: usize,
        rstate: &RandomState,
    ) -> Result<()> {
        // Persist only completed iterations, not the pre-grown capacity
        let container = RunContainer {
            npars: meta.npars,
            nwalkers: meta.nwalkers,
            scale: meta.scale,
            fixedinds: meta.fixedinds.clone(),
            fixedvals: meta.fixedvals.clone(),
            naccepted: naccepted.to_vec(),
            iterations,
            chain: chain.as_slice()[..iterations * meta.nwalkers * meta.npars].to_vec(),
            lnprob: lnprob.as_slice()[..iterations * meta.nwalkers].to_vec(),
            rstate: rstate.clone(),
            postargs: meta.postargs.clone(),
        };

        let raw = serde_json::to_vec(&container).map_err(|e| Error::Storage(e.to_string()))?;
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, raw)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

#[derive(Debug)]
pub(crate) enum Sink {
    Text(TextSink),
    Structured(StructuredSink),
}

/// The sampler's backing storage: in-memory arrays plus an optional sink,
/// all behind one append/extend/reset contract
#[derive(Debug)]
pub(crate) struct ChainStorage {
    chain: Chain,
    lnprob: ProbStore,
    sink: Option<Sink>,
}

impl ChainStorage {
    pub fn new(npars: usize, nwalkers: usize) -> ChainStorage {
        ChainStorage {
            chain: Chain::new(npars, nwalkers),
            lnprob: ProbStore::new(nwalkers),
            sink: None,
        }
    }

    pub fn with_sink(
        npars: usize,
        nwalkers: usize,
        path: PathBuf,
        format: OutputFormat,
        clobber: bool,
    ) -> ChainStorage {
        let sink = match format {
            OutputFormat::Text => Sink::Text(TextSink::new(path, clobber)),
            OutputFormat::Structured => Sink::Structured(StructuredSink::new(path, clobber)),
        };
        ChainStorage {
            chain: Chain::new(npars, nwalkers),
            lnprob: ProbStore::new(nwalkers),
            sink: Some(sink),
        }
    }

    /// Clear accumulated data and reinitialise the destination
    pub fn reset(
        &mut self,
        meta: &RunMeta,
        naccepted: &[usize],
        rstate: &RandomState,
    ) -> Result<()> {
        self.chain.clear();
        self.lnprob.clear();
        match &self.sink {
            Some(Sink::Text(sink)) => sink.reset(),
            Some(Sink::Structured(sink)) => {
                sink.reset(meta, &self.chain, &self.lnprob, naccepted, rstate)
            }
            None => Ok(()),
        }
    }

    /// Grow capacity ahead of a batch of `additional` iterations
    pub fn extend(&mut self, additional: usize) {
        self.chain.extend(additional);
        self.lnprob.extend(additional);
    }

    /// Record one post-accept/reject ensemble snapshot
    #[allow(clippy::too_many_arguments)]
    pub fn append(
        &mut self,
        meta: &RunMeta,
        iteration: usize,
        positions: &[Guess],
        lnprobs: &[f64],
        naccepted: &[usize],
        rstate: &RandomState,
    ) -> Result<()> {
        for (walker_idx, position) in positions.iter().enumerate() {
            self.chain.set_params(walker_idx, iteration, &position.values);
        }
        self.lnprob.set_probs(iteration, lnprobs);
        self.chain.record(iteration);
        self.lnprob.record(iteration);

        match &self.sink {
            Some(Sink::Text(sink)) => sink.append(positions),
            Some(Sink::Structured(sink)) => sink.flush(
                meta,
                &self.chain,
                &self.lnprob,
                naccepted,
                iteration + 1,
                rstate,
            ),
            None => Ok(()),
        }
    }

    pub fn chain(&self) -> &Chain {
        &self.chain
    }

    pub fn lnprob(&self) -> &ProbStore {
        &self.lnprob
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::rng::RandomStream;

    fn test_meta(npars: usize, nwalkers: usize) -> RunMeta {
        RunMeta {
            npars,
            nwalkers,
            scale: 2.0,
            fixedinds: Vec::new(),
            fixedvals: Vec::new(),
            postargs: None,
        }
    }

    #[test]
    fn test_chain() {
        let nparams = 2;
        let nwalkers = 10;
        let niterations = 1000;
        let mut chain = Chain::new(nparams, nwalkers);
        chain.extend(niterations);
        assert_eq!(chain.data.len(), nparams * nwalkers * niterations);

        assert_eq!(chain.index(0, 0, 0), 0);
        assert_eq!(chain.index(1, 0, 0), 1);
        assert_eq!(chain.index(0, 1, 0), 2);
        assert_eq!(chain.index(1, 1, 0), 3);
        assert_eq!(chain.index(0, 2, 0), 4);
        assert_eq!(chain.index(0, 9, 0), 18);
        assert_eq!(chain.index(0, 0, 1), 20);

        chain.set(0, 1, 0, 2.0f64);
        chain.record(0);
        assert_eq!(chain.data[2], 2.0f64);
        assert_eq!(chain.get(0, 1, 0), 2.0f64);

        let newdata = vec![5.0f64, 100.0f64];
        chain.set_params(1, 250, &newdata);
        chain.record(250);

        assert_eq!(chain.get(0, 1, 250), 5.0f64);
        assert_eq!(chain.get(1, 1, 250), 100.0f64);
    }

    #[test]
    fn test_chain_growth_preserves_data() {
        let mut chain = Chain::new(2, 4);
        chain.extend(5);
        chain.set_params(3, 4, &[1.5f64, -2.5f64]);
        chain.record(4);

        chain.extend(3);
        assert_eq!(chain.niterations(), 5);
        assert_eq!(chain.get(0, 3, 4), 1.5f64);
        assert_eq!(chain.get(1, 3, 4), -2.5f64);
    }

    #[test]
    fn test_chain_reports_only_recorded_iterations() {
        let mut chain = Chain::new(2, 4);
        chain.extend(100);
        assert_eq!(chain.niterations(), 0);
        assert!(chain.as_slice().is_empty());
        assert!(chain.flatchain().is_empty());

        chain.set_params(0, 0, &[1.0, 2.0]);
        chain.record(0);
        assert_eq!(chain.niterations(), 1);
        assert_eq!(chain.as_slice().len(), 2 * 4);
        assert_eq!(chain.flatchain().len(), 4);
    }

    #[test]
    fn test_chain_clear() {
        let mut chain = Chain::new(2, 4);
        chain.extend(5);
        chain.clear();
        assert_eq!(chain.niterations(), 0);
        assert!(chain.flatchain().is_empty());
    }

    #[test]
    fn test_probstore() {
        let nwalkers = 4;
        let niterations = 1000;
        let mut store = ProbStore::new(nwalkers);
        store.extend(niterations);
        assert_eq!(store.data.len(), nwalkers * niterations);

        assert_eq!(store.index(0, 0), 0);
        assert_eq!(store.index(2, 0), 2);
        assert_eq!(store.index(0, 1), 4);

        store.set(1, 0, 2.0f64);
        store.record(0);
        assert_eq!(store.data[1], 2.0f64);
        assert_eq!(store.get(1, 0), 2.0f64);

        let newdata = vec![5.0f64, 100.0f64, 1.0f64, 20f64];
        store.set_probs(250, &newdata);
        store.record(250);

        assert_eq!(store.get(0, 250), 5.0f64);
        assert_eq!(store.get(1, 250), 100.0f64);
        assert_eq!(store.get(3, 250), 20.0f64);
    }

    #[test]
    fn test_text_sink_appends_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chain.txt");
        let sink = TextSink::new(path.clone(), true);
        sink.reset().unwrap();

        let positions = vec![Guess::new(&[1.0, 2.0]), Guess::new(&[3.0, 4.0])];
        sink.append(&positions).unwrap();
        sink.append(&positions).unwrap();

        let contents = fs::read_to_string(&path).unwrap();
        let rows: Vec<_> = contents.lines().collect();
        assert_eq!(rows.len(), 4);
        assert!(rows[0].starts_with("1.00000000e+00\t"));
    }

    #[test]
    fn test_format_scientific() {
        assert_eq!(format_scientific(1.0), "1.00000000e+00");
        assert_eq!(format_scientific(0.0), "0.00000000e+00");
        assert_eq!(format_scientific(0.5), "5.00000000e-01");
        assert_eq!(format_scientific(-123.456), "-1.23456000e+02");
        assert_eq!(format_scientific(6.022e23), "6.02200000e+23");
    }

    #[test]
    fn test_text_sink_clobbers_on_reset() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chain.txt");
        fs::write(&path, "stale\n").unwrap();

        TextSink::new(path.clone(), true).reset().unwrap();
        assert!(!path.exists());

        fs::write(&path, "kept\n").unwrap();
        TextSink::new(path.clone(), false).reset().unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "kept\n");
    }

    #[test]
    fn test_structured_sink_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.json");
        let meta = test_meta(2, 3);

        let mut storage =
            ChainStorage::with_sink(2, 3, path.clone(), OutputFormat::Structured, true);
        let naccepted = vec![0usize; 3];
        let rstate = RandomStream::from_seed(11).snapshot();
        storage.reset(&meta, &naccepted, &rstate).unwrap();
        storage.extend(2);

        let positions = vec![
            Guess::new(&[1.0, 2.0]),
            Guess::new(&[3.0, 4.0]),
            Guess::new(&[5.0, 6.0]),
        ];
        let lnprobs = vec![-1.0, -2.0, -3.0];
        storage
            .append(&meta, 0, &positions, &lnprobs, &naccepted, &rstate)
            .unwrap();

        let container = RunContainer::load(&path).unwrap();
        assert_eq!(container.nwalkers, 3);
        assert_eq!(container.npars, 2);
        assert_eq!(container.iterations, 1);
        assert_eq!(container.chain.len(), 6);
        assert_eq!(container.lnprob, lnprobs);

        let (pos, lnprob, restored) = container.last_step().unwrap();
        assert_eq!(pos, positions);
        assert_eq!(lnprob, lnprobs);
        assert_eq!(restored, rstate);
    }

    #[test]
    fn test_structured_sink_empty_has_no_last_step() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.json");
        let meta = test_meta(2, 3);
        let sink = StructuredSink::new(path.clone(), true);
        let rstate = RandomStream::from_seed(0).snapshot();
        sink.reset(&meta, &Chain::new(2, 3), &ProbStore::new(3), &[0, 0, 0], &rstate)
            .unwrap();

        let container = RunContainer::load(&path).unwrap();
        assert!(container.last_step().is_none());
    }

    #[test]
    fn test_unwritable_destination_is_storage_error() {
        let sink = TextSink::new(PathBuf::from("/nonexistent-dir/chain.txt"), true);
        match sink.append(&[Guess::new(&[0.0])]) {
            Err(Error::Storage(_)) => {}
            other => panic!("expected Storage error, got {:?}", other),
        }
    }
}
