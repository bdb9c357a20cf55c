//! `gwmcmc` — affine-invariant ensemble MCMC sampling
//!
//! An implementation of Goodman & Weare's [Affine Invariant Markov chain
//! Monte Carlo (MCMC) Ensemble sampler][gw]. A population of *walkers*
//! explores the posterior together: each walker proposes its next position
//! by stretching along the line towards a randomly chosen partner walker,
//! which makes the proposal distribution invariant under affine
//! transformations of the parameter space. Highly correlated or badly
//! scaled parameters therefore need no hand-tuned proposal covariance.
//!
//! [gw]: https://msp.org/camcos/2010/5-1/p04.xhtml
//!
//! ## Implementing models
//!
//! The sampler requires a struct that implements [`Prob`], for example:
//!
//! ```rust
//! use gwmcmc::{Guess, Prob};
//!
//! struct Model;
//!
//! impl Prob for Model {
//!     fn lnlike(&self, params: &Guess) -> f64 {
//!         // Insert actual implementation here
//!         0f64
//!     }
//!
//!     fn lnprior(&self, params: &Guess) -> f64 {
//!         // Insert actual implementation here
//!         0f64
//!     }
//! }
//! ```
//!
//! The trait has a default implementation for [`lnprob`](Prob::lnprob) which
//! computes the product of the likelihood and prior probability (sum in log
//! space) as per Bayes' rule. Invalid prior values are marked by returning
//! `-f64::INFINITY` from the priors function. Any external data your model
//! needs should be borrowed by the implementing struct:
//!
//! ```rust
//! # use gwmcmc::{Guess, Prob};
//! struct Model<'a> {
//!     x: &'a [f64],
//!     y: &'a [f64],
//! }
//!
//! // Linear model y = m * x + c
//! impl<'a> Prob for Model<'a> {
//!     fn lnlike(&self, params: &Guess) -> f64 {
//!         let m = params[0];
//!         let c = params[1];
//!
//!         -0.5 * self.x.iter().zip(self.y)
//!             .map(|(xval, yval)| {
//!                 let model = m * xval + c;
//!                 (yval - model).powi(2)
//!             }).sum::<f64>()
//!     }
//!
//!     fn lnprior(&self, params: &Guess) -> f64 {
//!         // uninformative priors
//!         0.0f64
//!     }
//! }
//! ```
//!
//! ## Running the sampler
//!
//! Disperse an initial [`Guess`] into one starting position per walker, then
//! drive the sampler for a number of iterations. The number of walkers must
//! exceed the dimensionality of the parameter space.
//!
//! ```rust
//! # use gwmcmc::{EnsembleSampler, Guess, Prob};
//! # struct Model;
//! # impl Prob for Model {
//! #     fn lnlike(&self, params: &Guess) -> f64 {
//! #         -0.5 * (params[0].powi(2) + params[1].powi(2))
//! #     }
//! #     fn lnprior(&self, _params: &Guess) -> f64 { 0.0 }
//! # }
//! let model = Model;
//! let nwalkers = 10;
//!
//! let mut sampler = EnsembleSampler::new(nwalkers, 2, &model)
//!     .expect("could not create sampler");
//! sampler.seed(42);
//!
//! let p0 = Guess::new(&[0.1f64, 0.2f64]).create_initial_guess(nwalkers);
//! let last = sampler.run_mcmc(&p0, None, 100).expect("error running sampler");
//!
//! assert_eq!(last.iteration, 99);
//! assert_eq!(sampler.flatchain().len(), 100 * nwalkers);
//! ```
//!
//! Every intermediate state can be observed by supplying a callback to
//! [`sample`](EnsembleSampler::sample), which is invoked once per iteration
//! with the [`Step`] for that iteration; each `Step` carries the walker
//! positions, their log-posteriors and the random generator snapshot needed
//! to resume the run from exactly that point.
//!
//! ## Persistence
//!
//! [`output`](EnsembleSampler::output) mirrors every recorded iteration to
//! disk, either as plain text rows of positions
//! ([`OutputFormat::Text`]) or as a structured container
//! ([`OutputFormat::Structured`]) holding the full chain, the run metadata
//! and the generator snapshot. A structured container can be read back with
//! [`RunContainer::load`] and resumed from its
//! [`last_step`](RunContainer::last_step).

#![warn(missing_docs)]

pub mod errors;

mod clustering;
mod guess;
mod prob;
mod rng;
mod stores;
mod stretch;

use rayon::prelude::*;
use std::path::Path;

use crate::errors::{Error, Result};
pub use crate::guess::Guess;
pub use crate::prob::Prob;
pub use crate::rng::{RandomState, RandomStream};
pub use crate::stores::{Chain, OutputFormat, ProbStore, RunContainer};

use crate::stores::{ChainStorage, RunMeta};
use crate::stretch::Stretch;

/// The state of the ensemble after one iteration.
///
/// Yielded to the [`sample`](EnsembleSampler::sample) callback once per
/// iteration and returned by every run entry point for the final iteration.
/// Feeding `pos`, `lnprob` and `rstate` back into another call reproduces
/// the continuation of the run exactly.
#[derive(Debug, Clone)]
pub struct Step {
    /// The current parameter vectors, one per walker
    pub pos: Vec<Guess>,

    /// The log posterior probabilities of the values in `pos`, one per walker
    pub lnprob: Vec<f64>,

    /// Snapshot of the random stream taken after this iteration's draws
    pub rstate: RandomState,

    /// The iteration number
    pub iteration: usize,
}

/// Affine-invariant Markov-chain Monte Carlo sampler
pub struct EnsembleSampler<'a, T: Prob> {
    nwalkers: usize,
    npars: usize,
    lnposteriorfn: &'a T,
    proposal_scale: f64,

    // Effective dimensionality: npars minus the pinned parameters
    neff: usize,
    fixedinds: Vec<usize>,
    fixedvals: Vec<f64>,

    rng: RandomStream,
    naccepted: Vec<usize>,
    iterations: usize,
    storage: ChainStorage,
    pool: Option<rayon::ThreadPool>,
}

impl<'a, T: Prob> EnsembleSampler<'a, T> {
    /// Create a new `EnsembleSampler`.
    ///
    /// The affine-invariant move needs more walkers than dimensions to span
    /// the parameter space with full rank; `nwalkers <= npars` is rejected
    /// with [`Error::Config`](errors/enum.Error.html).
    pub fn new(nwalkers: usize, npars: usize, lnposteriorfn: &'a T) -> Result<Self> {
        if nwalkers <= npars {
            let msg = format!(
                "the number of walkers ({}) must be greater than the \
                 dimension of your parameter space ({})",
                nwalkers, npars
            );
            return Err(Error::Config(msg));
        }

        Ok(EnsembleSampler {
            nwalkers,
            npars,
            lnposteriorfn,
            proposal_scale: 2.0,
            neff: npars,
            fixedinds: Vec::new(),
            fixedvals: Vec::new(),
            rng: RandomStream::from_entropy(),
            naccepted: vec![0; nwalkers],
            iterations: 0,
            storage: ChainStorage::new(npars, nwalkers),
            pool: None,
        })
    }

    /// Set the proposal scale parameter `a` (default 2.0).
    ///
    /// Values below 1 make the stretch density improper and are rejected;
    /// `a == 1` is the degenerate stretch that always collapses proposals
    /// onto the current position.
    pub fn scale(mut self, a: f64) -> Result<Self> {
        if !a.is_finite() || a < 1.0 {
            return Err(Error::Config(format!(
                "the proposal scale must be a finite value >= 1, got {}",
                a
            )));
        }
        self.proposal_scale = a;
        Ok(self)
    }

    /// Distribute posterior evaluation over `nworkers` threads.
    ///
    /// The pool is created once, here; each iteration's batch of proposals
    /// is evaluated across it. If the pool cannot be started, evaluation
    /// falls back to sequential with a warning rather than failing the run.
    pub fn workers(mut self, nworkers: usize) -> Self {
        self.pool = if nworkers > 1 {
            match rayon::ThreadPoolBuilder::new()
                .num_threads(nworkers)
                .build()
            {
                Ok(pool) => Some(pool),
                Err(err) => {
                    log::warn!(
                        "could not start {} evaluation workers, \
                         falling back to sequential evaluation: {}",
                        nworkers,
                        err
                    );
                    None
                }
            }
        } else {
            None
        };
        self
    }

    /// Mirror recorded iterations to `path` in the given format.
    ///
    /// With `clobber` any pre-existing destination is removed and
    /// reinitialised immediately; otherwise text output appends to the
    /// existing file.
    pub fn output<P: AsRef<Path>>(
        mut self,
        path: P,
        format: OutputFormat,
        clobber: bool,
    ) -> Result<Self> {
        self.storage = ChainStorage::with_sink(
            self.npars,
            self.nwalkers,
            path.as_ref().to_path_buf(),
            format,
            clobber,
        );
        self.reset()?;
        Ok(self)
    }

    /// Pin a subset of parameters to fixed values.
    ///
    /// Pinned dimensions never move: proposals are overwritten with the
    /// pinned value, and the acceptance ratio uses the effective
    /// dimensionality `npars - inds.len()` so the pinned dimensions do not
    /// bias acceptance.
    pub fn fix_parameters(&mut self, inds: &[usize], vals: &[f64]) -> Result<()> {
        if inds.len() != vals.len() {
            return Err(Error::Config(format!(
                "fixed parameter indices and values must have equal lengths \
                 ({} != {})",
                inds.len(),
                vals.len()
            )));
        }
        if let Some(bad) = inds.iter().find(|&&ind| ind >= self.npars) {
            return Err(Error::Config(format!(
                "fixed parameter index {} out of range for {} dimensions",
                bad, self.npars
            )));
        }

        self.fixedinds = inds.to_vec();
        self.fixedvals = vals.to_vec();
        self.neff = self.npars - inds.len();
        Ok(())
    }

    /// Reseed the built in random stream, making runs reproducible
    pub fn seed(&mut self, seed: u64) {
        self.rng = RandomStream::from_seed(seed);
    }

    /// Run the sampler with a callback called on each iteration.
    ///
    /// `position0` holds one starting position per walker. `lnprob0`
    /// optionally carries the already-known log-posteriors of those
    /// positions; when absent they are evaluated first. `rstate` restores
    /// the random stream to a previous snapshot; when absent the stream
    /// continues from wherever it currently is.
    ///
    /// The callback receives every intermediate [`Step`]; the final `Step`
    /// is returned. Chain output accumulates across calls until
    /// [`reset`](#method.reset).
    pub fn sample<F>(
        &mut self,
        position0: &[Guess],
        lnprob0: Option<&[f64]>,
        rstate: Option<&RandomState>,
        iterations: usize,
        mut callback: F,
    ) -> Result<Step>
    where
        F: FnMut(&Step),
    {
        if position0.len() != self.nwalkers {
            return Err(Error::Config(format!(
                "expected {} walker positions, got {}",
                self.nwalkers,
                position0.len()
            )));
        }
        if let Some(bad) = position0.iter().find(|g| g.values.len() != self.npars) {
            return Err(Error::Config(format!(
                "walker position has {} parameters, expected {}",
                bad.values.len(),
                self.npars
            )));
        }
        if let Some(values) = lnprob0 {
            if values.len() != self.nwalkers {
                return Err(Error::Config(format!(
                    "expected {} initial lnprob values, got {}",
                    self.nwalkers,
                    values.len()
                )));
            }
        }

        if let Some(state) = rstate {
            self.rng.restore(state);
        }

        let mut position = position0.to_owned();
        for walker in &mut position {
            self.apply_fixed(walker);
        }

        let mut lnprob = match lnprob0 {
            Some(values) => values.to_vec(),
            None => self.ensemble_lnposterior(&position)?,
        };

        if lnprob.iter().any(|val| val.is_nan()) {
            return Err(Error::Evaluation("the initial lnprob was NaN".into()));
        }

        // Grow the chain arrays once for the whole batch
        self.storage.extend(iterations);
        let meta = self.run_meta();

        let mut last = Step {
            pos: position.clone(),
            lnprob: lnprob.clone(),
            rstate: self.rng.snapshot(),
            iteration: self.iterations.saturating_sub(1),
        };

        for _ in 0..iterations {
            let stretch = self.propose_stretch(&position, &lnprob)?;

            for walker_idx in 0..self.nwalkers {
                if !stretch.accept[walker_idx] {
                    continue;
                }

                lnprob[walker_idx] = stretch.newlnprob[walker_idx];
                position[walker_idx] = stretch.q[walker_idx].clone();
                self.naccepted[walker_idx] += 1;
            }

            let snapshot = self.rng.snapshot();
            self.storage.append(
                &meta,
                self.iterations,
                &position,
                &lnprob,
                &self.naccepted,
                &snapshot,
            )?;
            self.iterations += 1;

            let step = Step {
                pos: position.clone(),
                lnprob: lnprob.clone(),
                rstate: snapshot,
                iteration: self.iterations - 1,
            };
            callback(&step);
            last = step;
        }

        Ok(last)
    }

    /// Run the sampler for `niterations` iterations, returning only the
    /// final [`Step`]
    pub fn run_mcmc(
        &mut self,
        p0: &[Guess],
        rstate: Option<&RandomState>,
        niterations: usize,
    ) -> Result<Step> {
        self.sample(p0, None, rstate, niterations, |_step| {})
    }

    /// Advance the ensemble by exactly one iteration
    pub fn step(
        &mut self,
        position0: &[Guess],
        lnprob0: Option<&[f64]>,
        rstate: Option<&RandomState>,
    ) -> Result<Step> {
        self.sample(position0, lnprob0, rstate, 1, |_step| {})
    }

    /// Compute the log-posterior for a whole ensemble of positions, in
    /// order, distributing the work over the worker pool if one is
    /// configured
    pub fn ensemble_lnposterior(&self, p: &[Guess]) -> Result<Vec<f64>> {
        match &self.pool {
            Some(pool) => {
                pool.install(|| p.par_iter().map(|guess| self.lnprob_one(guess)).collect())
            }
            None => p.iter().map(|guess| self.lnprob_one(guess)).collect(),
        }
    }

    /// Return the samples recorded so far
    pub fn chain(&self) -> &Chain {
        self.storage.chain()
    }

    /// Return the recorded log-posteriors, parallel to
    /// [`chain`](#method.chain)
    pub fn lnprobability(&self) -> &ProbStore {
        self.storage.lnprob()
    }

    /// Flatten the recorded chain into one `Guess` per walker per iteration
    pub fn flatchain(&self) -> Vec<Guess> {
        self.storage.chain().flatchain()
    }

    /// Number of iterations run since construction or the last reset
    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// The fraction of proposed moves accepted so far, one value per
    /// walker; all zeros before any iteration has run
    pub fn acceptance_fraction(&self) -> Vec<f64> {
        if self.iterations == 0 {
            return vec![0.0; self.nwalkers];
        }
        self.naccepted
            .iter()
            .map(|naccepted| *naccepted as f64 / self.iterations as f64)
            .collect()
    }

    /// Return the sampler to its default state: iteration count zero,
    /// accept counters zero, chain empty, output destination reinitialised
    pub fn reset(&mut self) -> Result<()> {
        self.iterations = 0;
        for count in &mut self.naccepted {
            *count = 0;
        }
        let meta = self.run_meta();
        let snapshot = self.rng.snapshot();
        self.storage.reset(&meta, &self.naccepted, &snapshot)
    }

    // Internal functions

    fn run_meta(&self) -> RunMeta {
        RunMeta {
            npars: self.npars,
            nwalkers: self.nwalkers,
            scale: self.proposal_scale,
            fixedinds: self.fixedinds.clone(),
            fixedvals: self.fixedvals.clone(),
            postargs: self.lnposteriorfn.postargs(),
        }
    }

    fn apply_fixed(&self, guess: &mut Guess) {
        for (ind, val) in self.fixedinds.iter().zip(&self.fixedvals) {
            guess.values[*ind] = *val;
        }
    }

    fn propose_stretch(&mut self, position: &[Guess], lnprob: &[f64]) -> Result<Stretch> {
        let mut out = Stretch::preallocated_accept(self.nwalkers);
        out.q = Vec::with_capacity(self.nwalkers);
        out.zz = Vec::with_capacity(self.nwalkers);

        for walker_idx in 0..self.nwalkers {
            let zz = ((self.proposal_scale - 1.0) * self.rng.uniform() + 1.0).powi(2)
                / self.proposal_scale;

            // Partner j != i, uniform over the complement: draw from the
            // other nwalkers - 1 indices and skip past our own
            let mut partner = self.rng.integer(self.nwalkers - 1);
            if partner >= walker_idx {
                partner += 1;
            }

            let mut values = Vec::with_capacity(self.npars);
            for (param_idx, s_param) in position[walker_idx].values.iter().enumerate() {
                let partner_param = position[partner][param_idx];
                values.push(partner_param + zz * (s_param - partner_param));
            }

            let mut proposal = Guess { values };
            self.apply_fixed(&mut proposal);
            out.q.push(proposal);
            out.zz.push(zz);
        }

        out.newlnprob = self.ensemble_lnposterior(&out.q)?;

        for walker_idx in 0..self.nwalkers {
            let test_value = self.rng.uniform().ln();

            // An out-of-support proposal can never be accepted; skipping the
            // ratio keeps (-inf) - (-inf) from producing NaN
            if out.newlnprob[walker_idx] == f64::NEG_INFINITY {
                continue;
            }

            let lnpdiff = (self.neff as f64 - 1.0) * out.zz[walker_idx].ln()
                + out.newlnprob[walker_idx]
                - lnprob[walker_idx];
            if lnpdiff > test_value {
                out.accept[walker_idx] = true;
            }
        }

        Ok(out)
    }

    fn lnprob_one(&self, guess: &Guess) -> Result<f64> {
        if guess.contains_infs() {
            return Err(Error::Evaluation(
                "at least one parameter value was infinite".into(),
            ));
        } else if guess.contains_nans() {
            return Err(Error::Evaluation(
                "at least one parameter value was NaN".into(),
            ));
        }

        let result = self.lnposteriorfn.lnprob(guess);
        if result.is_nan() {
            return Err(Error::Evaluation("NaN value of lnprob".into()));
        }

        Ok(result)
    }
}
