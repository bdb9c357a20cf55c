use rand::Rng;
use rand_distr::StandardNormal;

/// A single walker's position in parameter space.
///
/// The `values` vector always has `npars` entries, one per dimension of the
/// posterior being sampled.
#[derive(Debug, Clone, PartialEq)]
pub struct Guess {
    /// Parameter values, one per dimension
    pub values: Vec<f64>,
}

impl Guess {
    /// Create a new guess from a slice of parameter values
    pub fn new(values: &[f64]) -> Self {
        Guess {
            values: Vec::from(values),
        }
    }

    /// Create a copy of this guess, jittered by a small normal perturbation
    pub fn perturb(&self) -> Guess {
        self.perturb_with_rng(&mut rand::thread_rng())
    }

    /// As [`perturb`](#method.perturb) but with a caller-supplied generator
    pub fn perturb_with_rng<R: Rng>(&self, rng: &mut R) -> Guess {
        let mut new_values = self.values.clone();
        for elem in &mut new_values {
            let jitter: f64 = rng.sample(StandardNormal);
            *elem += 1E-5 * jitter;
        }
        Guess { values: new_values }
    }

    /// Replicate this guess into an initial ensemble of `nwalkers` walkers,
    /// each dispersed slightly from the starting point
    pub fn create_initial_guess(&self, nwalkers: usize) -> Vec<Guess> {
        (0..nwalkers).map(|_| self.perturb()).collect()
    }

    /// As [`create_initial_guess`](#method.create_initial_guess) but with a
    /// caller-supplied generator, for reproducible ensembles
    pub fn create_initial_guess_with_rng<R: Rng>(&self, nwalkers: usize, rng: &mut R) -> Vec<Guess> {
        (0..nwalkers).map(|_| self.perturb_with_rng(rng)).collect()
    }

    /// Whether any parameter value is infinite
    pub fn contains_infs(&self) -> bool {
        self.values.iter().any(|val| val.is_infinite())
    }

    /// Whether any parameter value is NaN
    pub fn contains_nans(&self) -> bool {
        self.values.iter().any(|val| val.is_nan())
    }
}

impl std::ops::Index<usize> for Guess {
    type Output = f64;

    fn index(&self, idx: usize) -> &f64 {
        &self.values[idx]
    }
}

impl std::ops::IndexMut<usize> for Guess {
    fn index_mut(&mut self, idx: usize) -> &mut f64 {
        &mut self.values[idx]
    }
}
