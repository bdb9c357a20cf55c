//! Outlier-walker rescue.
//!
//! Walkers that wander into a very low probability region can take a long
//! time to rejoin the bulk of the ensemble, dragging down the usefulness of
//! the whole chain. [`EnsembleSampler::clustering`] detects such walkers by
//! looking for a gap in the sorted log-posteriors and resamples them from a
//! Gaussian fitted to the well-behaved walkers. It is a manual diagnostic,
//! intended to be run between sampling runs rather than inside the step
//! loop.
//!
//! [`EnsembleSampler::clustering`]: crate::EnsembleSampler::clustering

use std::cmp::Ordering;

use crate::errors::Result;
use crate::guess::Guess;
use crate::prob::Prob;
use crate::rng::RandomState;
use crate::EnsembleSampler;

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let mut sum = 0f64;
    let mut count = 0usize;
    for value in values {
        sum += value;
        count += 1;
    }
    sum / count as f64
}

impl<'a, T: Prob> EnsembleSampler<'a, T> {
    /// Detect walkers trapped far below the bulk of the ensemble and
    /// resample them from the well-behaved walkers' per-dimension Gaussian.
    ///
    /// Walkers are sorted by descending log-posterior and scanned from the
    /// best for the first index whose distance (in log-posterior) up to the
    /// mean of the better group exceeds its distance down to the mean of the
    /// worse group; everything from that index on is treated as an outlier.
    /// If the scan finds no such gap the ensemble is already consistent and
    /// is returned unchanged.
    ///
    /// Pass `lnprob0` if the log-posteriors of `position0` are already
    /// known, and `rstate` to make the resampling reproducible. The repaired
    /// ensemble is returned as `(positions, log-posteriors, random state)`;
    /// nothing is recorded in the chain.
    pub fn clustering(
        &mut self,
        position0: &[Guess],
        lnprob0: Option<&[f64]>,
        rstate: Option<&RandomState>,
    ) -> Result<(Vec<Guess>, Vec<f64>, RandomState)> {
        let mut position = position0.to_owned();
        let mut lnprob = match lnprob0 {
            Some(values) => values.to_vec(),
            None => self.ensemble_lnposterior(&position)?,
        };

        if let Some(state) = rstate {
            self.rng.restore(state);
        }

        let nwalkers = position.len();
        let mut inds: Vec<usize> = (0..nwalkers).collect();
        inds.sort_by(|&a, &b| {
            lnprob[b]
                .partial_cmp(&lnprob[a])
                .unwrap_or(Ordering::Equal)
        });

        // Scan for the gap separating the good walkers from the outliers.
        // At the last index the "worse" group is empty; its mean degenerates
        // to the candidate's own value so a lone trailing outlier is still
        // caught.
        let mut split = None;
        for i in 1..nwalkers {
            let candidate = lnprob[inds[i]];
            let big_mean = mean(inds[..i].iter().map(|&ind| lnprob[ind]));
            let small_mean = if i + 1 < nwalkers {
                mean(inds[i + 1..].iter().map(|&ind| lnprob[ind]))
            } else {
                candidate
            };
            if big_mean - candidate > candidate - small_mean {
                split = Some((i, big_mean, small_mean));
                break;
            }
        }

        let Some((split_idx, big_mean, small_mean)) = split else {
            log::info!("clustering: no outlier gap found, ensemble unchanged");
            return Ok((position, lnprob, self.rng.snapshot()));
        };

        let goodwalkers = &inds[..split_idx];
        let badwalkers = &inds[split_idx..];
        if badwalkers.len() > 1 {
            log::info!("clustering: {} walkers rejected", badwalkers.len());
        } else {
            log::info!("clustering: 1 walker rejected");
        }

        // Per-dimension mean and (population) standard deviation of the
        // good walkers
        let npars = self.npars;
        let mut centre = vec![0f64; npars];
        let mut std = vec![0f64; npars];
        for param_idx in 0..npars {
            centre[param_idx] = mean(goodwalkers.iter().map(|&ind| position[ind][param_idx]));
        }
        for param_idx in 0..npars {
            let variance = mean(
                goodwalkers
                    .iter()
                    .map(|&ind| (position[ind][param_idx] - centre[param_idx]).powi(2)),
            );
            std[param_idx] = variance.sqrt();
        }

        for &walker_idx in badwalkers {
            while big_mean - lnprob[walker_idx] > lnprob[walker_idx] - small_mean {
                for param_idx in 0..npars {
                    position[walker_idx][param_idx] =
                        centre[param_idx] + std[param_idx] * self.rng.standard_normal();
                }
                self.apply_fixed(&mut position[walker_idx]);
                lnprob[walker_idx] = self.lnprob_one(&position[walker_idx])?;
            }
        }

        Ok((position, lnprob, self.rng.snapshot()))
    }
}
