use crate::guess::Guess;

/// The user's posterior model.
///
/// Implementations must be a pure function of the walker position and any
/// fixed data captured by the implementing struct. The `Sync` bound lets the
/// sampler share the model read-only across evaluation workers.
///
/// Mark positions outside the prior's support by returning
/// `-f64::INFINITY` from [`lnprior`](#tymethod.lnprior); such proposals are
/// always rejected.
pub trait Prob: Sync {
    /// Natural log of the likelihood at `params`
    fn lnlike(&self, params: &Guess) -> f64;

    /// Natural log of the prior probability at `params`
    fn lnprior(&self, params: &Guess) -> f64;

    /// Natural log of the posterior, by default the sum of
    /// [`lnprior`](#tymethod.lnprior) and [`lnlike`](#tymethod.lnlike)
    fn lnprob(&self, params: &Guess) -> f64 {
        let lnp = self.lnprior(params);
        if lnp.is_finite() {
            lnp + self.lnlike(params)
        } else {
            -f64::INFINITY
        }
    }

    /// Serialisable description of the fixed auxiliary data the model
    /// closes over, persisted alongside structured chain output so a run
    /// records what it was evaluated against
    fn postargs(&self) -> Option<serde_json::Value> {
        None
    }
}
