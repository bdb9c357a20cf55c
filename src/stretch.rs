use crate::guess::Guess;

/// Scratch space for one stretch-move proposal round: the proposed
/// positions, their log-posteriors, the stretch factors that generated them
/// and the per-walker accept decisions.
#[derive(Debug, Default)]
pub struct Stretch {
    pub q: Vec<Guess>,
    pub newlnprob: Vec<f64>,
    pub zz: Vec<f64>,
    pub accept: Vec<bool>,
}

impl Stretch {
    pub fn preallocated_accept(n: usize) -> Stretch {
        let mut s = Stretch::default();
        s.accept.resize(n, false);
        s
    }
}
