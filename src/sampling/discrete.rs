//! Discrete weighting: classical birth/death branching.
//!
//! After each weight update, every walker is stochastically rounded to an
//! integer number of copies, `min(floor(w + u), max_branch)` with `u`
//! uniform on [0, 1). The expectation equals the weight (below the cap), so
//! the stationary population density is preserved while weights are
//! refreshed to unity every step.

use rand::distributions::{Distribution, Uniform};
use rand::rngs::StdRng;

use super::traits::{exponential_reweight, BranchingResult, PopulationControl};
use crate::errors::Result;
use crate::walkers::WalkerSet;

/// Birth/death branching with weights reset to 1 each step.
#[derive(Clone, Debug)]
pub struct DiscreteWeighting {
    /// Upper bound on copies per walker per step, bounding population spikes.
    pub max_branch: usize,
}

impl Default for DiscreteWeighting {
    fn default() -> Self {
        Self { max_branch: 3 }
    }
}

/// Make a branching decision for one walker given a uniform draw.
pub(crate) fn branching_decision(weight: f64, u: f64, max_branch: usize) -> BranchingResult {
    let cnt = ((weight + u) as i64).min(max_branch as i64);
    match cnt {
        n if n <= 0 => BranchingResult::Kill,
        1 => BranchingResult::Keep,
        n => BranchingResult::Clone { n: n as usize },
    }
}

impl PopulationControl for DiscreteWeighting {
    fn name(&self) -> &'static str {
        "discrete-weighting"
    }

    fn update_weights(&mut self, energies: &[f64], e_ref: f64, timestep: f64, weights: &mut [f64]) {
        exponential_reweight(energies, e_ref, timestep, weights);
    }

    fn branch(&mut self, walkers: &mut WalkerSet, rng: &mut StdRng) -> Result<()> {
        let uniform = Uniform::new(0.0, 1.0);
        let n = walkers.num_walkers();
        let mut coords = Vec::with_capacity(n);
        let mut lineage = Vec::with_capacity(n);

        for i in 0..n {
            let copies = match branching_decision(walkers.weights[i], uniform.sample(rng), self.max_branch) {
                BranchingResult::Kill => 0,
                BranchingResult::Keep => 1,
                BranchingResult::Clone { n } => n,
            };
            for _ in 0..copies {
                coords.push(walkers.coords[i].clone());
                lineage.push(walkers.lineage[i]);
            }
        }

        walkers.weights = vec![1.0; coords.len()];
        walkers.coords = coords;
        walkers.lineage = lineage;
        Ok(())
    }
}
