//! Continuous weighting: multiplicative reweighting with no birth/death.
//!
//! Weights accumulate across steps without ever resetting the population,
//! trading unbounded weight variance for zero branching noise. To prevent
//! weight degeneracy, the ensemble is multinomially resampled back to the
//! target population whenever the effective sample size drops below a
//! configured fraction of the current population; resampling conserves
//! total weight by resetting every survivor to the mean.

use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;

use super::traits::{exponential_reweight, PopulationControl};
use crate::errors::{DmcError, Result};
use crate::walkers::WalkerSet;

/// Pure reweighting with ESS-triggered importance resampling.
#[derive(Clone, Debug)]
pub struct ContinuousWeighting {
    /// Population size restored by a resampling pass.
    pub target_population: usize,
    /// Resample when `ESS < ess_threshold * num_walkers`.
    pub ess_threshold: f64,
}

impl ContinuousWeighting {
    pub fn new(target_population: usize) -> Self {
        Self {
            target_population,
            ess_threshold: 0.5,
        }
    }
}

/// Effective sample size `(sum w)^2 / sum w^2` of a weight vector.
pub fn effective_sample_size(weights: &[f64]) -> f64 {
    let total: f64 = weights.iter().sum();
    let sum_sq: f64 = weights.iter().map(|w| w * w).sum();
    if sum_sq == 0.0 {
        0.0
    } else {
        total * total / sum_sq
    }
}

impl PopulationControl for ContinuousWeighting {
    fn name(&self) -> &'static str {
        "continuous-weighting"
    }

    fn update_weights(&mut self, energies: &[f64], e_ref: f64, timestep: f64, weights: &mut [f64]) {
        exponential_reweight(energies, e_ref, timestep, weights);
    }

    fn branch(&mut self, walkers: &mut WalkerSet, rng: &mut StdRng) -> Result<()> {
        let total = walkers.total_weight();
        if total <= 0.0 {
            // nothing to resample from; the engine reports the collapse
            return Ok(());
        }
        let ess = effective_sample_size(&walkers.weights);
        if ess >= self.ess_threshold * walkers.num_walkers() as f64 {
            return Ok(());
        }

        log::debug!(
            "ESS {:.1} below threshold, resampling {} -> {} walkers",
            ess,
            walkers.num_walkers(),
            self.target_population
        );
        let dist = WeightedIndex::new(&walkers.weights)
            .map_err(|e| DmcError::Validation(format!("resampling weights invalid: {}", e)))?;
        let mut coords = Vec::with_capacity(self.target_population);
        let mut lineage = Vec::with_capacity(self.target_population);
        for _ in 0..self.target_population {
            let i = dist.sample(rng);
            coords.push(walkers.coords[i].clone());
            lineage.push(walkers.lineage[i]);
        }
        let mean_weight = total / self.target_population as f64;
        walkers.coords = coords;
        walkers.lineage = lineage;
        walkers.weights = vec![mean_weight; self.target_population];
        Ok(())
    }
}
