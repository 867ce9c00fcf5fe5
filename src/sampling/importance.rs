//! Importance sampling: drift-diffusion guided by a trial wavefunction.
//!
//! The guide biases walkers away from high-potential regions before
//! population control is applied: a deterministic drift along the guide's
//! log-gradient is added to the diffusion step, and the move is accepted
//! with a Metropolis test on the squared guide-function ratio. Branching
//! itself reuses the discrete birth/death scheme.

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::Rng;

use super::discrete::DiscreteWeighting;
use super::traits::{exponential_reweight, GuideWavefunction, PopulationControl};
use crate::coords::Geometry;
use crate::errors::Result;
use crate::walkers::WalkerSet;

/// Drift-diffusion population control with a guide wavefunction.
pub struct ImportanceSampling {
    guide: Arc<dyn GuideWavefunction>,
    brancher: DiscreteWeighting,
}

impl ImportanceSampling {
    pub fn new(guide: Arc<dyn GuideWavefunction>) -> Self {
        Self {
            guide,
            brancher: DiscreteWeighting::default(),
        }
    }
}

impl PopulationControl for ImportanceSampling {
    fn name(&self) -> &'static str {
        "importance-sampling"
    }

    /// Per-atom drift `sigma_a^2 * grad ln psi`, the free-diffusion variance
    /// steering each atom along the guide's gradient.
    fn drift(&self, walkers: &WalkerSet) -> Option<Vec<Geometry>> {
        let drifts = walkers
            .coords
            .iter()
            .map(|geom| {
                self.guide
                    .grad_ln(geom)
                    .into_iter()
                    .enumerate()
                    .map(|(a, g)| g * (walkers.sigmas[a] * walkers.sigmas[a]))
                    .collect()
            })
            .collect();
        Some(drifts)
    }

    fn accept_moves(
        &self,
        walkers: &WalkerSet,
        proposed: Vec<Geometry>,
        rng: &mut StdRng,
    ) -> Vec<Geometry> {
        walkers
            .coords
            .iter()
            .zip(proposed.into_iter())
            .map(|(old, new)| {
                let psi_old = self.guide.value(old);
                let psi_new = self.guide.value(&new);
                // a walker sitting on a node of the guide always moves off it
                if psi_old == 0.0 {
                    return new;
                }
                let ratio = (psi_new / psi_old).powi(2);
                if rng.gen::<f64>() < ratio {
                    new
                } else {
                    old.clone()
                }
            })
            .collect()
    }

    fn update_weights(&mut self, energies: &[f64], e_ref: f64, timestep: f64, weights: &mut [f64]) {
        exponential_reweight(energies, e_ref, timestep, weights);
    }

    fn branch(&mut self, walkers: &mut WalkerSet, rng: &mut StdRng) -> Result<()> {
        self.brancher.branch(walkers, rng)
    }
}
