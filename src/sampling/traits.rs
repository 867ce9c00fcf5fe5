//! Traits for DMC population control.

use nalgebra::Vector3;
use rand::rngs::StdRng;

use crate::coords::Geometry;
use crate::errors::Result;
use crate::walkers::WalkerSet;

/// Outcome of a per-walker branching decision.
pub enum BranchingResult {
    Clone { n: usize }, // n is the number of copies, original included
    Keep,               // The walker continues as is
    Kill,               // The walker should be removed
}

/// A guide (trial) wavefunction used by importance sampling to bias walker
/// motion. Only the value and the log-gradient are needed; the guide is
/// never the quantity being estimated.
pub trait GuideWavefunction: Send + Sync {
    fn value(&self, geometry: &Geometry) -> f64;
    /// Gradient of `ln psi` per atom.
    fn grad_ln(&self, geometry: &Geometry) -> Vec<Vector3<f64>>;
}

/// One population-control strategy, injected into the engine at construction.
///
/// All three variants (discrete weighting, continuous weighting, importance
/// sampling) satisfy the same statistical contract: weights stay
/// non-negative, walkers in lower-potential regions gain relative weight,
/// and branching preserves the expected population density.
pub trait PopulationControl {
    fn name(&self) -> &'static str;

    /// Deterministic drift added to each walker's diffusion displacement.
    /// `None` means pure diffusion (the default for non-guided strategies).
    fn drift(&self, _walkers: &WalkerSet) -> Option<Vec<Geometry>> {
        None
    }

    /// Accept or reject proposed moves before they are committed. The
    /// default accepts everything; importance sampling applies a
    /// Metropolis test on the guide-function ratio.
    fn accept_moves(
        &self,
        _walkers: &WalkerSet,
        proposed: Vec<Geometry>,
        _rng: &mut StdRng,
    ) -> Vec<Geometry> {
        proposed
    }

    /// Multiplicative weight update from the freshly evaluated energies and
    /// the current reference energy.
    fn update_weights(&mut self, energies: &[f64], e_ref: f64, timestep: f64, weights: &mut [f64]);

    /// Convert accumulated weight into population changes. Must keep the
    /// coords/weights/lineage arrays the same length as each other.
    fn branch(&mut self, walkers: &mut WalkerSet, rng: &mut StdRng) -> Result<()>;
}

/// The shared weight-update core: `w *= exp(-(E - E_ref) * dt)`.
///
/// Monotonically decreasing in `E - E_ref` and strictly positive, so
/// non-negativity of weights is preserved by construction.
pub fn exponential_reweight(energies: &[f64], e_ref: f64, timestep: f64, weights: &mut [f64]) {
    for (w, e) in weights.iter_mut().zip(energies.iter()) {
        *w *= ((e_ref - e) * timestep).exp();
    }
}
