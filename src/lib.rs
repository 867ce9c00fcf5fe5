//! Rust DMC - Diffusion Monte Carlo simulations in Rust
//!
//! This crate provides the DMC simulation kernel: a walker ensemble evolved
//! by random diffusion and potential-dependent population control, with
//! three interchangeable population-control strategies (discrete birth/death
//! branching, continuous reweighting, importance-sampled drift-diffusion)
//! and descendant weighting for wavefunction estimation. It is correct for
//! any potential and any walker geometry; no particular molecule is assumed.

pub mod atoms;
pub mod coords;
pub mod errors;
pub mod io;
pub mod potential;
pub mod sampling;
pub mod walkers;
pub mod wavefunction;

// Re-export commonly used types at crate root
pub use coords::{geometry, replicate, Geometry};
pub use errors::{DmcError, Result};
pub use io::{read_run_config, read_snapshot, FileSnapshotSink, RunConfig, SimulationState, SnapshotSink, StrategyKind};
pub use potential::{PotentialEvaluator, PotentialMode};
pub use sampling::{
    ContinuousWeighting, DMCEngine, DMCParams, DescendantBuffer, DiscreteWeighting,
    GuideWavefunction, ImportanceSampling, PopulationControl,
};
pub use walkers::{WalkerSet, WalkerSetParams};
pub use wavefunction::{CollectingAccumulator, NullAccumulator, WavefunctionAccumulator};
