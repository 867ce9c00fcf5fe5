//! Sampling module - the DMC engine and its population-control strategies.

mod continuous;
mod descendants;
mod discrete;
mod dmc;
mod importance;
mod traits;

pub use continuous::{effective_sample_size, ContinuousWeighting};
pub use descendants::{descendant_weights, DescendantBuffer, WeightSnapshot};
pub use discrete::DiscreteWeighting;
pub use dmc::{DMCEngine, DMCParams};
pub use importance::ImportanceSampling;
pub use traits::{
    exponential_reweight, BranchingResult, GuideWavefunction, PopulationControl,
};
