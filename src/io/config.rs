//! YAML run configuration.
//!
//! Describes a whole run as data: the molecule, the population, the
//! stepping parameters, and which population-control strategy to use.
//! Importance sampling needs an executable guide function and is therefore
//! wired up in code rather than from a file.

use serde::{Deserialize, Serialize};

use crate::errors::Result;
use crate::sampling::DMCParams;

/// Which file-configurable population-control strategy to run.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StrategyKind {
    Discrete,
    Continuous,
}

fn default_initial_walkers() -> usize {
    5000
}

fn default_steps_per_propagation() -> usize {
    1
}

/// A full DMC run description.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunConfig {
    /// Atom specs, e.g. `["O", "H", "H"]`.
    pub atoms: Vec<String>,
    /// Base geometry, one `[x, y, z]` row per atom.
    pub geometry: Vec<[f64; 3]>,
    /// Per-atom mass overrides in amu; omit to use the atom-data table.
    #[serde(default)]
    pub masses: Option<Vec<f64>>,
    #[serde(default = "default_initial_walkers")]
    pub initial_walkers: usize,
    pub timestep: f64,
    /// Committed propagation steps to run.
    pub steps: usize,
    #[serde(default = "default_steps_per_propagation")]
    pub steps_per_propagation: usize,
    /// Feedback-controller setpoint; defaults to the initial population.
    #[serde(default)]
    pub target_population: Option<usize>,
    /// Steps to wait before computing descendant weights; 0 disables.
    #[serde(default)]
    pub descendant_weighting_delay: usize,
    /// Snapshot buffer capacity; omit to size it from the delay.
    #[serde(default)]
    pub descendant_buffer_capacity: Option<usize>,
    /// Checkpoint every this many steps; omit to disable.
    #[serde(default)]
    pub checkpoint_interval: Option<usize>,
    #[serde(default)]
    pub seed: Option<u64>,
    pub strategy: StrategyKind,
}

impl RunConfig {
    /// Feedback-controller setpoint, defaulting to the initial population.
    pub fn target(&self) -> usize {
        self.target_population.unwrap_or(self.initial_walkers)
    }

    /// Engine parameters derived from the file. When no buffer capacity is
    /// given, the snapshot buffer is sized to cover the configured delay so
    /// a long delay never trips the capacity check.
    pub fn dmc_params(&self) -> DMCParams {
        let defaults = DMCParams::default();
        DMCParams {
            timestep: self.timestep,
            steps_per_propagation: self.steps_per_propagation,
            target_population: self.target(),
            descendant_weighting_delay: self.descendant_weighting_delay,
            descendant_buffer_capacity: self.descendant_buffer_capacity.unwrap_or(
                defaults
                    .descendant_buffer_capacity
                    .max(self.descendant_weighting_delay),
            ),
            checkpoint_interval: self.checkpoint_interval,
            seed: self.seed,
        }
    }
}

/// Read a [`RunConfig`] from a YAML file.
pub fn read_run_config(filename: &str) -> Result<RunConfig> {
    let file = std::fs::File::open(filename)?;
    let reader = std::io::BufReader::new(file);
    let config: RunConfig = serde_yaml::from_reader(reader)?;
    Ok(config)
}

// example of yaml file
// atoms: [O, H, H]
// geometry:
//   - [0.0, 0.0, 0.0]
//   - [0.96, 0.0, 0.0]
//   - [-0.24, 0.93, 0.0]
// initial_walkers: 5000
// timestep: 1.0
// steps: 1000
// target_population: 5000
// descendant_weighting_delay: 30
// strategy: discrete
