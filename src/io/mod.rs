//! IO module - run configuration and checkpointing.

mod config;
mod snapshot;

pub use config::{read_run_config, RunConfig, StrategyKind};
pub use snapshot::{read_snapshot, FileSnapshotSink, SimulationState, SnapshotSink};
