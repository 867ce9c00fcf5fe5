//! Checkpointing of simulation state.
//!
//! Only plain data is persisted: atoms, masses, coordinates, weights, the
//! step counter, and the energy history. The potential and the strategy are
//! reconstructable from configuration and deliberately never serialized.
//! The on-disk format is a private bincode blob; nothing else depends on
//! its byte layout.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::coords::Geometry;
use crate::errors::Result;
use crate::walkers::WalkerSet;

/// A serializable capture of everything needed to resume a run.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SimulationState {
    pub atoms: Vec<String>,
    pub masses: Vec<f64>,
    pub coords: Vec<Vec<[f64; 3]>>,
    pub weights: Vec<f64>,
    pub step_num: usize,
    pub energy_history: Vec<f64>,
}

impl SimulationState {
    /// Capture the current engine-owned state as plain data.
    pub fn capture(walkers: &WalkerSet, step_num: usize, energy_history: &[f64]) -> Self {
        Self {
            atoms: walkers.atoms.clone(),
            masses: walkers.masses.clone(),
            coords: walkers
                .coords
                .iter()
                .map(|geom| geom.iter().map(|v| [v.x, v.y, v.z]).collect())
                .collect(),
            weights: walkers.weights.clone(),
            step_num,
            energy_history: energy_history.to_vec(),
        }
    }

    /// Rebuild the coordinate ensemble from the captured arrays.
    pub fn to_coords(&self) -> Vec<Geometry> {
        self.coords
            .iter()
            .map(|geom| {
                geom.iter()
                    .map(|r| nalgebra::Vector3::new(r[0], r[1], r[2]))
                    .collect()
            })
            .collect()
    }
}

/// Opaque persistence hook for engine checkpoints.
pub trait SnapshotSink {
    fn snapshot(&mut self, state: &SimulationState) -> Result<()>;
}

/// Sink that overwrites one file per checkpoint, keeping the last
/// known-good state recoverable after a failed run.
pub struct FileSnapshotSink {
    path: PathBuf,
}

impl FileSnapshotSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl SnapshotSink for FileSnapshotSink {
    fn snapshot(&mut self, state: &SimulationState) -> Result<()> {
        let file = File::create(&self.path)?;
        let writer = BufWriter::new(file);
        bincode::serialize_into(writer, state)?;
        Ok(())
    }
}

/// Read a checkpoint written by [`FileSnapshotSink`].
pub fn read_snapshot(path: impl AsRef<Path>) -> Result<SimulationState> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let state = bincode::deserialize_from(reader)?;
    Ok(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coords::geometry;
    use crate::walkers::{WalkerSet, WalkerSetParams};
    use approx::assert_relative_eq;

    #[test]
    fn test_snapshot_round_trip() {
        let geom = geometry(&[[0.1, -0.2, 0.3], [1.0, 0.0, 0.0]]).unwrap();
        let ws = WalkerSet::new(
            &["O", "H"],
            geom,
            WalkerSetParams {
                initial_walkers: 3,
                masses: None,
            },
        )
        .unwrap();
        let state = SimulationState::capture(&ws, 17, &[0.5, 0.4, 0.3]);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.ckpt");
        let mut sink = FileSnapshotSink::new(&path);
        sink.snapshot(&state).unwrap();

        let restored = read_snapshot(&path).unwrap();
        assert_eq!(restored.atoms, vec!["O", "H"]);
        assert_eq!(restored.step_num, 17);
        assert_eq!(restored.weights, vec![1.0; 3]);
        assert_eq!(restored.energy_history.len(), 3);
        let coords = restored.to_coords();
        assert_eq!(coords.len(), 3);
        assert_relative_eq!(coords[0][0].y, -0.2, epsilon = 1e-12);
    }
}
