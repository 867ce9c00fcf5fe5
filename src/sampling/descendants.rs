//! Bounded history of ensemble snapshots for descendant weighting.
//!
//! The buffer is an index-addressed fixed array with a write cursor:
//! insertion is O(1) and, once full, always evicts the oldest snapshot
//! (FIFO). Capacity is fixed at construction.

use crate::coords::Geometry;
use crate::errors::{DmcError, Result};

/// Ensemble positions captured at the start of a descendant-weighting
/// window, keyed by the step they were taken at.
#[derive(Clone, Debug)]
pub struct WeightSnapshot {
    pub step: usize,
    pub positions: Vec<Geometry>,
}

/// Fixed-capacity circular buffer of [`WeightSnapshot`]s.
pub struct DescendantBuffer {
    slots: Vec<Option<WeightSnapshot>>,
    cursor: usize,
    len: usize,
}

impl DescendantBuffer {
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(DmcError::configuration(
                "descendant buffer capacity must be at least 1",
            ));
        }
        Ok(Self {
            slots: vec![None; capacity],
            cursor: 0,
            len: 0,
        })
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Insert a snapshot, evicting the oldest one when full.
    pub fn push(&mut self, snapshot: WeightSnapshot) {
        self.slots[self.cursor] = Some(snapshot);
        self.cursor = (self.cursor + 1) % self.slots.len();
        self.len = (self.len + 1).min(self.slots.len());
    }

    /// The snapshot that would be evicted next.
    pub fn oldest(&self) -> Option<&WeightSnapshot> {
        if self.len == 0 {
            return None;
        }
        let idx = if self.len == self.slots.len() {
            self.cursor
        } else {
            0
        };
        self.slots[idx].as_ref()
    }

    /// Find the snapshot taken at a given step, if it is still buffered.
    pub fn find(&self, step: usize) -> Option<&WeightSnapshot> {
        self.slots
            .iter()
            .filter_map(|s| s.as_ref())
            .find(|s| s.step == step)
    }
}

/// Sum the current weight of every surviving lineage back onto the walkers
/// alive when the window opened.
///
/// `lineage[i]` labels current walker `i` with the index its ancestor had in
/// the snapshot; a snapshot walker whose line has died out gets weight 0.
pub fn descendant_weights(snapshot_size: usize, lineage: &[usize], weights: &[f64]) -> Vec<f64> {
    let mut out = vec![0.0; snapshot_size];
    for (&ancestor, &w) in lineage.iter().zip(weights.iter()) {
        if ancestor < snapshot_size {
            out[ancestor] += w;
        }
    }
    out
}
