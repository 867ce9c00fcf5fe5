//! Ingestion contract for wavefunction estimation.
//!
//! The engine hands over one descendant-weighted snapshot per delay window;
//! what the consumer does with it (histogramming, plotting, fitting) is out
//! of scope here.

use crate::coords::Geometry;

/// One descendant-weighted spatial sample of the ensemble.
#[derive(Clone, Debug)]
pub struct WavefunctionSample {
    /// Walker positions at the start of the delay window.
    pub positions: Vec<Geometry>,
    /// Total surviving-lineage weight per walker after the delay.
    pub descendant_weights: Vec<f64>,
}

/// Consumer of descendant-weighted snapshots.
pub trait WavefunctionAccumulator {
    fn record(&mut self, positions: &[Geometry], descendant_weights: &[f64]);
}

/// Accumulator that keeps every sample for post-hoc analysis.
#[derive(Default)]
pub struct CollectingAccumulator {
    pub samples: Vec<WavefunctionSample>,
}

impl CollectingAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total descendant weight over all recorded samples.
    pub fn total_weight(&self) -> f64 {
        self.samples
            .iter()
            .map(|s| s.descendant_weights.iter().sum::<f64>())
            .sum()
    }
}

impl WavefunctionAccumulator for CollectingAccumulator {
    fn record(&mut self, positions: &[Geometry], descendant_weights: &[f64]) {
        self.samples.push(WavefunctionSample {
            positions: positions.to_vec(),
            descendant_weights: descendant_weights.to_vec(),
        });
    }
}

/// Shared-handle passthrough so a caller can keep a handle to the
/// accumulator while the engine owns the boxed trait object.
impl<A: WavefunctionAccumulator> WavefunctionAccumulator for std::sync::Arc<std::sync::Mutex<A>> {
    fn record(&mut self, positions: &[Geometry], descendant_weights: &[f64]) {
        self.lock().unwrap().record(positions, descendant_weights);
    }
}

/// Accumulator that discards everything; the default when a run only needs
/// the energy estimate.
#[derive(Default)]
pub struct NullAccumulator;

impl WavefunctionAccumulator for NullAccumulator {
    fn record(&mut self, _positions: &[Geometry], _descendant_weights: &[f64]) {}
}
