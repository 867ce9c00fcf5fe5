//! The DMC propagation engine.
//!
//! One engine owns one walker ensemble for the duration of a run and
//! advances it step by step: diffuse, evaluate the potential, update the
//! reference energy, reweight, branch, and periodically hand a
//! descendant-weighted snapshot to the wavefunction accumulator. Steps are
//! strictly sequential; a step either commits completely or leaves the
//! ensemble in its prior state.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::SeedableRng;

use super::descendants::{descendant_weights, DescendantBuffer, WeightSnapshot};
use super::traits::PopulationControl;
use crate::errors::{DmcError, Result};
use crate::io::{SimulationState, SnapshotSink};
use crate::potential::PotentialEvaluator;
use crate::walkers::WalkerSet;
use crate::wavefunction::{NullAccumulator, WavefunctionAccumulator};

/// Engine construction options.
#[derive(Copy, Clone, Debug)]
pub struct DMCParams {
    /// Imaginary-time step size.
    pub timestep: f64,
    /// Internal free-diffusion sub-steps per committed step.
    pub steps_per_propagation: usize,
    /// Feedback-controller setpoint for the total walker weight.
    pub target_population: usize,
    /// Steps between a lineage snapshot and its descendant weighting;
    /// 0 disables descendant weighting entirely.
    pub descendant_weighting_delay: usize,
    /// Capacity of the snapshot ring buffer, in steps of history.
    pub descendant_buffer_capacity: usize,
    /// Checkpoint every this many committed steps.
    pub checkpoint_interval: Option<usize>,
    /// Seed for the run's random source; `None` draws from entropy.
    pub seed: Option<u64>,
}

impl Default for DMCParams {
    fn default() -> Self {
        Self {
            timestep: 1.0,
            steps_per_propagation: 1,
            target_population: 5000,
            descendant_weighting_delay: 0,
            descendant_buffer_capacity: 64,
            checkpoint_interval: None,
            seed: None,
        }
    }
}

/// The propagation / branching / weighting state machine.
pub struct DMCEngine {
    walkers: WalkerSet,
    potential: PotentialEvaluator,
    strategy: Box<dyn PopulationControl>,
    params: DMCParams,
    rng: StdRng,
    step_num: usize,
    e_ref: f64,
    energy_history: Vec<f64>,
    descendants: DescendantBuffer,
    window_open: Option<usize>,
    cancel: Arc<AtomicBool>,
    sink: Option<Box<dyn SnapshotSink>>,
    accumulator: Box<dyn WavefunctionAccumulator>,
}

impl DMCEngine {
    pub fn new(
        mut walkers: WalkerSet,
        potential: PotentialEvaluator,
        strategy: Box<dyn PopulationControl>,
        params: DMCParams,
    ) -> Result<Self> {
        if params.steps_per_propagation == 0 {
            return Err(DmcError::configuration(
                "steps_per_propagation must be at least 1",
            ));
        }
        if params.target_population == 0 {
            return Err(DmcError::configuration(
                "target_population must be at least 1",
            ));
        }
        if params.descendant_weighting_delay > params.descendant_buffer_capacity {
            return Err(DmcError::Configuration(format!(
                "descendant_weighting_delay ({}) exceeds buffer capacity ({})",
                params.descendant_weighting_delay, params.descendant_buffer_capacity
            )));
        }
        if walkers.is_initialized() {
            if (walkers.timestep - params.timestep).abs() > f64::EPSILON {
                return Err(DmcError::Configuration(format!(
                    "walkers initialized with timestep {}, engine configured with {}",
                    walkers.timestep, params.timestep
                )));
            }
        } else {
            walkers.initialize(params.timestep)?;
        }
        let descendants = DescendantBuffer::new(params.descendant_buffer_capacity)?;
        let rng = match params.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        log::info!(
            "DMC engine: {} walkers, strategy {}, dt {}",
            walkers.num_walkers(),
            strategy.name(),
            params.timestep
        );
        Ok(Self {
            walkers,
            potential,
            strategy,
            params,
            rng,
            step_num: 0,
            e_ref: 0.0,
            energy_history: Vec::new(),
            descendants,
            window_open: None,
            cancel: Arc::new(AtomicBool::new(false)),
            sink: None,
            accumulator: Box::new(NullAccumulator),
        })
    }

    /// Attach a checkpoint sink.
    pub fn with_snapshot_sink(mut self, sink: Box<dyn SnapshotSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Attach a wavefunction accumulator for descendant-weighted samples.
    pub fn with_accumulator(mut self, accumulator: Box<dyn WavefunctionAccumulator>) -> Self {
        self.accumulator = accumulator;
        self
    }

    /// Use an externally owned cancellation flag instead of the engine's.
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = flag;
        self
    }

    /// Shared flag for cooperative, step-granular cancellation. Setting it
    /// stops the run at the top of the next step; no partial step is ever
    /// applied.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub fn step_num(&self) -> usize {
        self.step_num
    }

    pub fn reference_energy(&self) -> f64 {
        self.e_ref
    }

    pub fn energy_history(&self) -> &[f64] {
        &self.energy_history
    }

    pub fn walkers(&self) -> &WalkerSet {
        &self.walkers
    }

    /// Trailing average of the reference energy after discarding
    /// `equilibration` leading entries.
    pub fn ground_state_estimate(&self, equilibration: usize) -> Option<f64> {
        let tail = self.energy_history.get(equilibration..)?;
        if tail.is_empty() {
            return None;
        }
        Some(tail.iter().sum::<f64>() / tail.len() as f64)
    }

    /// Advance the ensemble by `n_steps` committed steps.
    pub fn propagate(&mut self, n_steps: usize) -> Result<()> {
        for _ in 0..n_steps {
            if self.cancel.load(Ordering::Relaxed) {
                log::info!("cancellation observed at step {}, stopping", self.step_num);
                break;
            }
            self.step()?;
        }
        Ok(())
    }

    fn step(&mut self) -> Result<()> {
        let n_sub = self.params.steps_per_propagation;
        let dt_eff = self.params.timestep * n_sub as f64;

        // diffuse, with the strategy's drift term if it has one
        let mut proposed = self.walkers.get_displaced_coords(n_sub, &mut self.rng)?;
        if let Some(drift) = self.strategy.drift(&self.walkers) {
            for (geom, d) in proposed.iter_mut().zip(drift.iter()) {
                for (pos, dv) in geom.iter_mut().zip(d.iter()) {
                    *pos += dv * n_sub as f64;
                }
            }
        }
        let proposed = self
            .strategy
            .accept_moves(&self.walkers, proposed, &mut self.rng);

        // a potential failure here propagates with the prior step intact
        let energies = self.potential.evaluate(&self.walkers.atoms, &proposed)?;

        // reference energy: weighted mean potential plus proportional
        // population feedback, so total weight fluctuates around the target
        let total_weight = self.walkers.total_weight();
        if total_weight <= 0.0 {
            return Err(DmcError::PopulationCollapse {
                step: self.step_num,
            });
        }
        let mean_v = energies
            .iter()
            .zip(self.walkers.weights.iter())
            .map(|(e, w)| e * w)
            .sum::<f64>()
            / total_weight;
        let e_ref = mean_v + (1.0 - total_weight / self.params.target_population as f64) / dt_eff;

        // stage the move; anything failing between here and the commit
        // point rolls the ensemble back to the prior fully-committed step
        let prev_coords = std::mem::replace(&mut self.walkers.coords, proposed);
        let prev_weights = self.walkers.weights.clone();
        let prev_lineage = self.walkers.lineage.clone();
        self.strategy
            .update_weights(&energies, e_ref, dt_eff, &mut self.walkers.weights);
        let branched = self
            .strategy
            .branch(&mut self.walkers, &mut self.rng)
            .and_then(|_| {
                if self.walkers.num_walkers() == 0 || self.walkers.total_weight() <= 0.0 {
                    return Err(DmcError::PopulationCollapse {
                        step: self.step_num,
                    });
                }
                if self.walkers.weights.len() != self.walkers.coords.len()
                    || self.walkers.lineage.len() != self.walkers.coords.len()
                {
                    return Err(DmcError::validation(
                        "strategy left coords/weights/lineage with mismatched lengths",
                    ));
                }
                Ok(())
            });
        if let Err(err) = branched {
            self.walkers.coords = prev_coords;
            self.walkers.weights = prev_weights;
            self.walkers.lineage = prev_lineage;
            return Err(err);
        }

        self.e_ref = e_ref;
        self.step_num += n_sub;
        self.update_descendants();
        self.energy_history.push(self.e_ref);
        log::debug!(
            "step {}: {} walkers, e_ref {:.6}",
            self.step_num,
            self.walkers.num_walkers(),
            self.e_ref
        );
        self.maybe_checkpoint()
    }

    /// Open or close a descendant-weighting window.
    ///
    /// When a window opens, every walker is relabeled as its own ancestor
    /// and the positions are snapshotted; after `delay` steps the summed
    /// weight of each surviving lineage is handed to the accumulator. The
    /// propagation weights themselves are never touched here.
    fn update_descendants(&mut self) {
        let delay = self.params.descendant_weighting_delay;
        if delay == 0 {
            return;
        }
        match self.window_open {
            None => {
                self.walkers.reset_lineage();
                self.descendants.push(WeightSnapshot {
                    step: self.step_num,
                    positions: self.walkers.coords.clone(),
                });
                self.window_open = Some(self.step_num);
            }
            Some(opened) if self.step_num >= opened + delay => {
                if let Some(snap) = self.descendants.find(opened) {
                    let dw = descendant_weights(
                        snap.positions.len(),
                        &self.walkers.lineage,
                        &self.walkers.weights,
                    );
                    self.accumulator.record(&snap.positions, &dw);
                }
                self.window_open = None;
            }
            Some(_) => {}
        }
    }

    fn maybe_checkpoint(&mut self) -> Result<()> {
        let interval = match self.params.checkpoint_interval {
            Some(k) if k > 0 => k,
            _ => return Ok(()),
        };
        if self.energy_history.len() % interval != 0 {
            return Ok(());
        }
        if let Some(sink) = self.sink.as_mut() {
            let state =
                SimulationState::capture(&self.walkers, self.step_num, &self.energy_history);
            sink.snapshot(&state)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coords::geometry;
    use crate::sampling::{ContinuousWeighting, DiscreteWeighting};
    use crate::walkers::WalkerSetParams;
    use crate::wavefunction::CollectingAccumulator;
    use approx::assert_relative_eq;

    fn single_atom_walkers(n: usize) -> WalkerSet {
        let geom = geometry(&[[0.0, 0.0, 0.0]]).unwrap();
        WalkerSet::new(
            &["H"],
            geom,
            WalkerSetParams {
                initial_walkers: n,
                masses: Some(vec![1.0]),
            },
        )
        .unwrap()
    }

    fn zero_potential() -> PotentialEvaluator {
        PotentialEvaluator::per_walker(|_, _| 0.0)
    }

    #[test]
    fn test_bad_configuration_rejected() {
        let params = DMCParams {
            steps_per_propagation: 0,
            ..DMCParams::default()
        };
        let result = DMCEngine::new(
            single_atom_walkers(2),
            zero_potential(),
            Box::new(DiscreteWeighting::default()),
            params,
        );
        assert!(matches!(result, Err(DmcError::Configuration(_))));

        let params = DMCParams {
            descendant_weighting_delay: 100,
            descendant_buffer_capacity: 10,
            ..DMCParams::default()
        };
        let result = DMCEngine::new(
            single_atom_walkers(2),
            zero_potential(),
            Box::new(DiscreteWeighting::default()),
            params,
        );
        assert!(matches!(result, Err(DmcError::Configuration(_))));
    }

    #[test]
    fn test_null_feedback_conserves_weights() {
        // flat potential and population already at target: e_ref stays 0
        // and continuous weights never move
        let params = DMCParams {
            target_population: 50,
            seed: Some(123),
            ..DMCParams::default()
        };
        let mut engine = DMCEngine::new(
            single_atom_walkers(50),
            zero_potential(),
            Box::new(ContinuousWeighting::new(50)),
            params,
        )
        .unwrap();
        engine.propagate(20).unwrap();
        assert_eq!(engine.step_num(), 20);
        for &e in engine.energy_history() {
            assert_relative_eq!(e, 0.0, epsilon = 1e-12);
        }
        for &w in &engine.walkers().weights {
            assert_relative_eq!(w, 1.0, epsilon = 1e-12);
        }
    }

    /// Strategy whose branching always loses every walker, standing in for
    /// a timestep so bad the whole ensemble dies in one step.
    struct Extinction;

    impl PopulationControl for Extinction {
        fn name(&self) -> &'static str {
            "extinction"
        }

        fn update_weights(
            &mut self,
            energies: &[f64],
            e_ref: f64,
            timestep: f64,
            weights: &mut [f64],
        ) {
            crate::sampling::exponential_reweight(energies, e_ref, timestep, weights);
        }

        fn branch(&mut self, walkers: &mut WalkerSet, _rng: &mut rand::rngs::StdRng) -> Result<()> {
            walkers.coords.clear();
            walkers.weights.clear();
            walkers.lineage.clear();
            Ok(())
        }
    }

    #[test]
    fn test_population_collapse_is_distinct() {
        let params = DMCParams {
            target_population: 10,
            seed: Some(7),
            ..DMCParams::default()
        };
        let mut engine = DMCEngine::new(
            single_atom_walkers(10),
            zero_potential(),
            Box::new(Extinction),
            params,
        )
        .unwrap();
        let err = engine.propagate(50).unwrap_err();
        assert!(matches!(err, DmcError::PopulationCollapse { step: 0 }));
        // the failed step rolled back: the prior ensemble is still intact
        assert_eq!(engine.walkers().num_walkers(), 10);
        assert!(engine.walkers().weights.iter().all(|&w| w == 1.0));
    }

    /// Strategy whose branching fails outright after a normal diffuse,
    /// evaluate, and reweight have already run.
    struct FaultyBranch;

    impl PopulationControl for FaultyBranch {
        fn name(&self) -> &'static str {
            "faulty-branch"
        }

        fn update_weights(
            &mut self,
            energies: &[f64],
            e_ref: f64,
            timestep: f64,
            weights: &mut [f64],
        ) {
            crate::sampling::exponential_reweight(energies, e_ref, timestep, weights);
        }

        fn branch(&mut self, _walkers: &mut WalkerSet, _rng: &mut rand::rngs::StdRng) -> Result<()> {
            Err(DmcError::validation("branching backend unavailable"))
        }
    }

    #[test]
    fn test_branch_failure_rolls_back_step() {
        let params = DMCParams {
            target_population: 10,
            seed: Some(13),
            ..DMCParams::default()
        };
        let mut engine = DMCEngine::new(
            single_atom_walkers(10),
            PotentialEvaluator::per_walker(|_, geom| geom[0].norm_squared()),
            Box::new(FaultyBranch),
            params,
        )
        .unwrap();
        let before_coords = engine.walkers().coords.clone();
        let before_weights = engine.walkers().weights.clone();
        let before_e_ref = engine.reference_energy();

        let err = engine.propagate(5).unwrap_err();
        assert!(matches!(err, DmcError::Validation(_)));

        // nothing of the failed step survives: coords, weights, reference
        // energy, step counter, and history all read as before
        assert_eq!(engine.walkers().coords, before_coords);
        assert_eq!(engine.walkers().weights, before_weights);
        assert_eq!(engine.reference_energy(), before_e_ref);
        assert_eq!(engine.step_num(), 0);
        assert!(engine.energy_history().is_empty());
    }

    #[test]
    fn test_potential_failure_leaves_prior_state() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_inner = Arc::clone(&calls);
        let pot = PotentialEvaluator::batched(move |_, batch| {
            let n = calls_inner.fetch_add(1, Ordering::SeqCst);
            if n >= 3 {
                vec![f64::NAN; batch.len()]
            } else {
                vec![0.0; batch.len()]
            }
        });
        let params = DMCParams {
            target_population: 20,
            seed: Some(9),
            ..DMCParams::default()
        };
        let mut engine = DMCEngine::new(
            single_atom_walkers(20),
            pot,
            Box::new(DiscreteWeighting::default()),
            params,
        )
        .unwrap();
        let err = engine.propagate(10).unwrap_err();
        assert!(matches!(err, DmcError::PotentialEvaluation { .. }));
        // three steps committed before the failure; the fourth never landed
        assert_eq!(engine.step_num(), 3);
        assert_eq!(engine.energy_history().len(), 3);
        assert_eq!(
            engine.walkers().weights.len(),
            engine.walkers().coords.len()
        );
    }

    #[test]
    fn test_descendant_window_records_samples() {
        use std::sync::Mutex;
        let params = DMCParams {
            target_population: 30,
            descendant_weighting_delay: 5,
            descendant_buffer_capacity: 8,
            seed: Some(21),
            ..DMCParams::default()
        };
        let collector = Arc::new(Mutex::new(CollectingAccumulator::new()));
        let mut engine = DMCEngine::new(
            single_atom_walkers(30),
            zero_potential(),
            Box::new(DiscreteWeighting::default()),
            params,
        )
        .unwrap()
        .with_accumulator(Box::new(Arc::clone(&collector)));
        engine.propagate(25).unwrap();

        // windows open at steps 1, 7, 13, 19 and close 5 steps later
        let samples = &collector.lock().unwrap().samples;
        assert_eq!(samples.len(), 4);
        for sample in samples {
            assert_eq!(sample.positions.len(), sample.descendant_weights.len());
            assert!(sample.descendant_weights.iter().all(|&w| w >= 0.0));
            // at least one lineage must have survived a 5-step window here
            assert!(sample.descendant_weights.iter().sum::<f64>() > 0.0);
        }
    }
}
