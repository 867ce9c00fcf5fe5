//! Uniform batched-call wrapper around an arbitrary potential function.
//!
//! A potential is either natively batched (one call scores the whole
//! ensemble) or per-walker (one call per geometry). The per-walker case is
//! embarrassingly parallel and is mapped with rayon; results are always
//! reassembled in walker order before being handed back.

use rayon::prelude::*;

use crate::coords::Geometry;
use crate::errors::{DmcError, Result};

/// How the wrapped callable expects its input.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PotentialMode {
    /// One geometry per call; the evaluator maps over the batch.
    PerWalker,
    /// The full batch per call; the callable must preserve walker order.
    Batched,
}

type PerWalkerFn = dyn Fn(&[String], &Geometry) -> f64 + Send + Sync;
type BatchedFn = dyn Fn(&[String], &[Geometry]) -> Vec<f64> + Send + Sync;

enum PotentialImpl {
    PerWalker(Box<PerWalkerFn>),
    Batched(Box<BatchedFn>),
}

/// Stateless wrapper turning walker coordinates into per-walker energies.
pub struct PotentialEvaluator {
    inner: PotentialImpl,
}

impl PotentialEvaluator {
    /// Wrap a scalar-per-geometry potential.
    pub fn per_walker<F>(f: F) -> Self
    where
        F: Fn(&[String], &Geometry) -> f64 + Send + Sync + 'static,
    {
        Self {
            inner: PotentialImpl::PerWalker(Box::new(f)),
        }
    }

    /// Wrap a natively batched potential.
    pub fn batched<F>(f: F) -> Self
    where
        F: Fn(&[String], &[Geometry]) -> Vec<f64> + Send + Sync + 'static,
    {
        Self {
            inner: PotentialImpl::Batched(Box::new(f)),
        }
    }

    pub fn mode(&self) -> PotentialMode {
        match self.inner {
            PotentialImpl::PerWalker(_) => PotentialMode::PerWalker,
            PotentialImpl::Batched(_) => PotentialMode::Batched,
        }
    }

    /// Score one coordinate batch: one energy per walker, in input order.
    pub fn evaluate(&self, atoms: &[String], coords: &[Geometry]) -> Result<Vec<f64>> {
        let energies: Vec<f64> = match &self.inner {
            PotentialImpl::PerWalker(f) => {
                // par_iter + collect keeps walker order.
                coords.par_iter().map(|geom| f(atoms, geom)).collect()
            }
            PotentialImpl::Batched(f) => {
                let out = f(atoms, coords);
                if out.len() != coords.len() {
                    return Err(DmcError::PotentialEvaluation {
                        walker: None,
                        reason: format!(
                            "batched potential returned {} energies for {} walkers",
                            out.len(),
                            coords.len()
                        ),
                    });
                }
                out
            }
        };
        if let Some(i) = energies.iter().position(|e| !e.is_finite()) {
            return Err(DmcError::PotentialEvaluation {
                walker: Some(i),
                reason: format!("non-finite energy {}", energies[i]),
            });
        }
        Ok(energies)
    }

    /// Score a stack of coordinate batches (rank-4 input), batch by batch.
    pub fn evaluate_stacked(
        &self,
        atoms: &[String],
        batches: &[Vec<Geometry>],
    ) -> Result<Vec<Vec<f64>>> {
        batches
            .iter()
            .map(|batch| self.evaluate(atoms, batch))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coords::geometry;
    use nalgebra::Vector3;

    fn index_tagged_batch(n: usize) -> Vec<Geometry> {
        // Encode the walker index in the x coordinate so an index-identity
        // probe potential can read it back.
        (0..n)
            .map(|i| vec![Vector3::new(i as f64, 0.0, 0.0)])
            .collect()
    }

    #[test]
    fn test_per_walker_order_preserved() {
        let pot = PotentialEvaluator::per_walker(|_, geom| geom[0].x);
        let atoms = vec!["H".to_string()];
        let batch = index_tagged_batch(512);
        let energies = pot.evaluate(&atoms, &batch).unwrap();
        let expected: Vec<f64> = (0..512).map(|i| i as f64).collect();
        assert_eq!(energies, expected);
    }

    #[test]
    fn test_batched_forwarding() {
        let pot = PotentialEvaluator::batched(|_, batch| {
            batch.iter().map(|geom| 2.0 * geom[0].x).collect()
        });
        assert_eq!(pot.mode(), PotentialMode::Batched);
        let atoms = vec!["H".to_string()];
        let batch = index_tagged_batch(4);
        let energies = pot.evaluate(&atoms, &batch).unwrap();
        assert_eq!(energies, vec![0.0, 2.0, 4.0, 6.0]);
    }

    #[test]
    fn test_batched_wrong_length_is_error() {
        let pot = PotentialEvaluator::batched(|_, _| vec![1.0]);
        let atoms = vec!["H".to_string()];
        let batch = index_tagged_batch(3);
        let err = pot.evaluate(&atoms, &batch).unwrap_err();
        assert!(matches!(
            err,
            DmcError::PotentialEvaluation { walker: None, .. }
        ));
    }

    #[test]
    fn test_nan_reports_walker_index() {
        let pot = PotentialEvaluator::per_walker(|_, geom| {
            if geom[0].x == 2.0 {
                f64::NAN
            } else {
                0.0
            }
        });
        let atoms = vec!["H".to_string()];
        let batch = index_tagged_batch(5);
        let err = pot.evaluate(&atoms, &batch).unwrap_err();
        assert!(matches!(
            err,
            DmcError::PotentialEvaluation {
                walker: Some(2),
                ..
            }
        ));
    }

    #[test]
    fn test_rank4_stacked_matches_independent_calls() {
        let pot = PotentialEvaluator::per_walker(|_, geom| geom[0].norm());
        let atoms = vec!["H".to_string()];
        let geom = geometry(&[[1.0, 2.0, 2.0]]).unwrap();
        let batch_a = vec![geom.clone(); 3];
        let batch_b = index_tagged_batch(3);

        let stacked = pot
            .evaluate_stacked(&atoms, &[batch_a.clone(), batch_b.clone()])
            .unwrap();
        assert_eq!(stacked.len(), 2);
        assert_eq!(stacked[0], pot.evaluate(&atoms, &batch_a).unwrap());
        assert_eq!(stacked[1], pot.evaluate(&atoms, &batch_b).unwrap());
    }
}
