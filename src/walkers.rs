//! The walker ensemble: per-atom identities, masses, diffusion scales, and
//! the live coordinate and weight arrays the engine evolves.
//!
//! The set is owned exclusively by one engine for the duration of a run.
//! `coords` and `weights` are replaced wholesale each committed step; the
//! displacement generators here never mutate them.

use rand::Rng;
use rand_distr::{Distribution, Normal};

use crate::atoms;
use crate::coords::{self, Geometry};
use crate::errors::{DmcError, Result};

/// Keyword-style construction options for a [`WalkerSet`].
///
/// Only the atom list and the base geometry are positional; everything else
/// goes through this struct so call sites stay unambiguous.
#[derive(Clone, Debug)]
pub struct WalkerSetParams {
    /// Population size at start; the base geometry is replicated this many times.
    pub initial_walkers: usize,
    /// Per-atom masses in amu. `None` falls back to the atom-data table.
    pub masses: Option<Vec<f64>>,
}

impl Default for WalkerSetParams {
    fn default() -> Self {
        Self {
            initial_walkers: 5000,
            masses: None,
        }
    }
}

/// The DMC walker ensemble.
pub struct WalkerSet {
    /// Canonical atomic symbols, one per particle. Immutable for the run.
    pub atoms: Vec<String>,
    /// Per-atom masses in amu. Immutable for the run.
    pub masses: Vec<f64>,
    /// Per-atom Gaussian displacement scale, `sqrt(timestep / mass)`.
    /// Heavier atoms diffuse less. Derived once by [`WalkerSet::initialize`].
    pub sigmas: Vec<f64>,
    /// Step size used to scale displacement variance.
    pub timestep: f64,
    /// The reference geometry the initial population was built from.
    pub base_coords: Geometry,
    /// Live positions, `num_walkers x num_atoms`. Replaced each step.
    pub coords: Vec<Geometry>,
    /// Per-walker statistical weights. Always the same length as `coords`.
    pub weights: Vec<f64>,
    /// Ancestor labels for descendant weighting; maintained through branching.
    pub(crate) lineage: Vec<usize>,
    initialized: bool,
}

impl WalkerSet {
    /// Build an ensemble by replicating one geometry into a population.
    pub fn new(atom_specs: &[&str], base: Geometry, params: WalkerSetParams) -> Result<Self> {
        if params.initial_walkers == 0 {
            return Err(DmcError::validation("initial_walkers must be at least 1"));
        }
        let ensemble = coords::replicate(&base, params.initial_walkers);
        Self::from_ensemble(atom_specs, ensemble, params.masses)
    }

    /// Build an ensemble from an explicit set of initial walker geometries.
    pub fn from_ensemble(
        atom_specs: &[&str],
        ensemble: Vec<Geometry>,
        masses: Option<Vec<f64>>,
    ) -> Result<Self> {
        if atom_specs.is_empty() {
            return Err(DmcError::validation("atom list must not be empty"));
        }
        if ensemble.is_empty() {
            return Err(DmcError::validation("initial ensemble must not be empty"));
        }
        for (i, geom) in ensemble.iter().enumerate() {
            if geom.len() != atom_specs.len() {
                return Err(DmcError::Validation(format!(
                    "walker {} has {} atoms, expected {}",
                    i,
                    geom.len(),
                    atom_specs.len()
                )));
            }
        }

        // Symbolize whatever atom spec we were given; unknown species are
        // only an error when we also need their mass.
        let (symbols, masses) = match masses {
            Some(m) => {
                if m.len() != atom_specs.len() {
                    return Err(DmcError::Validation(format!(
                        "got {} masses for {} atoms",
                        m.len(),
                        atom_specs.len()
                    )));
                }
                if m.iter().any(|&x| !(x.is_finite() && x > 0.0)) {
                    return Err(DmcError::validation("masses must be positive and finite"));
                }
                let symbols = atom_specs
                    .iter()
                    .map(|a| {
                        atoms::canonical_symbol(a)
                            .map(str::to_string)
                            .unwrap_or_else(|| a.to_string())
                    })
                    .collect();
                (symbols, m)
            }
            None => {
                let mut symbols = Vec::with_capacity(atom_specs.len());
                let mut looked_up = Vec::with_capacity(atom_specs.len());
                for a in atom_specs {
                    let sym = atoms::canonical_symbol(a).ok_or_else(|| {
                        DmcError::Validation(format!("unknown atom '{}' and no mass given", a))
                    })?;
                    let mass = atoms::mass_amu(sym).ok_or_else(|| {
                        DmcError::Validation(format!("no mass on record for atom '{}'", sym))
                    })?;
                    symbols.push(sym.to_string());
                    looked_up.push(mass);
                }
                (symbols, looked_up)
            }
        };

        let n = ensemble.len();
        let base_coords = ensemble[0].clone();
        Ok(Self {
            atoms: symbols,
            masses,
            sigmas: Vec::new(),
            timestep: 0.0,
            base_coords,
            coords: ensemble,
            weights: vec![1.0; n],
            lineage: (0..n).collect(),
            initialized: false,
        })
    }

    /// Derive the per-atom diffusion scales from the masses and the timestep.
    ///
    /// Must be called exactly once before any displacement is generated;
    /// re-deriving mid-run would silently change the diffusion statistics,
    /// so a second call is rejected.
    pub fn initialize(&mut self, timestep: f64) -> Result<()> {
        if self.initialized {
            return Err(DmcError::validation(
                "WalkerSet is already initialized; sigmas cannot be re-derived mid-run",
            ));
        }
        if !(timestep.is_finite() && timestep > 0.0) {
            return Err(DmcError::validation("timestep must be positive and finite"));
        }
        self.timestep = timestep;
        self.sigmas = self.masses.iter().map(|m| (timestep / m).sqrt()).collect();
        self.initialized = true;
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn num_walkers(&self) -> usize {
        self.coords.len()
    }

    pub fn num_atoms(&self) -> usize {
        self.atoms.len()
    }

    pub fn total_weight(&self) -> f64 {
        self.weights.iter().sum()
    }

    /// Relabel every walker as its own ancestor; called when a descendant
    /// weighting window opens.
    pub(crate) fn reset_lineage(&mut self) {
        self.lineage.clear();
        self.lineage.extend(0..self.coords.len());
    }

    /// Generate `n` independent single-step Gaussian displacement sets,
    /// each of shape `num_walkers x num_atoms`.
    pub fn get_displacements<R: Rng + ?Sized>(
        &self,
        n: usize,
        rng: &mut R,
    ) -> Result<Vec<Vec<Geometry>>> {
        if !self.initialized {
            return Err(DmcError::validation(
                "WalkerSet::initialize must be called before generating displacements",
            ));
        }
        let normals: Vec<Normal<f64>> = self
            .sigmas
            .iter()
            .map(|&sig| Normal::new(0.0, sig).unwrap())
            .collect();
        let steps = (0..n)
            .map(|_| {
                self.coords
                    .iter()
                    .map(|geom| {
                        geom.iter()
                            .enumerate()
                            .map(|(a, _)| {
                                nalgebra::Vector3::new(
                                    normals[a].sample(rng),
                                    normals[a].sample(rng),
                                    normals[a].sample(rng),
                                )
                            })
                            .collect()
                    })
                    .collect()
            })
            .collect();
        Ok(steps)
    }

    /// Coordinates after `n` sub-steps of free diffusion: the cumulative sum
    /// of `n` single-step displacements added to the current positions.
    ///
    /// Does not mutate `coords`; the caller decides when to commit.
    pub fn get_displaced_coords<R: Rng + ?Sized>(
        &self,
        n: usize,
        rng: &mut R,
    ) -> Result<Vec<Geometry>> {
        let steps = self.get_displacements(n, rng)?;
        let mut displaced = self.coords.clone();
        for step in &steps {
            for (walker, disp) in displaced.iter_mut().zip(step.iter()) {
                for (pos, d) in walker.iter_mut().zip(disp.iter()) {
                    *pos += d;
                }
            }
        }
        Ok(displaced)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coords::geometry;
    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn water() -> WalkerSet {
        let geom = geometry(&[
            [0.0, 0.0, 0.0],
            [0.96, 0.0, 0.0],
            [-0.24, 0.93, 0.0],
        ])
        .unwrap();
        WalkerSet::new(
            &["O", "H", "H"],
            geom,
            WalkerSetParams {
                initial_walkers: 10,
                masses: None,
            },
        )
        .unwrap()
    }

    #[test]
    fn test_construction_replicates_population() {
        let ws = water();
        assert_eq!(ws.num_walkers(), 10);
        assert_eq!(ws.num_atoms(), 3);
        assert_eq!(ws.weights, vec![1.0; 10]);
        assert_eq!(ws.atoms, vec!["O", "H", "H"]);
    }

    #[test]
    fn test_mismatched_lengths_rejected() {
        let geom = geometry(&[[0.0, 0.0, 0.0]]).unwrap();
        assert!(WalkerSet::new(&["O", "H"], geom.clone(), WalkerSetParams::default()).is_err());

        let bad_masses = WalkerSet::new(
            &["H"],
            geom,
            WalkerSetParams {
                initial_walkers: 2,
                masses: Some(vec![1.0, 2.0]),
            },
        );
        assert!(matches!(bad_masses, Err(DmcError::Validation(_))));
    }

    #[test]
    fn test_unknown_atom_needs_mass() {
        let geom = geometry(&[[0.0, 0.0, 0.0]]).unwrap();
        assert!(WalkerSet::new(&["Qq"], geom.clone(), WalkerSetParams::default()).is_err());
        let with_mass = WalkerSet::new(
            &["Qq"],
            geom,
            WalkerSetParams {
                initial_walkers: 1,
                masses: Some(vec![42.0]),
            },
        );
        assert!(with_mass.is_ok());
    }

    #[test]
    fn test_table_masses_are_finite() {
        let ws = water();
        assert!(ws.masses.iter().all(|&m| m.is_finite() && m > 0.0));
    }

    #[test]
    fn test_sigma_decreases_with_mass() {
        let mut ws = water();
        ws.initialize(1.0).unwrap();
        // atom 0 is O, atoms 1 and 2 are H
        assert!(ws.sigmas[0] < ws.sigmas[1]);
        assert_relative_eq!(ws.sigmas[1], (1.0 / ws.masses[1]).sqrt(), epsilon = 1e-12);
    }

    #[test]
    fn test_double_initialize_rejected() {
        let mut ws = water();
        ws.initialize(1.0).unwrap();
        assert!(ws.initialize(0.5).is_err());
    }

    #[test]
    fn test_displacement_requires_initialize() {
        let ws = water();
        let mut rng = StdRng::seed_from_u64(1);
        assert!(ws.get_displacements(1, &mut rng).is_err());
    }

    #[test]
    fn test_displacement_statistics() {
        let geom = geometry(&[[0.0, 0.0, 0.0]]).unwrap();
        let mut ws = WalkerSet::new(
            &["H"],
            geom,
            WalkerSetParams {
                initial_walkers: 4000,
                masses: Some(vec![1.0]),
            },
        )
        .unwrap();
        ws.initialize(0.25).unwrap();
        let sigma2 = 0.25;

        let mut rng = StdRng::seed_from_u64(7);
        let steps = ws.get_displacements(1, &mut rng).unwrap();
        let samples: Vec<f64> = steps[0]
            .iter()
            .flat_map(|geom| geom.iter().flat_map(|v| [v.x, v.y, v.z]))
            .collect();
        let n = samples.len() as f64;
        let mean = samples.iter().sum::<f64>() / n;
        let var = samples.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;
        assert_relative_eq!(mean, 0.0, epsilon = 0.02);
        assert_relative_eq!(var, sigma2, epsilon = 0.02);
    }

    #[test]
    fn test_displaced_coords_do_not_mutate() {
        let mut ws = water();
        ws.initialize(1.0).unwrap();
        let before = ws.coords.clone();
        let mut rng = StdRng::seed_from_u64(3);
        let displaced = ws.get_displaced_coords(5, &mut rng).unwrap();
        assert_eq!(ws.coords, before);
        assert_eq!(displaced.len(), ws.num_walkers());
        assert!(displaced != before);
    }
}
