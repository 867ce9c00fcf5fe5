//! Cartesian geometry construction and validation.
//!
//! A `Geometry` is one walker's atomic positions in a 3-D Cartesian frame.
//! Unit conversion is the caller's responsibility; the kernel only checks
//! that the numbers it is handed are usable.

use nalgebra::Vector3;

use crate::errors::{DmcError, Result};

/// One walker's atomic positions, one vector per atom.
pub type Geometry = Vec<Vector3<f64>>;

/// Build a validated geometry from raw numeric rows.
pub fn geometry(rows: &[[f64; 3]]) -> Result<Geometry> {
    if rows.is_empty() {
        return Err(DmcError::validation("geometry must contain at least one atom"));
    }
    for (i, row) in rows.iter().enumerate() {
        if row.iter().any(|x| !x.is_finite()) {
            return Err(DmcError::Validation(format!(
                "non-finite coordinate in geometry row {}",
                i
            )));
        }
    }
    Ok(rows.iter().map(|r| Vector3::new(r[0], r[1], r[2])).collect())
}

/// Replicate one geometry into an initial walker population.
pub fn replicate(geom: &Geometry, n: usize) -> Vec<Geometry> {
    (0..n).map(|_| geom.clone()).collect()
}
