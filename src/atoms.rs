//! Atomic species lookup: canonical symbols and masses.
//!
//! Stands in for an external atom-data collaborator; treated as a pure
//! function by `WalkerSet`. Masses are in atomic mass units (amu).

/// Symbol / mass pairs for the species the kernel knows out of the box.
/// D and T are listed separately so isotope studies don't need overrides.
const ATOM_DATA: &[(&str, f64)] = &[
    ("H", 1.00782503),
    ("D", 2.01410178),
    ("T", 3.01604928),
    ("He", 4.002602),
    ("Li", 6.94),
    ("Be", 9.0121831),
    ("B", 10.81),
    ("C", 12.011),
    ("N", 14.007),
    ("O", 15.999),
    ("F", 18.998403),
    ("Ne", 20.1797),
    ("Na", 22.989769),
    ("Mg", 24.305),
    ("Al", 26.981538),
    ("Si", 28.085),
    ("P", 30.973762),
    ("S", 32.06),
    ("Cl", 35.45),
    ("Ar", 39.948),
    ("K", 39.0983),
    ("Ca", 40.078),
    ("Br", 79.904),
    ("I", 126.90447),
];

/// Canonical symbol for an atom spec, matched case-insensitively.
pub fn canonical_symbol(atom: &str) -> Option<&'static str> {
    ATOM_DATA
        .iter()
        .find(|(sym, _)| sym.eq_ignore_ascii_case(atom))
        .map(|(sym, _)| *sym)
}

/// Atomic mass in amu for a known species.
pub fn mass_amu(atom: &str) -> Option<f64> {
    ATOM_DATA
        .iter()
        .find(|(sym, _)| sym.eq_ignore_ascii_case(atom))
        .map(|(_, mass)| *mass)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_symbol_canonicalization() {
        assert_eq!(canonical_symbol("h"), Some("H"));
        assert_eq!(canonical_symbol("CL"), Some("Cl"));
        assert_eq!(canonical_symbol("Xx"), None);
    }

    #[test]
    fn test_every_species_has_a_usable_mass() {
        // any symbol the canonicalizer accepts must also resolve to a
        // positive finite mass, so lookup-based construction cannot be
        // poisoned by a half-known species
        for (sym, _) in ATOM_DATA {
            assert_eq!(canonical_symbol(sym), Some(*sym));
            let mass = mass_amu(sym).unwrap();
            assert!(mass.is_finite() && mass > 0.0, "bad mass for {}", sym);
        }
    }

    #[test]
    fn test_mass_lookup() {
        assert_relative_eq!(mass_amu("O").unwrap(), 15.999, epsilon = 1e-9);
        assert!(mass_amu("D").unwrap() > mass_amu("H").unwrap());
        assert!(mass_amu("Uuo").is_none());
    }
}
