// src/utils.rs

use zeroize::Zeroizing;

/// Reduce a password held as UTF-16 code units to the byte form the
/// cipher consumes: the low 8 bits of each unit, in order. The returned
/// buffer wipes itself on drop.
pub fn password_code_units(units: &[u16]) -> Zeroizing<Vec<u8>> {
    Zeroizing::new(units.iter().map(|&u| u as u8).collect())
}
