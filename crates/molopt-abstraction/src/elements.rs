//! Element symbol lookup for the atomic numbers the service deals with.

use crate::AtomicNumber;

/// Symbols indexed by atomic number minus one, through bromine.
const SYMBOLS: [&str; 35] = [
    "H", "He", "Li", "Be", "B", "C", "N", "O", "F", "Ne", "Na", "Mg", "Al", "Si", "P", "S", "Cl",
    "Ar", "K", "Ca", "Sc", "Ti", "V", "Cr", "Mn", "Fe", "Co", "Ni", "Cu", "Zn", "Ga", "Ge", "As",
    "Se", "Br",
];

/// Returns the chemical symbol for an atomic number, if known.
pub fn element_symbol(number: AtomicNumber) -> Option<&'static str> {
    let index = usize::from(number).checked_sub(1)?;
    SYMBOLS.get(index).copied()
}

/// Returns the atomic number for a chemical symbol (case-insensitive).
pub fn atomic_number(symbol: &str) -> Option<AtomicNumber> {
    SYMBOLS
        .iter()
        .position(|s| s.eq_ignore_ascii_case(symbol))
        .map(|index| (index + 1) as AtomicNumber)
}
