//! XYZ structure text format.

use molopt_abstraction::{Geometry, atomic_number, element_symbol};
use std::fmt::Write;

use crate::error::{CoreError, Result};

/// Renders a structure as XYZ text.
///
/// Elements without a known symbol are written as `X<atomic number>`.
#[must_use]
pub fn structure_to_xyz(geometry: &Geometry, comment: &str) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", geometry.len());
    let _ = writeln!(out, "{}", comment.replace('\n', " "));
    for (element, [x, y, z]) in geometry.elements.iter().zip(&geometry.coordinates) {
        let symbol = element_symbol(*element)
            .map_or_else(|| format!("X{}", element), ToString::to_string);
        let _ = writeln!(out, "{:<2} {:12.6} {:12.6} {:12.6}", symbol, x, y, z);
    }
    out
}

/// Parses XYZ text.
///
/// Symbols may also be given as bare atomic numbers.
///
/// # Errors
/// Returns `CoreError::InvalidInput` on a bad atom count, unknown symbol,
/// malformed coordinate, or a line count that does not match the header.
pub fn parse_xyz(content: &str) -> Result<Geometry> {
    let mut lines = content.lines();
    let count: usize = lines
        .next()
        .map(str::trim)
        .ok_or_else(|| CoreError::InvalidInput("XYZ input is empty".to_string()))?
        .parse()
        .map_err(|_| CoreError::InvalidInput("XYZ atom count is not a number".to_string()))?;
    // Comment line.
    lines.next();

    let atom_lines: Vec<&str> = lines.filter(|line| !line.trim().is_empty()).collect();
    if atom_lines.len() != count {
        return Err(CoreError::InvalidInput(format!(
            "XYZ header declares {} atoms but {} were found",
            count,
            atom_lines.len()
        )));
    }

    let mut elements = Vec::with_capacity(atom_lines.len());
    let mut coordinates = Vec::with_capacity(atom_lines.len());
    for (index, line) in atom_lines.into_iter().enumerate() {
        let line_number = index + 3;
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 4 {
            return Err(CoreError::InvalidInput(format!(
                "Line {}: expected a symbol and three coordinates",
                line_number
            )));
        }

        let element = atomic_number(fields[0])
            .or_else(|| fields[0].parse().ok())
            .ok_or_else(|| {
                CoreError::InvalidInput(format!("Line {}: unknown element '{}'", line_number, fields[0]))
            })?;

        let mut position = [0.0; 3];
        for (axis, field) in fields[1..4].iter().enumerate() {
            position[axis] = field.parse().map_err(|_| {
                CoreError::InvalidInput(format!("Line {}: invalid coordinate '{}'", line_number, field))
            })?;
        }

        elements.push(element);
        coordinates.push(position);
    }

    Ok(Geometry::new(elements, coordinates)?)
}
