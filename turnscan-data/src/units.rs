//! Units of length. Everything is millimeters internally; conversion only
//! happens at export time.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

const MM_PER_INCH: f64 = 25.4;
const MM_PER_CM: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum UnitOfLength {
    #[default]
    #[serde(rename = "mm")]
    Millimeters,
    #[serde(rename = "cm")]
    Centimeters,
    #[serde(rename = "in")]
    Inches,
}

impl UnitOfLength {
    fn millimeters_per_unit(self) -> f64 {
        match self {
            UnitOfLength::Millimeters => 1.0,
            UnitOfLength::Centimeters => MM_PER_CM,
            UnitOfLength::Inches => MM_PER_INCH,
        }
    }
}

/// Convert `value` expressed in `from` units into `to` units.
pub fn convert_unit_of_length(value: f64, from: UnitOfLength, to: UnitOfLength) -> f64 {
    if from == to {
        return value;
    }
    value * from.millimeters_per_unit() / to.millimeters_per_unit()
}

impl fmt::Display for UnitOfLength {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            UnitOfLength::Millimeters => "mm",
            UnitOfLength::Centimeters => "cm",
            UnitOfLength::Inches => "in",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Error)]
#[error("Unknown unit of length: {0}")]
pub struct UnknownUnit(pub String);

impl FromStr for UnitOfLength {
    type Err = UnknownUnit;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mm" | "millimeters" => Ok(UnitOfLength::Millimeters),
            "cm" | "centimeters" => Ok(UnitOfLength::Centimeters),
            "in" | "inches" => Ok(UnitOfLength::Inches),
            other => Err(UnknownUnit(other.to_string())),
        }
    }
}
