//! Measurement units and canonical conversion
//!
//! Every quantity that crosses a module boundary carries its unit. Sums are
//! only taken after converting to the dimension's canonical unit.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{PlanningError, PlanningResult};

/// Physical dimension of a unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    /// Greenhouse gas emissions (CO2 equivalent)
    Emissions,
    /// Energy consumption
    Energy,
    /// Volume (water)
    Volume,
    /// Mass (waste)
    Mass,
}

impl Dimension {
    /// Canonical unit all values of this dimension are summed in
    pub fn canonical_unit(&self) -> Unit {
        match self {
            Dimension::Emissions => Unit::KgCo2e,
            Dimension::Energy => Unit::Kwh,
            Dimension::Volume => Unit::CubicMeters,
            Dimension::Mass => Unit::Kilograms,
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dimension::Emissions => write!(f, "emissions"),
            Dimension::Energy => write!(f, "energy"),
            Dimension::Volume => write!(f, "volume"),
            Dimension::Mass => write!(f, "mass"),
        }
    }
}

/// Unit of measure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Unit {
    /// Kilograms CO2 equivalent
    KgCo2e,
    /// Metric tonnes CO2 equivalent
    TonnesCo2e,
    /// Kilowatt hours
    Kwh,
    /// Megawatt hours
    Mwh,
    /// Gigajoules
    Gigajoules,
    /// Litres
    Liters,
    /// Cubic meters
    CubicMeters,
    /// Megalitres
    Megaliters,
    /// Kilograms
    Kilograms,
    /// Metric tonnes
    Tonnes,
}

impl Unit {
    /// Dimension of this unit
    pub fn dimension(&self) -> Dimension {
        match self {
            Unit::KgCo2e | Unit::TonnesCo2e => Dimension::Emissions,
            Unit::Kwh | Unit::Mwh | Unit::Gigajoules => Dimension::Energy,
            Unit::Liters | Unit::CubicMeters | Unit::Megaliters => Dimension::Volume,
            Unit::Kilograms | Unit::Tonnes => Dimension::Mass,
        }
    }

    /// Multiplier from this unit to its dimension's canonical unit
    fn canonical_factor(&self) -> f64 {
        match self {
            Unit::KgCo2e => 1.0,
            Unit::TonnesCo2e => 1_000.0,
            Unit::Kwh => 1.0,
            Unit::Mwh => 1_000.0,
            Unit::Gigajoules => 277.777_777_777_777_8,
            Unit::Liters => 0.001,
            Unit::CubicMeters => 1.0,
            Unit::Megaliters => 1_000.0,
            Unit::Kilograms => 1.0,
            Unit::Tonnes => 1_000.0,
        }
    }

    /// Canonical unit of this unit's dimension
    pub fn canonical(&self) -> Unit {
        self.dimension().canonical_unit()
    }

    /// Whether both units measure the same dimension
    pub fn is_compatible_with(&self, other: Unit) -> bool {
        self.dimension() == other.dimension()
    }

    /// Convert a value expressed in `self` into `target`
    pub fn convert(&self, value: f64, target: Unit) -> Option<f64> {
        if !self.is_compatible_with(target) {
            return None;
        }
        Some(value * self.canonical_factor() / target.canonical_factor())
    }

    /// Convert to the canonical unit
    pub fn to_canonical(&self, value: f64) -> f64 {
        value * self.canonical_factor()
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            Unit::KgCo2e => "kgCO2e",
            Unit::TonnesCo2e => "tCO2e",
            Unit::Kwh => "kWh",
            Unit::Mwh => "MWh",
            Unit::Gigajoules => "GJ",
            Unit::Liters => "L",
            Unit::CubicMeters => "m3",
            Unit::Megaliters => "ML",
            Unit::Kilograms => "kg",
            Unit::Tonnes => "t",
        };
        write!(f, "{}", symbol)
    }
}

impl FromStr for Unit {
    type Err = PlanningError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // "ML" (megalitres) and "mL" must not collapse, so match case first.
        match s.trim() {
            "ML" => return Ok(Unit::Megaliters),
            "L" | "l" => return Ok(Unit::Liters),
            _ => {}
        }
        match s.trim().to_ascii_lowercase().as_str() {
            "kgco2e" | "kg co2e" | "kg_co2e" => Ok(Unit::KgCo2e),
            "tco2e" | "t co2e" | "tonnes co2e" | "tco2" => Ok(Unit::TonnesCo2e),
            "kwh" => Ok(Unit::Kwh),
            "mwh" => Ok(Unit::Mwh),
            "gj" => Ok(Unit::Gigajoules),
            "liter" | "liters" | "litre" | "litres" => Ok(Unit::Liters),
            "m3" | "m³" | "cubic meters" | "cubic_meters" => Ok(Unit::CubicMeters),
            "megaliters" | "megalitres" => Ok(Unit::Megaliters),
            "kg" | "kilograms" => Ok(Unit::Kilograms),
            "t" | "tonnes" | "tons" => Ok(Unit::Tonnes),
            other => Err(PlanningError::ConfigurationError {
                message: format!("unknown unit '{}'", other),
            }),
        }
    }
}

/// A value with an explicit unit
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quantity {
    /// Magnitude
    pub value: f64,
    /// Unit of `value`
    pub unit: Unit,
}

impl Quantity {
    /// Create a quantity
    pub fn new(value: f64, unit: Unit) -> Self {
        Self { value, unit }
    }

    /// Express the quantity in another unit of the same dimension
    pub fn to_unit(&self, metric_id: Uuid, target: Unit) -> PlanningResult<Quantity> {
        self.unit
            .convert(self.value, target)
            .map(|value| Quantity::new(value, target))
            .ok_or_else(|| PlanningError::UnitMismatch {
                metric_id,
                expected: target.to_string(),
                found: self.unit.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_volume_conversions() {
        assert_relative_eq!(Unit::Liters.convert(2_500.0, Unit::CubicMeters).unwrap(), 2.5);
        assert_relative_eq!(Unit::Megaliters.convert(1.0, Unit::CubicMeters).unwrap(), 1_000.0);
        assert_relative_eq!(Unit::CubicMeters.convert(3.0, Unit::Liters).unwrap(), 3_000.0);
    }

    #[test]
    fn test_incompatible_units_do_not_convert() {
        assert!(Unit::Kwh.convert(10.0, Unit::CubicMeters).is_none());
        let quantity = Quantity::new(10.0, Unit::Kwh);
        let result = quantity.to_unit(Uuid::nil(), Unit::Liters);
        assert!(matches!(result, Err(PlanningError::UnitMismatch { .. })));
    }

    #[test]
    fn test_megaliters_and_liters_parse_distinctly() {
        assert_eq!("ML".parse::<Unit>().unwrap(), Unit::Megaliters);
        assert_eq!("L".parse::<Unit>().unwrap(), Unit::Liters);
        assert_eq!("m³".parse::<Unit>().unwrap(), Unit::CubicMeters);
        assert_eq!("tCO2e".parse::<Unit>().unwrap(), Unit::TonnesCo2e);
        assert!("furlongs".parse::<Unit>().is_err());
    }

    #[test]
    fn test_canonical_units() {
        assert_eq!(Unit::Mwh.canonical(), Unit::Kwh);
        assert_eq!(Unit::TonnesCo2e.canonical(), Unit::KgCo2e);
        assert_relative_eq!(Unit::Gigajoules.to_canonical(3.6), 1_000.0, epsilon = 1e-6);
    }
}
