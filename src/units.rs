//! Dimensioned quantities
//!
//! Every amount that flows through the calculator carries its physical
//! dimensions (mass, length, time and currency exponents). Multiplication and
//! division combine dimensions; addition and subtraction require them to match.

use std::fmt;
use std::ops::{Add, AddAssign, Div, Mul, Neg, Sub, SubAssign};

use crate::error::{LcaError, Result};

/// Exponents of the base dimensions: kilogram, meter, second, dollar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct Dimensions {
    exps: [i8; 4],
}

const BASE_SYMBOLS: [&str; 4] = ["kg", "m", "s", "$"];

impl Dimensions {
    pub const fn new(kg: i8, m: i8, s: i8, dollars: i8) -> Self {
        Dimensions {
            exps: [kg, m, s, dollars],
        }
    }

    pub fn matches(&self, other: &Dimensions) -> bool {
        self == other
    }

    pub fn is_dimensionless(&self) -> bool {
        self.exps == [0; 4]
    }

    fn combine(self, other: Dimensions, sign: i8) -> Dimensions {
        let mut exps = self.exps;
        for (e, o) in exps.iter_mut().zip(other.exps) {
            *e += sign * o;
        }
        Dimensions { exps }
    }

    /// Dimensions for a unit label as used in the process database.
    pub fn from_label(label: &str) -> Result<Dimensions> {
        unit_label(label).map(|(dims, _)| dims)
    }
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_dimensionless() {
            return write!(f, "1");
        }
        let mut first = true;
        for (sym, e) in BASE_SYMBOLS.iter().zip(self.exps) {
            if e == 0 {
                continue;
            }
            if !first {
                write!(f, " ")?;
            }
            first = false;
            if e == 1 {
                write!(f, "{sym}")?;
            } else {
                write!(f, "{sym}^{e}")?;
            }
        }
        Ok(())
    }
}

pub const DIMLESS: Dimensions = Dimensions::new(0, 0, 0, 0);
pub const KILOGRAM: Dimensions = Dimensions::new(1, 0, 0, 0);
pub const METER: Dimensions = Dimensions::new(0, 1, 0, 0);
pub const METER2: Dimensions = Dimensions::new(0, 2, 0, 0);
pub const METER3: Dimensions = Dimensions::new(0, 3, 0, 0);
pub const SECOND: Dimensions = Dimensions::new(0, 0, 1, 0);
pub const PER_SECOND: Dimensions = Dimensions::new(0, 0, -1, 0);
pub const DOLLAR: Dimensions = Dimensions::new(0, 0, 0, 1);
pub const JOULE: Dimensions = Dimensions::new(1, 2, -2, 0);
pub const WATT: Dimensions = Dimensions::new(1, 2, -3, 0);
pub const METER_PER_SECOND: Dimensions = Dimensions::new(0, 1, -1, 0);
pub const METER_PER_SECOND2: Dimensions = Dimensions::new(0, 1, -2, 0);
pub const KG_PER_M3: Dimensions = Dimensions::new(1, -3, 0, 0);
pub const J_PER_KG: Dimensions = Dimensions::new(0, 2, -2, 0);
pub const J_PER_M3: Dimensions = Dimensions::new(1, -1, -2, 0);
pub const KG_PER_J: Dimensions = Dimensions::new(0, -2, 2, 0);
/// Energy intensity of transport: J per meter per kg carried.
pub const J_PER_M_KG: Dimensions = METER_PER_SECOND2;
pub const J_PER_M: Dimensions = Dimensions::new(1, 1, -2, 0);
pub const KG_PER_M: Dimensions = Dimensions::new(1, -1, 0, 0);
pub const KG_PER_M2: Dimensions = Dimensions::new(1, -2, 0, 0);
pub const M_PER_M3: Dimensions = Dimensions::new(0, -2, 0, 0);
pub const W_PER_KG: Dimensions = Dimensions::new(0, 2, -3, 0);
pub const DOLLAR_PER_KG: Dimensions = Dimensions::new(-1, 0, 0, 1);
pub const DOLLAR_PER_M3: Dimensions = Dimensions::new(0, -3, 0, 1);
pub const DOLLAR_PER_J: Dimensions = Dimensions::new(-1, -2, 2, 1);

/// Maps a database unit label to dimensions and a scale factor applied to the
/// (already SI) value.
fn unit_label(label: &str) -> Result<(Dimensions, f64)> {
    let dims = match label.trim() {
        "distance" | "m" | "mi" | "km" => METER,
        "area" | "m^2" => METER2,
        "mass" | "kg" | "t" | "g" | "ton" | "lb" | "mg" | "yield" => KILOGRAM,
        "time" | "s" => SECOND,
        "energy" | "J" | "Btu" | "mmBtu" | "kWh" => JOULE,
        "power" | "W" | "hp" => WATT,
        "volume" | "m^3" | "gal" => METER3,
        "percentage" | "ratio" | "unitless" | "efficiency" | "%" | "" | "share"
        | "emission_factor_grams" | "energy_use" | "nutrient_add" => DIMLESS,
        "concentration" | "ppm" => return Ok((DIMLESS, 1.0e-6)),
        "currency" | "$" => DOLLAR,
        "speed" | "m/s" | "mi/h" => METER_PER_SECOND,
        "density" | "kg/m^3" => KG_PER_M3,
        "heating_value_mass" | "J/kg" | "Btu/lb" => J_PER_KG,
        "heating_value_volume" | "J/m^3" | "Btu/gal" => J_PER_M3,
        "emission_factor" | "kg/J" | "g/mmBtu" | "g/MJ" => KG_PER_J,
        "energy_intensity" | "J/(kg m)" | "Btu/(ton mi)" => J_PER_M_KG,
        "vehicle_energy" | "J/m" | "Btu/mi" => J_PER_M,
        "vehicle_emission_factor" | "kg/m" | "g/mi" => KG_PER_M,
        "acre_yield" | "kg/m^2" => KG_PER_M2,
        "fuel_economy" | "m/m^3" | "mi/gal" => M_PER_M3,
        "fuel_consumption" | "m^3/m" => METER2,
        "horsepower_factor" | "W/kg" | "hp/ton" => W_PER_KG,
        "market_value_mass" | "$/kg" | "$/lb" => DOLLAR_PER_KG,
        "market_value_volume" | "$/m^3" => DOLLAR_PER_M3,
        "market_value_energy" | "$/J" => DOLLAR_PER_J,
        "loss_rate_per_day" | "1/s" => PER_SECOND,
        other => return Err(LcaError::UnknownUnit(other.to_string())),
    };
    Ok((dims, 1.0))
}

/// A value with physical dimensions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quantity {
    value: f64,
    dims: Dimensions,
}

impl Quantity {
    pub const fn new(value: f64, dims: Dimensions) -> Self {
        Quantity { value, dims }
    }

    pub const fn zero(dims: Dimensions) -> Self {
        Quantity { value: 0.0, dims }
    }

    pub fn dimensionless(value: f64) -> Self {
        Quantity::new(value, DIMLESS)
    }

    /// Builds a quantity from an SI value and a database unit label.
    pub fn from_label(value: f64, label: &str) -> Result<Self> {
        let (dims, scale) = unit_label(label)?;
        Ok(Quantity::new(value * scale, dims))
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn dimensions(&self) -> Dimensions {
        self.dims
    }

    pub fn is_finite(&self) -> bool {
        self.value.is_finite()
    }

    pub fn check(&self, dims: Dimensions) -> Result<()> {
        if self.dims.matches(&dims) {
            Ok(())
        } else {
            Err(LcaError::DimensionMismatch {
                left: self.dims.to_string(),
                right: dims.to_string(),
            })
        }
    }

    pub fn try_add(&self, other: &Quantity) -> Result<Quantity> {
        other.check(self.dims)?;
        Ok(Quantity::new(self.value + other.value, self.dims))
    }

    pub fn try_sub(&self, other: &Quantity) -> Result<Quantity> {
        other.check(self.dims)?;
        Ok(Quantity::new(self.value - other.value, self.dims))
    }

    pub fn add_assign_checked(&mut self, other: &Quantity) -> Result<()> {
        *self = self.try_add(other)?;
        Ok(())
    }

    pub fn sub_assign_checked(&mut self, other: &Quantity) -> Result<()> {
        *self = self.try_sub(other)?;
        Ok(())
    }

    pub fn negate(&mut self) {
        self.value = -self.value;
    }

    pub fn scaled(self, factor: f64) -> Quantity {
        Quantity::new(self.value * factor, self.dims)
    }

    fn expect_same(&self, other: &Quantity, op: &str) {
        assert!(
            self.dims.matches(&other.dims),
            "cannot {op} quantities with dimensions [{}] and [{}]",
            self.dims,
            other.dims
        );
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.dims.is_dimensionless() {
            write!(f, "{}", self.value)
        } else {
            write!(f, "{} {}", self.value, self.dims)
        }
    }
}

impl Add for Quantity {
    type Output = Quantity;

    fn add(self, rhs: Quantity) -> Quantity {
        self.expect_same(&rhs, "add");
        Quantity::new(self.value + rhs.value, self.dims)
    }
}

impl Sub for Quantity {
    type Output = Quantity;

    fn sub(self, rhs: Quantity) -> Quantity {
        self.expect_same(&rhs, "subtract");
        Quantity::new(self.value - rhs.value, self.dims)
    }
}

impl AddAssign for Quantity {
    fn add_assign(&mut self, rhs: Quantity) {
        *self = *self + rhs;
    }
}

impl SubAssign for Quantity {
    fn sub_assign(&mut self, rhs: Quantity) {
        *self = *self - rhs;
    }
}

impl Mul for Quantity {
    type Output = Quantity;

    fn mul(self, rhs: Quantity) -> Quantity {
        Quantity::new(self.value * rhs.value, self.dims.combine(rhs.dims, 1))
    }
}

impl Div for Quantity {
    type Output = Quantity;

    fn div(self, rhs: Quantity) -> Quantity {
        Quantity::new(self.value / rhs.value, self.dims.combine(rhs.dims, -1))
    }
}

impl Mul<f64> for Quantity {
    type Output = Quantity;

    fn mul(self, rhs: f64) -> Quantity {
        self.scaled(rhs)
    }
}

impl Neg for Quantity {
    type Output = Quantity;

    fn neg(self) -> Quantity {
        Quantity::new(-self.value, self.dims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_multiplication_combines_dimensions() {
        let hv = Quantity::new(2.0, J_PER_KG);
        let mass = Quantity::new(3.0, KILOGRAM);
        let energy = hv * mass;
        assert_eq!(energy.dimensions(), JOULE);
        assert_eq!(energy.value(), 6.0);

        let back = energy / hv;
        assert_eq!(back.dimensions(), KILOGRAM);
    }

    #[test]
    fn test_transport_intensity_dimensions() {
        // hv_vol / fuel economy / payload
        let ei = Quantity::new(1.0, J_PER_M3) / Quantity::new(4e-4, M_PER_M3)
            / Quantity::new(1000.0, KILOGRAM);
        assert_eq!(ei.dimensions(), J_PER_M_KG);
    }

    #[test]
    fn test_mismatched_addition_is_an_error() {
        let a = Quantity::new(1.0, KILOGRAM);
        let b = Quantity::new(1.0, JOULE);
        assert!(matches!(
            a.try_add(&b),
            Err(LcaError::DimensionMismatch { .. })
        ));
        assert_eq!(a.try_add(&a).unwrap().value(), 2.0);
    }

    #[test]
    #[should_panic(expected = "cannot add")]
    fn test_mismatched_operator_panics() {
        let _ = Quantity::new(1.0, KILOGRAM) + Quantity::new(1.0, METER);
    }

    #[test]
    fn test_labels() {
        assert_eq!(Dimensions::from_label("kg/m^3").unwrap(), KG_PER_M3);
        assert_eq!(Dimensions::from_label("%").unwrap(), DIMLESS);
        assert_eq!(Quantity::from_label(5.0, "ppm").unwrap().value(), 5.0e-6);
        assert!(matches!(
            Dimensions::from_label("furlongs"),
            Err(LcaError::UnknownUnit(_))
        ));
    }

    #[test]
    fn test_display() {
        assert_eq!(JOULE.to_string(), "kg m^2 s^-2");
        assert_eq!(DIMLESS.to_string(), "1");
        assert_eq!(Quantity::new(1.5, KILOGRAM).to_string(), "1.5 kg");
        assert_eq!(Quantity::dimensionless(0.5).to_string(), "0.5");
    }
}
