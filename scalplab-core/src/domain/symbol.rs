//! Per-instrument constants supplied by the gateway.

use serde::Serialize;

use crate::error::ConfigError;

/// Static trading constraints for one instrument.
///
/// Immutable for the duration of a run. Built through [`SymbolSpec::new`],
/// which rejects specs the risk validator could not work with.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SymbolSpec {
    symbol: String,
    price_increment: f64,
    min_stop_distance: u32,
    volume_step: f64,
    volume_min: f64,
    volume_max: f64,
    tick_value: f64,
    price_decimals: u32,
}

impl SymbolSpec {
    /// `min_stop_distance` is expressed in price increments.
    pub fn new(
        symbol: impl Into<String>,
        price_increment: f64,
        min_stop_distance: u32,
        volume_step: f64,
        volume_min: f64,
        volume_max: f64,
        tick_value: f64,
    ) -> Result<Self, ConfigError> {
        if !price_increment.is_finite() || price_increment <= 0.0 {
            return Err(ConfigError::NonPositiveIncrement(price_increment));
        }
        if !volume_step.is_finite() || volume_step <= 0.0 {
            return Err(ConfigError::NonPositiveVolumeStep(volume_step));
        }
        if volume_min > volume_max {
            return Err(ConfigError::InvertedVolumeBounds {
                min: volume_min,
                max: volume_max,
            });
        }
        if volume_min < 0.0 {
            return Err(ConfigError::Negative {
                name: "volume_min",
                value: volume_min,
            });
        }

        Ok(Self {
            symbol: symbol.into(),
            price_increment,
            min_stop_distance,
            volume_step,
            volume_min,
            volume_max,
            tick_value,
            price_decimals: decimals_of(price_increment),
        })
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn price_increment(&self) -> f64 {
        self.price_increment
    }

    /// Minimum stop distance in increments.
    pub fn min_stop_distance(&self) -> u32 {
        self.min_stop_distance
    }

    /// Minimum stop distance in price units.
    pub fn min_stop_price_distance(&self) -> f64 {
        self.min_stop_distance as f64 * self.price_increment
    }

    pub fn volume_step(&self) -> f64 {
        self.volume_step
    }

    pub fn volume_min(&self) -> f64 {
        self.volume_min
    }

    pub fn volume_max(&self) -> f64 {
        self.volume_max
    }

    /// Account-currency value of one increment move for one unit of volume.
    pub fn tick_value(&self) -> f64 {
        self.tick_value
    }

    /// Number of decimals implied by the price increment (0.00001 → 5).
    pub fn price_decimals(&self) -> u32 {
        self.price_decimals
    }

    /// Round a price to the instrument's displayed precision.
    pub fn round_price(&self, price: f64) -> f64 {
        round_to(price, self.price_decimals)
    }

    /// Convert a price distance to increments.
    pub fn to_increments(&self, distance: f64) -> f64 {
        distance / self.price_increment
    }
}

/// Smallest number of decimals that represents `step` exactly (up to 1e-9).
pub(crate) fn decimals_of(step: f64) -> u32 {
    for d in 0..=10u32 {
        let scaled = step * 10f64.powi(d as i32);
        if (scaled - scaled.round()).abs() < 1e-9 * scaled.abs().max(1.0) {
            return d;
        }
    }
    10
}

pub(crate) fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eurusd() -> SymbolSpec {
        SymbolSpec::new("EURUSD", 0.00001, 10, 0.01, 0.01, 100.0, 1.0).unwrap()
    }

    #[test]
    fn derives_price_decimals() {
        assert_eq!(eurusd().price_decimals(), 5);
        let jpy = SymbolSpec::new("USDJPY", 0.001, 10, 0.01, 0.01, 100.0, 0.9).unwrap();
        assert_eq!(jpy.price_decimals(), 3);
        let index = SymbolSpec::new("US500", 1.0, 0, 1.0, 1.0, 10.0, 1.0).unwrap();
        assert_eq!(index.price_decimals(), 0);
        let gold = SymbolSpec::new("XAUUSD", 0.25, 0, 1.0, 1.0, 10.0, 1.0).unwrap();
        assert_eq!(gold.price_decimals(), 2);
    }

    #[test]
    fn min_stop_in_price_units() {
        let spec = eurusd();
        assert!((spec.min_stop_price_distance() - 0.0001).abs() < 1e-12);
    }

    #[test]
    fn rounds_prices() {
        let spec = eurusd();
        assert_eq!(spec.round_price(1.123456789), 1.12346);
    }

    #[test]
    fn rejects_non_positive_increment() {
        let err = SymbolSpec::new("X", 0.0, 0, 0.01, 0.01, 1.0, 1.0).unwrap_err();
        assert_eq!(err, ConfigError::NonPositiveIncrement(0.0));
        assert!(SymbolSpec::new("X", -0.1, 0, 0.01, 0.01, 1.0, 1.0).is_err());
        assert!(SymbolSpec::new("X", f64::NAN, 0, 0.01, 0.01, 1.0, 1.0).is_err());
    }

    #[test]
    fn rejects_non_positive_volume_step() {
        let err = SymbolSpec::new("X", 0.01, 0, 0.0, 0.01, 1.0, 1.0).unwrap_err();
        assert_eq!(err, ConfigError::NonPositiveVolumeStep(0.0));
    }

    #[test]
    fn rejects_inverted_volume_bounds() {
        let err = SymbolSpec::new("X", 0.01, 0, 0.01, 5.0, 1.0, 1.0).unwrap_err();
        assert!(matches!(err, ConfigError::InvertedVolumeBounds { .. }));
    }
}
