use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

use crate::error::{ForecastError, Result};

/// Min-max scaling onto [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MinMaxScaler {
    pub min: f64,
    pub max: f64,
}

impl MinMaxScaler {
    pub fn fit(values: &[f64]) -> Result<Self> {
        if values.is_empty() {
            return Err(ForecastError::Model("cannot fit scaler on an empty window".to_string()));
        }
        if values.iter().any(|v| !v.is_finite()) {
            return Err(ForecastError::Model("price window contains non-finite values".to_string()));
        }

        Ok(Self {
            min: Statistics::min(values.iter()),
            max: Statistics::max(values.iter()),
        })
    }

    /// A flat window has no range; treat it as 1 so constant prices map to 0.
    fn range(&self) -> f64 {
        let range = self.max - self.min;
        if range.abs() < f64::EPSILON {
            1.0
        } else {
            range
        }
    }

    pub fn transform_one(&self, value: f64) -> f64 {
        (value - self.min) / self.range()
    }

    pub fn inverse_one(&self, scaled: f64) -> f64 {
        scaled * self.range() + self.min
    }

    pub fn transform(&self, values: &[f64]) -> Vec<f64> {
        values.iter().map(|&v| self.transform_one(v)).collect()
    }

    pub fn inverse(&self, scaled: &[f64]) -> Vec<f64> {
        scaled.iter().map(|&v| self.inverse_one(v)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_extremes_to_unit_interval() {
        let scaler = MinMaxScaler::fit(&[10.0, 15.0, 20.0]).unwrap();
        assert_eq!(scaler.transform(&[10.0, 15.0, 20.0]), vec![0.0, 0.5, 1.0]);
        assert_eq!(scaler.inverse(&[0.0, 0.25, 1.0]), vec![10.0, 12.5, 20.0]);
    }

    #[test]
    fn values_outside_fit_window_extrapolate() {
        let scaler = MinMaxScaler::fit(&[0.0, 100.0]).unwrap();
        assert!((scaler.transform_one(150.0) - 1.5).abs() < 1e-12);
        assert!((scaler.inverse_one(-0.1) + 10.0).abs() < 1e-12);
    }

    #[test]
    fn flat_window_maps_to_zero() {
        let scaler = MinMaxScaler::fit(&[42.0; 5]).unwrap();
        assert_eq!(scaler.transform(&[42.0, 42.0]), vec![0.0, 0.0]);
        assert_eq!(scaler.inverse_one(0.0), 42.0);
    }

    #[test]
    fn empty_and_nan_windows_are_rejected() {
        assert!(MinMaxScaler::fit(&[]).is_err());
        assert!(MinMaxScaler::fit(&[1.0, f64::NAN]).is_err());
    }
}
