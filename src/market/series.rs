use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

use crate::error::{ForecastError, Result};

const MAX_SYMBOL_LEN: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub date: NaiveDate,
    pub close: f64,
}

/// Daily closes for one symbol, oldest first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceSeries {
    pub symbol: String,
    pub points: Vec<PricePoint>,
}

impl PriceSeries {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            points: Vec::new(),
        }
    }

    pub fn from_closes(symbol: impl Into<String>, start: NaiveDate, closes: &[f64]) -> Self {
        let points = closes
            .iter()
            .zip(start.iter_days())
            .map(|(&close, date)| PricePoint { date, close })
            .collect();
        Self {
            symbol: symbol.into(),
            points,
        }
    }

    pub fn push(&mut self, date: NaiveDate, close: f64) {
        self.points.push(PricePoint { date, close });
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn closes(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.close).collect()
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.points.last().map(|p| p.date)
    }

    pub fn summary(&self) -> SeriesSummary {
        if self.points.is_empty() {
            return SeriesSummary::default();
        }

        let closes = self.closes();
        SeriesSummary {
            count: closes.len(),
            mean: closes.iter().mean(),
            std_dev: closes.iter().std_dev(),
            min: Statistics::min(closes.iter()),
            max: Statistics::max(closes.iter()),
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SeriesSummary {
    pub count: usize,
    pub mean: f64,
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
}

/// Accepts ticker-shaped strings only. Symbols double as file names, so
/// anything that could escape the model directory is refused.
pub fn validate_symbol(symbol: &str) -> Result<&str> {
    let symbol = symbol.trim();
    if symbol.is_empty() {
        return Err(ForecastError::missing_symbol());
    }

    let allowed = |c: char| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '^' | '=');
    if symbol.len() > MAX_SYMBOL_LEN || !symbol.chars().all(allowed) || symbol.starts_with('.') {
        return Err(ForecastError::Validation(format!(
            "Invalid symbol: {}",
            symbol
        )));
    }

    Ok(symbol)
}
