use tracing::debug;

use super::scaler::MinMaxScaler;
use super::store::ModelArtifact;
use crate::config::ScalingMode;
use crate::error::{ForecastError, Result};

/// Forecasts the next `horizon` closes from the most recent raw closes.
pub fn forecast(artifact: &ModelArtifact, closes: &[f64], mode: ScalingMode) -> Result<Vec<f64>> {
    let lookback = artifact.network.lookback;
    if closes.len() < lookback {
        return Err(ForecastError::InsufficientData {
            symbol: artifact.symbol.clone(),
            required: lookback,
            actual: closes.len(),
        });
    }

    let scaler = match mode {
        ScalingMode::Training => artifact.scaler,
        ScalingMode::Refit => MinMaxScaler::fit(closes)?,
    };
    debug!(
        "Scaling {} closes for {} with min {:.4} max {:.4}",
        closes.len(),
        artifact.symbol,
        scaler.min,
        scaler.max
    );

    let recent = &closes[closes.len() - lookback..];
    let scaled = scaler.transform(recent);
    let output = artifact.network.forward(&scaled)?;

    Ok(scaler.inverse(&output))
}
