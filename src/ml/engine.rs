use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use super::cache::ModelCache;
use super::predictor::forecast;
use super::store::ModelStore;
use crate::config::{Config, ScalingMode};
use crate::error::{ForecastError, Result};
use crate::market::{validate_symbol, PriceSource};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Forecast {
    pub symbol: String,
    pub predictions: Vec<f64>,
}

/// Prediction flow shared by every route: resolve model, fetch recent
/// closes, scale, run the network, map back to prices.
pub struct ForecastEngine {
    source: Arc<dyn PriceSource>,
    models: Arc<ModelCache>,
    predict_days: u32,
    scaling: ScalingMode,
}

impl ForecastEngine {
    pub fn new(config: &Config, source: Arc<dyn PriceSource>) -> Self {
        let store = ModelStore::new(config.model.dir.clone());
        let models = Arc::new(ModelCache::new(store, config.model.cache));

        info!(
            "Forecast engine using models from {} (scaling: {:?}, cache: {})",
            models.store().dir().display(),
            config.model.scaling,
            config.model.cache
        );

        Self {
            source,
            models,
            predict_days: config.market.predict_days,
            scaling: config.model.scaling,
        }
    }

    pub fn models(&self) -> Arc<ModelCache> {
        self.models.clone()
    }

    pub async fn predict(&self, symbol: &str) -> Result<Forecast> {
        let result = self.run(symbol).await;
        let outcome = match &result {
            Ok(_) => "ok",
            Err(e) => e.kind(),
        };
        metrics::counter!("forecast_predictions_total", "outcome" => outcome).increment(1);

        if let Err(e) = &result {
            if e.status_code().is_server_error() {
                warn!("Prediction for {} failed: {}", symbol, e);
            } else {
                debug!("Prediction for {} rejected: {}", symbol, e);
            }
        }
        result
    }

    async fn run(&self, symbol: &str) -> Result<Forecast> {
        let symbol = validate_symbol(symbol)?;
        let artifact = self.models.get(symbol).await?;

        let series = self.source.daily_closes(symbol, self.predict_days).await?;
        if series.is_empty() {
            return Err(ForecastError::NoData {
                symbol: symbol.to_string(),
            });
        }

        let started = Instant::now();
        let predictions = forecast(&artifact, &series.closes(), self.scaling)?;
        metrics::histogram!("forecast_inference_seconds").record(started.elapsed().as_secs_f64());

        debug!("Forecast for {} from {} closes: {:?}", symbol, series.len(), predictions);
        Ok(Forecast {
            symbol: symbol.to_string(),
            predictions,
        })
    }
}
