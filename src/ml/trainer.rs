use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use statrs::statistics::Statistics;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

use super::cache::ModelCache;
use super::models::LstmNetwork;
use super::optimizer::Adam;
use super::scaler::MinMaxScaler;
use super::store::{ModelArtifact, ModelStore};
use super::window::{build_windows, min_points, Window};
use crate::config::{Config, ModelConfig};
use crate::error::{ForecastError, Result};
use crate::market::{validate_symbol, PriceSource, SeriesSummary};

#[derive(Debug, Clone)]
pub struct TrainingReport {
    pub symbol: String,
    pub points: usize,
    pub windows: usize,
    pub history: SeriesSummary,
    pub epoch_losses: Vec<f64>,
    pub path: PathBuf,
}

impl TrainingReport {
    pub fn final_loss(&self) -> Option<f64> {
        self.epoch_losses.last().copied()
    }
}

/// Fits `network` on `windows` with shuffled mini-batches and Adam. Returns
/// the mean batch loss of every epoch.
pub fn fit(
    network: &mut LstmNetwork,
    windows: &[Window],
    config: &ModelConfig,
    rng: &mut StdRng,
) -> Vec<f64> {
    let mut optimizer = Adam::new(config.learning_rate);
    let mut order: Vec<usize> = (0..windows.len()).collect();
    let mut epoch_losses = Vec::with_capacity(config.epochs);

    for epoch in 1..=config.epochs {
        order.shuffle(rng);
        let mut batch_losses = Vec::new();

        for chunk in order.chunks(config.batch_size.max(1)) {
            let batch: Vec<&Window> = chunk.iter().map(|&i| &windows[i]).collect();
            let (loss, grads) = network.loss_and_grads(&batch);
            optimizer.step(network.params_mut(), grads.slices());
            batch_losses.push(loss);
        }

        let epoch_loss = batch_losses.iter().mean();
        debug!("Epoch {}/{} loss {:.6}", epoch, config.epochs, epoch_loss);
        epoch_losses.push(epoch_loss);
    }

    debug!("Finished fitting after {} optimizer steps", optimizer.steps());
    epoch_losses
}

/// Downloads history, fits a network and persists it for one symbol at a time.
pub struct Trainer {
    source: Arc<dyn PriceSource>,
    store: ModelStore,
    model: ModelConfig,
    train_days: u32,
    cache: Option<Arc<ModelCache>>,
}

impl Trainer {
    pub fn new(config: &Config, source: Arc<dyn PriceSource>) -> Self {
        Self {
            source,
            store: ModelStore::new(config.model.dir.clone()),
            model: config.model.clone(),
            train_days: config.market.train_days,
            cache: None,
        }
    }

    /// Drops the cached copy of a symbol's model whenever it is retrained.
    pub fn with_cache(mut self, cache: Arc<ModelCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub async fn train(&self, symbol: &str) -> Result<TrainingReport> {
        let symbol = validate_symbol(symbol)?.to_string();
        info!("Training model for {} on {} days of history", symbol, self.train_days);

        let series = self.source.daily_closes(&symbol, self.train_days).await?;
        if series.is_empty() {
            return Err(ForecastError::NoData { symbol });
        }

        let history = series.summary();
        info!(
            "{}: {} closes up to {}, mean {:.2}, std dev {:.2}, range {:.2}..{:.2}",
            symbol,
            history.count,
            series.last_date().map(|d| d.to_string()).unwrap_or_default(),
            history.mean,
            history.std_dev,
            history.min,
            history.max
        );

        let closes = series.closes();
        let scaler = MinMaxScaler::fit(&closes)?;
        let windows = build_windows(
            &scaler.transform(&closes),
            self.model.lookback,
            self.model.horizon,
        );
        if windows.is_empty() {
            return Err(ForecastError::InsufficientData {
                symbol,
                required: min_points(self.model.lookback, self.model.horizon),
                actual: closes.len(),
            });
        }

        let window_count = windows.len();
        let config = self.model.clone();
        let started = Instant::now();
        let (network, epoch_losses) = tokio::task::spawn_blocking(move || {
            let mut rng = StdRng::seed_from_u64(config.seed);
            let mut network =
                LstmNetwork::new(config.lookback, config.hidden_size, config.horizon, &mut rng);
            debug!(
                "Fitting {} parameters on {} windows",
                network.parameter_count(),
                windows.len()
            );
            let losses = fit(&mut network, &windows, &config, &mut rng);
            (network, losses)
        })
        .await
        .map_err(|e| ForecastError::Model(format!("training task failed: {}", e)))?;

        let elapsed = started.elapsed();
        let final_loss = epoch_losses.last().copied().unwrap_or(f64::NAN);
        if !final_loss.is_finite() {
            return Err(ForecastError::Model(format!("training diverged for {}", symbol)));
        }
        info!(
            "Trained {} on {} windows in {:.1}s, final loss {:.6}",
            symbol,
            window_count,
            elapsed.as_secs_f64(),
            final_loss
        );
        metrics::counter!("forecast_training_runs_total").increment(1);
        metrics::histogram!("forecast_training_seconds").record(elapsed.as_secs_f64());

        let artifact = ModelArtifact::new(symbol.clone(), network, scaler).with_loss(final_loss);
        let path = self.store.save(&artifact).await?;
        if let Some(cache) = &self.cache {
            cache.invalidate(&symbol);
        }

        Ok(TrainingReport {
            symbol,
            points: closes.len(),
            windows: window_count,
            history,
            epoch_losses,
            path,
        })
    }
}
