use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub market: MarketConfig,
    pub model: ModelConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MarketConfig {
    pub base_url: String,
    pub timeout_seconds: u64,
    pub user_agent: String,
    pub train_days: u32,
    pub predict_days: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ModelConfig {
    pub dir: PathBuf,
    pub lookback: usize,
    pub horizon: usize,
    pub hidden_size: usize,
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    pub seed: u64,
    pub scaling: ScalingMode,
    pub cache: bool,
}

/// Which scaler maps prices into the network's input range at prediction time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScalingMode {
    /// Fit a fresh scaler on the prediction window.
    #[default]
    Refit,
    /// Reuse the scaler persisted with the model.
    Training,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            cors_origins: vec!["http://localhost:5173".to_string()],
        }
    }
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            base_url: "https://query1.finance.yahoo.com/v8/finance/chart".to_string(),
            timeout_seconds: 30,
            user_agent: "Mozilla/5.0".to_string(),
            train_days: 180,
            predict_days: 90,
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("models"),
            lookback: 60,
            horizon: 5,
            hidden_size: 50,
            epochs: 10,
            batch_size: 32,
            learning_rate: 0.001,
            seed: 42,
            scaling: ScalingMode::Refit,
            cache: true,
        }
    }
}

impl Config {
    /// Layers defaults, an optional TOML file and `FORECAST_*` environment
    /// variables, in that order of precedence.
    pub fn load(path: &str) -> Result<Self> {
        Self::load_with(path, Self::environment())
    }

    /// `FORECAST_SERVER__PORT=8080` sets `server.port`.
    fn environment() -> config::Environment {
        config::Environment::with_prefix("FORECAST")
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true)
    }

    fn load_with(path: &str, environment: config::Environment) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from(Path::new(path)).required(false))
            .add_source(environment)
            .build()?;

        let config: Config = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        let model = &self.model;
        if model.lookback == 0 || model.horizon == 0 || model.hidden_size == 0 {
            anyhow::bail!("model.lookback, model.horizon and model.hidden_size must be positive");
        }
        if model.batch_size == 0 {
            anyhow::bail!("model.batch_size must be positive");
        }
        if model.epochs == 0 {
            anyhow::bail!("model.epochs must be positive");
        }
        if !(model.learning_rate.is_finite() && model.learning_rate > 0.0) {
            anyhow::bail!("model.learning_rate must be a positive number");
        }
        if (self.market.predict_days as usize) < model.lookback {
            tracing::warn!(
                "market.predict_days ({}) is shorter than model.lookback ({}); predictions will fail",
                self.market.predict_days,
                model.lookback
            );
        }
        Ok(())
    }
}
