use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tokio::fs;
use tracing::{debug, info};

use super::models::LstmNetwork;
use super::scaler::MinMaxScaler;
use crate::error::{ForecastError, Result};

pub const ARTIFACT_VERSION: u32 = 1;

/// Everything needed to reproduce a forecast for one symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub version: u32,
    pub symbol: String,
    pub trained_at: DateTime<Utc>,
    pub scaler: MinMaxScaler,
    pub final_loss: Option<f64>,
    pub network: LstmNetwork,
}

impl ModelArtifact {
    pub fn new(symbol: impl Into<String>, network: LstmNetwork, scaler: MinMaxScaler) -> Self {
        Self {
            version: ARTIFACT_VERSION,
            symbol: symbol.into(),
            trained_at: Utc::now(),
            scaler,
            final_loss: None,
            network,
        }
    }

    pub fn with_loss(mut self, loss: f64) -> Self {
        self.final_loss = Some(loss);
        self
    }

    fn check(&self) -> Result<()> {
        if self.version != ARTIFACT_VERSION {
            return Err(ForecastError::Model(format!(
                "unsupported artifact version {} (expected {})",
                self.version, ARTIFACT_VERSION
            )));
        }
        self.network.check_shapes()
    }
}

/// File identity used to notice that a model was retrained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStamp {
    pub modified: SystemTime,
    pub len: u64,
}

/// Model files on disk, one JSON document per symbol.
#[derive(Debug, Clone)]
pub struct ModelStore {
    dir: PathBuf,
}

impl ModelStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, symbol: &str) -> PathBuf {
        self.dir.join(format!("{}.json", symbol))
    }

    /// Writes to a temporary file first so readers never observe a partial
    /// model.
    pub async fn save(&self, artifact: &ModelArtifact) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir).await?;

        let path = self.path_for(&artifact.symbol);
        let tmp = self.dir.join(format!(".{}.json.tmp", artifact.symbol));
        let bytes = serde_json::to_vec(artifact)?;

        fs::write(&tmp, &bytes).await?;
        fs::rename(&tmp, &path).await?;

        info!(
            "Saved model for {} to {} ({} bytes)",
            artifact.symbol,
            path.display(),
            bytes.len()
        );
        Ok(path)
    }

    pub async fn load(&self, symbol: &str) -> Result<ModelArtifact> {
        let path = self.path_for(symbol);
        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(ForecastError::ModelNotFound {
                    symbol: symbol.to_string(),
                })
            }
            Err(e) => return Err(e.into()),
        };

        let artifact: ModelArtifact = serde_json::from_slice(&bytes)?;
        if artifact.symbol != symbol {
            return Err(ForecastError::Model(format!(
                "{} holds a model for {}",
                path.display(),
                artifact.symbol
            )));
        }
        artifact.check()?;

        debug!("Loaded model for {} trained at {}", symbol, artifact.trained_at);
        Ok(artifact)
    }

    /// `None` when no model file exists for `symbol`.
    pub async fn stamp(&self, symbol: &str) -> Result<Option<FileStamp>> {
        match fs::metadata(self.path_for(symbol)).await {
            Ok(meta) => Ok(Some(FileStamp {
                modified: meta.modified()?,
                len: meta.len(),
            })),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
