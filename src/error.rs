use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ForecastError {
    #[error("{0}")]
    Validation(String),

    #[error("Model for {symbol} not found. Please train the model first.")]
    ModelNotFound { symbol: String },

    #[error("No data found for symbol {symbol}")]
    NoData { symbol: String },

    #[error("Not enough data for {symbol}: need at least {required} points, got {actual}")]
    InsufficientData {
        symbol: String,
        required: usize,
        actual: usize,
    },

    #[error("Market data request failed: {0}")]
    Upstream(String),

    #[error("Model failure: {0}")]
    Model(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ForecastError {
    pub fn missing_symbol() -> Self {
        Self::Validation("Symbol is required".to_string())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::ModelNotFound { .. } | Self::NoData { .. } => StatusCode::NOT_FOUND,
            Self::InsufficientData { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
            Self::Model(_) | Self::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short label used for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::ModelNotFound { .. } => "model_not_found",
            Self::NoData { .. } => "no_data",
            Self::InsufficientData { .. } => "insufficient_data",
            Self::Upstream(_) => "upstream",
            Self::Model(_) => "model",
            Self::Io(_) => "io",
        }
    }
}

impl From<reqwest::Error> for ForecastError {
    fn from(err: reqwest::Error) -> Self {
        Self::Upstream(err.to_string())
    }
}

impl From<serde_json::Error> for ForecastError {
    fn from(err: serde_json::Error) -> Self {
        Self::Model(format!("artifact encoding: {}", err))
    }
}

impl IntoResponse for ForecastError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

pub type Result<T> = std::result::Result<T, ForecastError>;
