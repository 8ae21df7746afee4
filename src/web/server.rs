use anyhow::Result;
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{header, HeaderValue, Method, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio::signal;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::ServerConfig;
use crate::error::ForecastError;
use crate::ml::{Forecast, ForecastEngine};

#[derive(Clone)]
pub struct AppState {
    engine: Arc<ForecastEngine>,
    metrics: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(engine: Arc<ForecastEngine>) -> Self {
        Self {
            engine,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }
}

#[derive(Debug, Deserialize)]
pub struct PredictRequest {
    pub symbol: Option<Value>,
}

impl PredictRequest {
    /// Numbers and booleans count as a symbol in their textual form; null,
    /// arrays and objects count as missing.
    pub fn symbol(&self) -> Option<String> {
        match self.symbol.as_ref()? {
            Value::String(symbol) => Some(symbol.clone()),
            Value::Number(number) => Some(number.to_string()),
            Value::Bool(flag) => Some(flag.to_string()),
            _ => None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub message: String,
}

pub struct ApiServer {
    config: ServerConfig,
    state: AppState,
}

impl ApiServer {
    pub fn new(config: ServerConfig, state: AppState) -> Self {
        Self { config, state }
    }

    pub async fn start(self) -> Result<()> {
        let app = router_with_cors(self.state, &self.config.cors_origins);

        let listener =
            tokio::net::TcpListener::bind((self.config.host.as_str(), self.config.port)).await?;
        info!("Prediction server listening on http://{}", listener.local_addr()?);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        info!("Prediction server stopped");
        Ok(())
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/predict", post(predict))
        .route("/health", get(health))
        .route("/api/stocks/:symbol/predict", get(stock_predictions))
        .route("/metrics", get(render_metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// `router` behind a CORS layer that admits only the listed origins.
pub fn router_with_cors(state: AppState, origins: &[String]) -> Router {
    router(state).layer(cors_layer(origins))
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin {:?}", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE])
}

async fn shutdown_signal() {
    if let Err(e) = signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

// API Handlers
async fn predict(
    State(state): State<AppState>,
    payload: Result<Json<PredictRequest>, JsonRejection>,
) -> Result<Json<Forecast>, ForecastError> {
    let symbol = payload
        .ok()
        .and_then(|Json(request)| request.symbol())
        .filter(|symbol| !symbol.trim().is_empty())
        .ok_or_else(ForecastError::missing_symbol)?;

    let forecast = state.engine.predict(&symbol).await?;
    Ok(Json(forecast))
}

async fn stock_predictions(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
) -> Result<Json<Vec<f64>>, ForecastError> {
    let forecast = state.engine.predict(&symbol).await?;
    Ok(Json(forecast.predictions))
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        message: "Server is running".to_string(),
    })
}

async fn render_metrics(State(state): State<AppState>) -> impl IntoResponse {
    match &state.metrics {
        Some(handle) => (StatusCode::OK, handle.render()).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}
