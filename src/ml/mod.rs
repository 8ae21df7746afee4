pub mod cache;
pub mod engine;
pub mod models;
pub mod optimizer;
pub mod predictor;
pub mod scaler;
pub mod store;
pub mod trainer;
pub mod window;

pub use cache::ModelCache;
pub use engine::{Forecast, ForecastEngine};
pub use models::LstmNetwork;
pub use scaler::MinMaxScaler;
pub use store::{ModelArtifact, ModelStore};
pub use trainer::{Trainer, TrainingReport};
