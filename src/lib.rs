pub mod config;
pub mod error;
pub mod market;
pub mod ml;
pub mod web;

pub use config::Config;
pub use error::{ForecastError, Result};
