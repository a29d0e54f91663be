pub mod config;
pub mod database;
pub mod errors;
pub mod models;
pub mod services;
pub mod telemetry;
pub mod utils;

pub use errors::{AppError, Result};
