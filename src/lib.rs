pub mod classifier;
pub mod config;
pub mod db;
pub mod error;
pub mod http_client;
pub mod identifier;
pub mod middleware;
pub mod models;
pub mod notifier;
pub mod proto;
pub mod services;
pub mod storage;

pub use config::Config;
pub use error::{AppError, AppResult};
