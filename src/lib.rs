pub mod cache;
pub mod config;
pub mod domain;
pub mod error;
pub mod handlers;
pub mod period;
pub mod repository;
pub mod services;

pub use config::Config;
pub use error::{AppError, Result};
