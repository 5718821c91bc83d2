//! Image Resizer Service
//!
//! Fetches a remote image, resizes it to the requested dimensions and serves
//! the result, with a Redis TTL cache in front of the pipeline. Resizes run
//! inline (`/resize`) or through the Redis task queue (`/resize-async` plus
//! the `worker` run mode).

pub mod cache;
pub mod config;
pub mod error;
pub mod handlers;
pub mod models;
pub mod services;
pub mod telemetry;
pub mod worker;

// Public re-exports
pub use config::Config;
pub use error::{AppError, CacheError, ResizeError, Result};
pub use services::ResizerService;
pub use worker::ResizeTaskHandler;
