//! Larder Rate Limiting
//!
//! Per-client request admission, either with in-process token buckets or with
//! fixed one-second windows counted in the shared key/value store.

pub mod error;
pub mod limiter;

pub use error::LimiterError;
pub use limiter::{LimiterOptions, RateLimiter, Strategy, spawn_reaper_task};
