//! Rate limiter error types

use larder_kv::KvError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LimiterError {
    #[error("Rate limit store error: {0}")]
    Store(#[from] KvError),
}
