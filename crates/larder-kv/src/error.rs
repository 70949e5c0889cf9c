//! Key/value error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum KvError {
    #[error("Cache operation timed out")]
    Timeout,

    #[error("Cache backend error: {0}")]
    Backend(String),

    #[error("Invalid cached value for key '{0}'")]
    InvalidValue(String),
}
