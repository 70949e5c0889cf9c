//! Larder Key/Value Cache Layer
//!
//! This crate provides the key/value collaborator used for session caching and
//! fixed-window rate limiting, with an in-process TTL implementation.

pub mod backend;
pub mod error;
pub mod memory;

pub use backend::{KvStore, with_timeout};
pub use error::KvError;
pub use memory::{MemoryStore, spawn_purge_task};
