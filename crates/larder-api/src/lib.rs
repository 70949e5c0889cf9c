//! Larder REST API
//!
//! This crate provides the Axum-based HTTP API for Larder: account
//! registration and login, restaurant/category/menu management, and the
//! request pipeline (panic isolation, rate limiting, authentication) in front
//! of it.

pub mod error;
pub mod extract;
pub mod mailer;
pub mod middleware;
pub mod routes;
pub mod state;

pub use error::ApiError;
pub use mailer::{LogMailer, MailError, Mailer, MemoryMailer, SentMail};
pub use routes::create_router;
pub use state::{AppState, AuthSettings, MetricsHandle};
