//! Caller identity and its extractors

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use larder_db::User;
use std::convert::Infallible;

use crate::error::AuthError;

/// Who is making the request. Set once per request by the authenticate
/// middleware.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum CallerIdentity {
    #[default]
    Anonymous,
    User(User),
}

impl CallerIdentity {
    pub fn is_anonymous(&self) -> bool {
        matches!(self, CallerIdentity::Anonymous)
    }

    pub fn user(&self) -> Option<&User> {
        match self {
            CallerIdentity::User(user) => Some(user),
            CallerIdentity::Anonymous => None,
        }
    }

    /// Anonymous callers are never activated
    pub fn is_activated(&self) -> bool {
        self.user().is_some_and(|u| u.is_active)
    }
}

/// Extractor for the caller identity; a request that never passed through
/// authentication reads as anonymous
pub struct Caller(pub CallerIdentity);

impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let identity = parts
            .extensions
            .get::<CallerIdentity>()
            .cloned()
            .unwrap_or_default();
        Ok(Caller(identity))
    }
}

/// Extractor for an authenticated, activated user
pub struct ActiveUser(pub User);

impl<S> FromRequestParts<S> for ActiveUser
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Ok(Caller(identity)) = Caller::from_request_parts(parts, state).await;

        match identity {
            CallerIdentity::Anonymous => Err(AuthError::AuthenticationRequired),
            CallerIdentity::User(user) if !user.is_active => Err(AuthError::ActivationRequired),
            CallerIdentity::User(user) => Ok(ActiveUser(user)),
        }
    }
}
