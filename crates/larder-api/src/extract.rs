//! Request extractors
//!
//! Each handler decodes into its own input struct; nothing is shared between
//! requests.

use axum::body::Bytes;
use axum::extract::{FromRequest, FromRequestParts, Path, Request};
use axum::http::request::Parts;
use larder_auth::Validator;
use larder_auth::validation::permitted_value;
use larder_db::Filters;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::error::Category;

use crate::error::ApiError;

/// Largest accepted request body
pub const MAX_BODY_BYTES: usize = 1_048_576;

const MAX_PAGE: i64 = 10_000_000;
const MAX_PAGE_SIZE: i64 = 100;
const DEFAULT_PAGE_SIZE: i64 = 20;

/// JSON body extractor with client-facing error messages.
///
/// Input types are expected to carry `#[serde(deny_unknown_fields)]`.
pub struct JsonBody<T>(pub T);

impl<S, T> FromRequest<S> for JsonBody<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let bytes = Bytes::from_request(req, state).await.map_err(|_| {
            ApiError::BadRequest(format!(
                "body must not be larger than {} bytes",
                MAX_BODY_BYTES
            ))
        })?;

        decode(&bytes).map(JsonBody)
    }
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, ApiError> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Err(ApiError::BadRequest("body must not be empty".to_string()));
    }

    serde_json::from_slice(bytes).map_err(|e| {
        let message = match e.classify() {
            Category::Data => match unknown_field(&e.to_string()) {
                Some(field) => format!("body contains unknown key \"{}\"", field),
                None => format!(
                    "body contains incorrect JSON (at line {} column {})",
                    e.line(),
                    e.column()
                ),
            },
            Category::Syntax | Category::Eof => "body contains badly-formed JSON".to_string(),
            Category::Io => "body could not be read".to_string(),
        };
        ApiError::BadRequest(message)
    })
}

/// Pull the key name out of serde's "unknown field `x`, expected ..." message
fn unknown_field(message: &str) -> Option<&str> {
    message
        .strip_prefix("unknown field `")
        .and_then(|rest| rest.split('`').next())
}

/// Positive numeric `{id}` path segment. Anything else reads as a missing
/// resource.
pub struct Id(pub i64);

impl<S> FromRequestParts<S> for Id
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(id) = Path::<i64>::from_request_parts(parts, state)
            .await
            .map_err(|_| ApiError::NotFound)?;

        if id < 1 {
            return Err(ApiError::NotFound);
        }
        Ok(Id(id))
    }
}

/// Query string accepted by list endpoints
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub name: Option<String>,
    pub page: Option<String>,
    pub page_size: Option<String>,
    pub sort: Option<String>,
}

fn read_int(v: &mut Validator, key: &str, value: Option<&str>, default: i64) -> i64 {
    match value {
        None | Some("") => default,
        Some(raw) => match raw.parse() {
            Ok(n) => n,
            Err(_) => {
                v.add_error(key, "must be an integer value");
                default
            }
        },
    }
}

impl ListQuery {
    /// Name fragment to filter on, ignoring blanks
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref().map(str::trim).filter(|n| !n.is_empty())
    }

    /// Validate paging and sorting against `safe_list`
    pub fn filters(&self, safe_list: &'static [&'static str]) -> Result<Filters, ApiError> {
        let mut v = Validator::new();

        let filters = Filters {
            page: read_int(&mut v, "page", self.page.as_deref(), 1),
            page_size: read_int(
                &mut v,
                "page_size",
                self.page_size.as_deref(),
                DEFAULT_PAGE_SIZE,
            ),
            sort: self.sort.clone().unwrap_or_else(|| "id".to_string()),
            sort_safe_list: safe_list,
        };

        v.check(filters.page > 0, "page", "must be greater than zero");
        v.check(filters.page <= MAX_PAGE, "page", "must be a maximum of 10 million");
        v.check(filters.page_size > 0, "page_size", "must be greater than zero");
        v.check(
            filters.page_size <= MAX_PAGE_SIZE,
            "page_size",
            "must be a maximum of 100",
        );
        v.check(
            permitted_value(&filters.sort.as_str(), safe_list),
            "sort",
            "invalid sort value",
        );

        if !v.is_valid() {
            return Err(ApiError::Validation(v.into_errors()));
        }
        Ok(filters)
    }
}
