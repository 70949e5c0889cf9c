//! Field validation
//!
//! Collects per-field messages; the first message recorded for a field wins.

use regex::Regex;
use std::collections::BTreeMap;
use std::sync::LazyLock;

/// Field name to message
pub type FieldErrors = BTreeMap<String, String>;

static EMAIL_RX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)*$",
    )
    .expect("email pattern is a valid regex")
});

pub const MAX_NAME_LENGTH: usize = 50;
pub const MIN_PASSWORD_LENGTH: usize = 8;
pub const MAX_PASSWORD_LENGTH: usize = 256;

#[derive(Debug, Default)]
pub struct Validator {
    errors: FieldErrors,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, key: &str, message: &str) {
        self.errors
            .entry(key.to_string())
            .or_insert_with(|| message.to_string());
    }

    /// Record `message` for `key` unless `ok` holds
    pub fn check(&mut self, ok: bool, key: &str, message: &str) {
        if !ok {
            self.add_error(key, message);
        }
    }

    pub fn errors(&self) -> &FieldErrors {
        &self.errors
    }

    pub fn into_errors(self) -> FieldErrors {
        self.errors
    }
}

pub fn is_valid_email(email: &str) -> bool {
    EMAIL_RX.is_match(email)
}

pub fn permitted_value<T: PartialEq>(value: &T, permitted: &[T]) -> bool {
    permitted.contains(value)
}

pub fn validate_email(v: &mut Validator, email: &str) {
    v.check(!email.is_empty(), "email", "must be provided");
    v.check(is_valid_email(email), "email", "must be a valid email address");
}

pub fn validate_password_plaintext(v: &mut Validator, key: &str, password: &str) {
    v.check(!password.is_empty(), key, "must be provided");
    v.check(
        password.len() >= MIN_PASSWORD_LENGTH,
        key,
        "must be at least 8 bytes long",
    );
    v.check(
        password.len() <= MAX_PASSWORD_LENGTH,
        key,
        "must not be more than 256 bytes long",
    );
}

pub fn validate_name(v: &mut Validator, key: &str, name: &str) {
    v.check(!name.trim().is_empty(), key, "must be provided");
    v.check(
        name.chars().count() <= MAX_NAME_LENGTH,
        key,
        "must not be more than 50 characters long",
    );
}
