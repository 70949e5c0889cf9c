//! Password credential hashing
//!
//! Passwords are stored as Argon2id PHC strings with a random 16-byte salt.

use argon2::Argon2;
use argon2::password_hash::{self, PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use rand::RngCore;
use std::sync::LazyLock;

use crate::error::AuthError;

/// One-way hash of a user's password. Never holds the plaintext.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    hash: String,
}

/// Verified in place of a real hash when the account does not exist, so both
/// login failure paths do the same amount of work.
static DUMMY: LazyLock<Option<Credential>> =
    LazyLock::new(|| Credential::set("larder-timing-equalizer").ok());

impl Credential {
    /// Hash a plaintext password with a fresh salt
    pub fn set(plaintext: &str) -> Result<Self, AuthError> {
        let mut salt_bytes = [0u8; 16];
        rand::rng().fill_bytes(&mut salt_bytes);
        let salt = SaltString::encode_b64(&salt_bytes)
            .map_err(|e| AuthError::PasswordHash(e.to_string()))?;

        let hash = Argon2::default()
            .hash_password(plaintext.as_bytes(), &salt)
            .map_err(|e| AuthError::PasswordHash(e.to_string()))?
            .to_string();

        Ok(Self { hash })
    }

    /// Wrap a hash loaded from storage
    pub fn from_hash(hash: String) -> Self {
        Self { hash }
    }

    pub fn hash(&self) -> &str {
        &self.hash
    }

    pub fn into_hash(self) -> String {
        self.hash
    }

    /// Check a candidate password. A mismatch is `Ok(false)`; only a corrupt
    /// stored hash is an error.
    pub fn verify(&self, candidate: &str) -> Result<bool, AuthError> {
        let parsed =
            PasswordHash::new(&self.hash).map_err(|e| AuthError::PasswordHash(e.to_string()))?;

        match Argon2::default().verify_password(candidate.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(password_hash::Error::Password) => Ok(false),
            Err(e) => Err(AuthError::PasswordHash(e.to_string())),
        }
    }

    /// Burn one verification against a throwaway hash; always `false`
    pub fn verify_dummy(candidate: &str) -> bool {
        if let Some(dummy) = DUMMY.as_ref() {
            let _ = dummy.verify(candidate);
        }
        false
    }
}
