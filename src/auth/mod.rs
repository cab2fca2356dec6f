//! Authentication: resolves a request's credentials to the owning principal.
//!
//! Credentials come from a TOML file loaded once at startup:
//!
//! ```toml
//! [[users]]
//! email = "user1@email.com"
//! password_hash = "$argon2id$v=19$..."
//!
//! [[tokens]]
//! email = "ci@email.com"
//! token_sha256 = "9f86d081884c7d65..."
//! ```

pub mod middleware;

use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::SaltString,
};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::{collections::HashMap, path::Path};
use thiserror::Error;
use uuid::Uuid;

pub use middleware::AuthLayer;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("reading credential file: {0}")]
    Io(#[from] std::io::Error),
    #[error("parsing credential file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid password hash for `{email}`: {reason}")]
    BadHash { email: String, reason: String },
    #[error("hashing password: {0}")]
    Hash(String),
}

/// The authenticated principal. Its id scopes every fragment operation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Owner(pub String);

impl Owner {
    /// Owner id for an email: lowercase hex SHA-256 of the address.
    pub fn from_email(email: &str) -> Self {
        Self(sha256_hex(email))
    }

    pub fn id(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct CredentialFile {
    #[serde(default)]
    pub users: Vec<UserCredential>,
    #[serde(default)]
    pub tokens: Vec<TokenCredential>,
}

#[derive(Debug, Deserialize)]
pub struct UserCredential {
    pub email: String,
    /// Argon2 PHC string.
    pub password_hash: String,
}

#[derive(Debug, Deserialize)]
pub struct TokenCredential {
    pub email: String,
    /// Hex SHA-256 of the bearer token.
    pub token_sha256: String,
}

/// Credential source built once at startup.
pub struct AuthProvider {
    /// Email to PHC password hash.
    users: HashMap<String, String>,
    /// SHA-256 hex of token to email.
    tokens: HashMap<String, String>,
}

impl AuthProvider {
    pub fn new(file: CredentialFile) -> Result<Self, AuthError> {
        let mut users = HashMap::new();
        for user in file.users {
            PasswordHash::new(&user.password_hash).map_err(|err| AuthError::BadHash {
                email: user.email.clone(),
                reason: err.to_string(),
            })?;
            users.insert(user.email, user.password_hash);
        }
        let tokens = file
            .tokens
            .into_iter()
            .map(|t| (t.token_sha256.to_ascii_lowercase(), t.email))
            .collect();
        Ok(Self { users, tokens })
    }

    pub fn from_toml(text: &str) -> Result<Self, AuthError> {
        Self::new(toml::from_str(text)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, AuthError> {
        Self::from_toml(&std::fs::read_to_string(path)?)
    }

    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    /// Check an email/password pair. CPU heavy; call off the async scheduler.
    pub fn verify_password(&self, email: &str, password: &str) -> Option<Owner> {
        let stored = self.users.get(email)?;
        let parsed = PasswordHash::new(stored).ok()?;
        Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .ok()
            .map(|_| Owner::from_email(email))
    }

    pub fn verify_token(&self, token: &str) -> Option<Owner> {
        self.tokens
            .get(&sha256_hex(token))
            .map(|email| Owner::from_email(email))
    }
}

/// Produce an argon2 PHC string for provisioning a credential file.
pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::encode_b64(Uuid::new_v4().as_bytes())
        .map_err(|err| AuthError::Hash(err.to_string()))?;
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|err| AuthError::Hash(err.to_string()))
}

pub fn sha256_hex(value: &str) -> String {
    hex::encode(Sha256::digest(value.as_bytes()))
}
