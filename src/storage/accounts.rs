//! Account storage.
//!
//! Credentials are stored as Argon2 PHC strings and verified with the
//! `argon2` crate. The in-memory store is seeded from the `[[user]]` blocks
//! in the config file.

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordVerifier},
};
use async_trait::async_trait;
use dashmap::DashMap;
use thiserror::Error;

/// Provider key for the account store.
pub const ACCOUNT_STORE_KEY: &str = "account-store";

/// Account storage errors.
#[derive(Debug, Error)]
pub enum AccountError {
    #[error("stored credential for '{0}' is not a valid hash")]
    BadHash(String),
}

/// Credential verification for local accounts.
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Whether an account with this name exists.
    async fn exists(&self, username: &str) -> bool;

    /// Verify a password against the stored credential.
    async fn verify(&self, username: &str, password: &str) -> Result<bool, AccountError>;
}

/// In-memory account store: username to Argon2 PHC hash.
#[derive(Default)]
pub struct MemoryAccountStore {
    users: DashMap<String, String>,
}

impl MemoryAccountStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an account with a pre-hashed credential.
    pub fn add_user(&self, username: &str, password_hash: &str) {
        self.users
            .insert(username.to_string(), password_hash.to_string());
    }

    /// Number of accounts.
    pub fn len(&self) -> usize {
        self.users.len()
    }

    /// Whether the store holds no accounts.
    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

#[async_trait]
impl AccountStore for MemoryAccountStore {
    async fn exists(&self, username: &str) -> bool {
        self.users.contains_key(username)
    }

    async fn verify(&self, username: &str, password: &str) -> Result<bool, AccountError> {
        let Some(stored) = self.users.get(username) else {
            return Ok(false);
        };
        let parsed = PasswordHash::new(stored.value())
            .map_err(|_| AccountError::BadHash(username.to_string()))?;
        Ok(Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use argon2::password_hash::{PasswordHasher, SaltString, rand_core::OsRng};

    fn hash(password: &str) -> String {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .expect("hashing cannot fail for test input")
            .to_string()
    }

    #[tokio::test]
    async fn verifies_correct_password() {
        let store = MemoryAccountStore::new();
        store.add_user("alice", &hash("looking-glass"));

        assert!(store.exists("alice").await);
        assert!(store.verify("alice", "looking-glass").await.unwrap());
        assert!(!store.verify("alice", "jabberwock").await.unwrap());
    }

    #[tokio::test]
    async fn unknown_user_fails_closed() {
        let store = MemoryAccountStore::new();
        assert!(!store.exists("nobody").await);
        assert!(!store.verify("nobody", "anything").await.unwrap());
    }

    #[tokio::test]
    async fn corrupt_hash_is_reported() {
        let store = MemoryAccountStore::new();
        store.add_user("mangled", "not-a-phc-string");
        assert!(matches!(
            store.verify("mangled", "pw").await,
            Err(AccountError::BadHash(_))
        ));
    }
}
