//! Credential store — user lookup, password validation, registration.
//!
//! The store is an external collaborator from the gateway's point of view;
//! the trait is the contract and [`MemoryCredentialStore`] is the in-process
//! implementation backing it. Passwords are stored only as argon2id PHC
//! strings, never in clear.

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use async_trait::async_trait;
use dashmap::DashMap;
use tracing::debug;

use crate::token::Role;

/// A stored user
#[derive(Debug, Clone)]
pub struct UserRecord {
    /// Unique username
    pub username: String,
    /// Argon2id PHC hash of the password
    pub password_hash: String,
    /// Role assigned at registration
    pub role: Role,
}

/// Credential store failures
#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    /// A user with this username already exists
    #[error("Username already taken: {0}")]
    UsernameTaken(String),

    /// Password could not be hashed
    #[error("Password hashing failed: {0}")]
    Hashing(String),
}

/// User lookup, credential validation, and registration.
///
/// `validate_credentials` answers only yes/no: whether the failure was an
/// unknown username or a wrong password is not observable through this
/// interface.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Look up a user by username
    async fn find_by_username(&self, username: &str) -> Option<UserRecord>;

    /// Check a clear-text password against the stored hash
    async fn validate_credentials(&self, username: &str, password: &str) -> bool;

    /// Create a new user, hashing the password.
    ///
    /// # Errors
    ///
    /// `UsernameTaken` if the username exists. Uniqueness is enforced by the
    /// storage layer itself, not by a separate existence check, so two
    /// concurrent registrations of the same name cannot both succeed.
    async fn create(
        &self,
        username: &str,
        password: &str,
        role: Role,
    ) -> Result<UserRecord, CredentialError>;
}

/// In-memory credential store keyed by username
#[derive(Default)]
pub struct MemoryCredentialStore {
    users: DashMap<String, UserRecord>,
}

impl MemoryCredentialStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn hash_password(password: &str) -> Result<String, CredentialError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| CredentialError::Hashing(e.to_string()))
}

fn verify_password(password: &str, hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn find_by_username(&self, username: &str) -> Option<UserRecord> {
        self.users.get(username).map(|u| u.value().clone())
    }

    async fn validate_credentials(&self, username: &str, password: &str) -> bool {
        match self.users.get(username) {
            Some(user) => verify_password(password, &user.password_hash),
            None => false,
        }
    }

    async fn create(
        &self,
        username: &str,
        password: &str,
        role: Role,
    ) -> Result<UserRecord, CredentialError> {
        let password_hash = hash_password(password)?;
        let record = UserRecord {
            username: username.to_string(),
            password_hash,
            role,
        };

        // The entry API holds the shard lock across the vacancy check and the
        // insert, so uniqueness cannot race.
        match self.users.entry(username.to_string()) {
            dashmap::Entry::Occupied(_) => {
                Err(CredentialError::UsernameTaken(username.to_string()))
            }
            dashmap::Entry::Vacant(slot) => {
                slot.insert(record.clone());
                debug!(username = %username, role = ?role, "Registered user");
                Ok(record)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_then_validate() {
        let store = MemoryCredentialStore::new();
        store
            .create("alice", "s3cret", Role::Practitioner)
            .await
            .unwrap();

        assert!(store.validate_credentials("alice", "s3cret").await);
        assert!(!store.validate_credentials("alice", "wrong").await);
        assert!(!store.validate_credentials("nobody", "s3cret").await);
    }

    #[tokio::test]
    async fn password_is_stored_hashed() {
        let store = MemoryCredentialStore::new();
        let record = store
            .create("alice", "s3cret", Role::Organizer)
            .await
            .unwrap();

        assert!(record.password_hash.starts_with("$argon2"));
        assert!(!record.password_hash.contains("s3cret"));
    }

    #[tokio::test]
    async fn duplicate_username_is_a_typed_conflict() {
        let store = MemoryCredentialStore::new();
        store
            .create("alice", "first", Role::Organizer)
            .await
            .unwrap();

        let err = store
            .create("alice", "second", Role::Practitioner)
            .await
            .unwrap_err();
        assert!(matches!(err, CredentialError::UsernameTaken(_)));

        // The original credentials still win.
        assert!(store.validate_credentials("alice", "first").await);
    }

    #[tokio::test]
    async fn find_returns_role() {
        let store = MemoryCredentialStore::new();
        store
            .create("bob", "pw", Role::Practitioner)
            .await
            .unwrap();

        let user = store.find_by_username("bob").await.unwrap();
        assert_eq!(user.role, Role::Practitioner);
        assert!(store.find_by_username("missing").await.is_none());
    }
}
