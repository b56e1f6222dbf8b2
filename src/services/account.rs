//! Account service
//!
//! The login state machine: validate input, check credentials without
//! leaking whether the username exists, enforce suspension and subscription
//! expiry, and make sure the account carries a worker API key before a
//! session is issued.

use chrono::Utc;
use data_encoding::HEXLOWER;
use std::sync::Arc;

use crate::db::repositories::{RepoError, UserRepository};
use crate::models::User;
use crate::services::password::verify_password;

/// Attempts to persist a generated API key before giving up on
/// uniqueness-constraint collisions.
const API_KEY_ATTEMPTS: usize = 5;

/// Account service errors.
#[derive(Debug, thiserror::Error)]
pub enum AccountError {
    /// Missing or malformed request fields
    #[error("{0}")]
    InvalidInput(String),

    /// Unknown user, missing password hash or wrong password. One variant
    /// on purpose: callers must not be able to tell these apart.
    #[error("Invalid username or password")]
    InvalidCredentials,

    /// Account is suspended
    #[error("Account is suspended")]
    Suspended,

    /// Subscription has lapsed
    #[error("Subscription has expired")]
    SubscriptionExpired,

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

/// Service for account authentication.
pub struct AccountService {
    users: Arc<dyn UserRepository>,
}

impl AccountService {
    pub fn new(users: Arc<dyn UserRepository>) -> Self {
        Self { users }
    }

    /// Authenticate a login attempt.
    ///
    /// On success the returned user is guaranteed to carry an API key.
    ///
    /// # Errors
    ///
    /// - `InvalidInput` for empty username or password after trimming
    /// - `InvalidCredentials` for unknown user, absent hash or bad password
    /// - `Suspended` / `SubscriptionExpired` for accounts that exist and
    ///   matched the password but may not log in
    /// - `Internal` for persistence failures, including API-key retry
    ///   exhaustion
    pub async fn login(&self, username: &str, password: &str) -> Result<User, AccountError> {
        let username = username.trim();
        let password = password.trim();
        if username.is_empty() || password.is_empty() {
            return Err(AccountError::InvalidInput(
                "Username and password are required".to_string(),
            ));
        }

        let user = self
            .users
            .get_by_username(username)
            .await
            .map_err(|e| AccountError::Internal(e.into()))?
            .ok_or(AccountError::InvalidCredentials)?;

        let hash = user
            .password_hash
            .as_deref()
            .ok_or(AccountError::InvalidCredentials)?;

        if !verify_password(password, hash)? {
            return Err(AccountError::InvalidCredentials);
        }

        if user.is_suspended() {
            return Err(AccountError::Suspended);
        }
        if user.is_expired(Utc::now()) {
            return Err(AccountError::SubscriptionExpired);
        }

        self.ensure_api_key(user).await
    }

    /// Look up the account owning a worker API key.
    ///
    /// Suspended and expired accounts are rejected the same way an unknown
    /// key is, so a revoked account cannot probe which it was.
    pub async fn authenticate_api_key(&self, api_key: &str) -> Result<Option<User>, AccountError> {
        let user = self
            .users
            .get_by_api_key(api_key)
            .await
            .map_err(|e| AccountError::Internal(e.into()))?;

        Ok(user.filter(|u| !u.is_suspended() && !u.is_expired(Utc::now())))
    }

    /// Generate and persist an API key if the account has none.
    ///
    /// Retries on uniqueness collisions up to [`API_KEY_ATTEMPTS`] times;
    /// any other persistence error aborts immediately, and exhausting the
    /// retries fails the request rather than issuing a session without a
    /// key.
    async fn ensure_api_key(&self, mut user: User) -> Result<User, AccountError> {
        if user.api_key.is_some() {
            return Ok(user);
        }

        for _ in 0..API_KEY_ATTEMPTS {
            let key = generate_api_key()?;
            match self.users.set_api_key(user.id, &key).await {
                Ok(()) => {
                    user.api_key = Some(key);
                    return Ok(user);
                }
                Err(RepoError::UniqueViolation) => continue,
                Err(RepoError::Other(e)) => return Err(AccountError::Internal(e)),
            }
        }

        Err(AccountError::Internal(anyhow::anyhow!(
            "Exhausted {} attempts to generate a unique API key",
            API_KEY_ATTEMPTS
        )))
    }
}

/// Generate a fresh API key: `sk_` followed by 32 random bytes hex-encoded.
fn generate_api_key() -> anyhow::Result<String> {
    let mut bytes = [0u8; 32];
    getrandom::getrandom(&mut bytes)
        .map_err(|e| anyhow::anyhow!("Failed to gather randomness: {}", e))?;
    Ok(format!("sk_{}", HEXLOWER.encode(&bytes)))
}
