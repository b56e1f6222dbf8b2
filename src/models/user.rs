//! User model
//!
//! Defines the User entity for the dumphub dashboard. Accounts are
//! license-gated: a user carries a subscription expiry (`expires_at`) and a
//! worker API key, and can be suspended by an operator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// User entity representing a registered account.
///
/// An account can only log in while its status is `Active` and its
/// subscription expiry lies in the future. `password_hash` is nullable:
/// rows created by provisioning tools without a password can never
/// authenticate until one is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Unique identifier
    pub id: i64,
    /// Username (unique)
    pub username: String,
    /// Argon2 password hash, absent for accounts that cannot log in
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,
    /// Account status (active/suspended)
    pub status: UserStatus,
    /// Subscription expiry; an active account past this instant is rejected
    pub expires_at: Option<DateTime<Utc>>,
    /// Subscription days granted by the redeemed license
    pub day: i64,
    /// Worker API key (`sk_` prefix), generated on first login
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Create a new User. The password must already be hashed.
    pub fn new(username: String, password_hash: Option<String>) -> Self {
        Self {
            id: 0, // assigned by the database
            username,
            password_hash,
            status: UserStatus::Active,
            expires_at: None,
            day: 0,
            api_key: None,
            created_at: Utc::now(),
        }
    }

    /// Check if the account is suspended
    pub fn is_suspended(&self) -> bool {
        self.status == UserStatus::Suspended
    }

    /// Check if the subscription has lapsed relative to `now`.
    ///
    /// An account with no expiry at all is treated as lapsed: it was never
    /// granted any subscription days.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(expires_at) => expires_at < now,
            None => true,
        }
    }
}

/// User account status.
///
/// - Active: may log in while the subscription holds
/// - Suspended: rejected regardless of password correctness
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    /// Active - normal access
    #[default]
    Active,
    /// Suspended - cannot log in
    Suspended,
}

impl fmt::Display for UserStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserStatus::Active => write!(f, "active"),
            UserStatus::Suspended => write!(f, "suspended"),
        }
    }
}

impl FromStr for UserStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "active" => Ok(UserStatus::Active),
            "suspended" => Ok(UserStatus::Suspended),
            _ => Err(anyhow::anyhow!("Invalid user status: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_user_new() {
        let user = User::new("alice".to_string(), Some("hash".to_string()));

        assert_eq!(user.id, 0);
        assert_eq!(user.username, "alice");
        assert_eq!(user.status, UserStatus::Active);
        assert!(user.expires_at.is_none());
        assert!(user.api_key.is_none());
    }

    #[test]
    fn test_user_is_suspended() {
        let mut user = User::new("alice".to_string(), None);
        assert!(!user.is_suspended());
        user.status = UserStatus::Suspended;
        assert!(user.is_suspended());
    }

    #[test]
    fn test_user_is_expired() {
        let now = Utc::now();
        let mut user = User::new("alice".to_string(), None);

        // No expiry at all counts as lapsed
        assert!(user.is_expired(now));

        user.expires_at = Some(now + Duration::days(3));
        assert!(!user.is_expired(now));

        user.expires_at = Some(now - Duration::seconds(1));
        assert!(user.is_expired(now));
    }

    #[test]
    fn test_user_status_roundtrip() {
        assert_eq!(UserStatus::Active.to_string(), "active");
        assert_eq!(UserStatus::Suspended.to_string(), "suspended");
        assert_eq!(UserStatus::from_str("ACTIVE").unwrap(), UserStatus::Active);
        assert_eq!(
            UserStatus::from_str("suspended").unwrap(),
            UserStatus::Suspended
        );
        assert!(UserStatus::from_str("banned").is_err());
    }

    #[test]
    fn test_user_serialization_hides_secrets() {
        let mut user = User::new("alice".to_string(), Some("hash".to_string()));
        user.api_key = Some("sk_deadbeef".to_string());

        let json = serde_json::to_string(&user).unwrap();
        assert!(!json.contains("hash"));
        assert!(!json.contains("sk_deadbeef"));
    }
}
