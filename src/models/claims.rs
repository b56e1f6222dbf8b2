//! Session claims
//!
//! The claims map carried inside the signed session token. Field order is
//! part of the wire format: serde serializes struct fields in declaration
//! order, which keeps the encoded payload stable for a given claims value.

use serde::{Deserialize, Serialize};

/// Claims embedded in a session token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Subject: the user id, opaque string
    pub sub: String,
    /// Display name. Informational only; never used for authorization.
    pub username: String,
    /// Absolute expiry, seconds since epoch
    pub exp: i64,
}

impl SessionClaims {
    /// Build claims for a user expiring `ttl_seconds` from `now`.
    pub fn new(user_id: i64, username: &str, now: i64, ttl_seconds: i64) -> Self {
        Self {
            sub: user_id.to_string(),
            username: username.to_string(),
            exp: now + ttl_seconds,
        }
    }

    /// Parse the subject back into a user id.
    pub fn user_id(&self) -> Option<i64> {
        self.sub.parse().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claims_new() {
        let claims = SessionClaims::new(42, "alice", 1_000, 7_200);
        assert_eq!(claims.sub, "42");
        assert_eq!(claims.username, "alice");
        assert_eq!(claims.exp, 8_200);
        assert_eq!(claims.user_id(), Some(42));
    }

    #[test]
    fn test_claims_serialization_order_is_stable() {
        let claims = SessionClaims::new(1, "u", 0, 60);
        let json = serde_json::to_string(&claims).unwrap();
        assert_eq!(json, r#"{"sub":"1","username":"u","exp":60}"#);
    }

    #[test]
    fn test_claims_non_numeric_subject() {
        let claims = SessionClaims {
            sub: "not-a-number".to_string(),
            username: "u".to_string(),
            exp: 0,
        };
        assert_eq!(claims.user_id(), None);
    }
}
