//! Token codec
//!
//! Encodes session claims into a compact signed string usable as a cookie
//! value, and verifies such strings back into claims without any server-side
//! state.
//!
//! Wire format: `b64url(header).b64url(payload).b64url(hmac_sha256)`, no
//! padding. The header is a fixed constant, serialized once as a byte
//! literal so the encoded form never drifts. The signature covers the ASCII
//! string `b64url(header) + "." + b64url(payload)`.
//!
//! Verification returns an error value for every malformed, tampered or
//! expired token; it never panics on attacker-controlled input.

use std::sync::Arc;

use chrono::Utc;
use data_encoding::BASE64URL_NOPAD;

use crate::auth::backend::MacBackend;
use crate::models::SessionClaims;

/// Name of the session cookie carrying the token.
pub const SESSION_COOKIE: &str = "session_token";

/// Fixed token header: algorithm + type identifiers.
const HEADER_JSON: &[u8] = br#"{"alg":"HS256","typ":"JWT"}"#;

/// Verification failure. Every variant is an expected outcome for
/// attacker-controlled input, not an error condition of the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum VerifyError {
    /// Not three dot-separated segments
    #[error("malformed token")]
    MalformedToken,
    /// Signature does not match the header+payload under our secret
    #[error("bad signature")]
    BadSignature,
    /// Signature valid but the payload is not a claims object
    #[error("malformed payload")]
    MalformedPayload,
    /// Claims expired
    #[error("token expired")]
    Expired,
}

/// Stateless issuer/verifier of signed session tokens.
///
/// Holds the server secret, injected once at construction. The MAC is
/// computed by whichever [`MacBackend`] was selected at startup.
pub struct TokenCodec {
    secret: Vec<u8>,
    backend: Arc<dyn MacBackend>,
}

impl TokenCodec {
    pub fn new(secret: impl Into<Vec<u8>>, backend: Arc<dyn MacBackend>) -> Self {
        Self {
            secret: secret.into(),
            backend,
        }
    }

    /// Encode and sign `claims` into a token string.
    pub fn issue(&self, claims: &SessionClaims) -> String {
        let payload = serde_json::to_vec(claims).expect("claims serialize to JSON");
        self.issue_raw(&payload)
    }

    fn issue_raw(&self, payload: &[u8]) -> String {
        let signing_input = format!(
            "{}.{}",
            BASE64URL_NOPAD.encode(HEADER_JSON),
            BASE64URL_NOPAD.encode(payload)
        );
        let tag = self.backend.sign(&self.secret, signing_input.as_bytes());
        format!("{}.{}", signing_input, BASE64URL_NOPAD.encode(&tag))
    }

    /// Verify a token against the current clock.
    pub fn verify(&self, token: &str) -> Result<SessionClaims, VerifyError> {
        self.verify_at(token, Utc::now().timestamp())
    }

    /// Verify a token as of `now` (seconds since epoch).
    ///
    /// The signature is checked before the payload is even parsed, so a
    /// forged token learns nothing about payload handling.
    pub fn verify_at(&self, token: &str, now: i64) -> Result<SessionClaims, VerifyError> {
        let mut segments = token.split('.');
        let (header, payload, signature) = match (
            segments.next(),
            segments.next(),
            segments.next(),
            segments.next(),
        ) {
            (Some(h), Some(p), Some(s), None) => (h, p, s),
            _ => return Err(VerifyError::MalformedToken),
        };

        // An undecodable signature can never match; same failure as a wrong one.
        let supplied = BASE64URL_NOPAD
            .decode(signature.as_bytes())
            .map_err(|_| VerifyError::BadSignature)?;

        let signing_input = format!("{}.{}", header, payload);
        if !self
            .backend
            .verify(&self.secret, signing_input.as_bytes(), &supplied)
        {
            return Err(VerifyError::BadSignature);
        }

        let payload_bytes = BASE64URL_NOPAD
            .decode(payload.as_bytes())
            .map_err(|_| VerifyError::MalformedPayload)?;
        let claims: SessionClaims =
            serde_json::from_slice(&payload_bytes).map_err(|_| VerifyError::MalformedPayload)?;

        if now > claims.exp {
            return Err(VerifyError::Expired);
        }

        Ok(claims)
    }

    /// Sign an arbitrary message, returning the base64url tag.
    ///
    /// Used for time-limited signed download URLs, which share the server
    /// secret and backend with session tokens.
    pub fn sign_detached(&self, message: &[u8]) -> String {
        BASE64URL_NOPAD.encode(&self.backend.sign(&self.secret, message))
    }

    /// Verify a detached base64url signature over `message`.
    pub fn verify_detached(&self, message: &[u8], signature: &str) -> bool {
        match BASE64URL_NOPAD.decode(signature.as_bytes()) {
            Ok(tag) => self.backend.verify(&self.secret, message, &tag),
            Err(_) => false,
        }
    }
}


#[cfg(test)]
mod property_tests {
    use super::*;
    use crate::auth::backend::{HmacSha2Backend, RingBackend};
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn property_roundtrip_any_claims(
            sub in "[a-zA-Z0-9_-]{1,24}",
            username in "\\PC{0,32}",
            exp in 1i64..=4_000_000_000i64,
            secret in proptest::collection::vec(any::<u8>(), 1..64),
        ) {
            let codec = TokenCodec::new(secret, std::sync::Arc::new(HmacSha2Backend));
            let claims = SessionClaims { sub, username, exp };
            let token = codec.issue(&claims);
            prop_assert_eq!(codec.verify_at(&token, 0).unwrap(), claims);
        }

        #[test]
        fn property_distinct_secrets_reject(
            exp in 1i64..=4_000_000_000i64,
            s1 in proptest::collection::vec(any::<u8>(), 1..64),
            s2 in proptest::collection::vec(any::<u8>(), 1..64),
        ) {
            prop_assume!(s1 != s2);
            let a = TokenCodec::new(s1, std::sync::Arc::new(HmacSha2Backend));
            let b = TokenCodec::new(s2, std::sync::Arc::new(HmacSha2Backend));
            let claims = SessionClaims { sub: "u1".into(), username: "u".into(), exp };
            let token = a.issue(&claims);
            prop_assert_eq!(b.verify_at(&token, 0), Err(VerifyError::BadSignature));
        }

        #[test]
        fn property_verify_never_panics_on_arbitrary_input(token in "\\PC{0,128}") {
            let codec = TokenCodec::new(b"s3cret".to_vec(), std::sync::Arc::new(HmacSha2Backend));
            let _ = codec.verify_at(&token, 0);
        }

        #[test]
        fn property_backends_agree(
            sub in "[a-zA-Z0-9_-]{1,24}",
            username in "[a-z]{0,16}",
            exp in 1i64..=4_000_000_000i64,
            secret in proptest::collection::vec(any::<u8>(), 1..64),
        ) {
            let a = TokenCodec::new(secret.clone(), std::sync::Arc::new(HmacSha2Backend));
            let b = TokenCodec::new(secret, std::sync::Arc::new(RingBackend));
            let claims = SessionClaims { sub, username, exp };
            prop_assert_eq!(a.issue(&claims), b.issue(&claims));
            prop_assert_eq!(a.verify_at(&b.issue(&claims), 0).unwrap(), claims);
        }
    }
}
