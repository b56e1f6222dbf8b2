//! MAC backends
//!
//! The token codec computes HMAC-SHA256 through a small backend trait with
//! two implementations: one on the RustCrypto `hmac`/`sha2` pair, one on
//! `ring`. Both must produce byte-identical tags for the same key and
//! message; which one runs is decided once at startup from configuration.
//!
//! Verification goes through the backend's own constant-time comparison. A
//! tag of the wrong length is an ordinary verification failure, never a
//! panic.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use hmac::{Hmac, Mac};
use ring::hmac as ring_hmac;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Keyed-hash provider for the token codec.
pub trait MacBackend: Send + Sync {
    /// Backend name, for startup logging.
    fn name(&self) -> &'static str;

    /// Compute the HMAC-SHA256 tag of `message` under `key`.
    fn sign(&self, key: &[u8], message: &[u8]) -> Vec<u8>;

    /// Constant-time check that `tag` is the HMAC-SHA256 of `message`
    /// under `key`. Length mismatches return `false`.
    fn verify(&self, key: &[u8], message: &[u8], tag: &[u8]) -> bool;
}

/// Backend on the RustCrypto `hmac` + `sha2` crates.
pub struct HmacSha2Backend;

impl MacBackend for HmacSha2Backend {
    fn name(&self) -> &'static str {
        "hmac-sha2"
    }

    fn sign(&self, key: &[u8], message: &[u8]) -> Vec<u8> {
        // HMAC accepts keys of any length; this cannot fail.
        let mut mac = HmacSha256::new_from_slice(key).expect("HMAC key of any length");
        mac.update(message);
        mac.finalize().into_bytes().to_vec()
    }

    fn verify(&self, key: &[u8], message: &[u8], tag: &[u8]) -> bool {
        let mut mac = HmacSha256::new_from_slice(key).expect("HMAC key of any length");
        mac.update(message);
        mac.verify_slice(tag).is_ok()
    }
}

/// Backend on `ring`.
pub struct RingBackend;

impl MacBackend for RingBackend {
    fn name(&self) -> &'static str {
        "ring"
    }

    fn sign(&self, key: &[u8], message: &[u8]) -> Vec<u8> {
        let key = ring_hmac::Key::new(ring_hmac::HMAC_SHA256, key);
        ring_hmac::sign(&key, message).as_ref().to_vec()
    }

    fn verify(&self, key: &[u8], message: &[u8], tag: &[u8]) -> bool {
        let key = ring_hmac::Key::new(ring_hmac::HMAC_SHA256, key);
        ring_hmac::verify(&key, message, tag).is_ok()
    }
}

/// Configured backend choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum MacBackendKind {
    /// RustCrypto hmac + sha2 (default)
    #[default]
    HmacSha2,
    /// ring
    Ring,
}

impl fmt::Display for MacBackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MacBackendKind::HmacSha2 => write!(f, "hmac-sha2"),
            MacBackendKind::Ring => write!(f, "ring"),
        }
    }
}

impl FromStr for MacBackendKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "hmac-sha2" | "hmac" => Ok(MacBackendKind::HmacSha2),
            "ring" => Ok(MacBackendKind::Ring),
            _ => Err(anyhow::anyhow!("Invalid MAC backend: {}", s)),
        }
    }
}

/// Instantiate the configured backend.
pub fn select_backend(kind: MacBackendKind) -> Arc<dyn MacBackend> {
    match kind {
        MacBackendKind::HmacSha2 => Arc::new(HmacSha2Backend),
        MacBackendKind::Ring => Arc::new(RingBackend),
    }
}
