//! Session authentication
//!
//! Stateless signed-session authentication. The token codec produces and
//! verifies compact HMAC-SHA256-signed claim strings carried in the
//! `session_token` cookie; the MAC itself is computed by one of two
//! interchangeable backends selected at startup.

pub mod backend;
pub mod token;

pub use backend::{select_backend, HmacSha2Backend, MacBackend, MacBackendKind, RingBackend};
pub use token::{TokenCodec, VerifyError, SESSION_COOKIE};
