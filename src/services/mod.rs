//! Business logic services
//!
//! Services sit between the HTTP handlers and the repositories. They own
//! the account and license state machines, password hashing, and the
//! object storage abstraction.

pub mod account;
pub mod license;
pub mod password;
pub mod storage;

pub use account::{AccountError, AccountService};
pub use license::{compensated, LicenseError, LicenseService};
pub use storage::{LocalObjectStore, ObjectInfo, ObjectStore, StoreError};
