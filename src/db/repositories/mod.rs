//! Repositories
//!
//! Data access behind traits so services can be tested against doubles.
//! Each repository has a sqlx implementation over the shared pool.
//!
//! Uniqueness-constraint violations are surfaced as `RepoError::UniqueViolation`
//! so callers can react with bounded retry or a conflict response; everything
//! else is an opaque upstream failure.

pub mod license;
pub mod machine;
pub mod notification;
pub mod preset;
pub mod task;
pub mod user;

pub use license::{LicenseRepository, SqlxLicenseRepository};
pub use machine::{MachineRepository, SqlxMachineRepository};
pub use notification::{NotificationRepository, SqlxNotificationRepository};
pub use preset::{PresetRepository, SqlxPresetRepository};
pub use task::{NewTask, SqlxTaskRepository, TaskRepository};
pub use user::{SqlxUserRepository, UserRepository};

/// Repository error.
#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    /// A uniqueness constraint rejected the write
    #[error("uniqueness constraint violated")]
    UniqueViolation,

    /// Any other persistence failure
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl RepoError {
    /// Map a sqlx error, promoting uniqueness violations to their own variant.
    pub fn from_sqlx(err: sqlx::Error, context: &'static str) -> Self {
        if crate::db::is_unique_violation(&err) {
            RepoError::UniqueViolation
        } else {
            RepoError::Other(anyhow::Error::new(err).context(context))
        }
    }
}

/// Shorthand for repository results.
pub type RepoResult<T> = Result<T, RepoError>;
