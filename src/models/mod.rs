//! Data models
//!
//! Core entities of the dumphub system: users, licenses, machines,
//! dumper tasks, notifications and presets, plus the session claims
//! carried inside the signed session token.

pub mod claims;
pub mod license;
pub mod machine;
pub mod notification;
pub mod preset;
pub mod task;
pub mod user;

pub use claims::SessionClaims;
pub use license::{License, LicenseStatus};
pub use machine::Machine;
pub use notification::Notification;
pub use preset::{DumperPreset, FileType};
pub use task::{DumpResult, Task, TaskStatus, TaskUrl};
pub use user::{User, UserStatus};
