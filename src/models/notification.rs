//! Notification model
//!
//! Dashboard banner notifications shown to every authenticated user until
//! deactivated by an operator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Banner notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    /// Unique identifier
    pub id: i64,
    /// Short headline
    pub title: String,
    /// Banner body text
    pub body: String,
    /// Severity hint for the UI (info/warning/error)
    pub level: String,
    /// Whether the banner is currently shown
    pub active: bool,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(title: String, body: String, level: String) -> Self {
        Self {
            id: 0, // assigned by the database
            title,
            body,
            level,
            active: true,
            created_at: Utc::now(),
        }
    }
}
