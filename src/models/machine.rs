//! Machine model
//!
//! A machine is a registered worker that runs dumper tasks on behalf of a
//! user. Machines are identified by a hardware id that is unique per owner.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Registered worker machine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Machine {
    /// Unique identifier
    pub id: i64,
    /// Owning user
    pub user_id: i64,
    /// Display name
    pub name: String,
    /// Hardware id (unique per owner)
    pub hwid: String,
    /// Last heartbeat from the worker
    pub last_seen: Option<DateTime<Utc>>,
    /// Registration timestamp
    pub created_at: DateTime<Utc>,
}

impl Machine {
    pub fn new(user_id: i64, name: String, hwid: String) -> Self {
        Self {
            id: 0, // assigned by the database
            user_id,
            name,
            hwid,
            last_seen: None,
            created_at: Utc::now(),
        }
    }
}
