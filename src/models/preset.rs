//! Dumper preset and file type models
//!
//! Presets bundle dumper configuration reusable across tasks; file types
//! describe the artifact extensions workers may upload.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Reusable dumper configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DumperPreset {
    /// Unique identifier
    pub id: i64,
    /// Display name (unique)
    pub name: String,
    /// Opaque configuration blob handed to the worker, JSON-encoded
    pub config: serde_json::Value,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl DumperPreset {
    pub fn new(name: String, config: serde_json::Value) -> Self {
        Self {
            id: 0, // assigned by the database
            name,
            config,
            created_at: Utc::now(),
        }
    }
}

/// Known artifact file type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileType {
    pub id: i64,
    /// Extension without the dot, e.g. "txt"
    pub extension: String,
    pub description: String,
}
