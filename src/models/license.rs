//! License model
//!
//! A license key grants a fixed number of subscription days to the account
//! that redeems it. A license transitions `Inactive -> Active` exactly once,
//! binding it to a user and stamping the activation time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// License entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct License {
    /// Unique identifier
    pub id: i64,
    /// License key (unique, one-time redeemable)
    pub key: String,
    /// Subscription days granted on activation
    pub days: i64,
    /// Activation state
    pub status: LicenseStatus,
    /// User the license is bound to after activation
    pub user_id: Option<i64>,
    /// When the license was activated
    pub activated_at: Option<DateTime<Utc>>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl License {
    /// Create a new, unredeemed license.
    pub fn new(key: String, days: i64) -> Self {
        Self {
            id: 0, // assigned by the database
            key,
            days,
            status: LicenseStatus::Inactive,
            user_id: None,
            activated_at: None,
            created_at: Utc::now(),
        }
    }

    /// Check whether the license can still be redeemed.
    pub fn is_redeemable(&self) -> bool {
        self.status == LicenseStatus::Inactive
    }
}

/// License activation state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LicenseStatus {
    /// Not yet redeemed
    #[default]
    Inactive,
    /// Redeemed and bound to a user
    Active,
}

impl fmt::Display for LicenseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LicenseStatus::Inactive => write!(f, "inactive"),
            LicenseStatus::Active => write!(f, "active"),
        }
    }
}

impl FromStr for LicenseStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "inactive" => Ok(LicenseStatus::Inactive),
            "active" => Ok(LicenseStatus::Active),
            _ => Err(anyhow::anyhow!("Invalid license status: {}", s)),
        }
    }
}
