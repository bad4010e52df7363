//! Registration tokens, RFID tags, and the user snapshot the core needs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// OCPP 1.5/1.6 limit on idTag length
pub const MAX_TAG_LENGTH: usize = 20;

/// Credential authorizing a new station's first BootNotification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrationToken {
    pub tenant_id: String,
    pub token: String,
    pub expiration_date: Option<DateTime<Utc>>,
    pub revocation_date: Option<DateTime<Utc>>,
    pub site_area_id: Option<String>,
    pub last_used_on: Option<DateTime<Utc>>,
}

impl RegistrationToken {
    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        if let Some(revoked) = self.revocation_date {
            if revoked <= now {
                return false;
            }
        }
        if let Some(expires) = self.expiration_date {
            if expires <= now {
                return false;
            }
        }
        true
    }
}

/// User account status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UserStatus {
    Active,
    Blocked,
    Inactive,
    Pending,
}

/// User snapshot consumed by the core (full account lives in the facade)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: Option<String>,
    pub status: UserStatus,
    /// Default car, copied onto transactions when the tenant has the car feature
    pub default_car_id: Option<String>,
    /// Car picked for the next session; cleared when a transaction starts
    pub last_selected_car_id: Option<String>,
}

/// RFID tag
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tag {
    pub id: String,
    pub tenant_id: String,
    pub user_id: Option<String>,
    pub active: bool,
    pub expiry_date: Option<DateTime<Utc>>,
    pub description: Option<String>,
}

impl Tag {
    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        if !self.active {
            return false;
        }
        match self.expiry_date {
            Some(expiry) => expiry > now,
            None => true,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expiry_date, Some(expiry) if expiry <= now)
    }
}
