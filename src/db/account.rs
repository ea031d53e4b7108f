/// Account database models
use crate::account::AccountStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Account record in the database
///
/// Activity counters are maintained by the surrounding application and are
/// read-only inputs to the spam scorer and rate limiter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: i64,
    pub display_name: String,
    /// lowercase(NFKC(display_name)), maintained on every write
    pub display_name_canonical: String,
    pub email: String,
    /// Pending address awaiting confirmation, separate from the active email
    pub new_email: Option<String>,
    pub email_valid: bool,
    /// Argon2id PHC string, or a hex digest for legacy credentials
    pub pass_crypt: String,
    /// Hex salt for legacy credentials; NULL once upgraded
    pub pass_salt: Option<String>,
    pub status: AccountStatus,
    pub created_at: DateTime<Utc>,
    pub description: String,
    pub home_lat: Option<f64>,
    pub home_lon: Option<f64>,
    pub home_zoom: Option<i64>,
    pub home_tile: Option<i64>,
    pub auth_provider: Option<String>,
    pub auth_uid: Option<String>,
    pub avatar_key: Option<String>,
    pub changesets_count: i64,
    pub traces_count: i64,
    pub diary_entries_count: i64,
    pub diary_comments_count: i64,
    pub note_comments_count: i64,
}

impl Account {
    /// Both home coordinates, when set
    pub fn home_location(&self) -> Option<(f64, f64)> {
        match (self.home_lat, self.home_lon) {
            (Some(lat), Some(lon)) => Some((lat, lon)),
            _ => None,
        }
    }

    /// Visible to other users: not suspended and not deleted
    pub fn is_visible(&self) -> bool {
        self.status.is_visible()
    }

    /// In normal standing: active or confirmed
    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }
}

/// Access token record
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct AccessToken {
    pub id: String,
    pub account_id: i64,
    pub token: String,
    pub created_at: DateTime<Utc>,
    /// NULL means the token never expires
    pub expires_at: Option<DateTime<Utc>>,
    pub revoked: bool,
    pub revoked_at: Option<DateTime<Utc>>,
}

/// Moderation issue filed against an account
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Issue {
    pub id: i64,
    pub reported_account_id: i64,
    pub status: String,
    pub resolved_at: Option<DateTime<Utc>>,
}

/// Report attached to an issue
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Report {
    pub id: i64,
    pub issue_id: i64,
    pub reporter_id: i64,
    pub category: String,
    pub updated_at: DateTime<Utc>,
}
