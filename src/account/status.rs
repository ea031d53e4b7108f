/// Account status state machine
///
/// Owns the status enum and the full table of legal transitions. Every
/// status change in the crate goes through [`apply`]; an event requested
/// from a state it is not legal in fails loudly, never silently.
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Account lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    /// Freshly registered, not yet activated
    Pending,
    /// A normal account
    Active,
    /// Manually vetted; exempt from automatic suspension
    Confirmed,
    /// Taken out of circulation, manually or by the spam check
    Suspended,
    /// Soft-deleted; the row is kept for referential integrity
    Deleted,
}

impl AccountStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountStatus::Pending => "pending",
            AccountStatus::Active => "active",
            AccountStatus::Confirmed => "confirmed",
            AccountStatus::Suspended => "suspended",
            AccountStatus::Deleted => "deleted",
        }
    }

    pub fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(AccountStatus::Pending),
            "active" => Ok(AccountStatus::Active),
            "confirmed" => Ok(AccountStatus::Confirmed),
            "suspended" => Ok(AccountStatus::Suspended),
            "deleted" => Ok(AccountStatus::Deleted),
            _ => Err(Error::Validation(format!("Invalid account status: {}", s))),
        }
    }

    /// Visible to other users
    pub fn is_visible(&self) -> bool {
        matches!(
            self,
            AccountStatus::Pending | AccountStatus::Active | AccountStatus::Confirmed
        )
    }

    /// In normal standing
    pub fn is_active(&self) -> bool {
        matches!(self, AccountStatus::Active | AccountStatus::Confirmed)
    }
}

impl fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status-machine events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusEvent {
    /// A normal account becomes active
    Activate,
    /// Vet an account, overriding the spam scoring
    Confirm,
    /// Make a confirmed account subject to spam scoring again
    Unconfirm,
    /// Applied manually or automatically by the spam check
    Suspend,
    /// Back to active without overriding the spam scoring
    Unsuspend,
    /// Mark the account as deleted but keep all data intact
    Hide,
    Unhide,
    /// Mark the account as deleted and remove personal data
    SoftDestroy,
}

impl StatusEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusEvent::Activate => "activate",
            StatusEvent::Confirm => "confirm",
            StatusEvent::Unconfirm => "unconfirm",
            StatusEvent::Suspend => "suspend",
            StatusEvent::Unsuspend => "unsuspend",
            StatusEvent::Hide => "hide",
            StatusEvent::Unhide => "unhide",
            StatusEvent::SoftDestroy => "soft_destroy",
        }
    }

    /// States the event may fire from
    pub fn sources(&self) -> &'static [AccountStatus] {
        use AccountStatus::*;
        match self {
            StatusEvent::Activate => &[Pending],
            StatusEvent::Confirm => &[Pending, Active, Suspended],
            StatusEvent::Unconfirm => &[Confirmed],
            StatusEvent::Suspend => &[Pending, Active],
            StatusEvent::Unsuspend => &[Suspended],
            StatusEvent::Hide => &[Pending, Active, Confirmed, Suspended],
            StatusEvent::Unhide => &[Deleted],
            StatusEvent::SoftDestroy => &[Pending, Active, Confirmed, Suspended],
        }
    }

    /// State the event lands in
    pub fn target(&self) -> AccountStatus {
        match self {
            StatusEvent::Activate => AccountStatus::Active,
            StatusEvent::Confirm => AccountStatus::Confirmed,
            StatusEvent::Unconfirm => AccountStatus::Active,
            StatusEvent::Suspend => AccountStatus::Suspended,
            StatusEvent::Unsuspend => AccountStatus::Active,
            StatusEvent::Hide => AccountStatus::Deleted,
            StatusEvent::Unhide => AccountStatus::Active,
            StatusEvent::SoftDestroy => AccountStatus::Deleted,
        }
    }
}

impl fmt::Display for StatusEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether `event` is legal from `current`
pub fn may(current: AccountStatus, event: StatusEvent) -> bool {
    event.sources().contains(&current)
}

/// Resolve the state `event` moves `current` to
pub fn apply(current: AccountStatus, event: StatusEvent) -> Result<AccountStatus> {
    if may(current, event) {
        Ok(event.target())
    } else {
        Err(Error::IllegalTransition {
            current,
            event,
            allowed: event.sources(),
        })
    }
}
