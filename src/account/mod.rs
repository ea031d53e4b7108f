/// Account management system
///
/// Owns the status state machine, password credentials, roles, and the
/// storage-backed account manager.

mod manager;
mod password;
mod roles;
mod status;

pub use manager::{canonical_name, AccountManager, CredentialLookup};
pub use password::PasswordCredential;
pub use roles::{Role, RoleSet};
pub use status::{apply, may, AccountStatus, StatusEvent};

use serde::{Deserialize, Serialize};

/// Registration request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAccount {
    pub display_name: String,
    pub email: String,
    pub password: String,
}
