/// Account roles
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Known role names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Can moderate content and other users
    Moderator,
    /// Full administrative access
    Administrator,
    /// Allowed to run bulk imports
    Importer,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Moderator => "moderator",
            Role::Administrator => "administrator",
            Role::Importer => "importer",
        }
    }

    pub fn from_str(s: &str) -> Result<Self> {
        match s {
            "moderator" => Ok(Role::Moderator),
            "administrator" => Ok(Role::Administrator),
            "importer" => Ok(Role::Importer),
            _ => Err(Error::Validation(format!("Invalid role: {}", s))),
        }
    }
}

/// Precomputed set of role names attached to an account snapshot
///
/// Loaded once per request; membership checks are set lookups rather than
/// repeated queries.
#[derive(Debug, Clone, Default)]
pub struct RoleSet(HashSet<String>);

impl RoleSet {
    pub fn new(roles: impl IntoIterator<Item = String>) -> Self {
        Self(roles.into_iter().collect())
    }

    pub fn contains(&self, role: Role) -> bool {
        self.0.contains(role.as_str())
    }

    pub fn is_moderator(&self) -> bool {
        self.contains(Role::Moderator)
    }

    pub fn is_administrator(&self) -> bool {
        self.contains(Role::Administrator)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
