/// Configuration management for the Meridian account engine
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub limits: LimitConfig,
    pub avatar: AvatarConfig,
    pub logging: LoggingConfig,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub path: PathBuf,
}

/// Numeric trust policy settings
///
/// The spam threshold and the per-hour quota bounds consumed by the spam
/// scorer and rate limiter. All values are per account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitConfig {
    /// Spam score above which an eligible account is automatically suspended
    pub spam_threshold: i64,
    pub max_messages_per_hour: i64,
    pub max_follows_per_hour: i64,
    pub min_changeset_comments_per_hour: i64,
    pub initial_changeset_comments_per_hour: i64,
    pub max_changeset_comments_per_hour: i64,
    pub moderator_changeset_comments_per_hour: i64,
    /// How many recent comments it takes to earn the full comment quota
    pub comments_to_max_changeset_comments: i64,
    /// Delay between the last closed changeset and account deletion.
    /// Unset means deletion is allowed from account creation.
    pub account_deletion_delay_hours: Option<i64>,
}

/// Avatar storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvatarConfig {
    pub storage_directory: PathBuf,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./data/meridian.sqlite"),
        }
    }
}

impl Default for LimitConfig {
    fn default() -> Self {
        Self {
            spam_threshold: 50,
            max_messages_per_hour: 60,
            max_follows_per_hour: 60,
            min_changeset_comments_per_hour: 1,
            initial_changeset_comments_per_hour: 6,
            max_changeset_comments_per_hour: 60,
            moderator_changeset_comments_per_hour: 36_000,
            comments_to_max_changeset_comments: 200,
            account_deletion_delay_hours: None,
        }
    }
}

impl Default for AvatarConfig {
    fn default() -> Self {
        Self {
            storage_directory: PathBuf::from("./data/avatars"),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            limits: LimitConfig::default(),
            avatar: AvatarConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Parse an integer setting, falling back to its default when unset.
/// A value that is present but malformed is a configuration error, not
/// something to silently paper over.
fn env_i64(name: &str, default: i64) -> Result<i64> {
    match env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| Error::Config(format!("{} must be an integer, got {:?}", name, raw))),
        Err(_) => Ok(default),
    }
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();

        let defaults = LimitConfig::default();

        let database = DatabaseConfig {
            path: env::var("MERIDIAN_DATABASE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| DatabaseConfig::default().path),
        };

        let limits = LimitConfig {
            spam_threshold: env_i64("MERIDIAN_SPAM_THRESHOLD", defaults.spam_threshold)?,
            max_messages_per_hour: env_i64(
                "MERIDIAN_MAX_MESSAGES_PER_HOUR",
                defaults.max_messages_per_hour,
            )?,
            max_follows_per_hour: env_i64(
                "MERIDIAN_MAX_FOLLOWS_PER_HOUR",
                defaults.max_follows_per_hour,
            )?,
            min_changeset_comments_per_hour: env_i64(
                "MERIDIAN_MIN_CHANGESET_COMMENTS_PER_HOUR",
                defaults.min_changeset_comments_per_hour,
            )?,
            initial_changeset_comments_per_hour: env_i64(
                "MERIDIAN_INITIAL_CHANGESET_COMMENTS_PER_HOUR",
                defaults.initial_changeset_comments_per_hour,
            )?,
            max_changeset_comments_per_hour: env_i64(
                "MERIDIAN_MAX_CHANGESET_COMMENTS_PER_HOUR",
                defaults.max_changeset_comments_per_hour,
            )?,
            moderator_changeset_comments_per_hour: env_i64(
                "MERIDIAN_MODERATOR_CHANGESET_COMMENTS_PER_HOUR",
                defaults.moderator_changeset_comments_per_hour,
            )?,
            comments_to_max_changeset_comments: env_i64(
                "MERIDIAN_COMMENTS_TO_MAX_CHANGESET_COMMENTS",
                defaults.comments_to_max_changeset_comments,
            )?,
            account_deletion_delay_hours: match env::var("MERIDIAN_ACCOUNT_DELETION_DELAY_HOURS") {
                Ok(raw) => Some(raw.parse().map_err(|_| {
                    Error::Config(format!(
                        "MERIDIAN_ACCOUNT_DELETION_DELAY_HOURS must be an integer, got {:?}",
                        raw
                    ))
                })?),
                Err(_) => None,
            },
        };

        let avatar = AvatarConfig {
            storage_directory: env::var("MERIDIAN_AVATAR_DIRECTORY")
                .map(PathBuf::from)
                .unwrap_or_else(|_| AvatarConfig::default().storage_directory),
        };

        let logging = LoggingConfig {
            level: env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        };

        let config = AppConfig {
            database,
            limits,
            avatar,
            logging,
        };
        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        let limits = &self.limits;

        if limits.comments_to_max_changeset_comments <= 0 {
            return Err(Error::Config(
                "comments_to_max_changeset_comments must be positive".to_string(),
            ));
        }

        if limits.min_changeset_comments_per_hour > limits.max_changeset_comments_per_hour {
            return Err(Error::Config(
                "min_changeset_comments_per_hour exceeds max_changeset_comments_per_hour"
                    .to_string(),
            ));
        }

        if limits.initial_changeset_comments_per_hour < limits.min_changeset_comments_per_hour
            || limits.initial_changeset_comments_per_hour > limits.max_changeset_comments_per_hour
        {
            return Err(Error::Config(
                "initial_changeset_comments_per_hour outside [min, max]".to_string(),
            ));
        }

        if limits.max_messages_per_hour < 0 || limits.max_follows_per_hour < 0 {
            return Err(Error::Config(
                "per-hour maxima cannot be negative".to_string(),
            ));
        }

        if let Some(delay) = limits.account_deletion_delay_hours {
            if delay < 0 {
                return Err(Error::Config(
                    "account_deletion_delay_hours cannot be negative".to_string(),
                ));
            }
        }

        Ok(())
    }
}
