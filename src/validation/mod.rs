/// Registration and profile input validation
///
/// Email format rides on the `validator` crate; the display-name rules
/// that need context (reserved words, the `user_<id>` convention, URL
/// safety) are hand checks.
use crate::error::{Error, Result};
use validator::ValidateEmail;

/// Display names reserved for routing and system pages
pub const RESERVED_DISPLAY_NAMES: &[&str] = &[
    "new",
    "terms",
    "save",
    "confirm",
    "confirm-email",
    "go_public",
    "reset-password",
    "forgot-password",
    "suspended",
];

/// Characters that would break display-name URLs
const URL_UNSAFE: &[char] = &['/', ';', '.', ',', '?', '%', '#'];

/// Validate a display name
///
/// `account_id` is the owning account when validating a rename, so the
/// purge convention `user_<own id>` stays legal for that account alone.
pub fn validate_display_name(name: &str, account_id: Option<i64>) -> Result<()> {
    let char_count = name.chars().count();
    if !(3..=255).contains(&char_count) {
        return Err(Error::Validation(
            "Display name must be between 3 and 255 characters".to_string(),
        ));
    }

    if name.trim() != name {
        return Err(Error::Validation(
            "Display name cannot have leading or trailing whitespace".to_string(),
        ));
    }

    if name.chars().any(|c| URL_UNSAFE.contains(&c) || c.is_control()) {
        return Err(Error::Validation(format!(
            "Display name cannot contain any of {:?}",
            URL_UNSAFE
        )));
    }

    let lowered = name.to_lowercase();
    if RESERVED_DISPLAY_NAMES.contains(&lowered.as_str()) {
        return Err(Error::Validation(format!(
            "Display name {:?} is reserved",
            name
        )));
    }

    // user_<n> is the purged-account convention; only the account with id n
    // may carry it
    if let Some(claimed) = lowered.strip_prefix("user_") {
        if !claimed.is_empty() && claimed.bytes().all(|b| b.is_ascii_digit()) {
            let claimed: i64 = claimed
                .parse()
                .map_err(|_| Error::Validation("Display name is out of range".to_string()))?;
            if account_id != Some(claimed) {
                return Err(Error::Validation(
                    "Display name cannot claim another account's user_<id> name".to_string(),
                ));
            }
        }
    }

    Ok(())
}

/// Validate an email address for storage
pub fn validate_email(email: &str) -> Result<()> {
    if email.trim() != email {
        return Err(Error::Validation(
            "Email cannot have leading or trailing whitespace".to_string(),
        ));
    }

    if !email.validate_email() {
        return Err(Error::Validation(format!(
            "Invalid email address: {}",
            email
        )));
    }

    Ok(())
}

/// Validate a plaintext password before hashing
pub fn validate_password(password: &str) -> Result<()> {
    let char_count = password.chars().count();
    if !(8..=255).contains(&char_count) {
        return Err(Error::Validation(
            "Password must be between 8 and 255 characters".to_string(),
        ));
    }

    Ok(())
}

/// Validate optional home coordinates
pub fn validate_home_location(lat: Option<f64>, lon: Option<f64>) -> Result<()> {
    if let Some(lat) = lat {
        if !(-90.0..=90.0).contains(&lat) || !lat.is_finite() {
            return Err(Error::Validation(format!(
                "Home latitude {} out of range",
                lat
            )));
        }
    }

    if let Some(lon) = lon {
        if !(-180.0..=180.0).contains(&lon) || !lon.is_finite() {
            return Err(Error::Validation(format!(
                "Home longitude {} out of range",
                lon
            )));
        }
    }

    Ok(())
}
