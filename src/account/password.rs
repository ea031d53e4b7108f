/// Password credentials
///
/// Current credentials are Argon2id PHC strings with the salt embedded; a
/// fresh random salt is generated for every hash. Legacy credentials are
/// `hex(sha256(salt ++ password))` with the salt in a separate column, kept
/// verifiable so old accounts can still log in, and flagged for a
/// transparent rehash on their next successful login.
use crate::error::{Error, Result};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, SaltString},
    Argon2, PasswordHasher, PasswordVerifier,
};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

pub struct PasswordCredential;

impl PasswordCredential {
    /// Hash a password with a freshly generated salt
    ///
    /// Returns the PHC string and the value for the salt column, which is
    /// always `None` for the current scheme.
    pub fn create(password: &str) -> Result<(String, Option<String>)> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| Error::Internal(format!("Password hashing failed: {}", e)))?;

        Ok((hash.to_string(), None))
    }

    /// Verify a password against a stored credential
    ///
    /// Comparison never short-circuits: Argon2 verification is constant-time
    /// internally, and the legacy digest comparison goes through `subtle`.
    /// Malformed stored values verify as false rather than erroring.
    pub fn check(pass_crypt: &str, pass_salt: Option<&str>, password: &str) -> bool {
        match pass_salt {
            None | Some("") => match PasswordHash::new(pass_crypt) {
                Ok(parsed) => Argon2::default()
                    .verify_password(password.as_bytes(), &parsed)
                    .is_ok(),
                Err(_) => false,
            },
            Some(salt) => {
                let digest = Self::legacy_digest(salt, password);
                digest.as_bytes().ct_eq(pass_crypt.as_bytes()).into()
            }
        }
    }

    /// Whether the stored credential uses the legacy scheme and should be
    /// re-hashed on the next successful login
    pub fn needs_upgrade(pass_crypt: &str, pass_salt: Option<&str>) -> bool {
        if pass_salt.map_or(false, |s| !s.is_empty()) {
            return true;
        }
        PasswordHash::new(pass_crypt).is_err()
    }

    fn legacy_digest(salt: &str, password: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(salt.as_bytes());
        hasher.update(password.as_bytes());
        hex::encode(hasher.finalize())
    }
}
