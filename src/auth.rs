/// Credential authentication
///
/// Resolves a login identifier and password to an account, or to nothing.
/// Every failure mode (unknown identifier, ambiguous match, wrong
/// password, ineligible status) looks identical to the caller so account
/// existence is never leaked.
use crate::{
    account::{AccountManager, AccountStatus, CredentialLookup, PasswordCredential},
    db::account::Account,
    error::Result,
};
use std::sync::Arc;

/// Status-eligibility switches for a login attempt
///
/// Defaults reject pending and suspended accounts; deleted accounts are
/// always rejected.
#[derive(Debug, Clone, Copy, Default)]
pub struct AuthOptions {
    pub allow_pending: bool,
    pub allow_suspended: bool,
}

/// Authenticator service
pub struct Authenticator {
    accounts: Arc<AccountManager>,
}

impl Authenticator {
    pub fn new(accounts: Arc<AccountManager>) -> Self {
        Self { accounts }
    }

    /// Authenticate an identifier/password pair
    ///
    /// `None` is the uniform failure value. An exact email or display-name
    /// match wins; otherwise a relaxed match is used only when unique —
    /// an ambiguous lookup is a failure, never a pick.
    pub async fn authenticate(
        &self,
        identifier: &str,
        password: &str,
        options: AuthOptions,
    ) -> Result<Option<Account>> {
        let mut account = match self
            .accounts
            .find_by_credential_identifier(identifier)
            .await?
        {
            CredentialLookup::Unique(account) => Some(account),
            CredentialLookup::Ambiguous => {
                tracing::debug!(identifier, "ambiguous credential lookup rejected");
                None
            }
            CredentialLookup::None => None,
        };

        if let Some(candidate) = account.take() {
            if PasswordCredential::check(
                &candidate.pass_crypt,
                candidate.pass_salt.as_deref(),
                password,
            ) {
                account = Some(self.upgrade_if_needed(candidate, password).await?);
            }
        }

        // Status gating applies regardless of how the account was resolved
        if let Some(candidate) = &account {
            let rejected = candidate.status == AccountStatus::Deleted
                || (candidate.status == AccountStatus::Pending && !options.allow_pending)
                || (candidate.status == AccountStatus::Suspended && !options.allow_suspended);
            if rejected {
                account = None;
            }
        }

        Ok(account)
    }

    /// Transparently rehash a legacy credential after a successful check
    async fn upgrade_if_needed(&self, mut account: Account, password: &str) -> Result<Account> {
        if PasswordCredential::needs_upgrade(&account.pass_crypt, account.pass_salt.as_deref()) {
            let (pass_crypt, pass_salt) = PasswordCredential::create(password)?;
            self.accounts
                .update_credential(account.id, &pass_crypt, pass_salt.as_deref())
                .await?;
            tracing::info!(account_id = account.id, "upgraded legacy credential");
            account.pass_crypt = pass_crypt;
            account.pass_salt = pass_salt;
        }

        Ok(account)
    }
}
