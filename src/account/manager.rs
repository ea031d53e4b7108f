/// Account manager implementation using runtime queries
///
/// Owns every read and write against the account storage: registration,
/// lookups, status transitions, token issuance and revocation, the
/// personal-data scrub, and the activity queries consumed by the spam
/// scorer and rate limiter.
use crate::{
    account::{
        status, AccountStatus, NewAccount, PasswordCredential, Role, RoleSet, StatusEvent,
    },
    clock::Clock,
    config::AppConfig,
    db::account::{AccessToken, Account},
    error::{Error, Result},
    tile, validation,
};
use chrono::{DateTime, Duration, Utc};
use sqlx::{Row, SqlitePool};
use std::sync::Arc;
use unicode_normalization::UnicodeNormalization;
use uuid::Uuid;

/// Column list shared by every account SELECT
const ACCOUNT_COLUMNS: &str = "id, display_name, display_name_canonical, email, new_email, \
     email_valid, pass_crypt, pass_salt, status, created_at, description, \
     home_lat, home_lon, home_zoom, home_tile, auth_provider, auth_uid, \
     avatar_key, changesets_count, traces_count, diary_entries_count, \
     diary_comments_count, note_comments_count";

/// Outcome of a credential-identifier lookup
///
/// More than one relaxed match is reported as ambiguity, which the
/// authenticator folds into the uniform failure path. It is never resolved
/// by picking one of the candidates.
#[derive(Debug)]
pub enum CredentialLookup {
    Unique(Account),
    Ambiguous,
    None,
}

/// Canonical form used for normalization-insensitive display-name matching
pub fn canonical_name(name: &str) -> String {
    name.nfkc().collect::<String>().to_lowercase()
}

/// Account manager service
pub struct AccountManager {
    db: SqlitePool,
    config: Arc<AppConfig>,
    clock: Arc<dyn Clock>,
}

impl AccountManager {
    /// Create a new account manager
    pub fn new(db: SqlitePool, config: Arc<AppConfig>, clock: Arc<dyn Clock>) -> Self {
        Self { db, config, clock }
    }

    pub(crate) fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    pub(crate) fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Register a new account
    ///
    /// Accounts are born `pending` with zero activity counters.
    pub async fn create_account(&self, new: &NewAccount) -> Result<Account> {
        validation::validate_display_name(&new.display_name, None)?;
        validation::validate_email(&new.email)?;
        validation::validate_password(&new.password)?;

        if self.display_name_exists(&new.display_name).await? {
            return Err(Error::Conflict(format!(
                "Display name {} already taken",
                new.display_name
            )));
        }

        if self.email_exists(&new.email).await? {
            return Err(Error::Conflict("Email already registered".to_string()));
        }

        let (pass_crypt, pass_salt) = PasswordCredential::create(&new.password)?;
        let now = self.clock.now();

        let result = sqlx::query(
            "INSERT INTO accounts (display_name, display_name_canonical, email, pass_crypt, pass_salt, status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )
        .bind(&new.display_name)
        .bind(canonical_name(&new.display_name))
        .bind(&new.email)
        .bind(&pass_crypt)
        .bind(&pass_salt)
        .bind(AccountStatus::Pending.as_str())
        .bind(now)
        .execute(&self.db)
        .await?;

        self.get_account(result.last_insert_rowid()).await
    }

    /// Get account by id
    pub async fn get_account(&self, id: i64) -> Result<Account> {
        let sql = format!("SELECT {} FROM accounts WHERE id = ?1", ACCOUNT_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Account {} not found", id)))?;

        parse_account(row)
    }

    /// Get account by exact display name
    pub async fn find_by_display_name(&self, display_name: &str) -> Result<Option<Account>> {
        let sql = format!(
            "SELECT {} FROM accounts WHERE display_name = ?1",
            ACCOUNT_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(display_name)
            .fetch_optional(&self.db)
            .await?;

        row.map(parse_account).transpose()
    }

    /// Resolve a login identifier to at most one account
    ///
    /// Exact email/display-name matches win. Failing that, a
    /// case-insensitive and normalization-insensitive match is accepted
    /// only when it is unique.
    pub async fn find_by_credential_identifier(&self, identifier: &str) -> Result<CredentialLookup> {
        let trimmed = identifier.trim();

        let sql = format!(
            "SELECT {} FROM accounts WHERE email = ?1 OR display_name = ?2 ORDER BY id LIMIT 1",
            ACCOUNT_COLUMNS
        );
        if let Some(row) = sqlx::query(&sql)
            .bind(trimmed)
            .bind(identifier)
            .fetch_optional(&self.db)
            .await?
        {
            return Ok(CredentialLookup::Unique(parse_account(row)?));
        }

        let sql = format!(
            "SELECT {} FROM accounts
             WHERE lower(email) = lower(?1) OR display_name_canonical = ?2
             ORDER BY id LIMIT 2",
            ACCOUNT_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(trimmed)
            .bind(canonical_name(identifier))
            .fetch_all(&self.db)
            .await?;

        match rows.len() {
            0 => Ok(CredentialLookup::None),
            1 => Ok(CredentialLookup::Unique(parse_account(
                rows.into_iter().next().unwrap(),
            )?)),
            _ => Ok(CredentialLookup::Ambiguous),
        }
    }

    /// Replace a stored credential, e.g. after a legacy-scheme login
    pub async fn update_credential(
        &self,
        account_id: i64,
        pass_crypt: &str,
        pass_salt: Option<&str>,
    ) -> Result<()> {
        sqlx::query("UPDATE accounts SET pass_crypt = ?1, pass_salt = ?2 WHERE id = ?3")
            .bind(pass_crypt)
            .bind(pass_salt)
            .bind(account_id)
            .execute(&self.db)
            .await?;

        Ok(())
    }

    /// Persist an account's mutable profile fields
    ///
    /// Recomputes the canonical display name, and the home tile whenever
    /// both coordinates are present. Status, creation time, and counters
    /// are not written here.
    pub async fn save(&self, account: &mut Account) -> Result<()> {
        validation::validate_display_name(&account.display_name, Some(account.id))?;
        validation::validate_email(&account.email)?;
        validation::validate_home_location(account.home_lat, account.home_lon)?;

        if self
            .display_name_taken_by_other(&account.display_name, account.id)
            .await?
        {
            return Err(Error::Conflict(format!(
                "Display name {} already taken",
                account.display_name
            )));
        }

        account.display_name_canonical = canonical_name(&account.display_name);
        if let Some((lat, lon)) = account.home_location() {
            account.home_tile = Some(tile::tile_for_point(lat, lon));
        }

        sqlx::query(
            "UPDATE accounts
             SET display_name = ?1, display_name_canonical = ?2, email = ?3,
                 new_email = ?4, email_valid = ?5, description = ?6,
                 home_lat = ?7, home_lon = ?8, home_zoom = ?9, home_tile = ?10,
                 auth_provider = ?11, auth_uid = ?12, avatar_key = ?13
             WHERE id = ?14",
        )
        .bind(&account.display_name)
        .bind(&account.display_name_canonical)
        .bind(&account.email)
        .bind(&account.new_email)
        .bind(account.email_valid)
        .bind(&account.description)
        .bind(account.home_lat)
        .bind(account.home_lon)
        .bind(account.home_zoom)
        .bind(account.home_tile)
        .bind(&account.auth_provider)
        .bind(&account.auth_uid)
        .bind(&account.avatar_key)
        .bind(account.id)
        .execute(&self.db)
        .await?;

        Ok(())
    }

    /// Apply a side-effect-free status transition and persist it
    ///
    /// The write is guarded on the status the caller saw, so a concurrent
    /// transition surfaces as a conflict instead of being overwritten.
    /// `soft_destroy` carries mandatory side effects and has its own path.
    pub async fn transition(&self, account: &mut Account, event: StatusEvent) -> Result<()> {
        if event == StatusEvent::SoftDestroy {
            return Err(Error::Validation(
                "soft_destroy must go through its dedicated operation".to_string(),
            ));
        }

        let next = status::apply(account.status, event)?;

        let result = sqlx::query("UPDATE accounts SET status = ?1 WHERE id = ?2 AND status = ?3")
            .bind(next.as_str())
            .bind(account.id)
            .bind(account.status.as_str())
            .execute(&self.db)
            .await?;

        if result.rows_affected() == 0 {
            return Err(Error::Conflict(
                "Account status changed concurrently".to_string(),
            ));
        }

        tracing::info!(
            account_id = account.id,
            from = %account.status,
            to = %next,
            event = %event,
            "account status transition"
        );

        account.status = next;
        Ok(())
    }

    /// Soft-destroy: revoke tokens, scrub personal data, and mark the
    /// account deleted, all inside one transaction
    ///
    /// Returns the detached avatar key so the caller can schedule blob
    /// removal after the transaction commits.
    pub async fn soft_destroy(&self, account: &mut Account) -> Result<Option<String>> {
        let next = status::apply(account.status, StatusEvent::SoftDestroy)?;
        let scrub_name = format!("user_{}", account.id);
        let scrub_canonical = canonical_name(&scrub_name);
        let avatar_key = account.avatar_key.clone();
        let now = self.clock.now();

        let mut tx = self.db.begin().await?;

        sqlx::query(
            "UPDATE access_tokens SET revoked = 1, revoked_at = ?1
             WHERE account_id = ?2 AND revoked = 0
               AND (expires_at IS NULL OR expires_at > ?1)",
        )
        .bind(now)
        .bind(account.id)
        .execute(&mut *tx)
        .await
        .map_err(|e| Error::Purge(format!("Token revocation failed: {}", e)))?;

        let result = sqlx::query(
            "UPDATE accounts
             SET display_name = ?1, display_name_canonical = ?2, description = '',
                 home_lat = NULL, home_lon = NULL, email_valid = 0, new_email = NULL,
                 auth_provider = NULL, auth_uid = NULL, avatar_key = NULL, status = ?3
             WHERE id = ?4 AND status = ?5",
        )
        .bind(&scrub_name)
        .bind(&scrub_canonical)
        .bind(next.as_str())
        .bind(account.id)
        .bind(account.status.as_str())
        .execute(&mut *tx)
        .await
        .map_err(|e| Error::Purge(format!("Personal data scrub failed: {}", e)))?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(Error::Conflict(
                "Account status changed concurrently".to_string(),
            ));
        }

        tx.commit().await?;

        tracing::info!(account_id = account.id, "account soft-destroyed");

        account.display_name = scrub_name;
        account.display_name_canonical = scrub_canonical;
        account.description.clear();
        account.home_lat = None;
        account.home_lon = None;
        account.email_valid = false;
        account.new_email = None;
        account.auth_provider = None;
        account.auth_uid = None;
        account.avatar_key = None;
        account.status = next;

        Ok(avatar_key)
    }

    /// Scrub personal data without changing status
    ///
    /// Idempotent: re-running on an already-purged account rewrites the
    /// same scrubbed values. Returns the detached avatar key, if any.
    pub async fn purge_personal_data(&self, account: &mut Account) -> Result<Option<String>> {
        let scrub_name = format!("user_{}", account.id);
        let scrub_canonical = canonical_name(&scrub_name);
        let avatar_key = account.avatar_key.clone();

        sqlx::query(
            "UPDATE accounts
             SET display_name = ?1, display_name_canonical = ?2, description = '',
                 home_lat = NULL, home_lon = NULL, email_valid = 0, new_email = NULL,
                 auth_provider = NULL, auth_uid = NULL, avatar_key = NULL
             WHERE id = ?3",
        )
        .bind(&scrub_name)
        .bind(&scrub_canonical)
        .bind(account.id)
        .execute(&self.db)
        .await?;

        account.display_name = scrub_name;
        account.display_name_canonical = scrub_canonical;
        account.description.clear();
        account.home_lat = None;
        account.home_lon = None;
        account.email_valid = false;
        account.new_email = None;
        account.auth_provider = None;
        account.auth_uid = None;
        account.avatar_key = None;

        Ok(avatar_key)
    }

    /// Issue an access token for an account
    pub async fn create_access_token(
        &self,
        account_id: i64,
        ttl: Option<Duration>,
    ) -> Result<AccessToken> {
        let id = Uuid::new_v4().to_string();
        let token = Uuid::new_v4().to_string();
        let now = self.clock.now();
        let expires_at = ttl.map(|d| now + d);

        sqlx::query(
            "INSERT INTO access_tokens (id, account_id, token, created_at, expires_at, revoked)
             VALUES (?1, ?2, ?3, ?4, ?5, 0)",
        )
        .bind(&id)
        .bind(account_id)
        .bind(&token)
        .bind(now)
        .bind(expires_at)
        .execute(&self.db)
        .await?;

        Ok(AccessToken {
            id,
            account_id,
            token,
            created_at: now,
            expires_at,
            revoked: false,
            revoked_at: None,
        })
    }

    /// Revoke every non-expired token owned by the account
    ///
    /// Idempotent; returns how many tokens this call revoked.
    pub async fn revoke_authentication_tokens(&self, account_id: i64) -> Result<u64> {
        let now = self.clock.now();

        let result = sqlx::query(
            "UPDATE access_tokens SET revoked = 1, revoked_at = ?1
             WHERE account_id = ?2 AND revoked = 0
               AND (expires_at IS NULL OR expires_at > ?1)",
        )
        .bind(now)
        .bind(account_id)
        .execute(&self.db)
        .await?;

        Ok(result.rows_affected())
    }

    /// Tokens that are neither revoked nor expired
    pub async fn active_tokens(&self, account_id: i64) -> Result<Vec<AccessToken>> {
        let now = self.clock.now();

        let tokens = sqlx::query_as::<_, AccessToken>(
            "SELECT id, account_id, token, created_at, expires_at, revoked, revoked_at
             FROM access_tokens
             WHERE account_id = ?1 AND revoked = 0
               AND (expires_at IS NULL OR expires_at > ?2)
             ORDER BY created_at",
        )
        .bind(account_id)
        .bind(now)
        .fetch_all(&self.db)
        .await?;

        Ok(tokens)
    }

    /// Grant a role to an account; granting an already-held role is a no-op
    pub async fn grant_role(
        &self,
        account_id: i64,
        role: Role,
        granted_by: Option<i64>,
    ) -> Result<()> {
        sqlx::query(
            "INSERT OR IGNORE INTO account_roles (account_id, role, granted_by, granted_at)
             VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(account_id)
        .bind(role.as_str())
        .bind(granted_by)
        .bind(self.clock.now())
        .execute(&self.db)
        .await?;

        Ok(())
    }

    /// Load the account's role names as a set
    pub async fn role_set(&self, account_id: i64) -> Result<RoleSet> {
        let names: Vec<String> =
            sqlx::query_scalar("SELECT role FROM account_roles WHERE account_id = ?1")
                .bind(account_id)
                .fetch_all(&self.db)
                .await?;

        Ok(RoleSet::new(names))
    }

    /// Open issues against the account with report activity since their
    /// last resolution
    pub async fn active_reports(&self, account_id: i64) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(DISTINCT i.id)
             FROM issues i
             JOIN reports r ON r.issue_id = i.id
             WHERE i.reported_account_id = ?1 AND i.status = 'open'
               AND r.updated_at >= COALESCE(i.resolved_at, '1970-01-01')",
        )
        .bind(account_id)
        .fetch_one(&self.db)
        .await?;

        Ok(count)
    }

    /// Distinct reporters with spam-category reports on open issues
    pub async fn spam_issue_reporters(&self, account_id: i64) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(DISTINCT r.reporter_id)
             FROM reports r
             JOIN issues i ON r.issue_id = i.id
             WHERE i.reported_account_id = ?1 AND i.status = 'open'
               AND r.category = 'spam'",
        )
        .bind(account_id)
        .fetch_one(&self.db)
        .await?;

        Ok(count)
    }

    /// Bodies of the account's visible diary entries
    pub async fn visible_diary_entry_bodies(&self, account_id: i64) -> Result<Vec<String>> {
        let bodies: Vec<String> = sqlx::query_scalar(
            "SELECT body FROM diary_entries WHERE account_id = ?1 AND visible = 1",
        )
        .bind(account_id)
        .fetch_all(&self.db)
        .await?;

        Ok(bodies)
    }

    /// Visible diary entries created after the given instant
    pub async fn visible_diary_entries_since(
        &self,
        account_id: i64,
        since: DateTime<Utc>,
    ) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM diary_entries
             WHERE account_id = ?1 AND visible = 1 AND created_at > ?2",
        )
        .bind(account_id)
        .bind(since)
        .fetch_one(&self.db)
        .await?;

        Ok(count)
    }

    /// Bodies of the account's visible diary comments
    pub async fn visible_diary_comment_bodies(&self, account_id: i64) -> Result<Vec<String>> {
        let bodies: Vec<String> = sqlx::query_scalar(
            "SELECT body FROM diary_comments WHERE account_id = ?1 AND visible = 1",
        )
        .bind(account_id)
        .fetch_all(&self.db)
        .await?;

        Ok(bodies)
    }

    /// Messages received by the account since the given instant
    pub async fn messages_received_since(
        &self,
        account_id: i64,
        since: DateTime<Utc>,
    ) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM messages WHERE to_account_id = ?1 AND sent_at >= ?2",
        )
        .bind(account_id)
        .bind(since)
        .fetch_one(&self.db)
        .await?;

        Ok(count)
    }

    /// Follow edges targeting the account created since the given instant
    pub async fn follows_received_since(
        &self,
        account_id: i64,
        since: DateTime<Utc>,
    ) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM follows WHERE following_id = ?1 AND created_at >= ?2",
        )
        .bind(account_id)
        .bind(since)
        .fetch_one(&self.db)
        .await?;

        Ok(count)
    }

    /// How many of the account's `cap` most recent changeset comments exist
    ///
    /// Capped count, not full history: an account with more than `cap`
    /// comments reports exactly `cap`.
    pub async fn recent_changeset_comment_count(&self, account_id: i64, cap: i64) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM (
                 SELECT id FROM changeset_comments
                 WHERE author_id = ?1
                 ORDER BY created_at DESC
                 LIMIT ?2
             )",
        )
        .bind(account_id)
        .bind(cap)
        .fetch_one(&self.db)
        .await?;

        Ok(count)
    }

    /// Closing time of the account's most recently closed changeset
    pub async fn last_closed_changeset_at(&self, account_id: i64) -> Result<Option<DateTime<Utc>>> {
        let closed_at: Option<DateTime<Utc>> = sqlx::query_scalar(
            "SELECT closed_at FROM changesets
             WHERE account_id = ?1 AND closed_at IS NOT NULL
             ORDER BY closed_at DESC
             LIMIT 1",
        )
        .bind(account_id)
        .fetch_optional(&self.db)
        .await?;

        Ok(closed_at)
    }

    async fn display_name_exists(&self, display_name: &str) -> Result<bool> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM accounts WHERE display_name = ?1")
                .bind(display_name)
                .fetch_one(&self.db)
                .await?;

        Ok(count > 0)
    }

    async fn display_name_taken_by_other(&self, display_name: &str, id: i64) -> Result<bool> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM accounts WHERE display_name = ?1 AND id != ?2",
        )
        .bind(display_name)
        .bind(id)
        .fetch_one(&self.db)
        .await?;

        Ok(count > 0)
    }

    async fn email_exists(&self, email: &str) -> Result<bool> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM accounts WHERE lower(email) = lower(?1)")
                .bind(email)
                .fetch_one(&self.db)
                .await?;

        Ok(count > 0)
    }
}

/// Parse an account row
fn parse_account(row: sqlx::sqlite::SqliteRow) -> Result<Account> {
    let status_str: String = row.get("status");
    let status = AccountStatus::from_str(&status_str)?;

    Ok(Account {
        id: row.get("id"),
        display_name: row.get("display_name"),
        display_name_canonical: row.get("display_name_canonical"),
        email: row.get("email"),
        new_email: row.get("new_email"),
        email_valid: row.get("email_valid"),
        pass_crypt: row.get("pass_crypt"),
        pass_salt: row.get("pass_salt"),
        status,
        created_at: row.get("created_at"),
        description: row.get("description"),
        home_lat: row.get("home_lat"),
        home_lon: row.get("home_lon"),
        home_zoom: row.get("home_zoom"),
        home_tile: row.get("home_tile"),
        auth_provider: row.get("auth_provider"),
        auth_uid: row.get("auth_uid"),
        avatar_key: row.get("avatar_key"),
        changesets_count: row.get("changesets_count"),
        traces_count: row.get("traces_count"),
        diary_entries_count: row.get("diary_entries_count"),
        diary_comments_count: row.get("diary_comments_count"),
        note_comments_count: row.get("note_comments_count"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::db;
    use chrono::TimeZone;

    fn test_clock() -> Arc<ManualClock> {
        Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap(),
        ))
    }

    async fn test_manager() -> (AccountManager, Arc<ManualClock>) {
        let pool = db::memory_pool().await;
        let clock = test_clock();
        let manager = AccountManager::new(pool, Arc::new(AppConfig::default()), clock.clone());
        (manager, clock)
    }

    fn registration(name: &str, email: &str) -> NewAccount {
        NewAccount {
            display_name: name.to_string(),
            email: email.to_string(),
            password: "correct horse battery".to_string(),
        }
    }

    #[tokio::test]
    async fn create_account_starts_pending() {
        let (manager, clock) = test_manager().await;

        let account = manager
            .create_account(&registration("Mapper One", "mapper@example.com"))
            .await
            .unwrap();

        assert_eq!(account.status, AccountStatus::Pending);
        assert_eq!(account.display_name_canonical, "mapper one");
        assert_eq!(account.created_at, clock.now());
        assert_eq!(account.changesets_count, 0);
        assert!(account.pass_salt.is_none());
    }

    #[tokio::test]
    async fn duplicate_display_name_conflicts() {
        let (manager, _) = test_manager().await;

        manager
            .create_account(&registration("Mapper One", "first@example.com"))
            .await
            .unwrap();
        let err = manager
            .create_account(&registration("Mapper One", "second@example.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }

    #[tokio::test]
    async fn email_conflicts_are_case_insensitive() {
        let (manager, _) = test_manager().await;

        manager
            .create_account(&registration("Mapper One", "mapper@example.com"))
            .await
            .unwrap();
        let err = manager
            .create_account(&registration("Mapper Two", "MAPPER@example.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }

    #[tokio::test]
    async fn credential_lookup_prefers_exact_match() {
        let (manager, _) = test_manager().await;

        // Two accounts whose canonical names collide
        manager
            .create_account(&registration("MapMaker", "one@example.com"))
            .await
            .unwrap();
        manager
            .create_account(&registration("mapmaker", "two@example.com"))
            .await
            .unwrap();

        match manager.find_by_credential_identifier("MapMaker").await.unwrap() {
            CredentialLookup::Unique(account) => assert_eq!(account.email, "one@example.com"),
            other => panic!("expected unique match, got {:?}", other),
        }

        // Neither exact: two canonical candidates means ambiguity
        match manager.find_by_credential_identifier("MAPMAKER").await.unwrap() {
            CredentialLookup::Ambiguous => {}
            other => panic!("expected ambiguous, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn credential_lookup_accepts_unique_relaxed_match() {
        let (manager, _) = test_manager().await;

        manager
            .create_account(&registration("MapMaker", "one@example.com"))
            .await
            .unwrap();

        match manager.find_by_credential_identifier("ONE@example.com").await.unwrap() {
            CredentialLookup::Unique(account) => assert_eq!(account.display_name, "MapMaker"),
            other => panic!("expected unique match, got {:?}", other),
        }

        assert!(matches!(
            manager.find_by_credential_identifier("nobody").await.unwrap(),
            CredentialLookup::None
        ));
    }

    #[tokio::test]
    async fn transition_persists_and_guards() {
        let (manager, _) = test_manager().await;

        let mut account = manager
            .create_account(&registration("Mapper One", "mapper@example.com"))
            .await
            .unwrap();

        manager
            .transition(&mut account, StatusEvent::Activate)
            .await
            .unwrap();
        assert_eq!(account.status, AccountStatus::Active);

        let stored = manager.get_account(account.id).await.unwrap();
        assert_eq!(stored.status, AccountStatus::Active);

        // Illegal event surfaces, never silently no-ops
        let err = manager
            .transition(&mut account, StatusEvent::Activate)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::IllegalTransition { .. }));

        // Stale in-memory status loses to the guard
        let mut stale = stored.clone();
        manager
            .transition(&mut stale, StatusEvent::Confirm)
            .await
            .unwrap();
        let mut stale_again = stored;
        let err = manager
            .transition(&mut stale_again, StatusEvent::Suspend)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }

    #[tokio::test]
    async fn token_revocation_is_idempotent() {
        let (manager, _) = test_manager().await;

        let account = manager
            .create_account(&registration("Mapper One", "mapper@example.com"))
            .await
            .unwrap();

        manager
            .create_access_token(account.id, None)
            .await
            .unwrap();
        manager
            .create_access_token(account.id, Some(Duration::hours(2)))
            .await
            .unwrap();
        // Already expired: not active, not revocable
        manager
            .create_access_token(account.id, Some(Duration::hours(-1)))
            .await
            .unwrap();

        assert_eq!(manager.active_tokens(account.id).await.unwrap().len(), 2);
        assert_eq!(
            manager.revoke_authentication_tokens(account.id).await.unwrap(),
            2
        );
        assert_eq!(manager.active_tokens(account.id).await.unwrap().len(), 0);
        assert_eq!(
            manager.revoke_authentication_tokens(account.id).await.unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn active_reports_counts_distinct_open_issues() {
        let (manager, clock) = test_manager().await;

        let account = manager
            .create_account(&registration("Mapper One", "mapper@example.com"))
            .await
            .unwrap();
        let reporter = manager
            .create_account(&registration("Reporter", "reporter@example.com"))
            .await
            .unwrap();

        let now = clock.now();
        let pool = manager.db.clone();

        // Open issue with two recent reports: counts once
        sqlx::query("INSERT INTO issues (id, reported_account_id, status) VALUES (1, ?1, 'open')")
            .bind(account.id)
            .execute(&pool)
            .await
            .unwrap();
        for _ in 0..2 {
            sqlx::query(
                "INSERT INTO reports (issue_id, reporter_id, category, updated_at)
                 VALUES (1, ?1, 'spam', ?2)",
            )
            .bind(reporter.id)
            .bind(now)
            .execute(&pool)
            .await
            .unwrap();
        }

        // Open issue whose only report predates its last resolution: ignored
        sqlx::query(
            "INSERT INTO issues (id, reported_account_id, status, resolved_at)
             VALUES (2, ?1, 'open', ?2)",
        )
        .bind(account.id)
        .bind(now)
        .execute(&pool)
        .await
        .unwrap();
        sqlx::query(
            "INSERT INTO reports (issue_id, reporter_id, category, updated_at)
             VALUES (2, ?1, 'spam', ?2)",
        )
        .bind(reporter.id)
        .bind(now - Duration::days(2))
        .execute(&pool)
        .await
        .unwrap();

        // Resolved issue: ignored regardless of report recency
        sqlx::query("INSERT INTO issues (id, reported_account_id, status) VALUES (3, ?1, 'resolved')")
            .bind(account.id)
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query(
            "INSERT INTO reports (issue_id, reporter_id, category, updated_at)
             VALUES (3, ?1, 'spam', ?2)",
        )
        .bind(reporter.id)
        .bind(now)
        .execute(&pool)
        .await
        .unwrap();

        assert_eq!(manager.active_reports(account.id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn purge_is_idempotent() {
        let (manager, _) = test_manager().await;

        let mut account = manager
            .create_account(&registration("Mapper One", "mapper@example.com"))
            .await
            .unwrap();
        account.description = "I map things".to_string();
        account.home_lat = Some(51.5);
        account.home_lon = Some(-0.12);
        account.avatar_key = Some("ab/abcdef".to_string());
        manager.save(&mut account).await.unwrap();

        let key = manager.purge_personal_data(&mut account).await.unwrap();
        assert_eq!(key.as_deref(), Some("ab/abcdef"));
        assert_eq!(account.display_name, format!("user_{}", account.id));
        assert_eq!(account.display_name_canonical, format!("user_{}", account.id));
        assert!(account.description.is_empty());
        assert!(account.home_lat.is_none());
        assert!(account.avatar_key.is_none());

        // Second run re-scrubs the same fields and detaches nothing
        let key = manager.purge_personal_data(&mut account).await.unwrap();
        assert!(key.is_none());

        let stored = manager.get_account(account.id).await.unwrap();
        assert_eq!(stored.display_name, format!("user_{}", account.id));
        // The row survives; only personal fields are scrubbed
        assert_eq!(stored.status, AccountStatus::Pending);
    }

    #[tokio::test]
    async fn soft_destroy_revokes_scrubs_and_deletes() {
        let (manager, _) = test_manager().await;

        let mut account = manager
            .create_account(&registration("Mapper One", "mapper@example.com"))
            .await
            .unwrap();
        account.description = "I map things".to_string();
        manager.save(&mut account).await.unwrap();
        manager.create_access_token(account.id, None).await.unwrap();

        manager.soft_destroy(&mut account).await.unwrap();

        assert_eq!(account.status, AccountStatus::Deleted);
        let stored = manager.get_account(account.id).await.unwrap();
        assert_eq!(stored.status, AccountStatus::Deleted);
        assert_eq!(stored.display_name, format!("user_{}", account.id));
        assert!(stored.description.is_empty());
        assert!(manager.active_tokens(account.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn soft_destroy_rolls_back_on_concurrent_change() {
        let (manager, _) = test_manager().await;

        let mut account = manager
            .create_account(&registration("Mapper One", "mapper@example.com"))
            .await
            .unwrap();
        manager.create_access_token(account.id, None).await.unwrap();

        // Another actor moves the account on before our write lands
        let mut other = manager.get_account(account.id).await.unwrap();
        manager
            .transition(&mut other, StatusEvent::Activate)
            .await
            .unwrap();

        let err = manager.soft_destroy(&mut account).await.unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));

        // All-or-nothing: the token revocation did not survive the rollback
        assert_eq!(manager.active_tokens(account.id).await.unwrap().len(), 1);
        let stored = manager.get_account(account.id).await.unwrap();
        assert_eq!(stored.display_name, "Mapper One");
        assert_eq!(stored.status, AccountStatus::Active);
    }

    #[tokio::test]
    async fn save_recomputes_home_tile() {
        let (manager, _) = test_manager().await;

        let mut account = manager
            .create_account(&registration("Mapper One", "mapper@example.com"))
            .await
            .unwrap();
        assert!(account.home_tile.is_none());

        account.home_lat = Some(0.0);
        account.home_lon = Some(0.0);
        manager.save(&mut account).await.unwrap();
        assert_eq!(account.home_tile, Some(0b11 << 30));

        let stored = manager.get_account(account.id).await.unwrap();
        assert_eq!(stored.home_tile, Some(0b11 << 30));

        // A single coordinate is not a location; the tile is left alone
        account.home_lon = None;
        manager.save(&mut account).await.unwrap();
        let stored = manager.get_account(account.id).await.unwrap();
        assert_eq!(stored.home_tile, Some(0b11 << 30));
    }

    #[tokio::test]
    async fn roles_load_as_a_set() {
        let (manager, _) = test_manager().await;

        let account = manager
            .create_account(&registration("Mapper One", "mapper@example.com"))
            .await
            .unwrap();

        assert!(manager.role_set(account.id).await.unwrap().is_empty());

        manager
            .grant_role(account.id, Role::Moderator, None)
            .await
            .unwrap();
        manager
            .grant_role(account.id, Role::Moderator, None)
            .await
            .unwrap();

        let roles = manager.role_set(account.id).await.unwrap();
        assert!(roles.is_moderator());
        assert!(!roles.is_administrator());
    }
}
