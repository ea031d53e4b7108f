/// Account lifecycle façade
///
/// The entry point the web layer calls for account events: saves with
/// their spam check, deletion eligibility, token revocation, and the
/// personal-data purge. Composes the account manager, spam scorer, and
/// avatar store.
use crate::{
    account::{AccountManager, StatusEvent},
    avatar::AvatarStore,
    db::account::Account,
    error::Result,
    spam::SpamScorer,
};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

pub struct LifecycleManager {
    accounts: Arc<AccountManager>,
    scorer: Arc<SpamScorer>,
    avatars: Arc<dyn AvatarStore>,
}

impl LifecycleManager {
    pub fn new(
        accounts: Arc<AccountManager>,
        scorer: Arc<SpamScorer>,
        avatars: Arc<dyn AvatarStore>,
    ) -> Self {
        Self {
            accounts,
            scorer,
            avatars,
        }
    }

    /// Earliest instant the account may be deleted
    ///
    /// With a configured delay, recent mapping work holds deletion open:
    /// the delay runs from the most recently closed changeset, or from
    /// account creation when there is none. Without a delay, deletion is
    /// allowed from creation.
    pub async fn deletion_allowed_at(&self, account: &Account) -> Result<DateTime<Utc>> {
        if let Some(delay_hours) = self
            .accounts
            .config()
            .limits
            .account_deletion_delay_hours
        {
            if let Some(closed_at) = self.accounts.last_closed_changeset_at(account.id).await? {
                return Ok(closed_at + Duration::hours(delay_hours));
            }
        }

        Ok(account.created_at)
    }

    /// Whether the account may be deleted right now
    pub async fn deletion_allowed(&self, account: &Account) -> Result<bool> {
        Ok(self.deletion_allowed_at(account).await? <= self.accounts.clock().now())
    }

    /// Persist profile changes, then run the spam check
    ///
    /// The save recomputes the home tile when both coordinates are
    /// present. The spam check may move an eligible account to suspended.
    pub async fn on_save(&self, account: &mut Account) -> Result<()> {
        self.accounts.save(account).await?;
        self.spam_check(account).await
    }

    /// Suspend the account if the spam scorer says so
    pub async fn spam_check(&self, account: &mut Account) -> Result<()> {
        if self.scorer.should_suspend(account).await? {
            tracing::info!(account_id = account.id, "spam check suspending account");
            self.accounts
                .transition(account, StatusEvent::Suspend)
                .await?;
        }

        Ok(())
    }

    /// Revoke every non-expired token owned by the account; idempotent
    pub async fn revoke_authentication_tokens(&self, account: &Account) -> Result<u64> {
        self.accounts.revoke_authentication_tokens(account.id).await
    }

    /// Scrub personal data, keeping the row
    ///
    /// The avatar blob is removed asynchronously; a failure there is
    /// logged and retried by storage housekeeping, never surfaced here.
    pub async fn purge_personal_data(&self, account: &mut Account) -> Result<()> {
        let avatar_key = self.accounts.purge_personal_data(account).await?;
        if let Some(key) = avatar_key {
            self.schedule_avatar_purge(account.id, key);
        }

        Ok(())
    }

    /// Delete the account: revoke tokens, scrub personal data, and mark it
    /// deleted in one atomic transition
    pub async fn soft_destroy(&self, account: &mut Account) -> Result<()> {
        let avatar_key = self.accounts.soft_destroy(account).await?;
        if let Some(key) = avatar_key {
            self.schedule_avatar_purge(account.id, key);
        }

        Ok(())
    }

    /// Fire-and-forget avatar removal
    ///
    /// Must not block the transition that triggered it. Deletion is
    /// idempotent, so a retry after a failure is always safe.
    fn schedule_avatar_purge(&self, account_id: i64, key: String) {
        let avatars = Arc::clone(&self.avatars);
        tokio::spawn(async move {
            if let Err(e) = avatars.delete(&key).await {
                tracing::warn!(account_id, key, "failed to purge avatar: {}", e);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::{AccountStatus, NewAccount};
    use crate::avatar::DiskAvatarStore;
    use crate::clock::{Clock, ManualClock};
    use crate::config::AppConfig;
    use crate::db;
    use crate::spam::SpamClassifier;
    use chrono::{TimeZone, Utc};

    struct PhraseClassifier;

    impl SpamClassifier for PhraseClassifier {
        fn score(&self, text: &str) -> u32 {
            text.matches("buy now").count() as u32 * 100
        }
    }

    struct Fixture {
        accounts: Arc<AccountManager>,
        lifecycle: LifecycleManager,
        clock: Arc<ManualClock>,
        pool: sqlx::SqlitePool,
        avatar_dir: tempfile::TempDir,
    }

    async fn fixture_with_config(config: AppConfig) -> Fixture {
        let pool = db::memory_pool().await;
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap(),
        ));
        let accounts = Arc::new(AccountManager::new(
            pool.clone(),
            Arc::new(config),
            clock.clone(),
        ));
        let scorer = Arc::new(SpamScorer::new(accounts.clone(), Arc::new(PhraseClassifier)));
        let avatar_dir = tempfile::tempdir().unwrap();
        let avatars = Arc::new(DiskAvatarStore::new(avatar_dir.path().to_path_buf()));
        let lifecycle = LifecycleManager::new(accounts.clone(), scorer, avatars);

        Fixture {
            accounts,
            lifecycle,
            clock,
            pool,
            avatar_dir,
        }
    }

    async fn fixture() -> Fixture {
        fixture_with_config(AppConfig::default()).await
    }

    async fn make_account(accounts: &AccountManager) -> Account {
        accounts
            .create_account(&NewAccount {
                display_name: "Mapper One".to_string(),
                email: "mapper@example.com".to_string(),
                password: "correct horse battery".to_string(),
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn deletion_allowed_immediately_without_delay() {
        let f = fixture().await;
        let account = make_account(&f.accounts).await;

        let allowed_at = f.lifecycle.deletion_allowed_at(&account).await.unwrap();
        assert_eq!(allowed_at, account.created_at);
        assert!(f.lifecycle.deletion_allowed(&account).await.unwrap());
    }

    #[tokio::test]
    async fn deletion_delay_runs_from_last_closed_changeset() {
        let mut config = AppConfig::default();
        config.limits.account_deletion_delay_hours = Some(48);
        let f = fixture_with_config(config).await;
        let account = make_account(&f.accounts).await;

        // No changesets yet: the delay window starts at creation, which is
        // already in the past
        let allowed_at = f.lifecycle.deletion_allowed_at(&account).await.unwrap();
        assert_eq!(allowed_at, account.created_at);

        let closed_at = f.clock.now() - chrono::Duration::hours(2);
        for (created, closed) in [
            (f.clock.now(), Some(closed_at - chrono::Duration::hours(5))),
            (f.clock.now(), Some(closed_at)),
            (f.clock.now(), None),
        ] {
            sqlx::query(
                "INSERT INTO changesets (account_id, created_at, closed_at) VALUES (?1, ?2, ?3)",
            )
            .bind(account.id)
            .bind(created)
            .bind(closed)
            .execute(&f.pool)
            .await
            .unwrap();
        }

        let allowed_at = f.lifecycle.deletion_allowed_at(&account).await.unwrap();
        assert_eq!(allowed_at, closed_at + chrono::Duration::hours(48));
        assert!(!f.lifecycle.deletion_allowed(&account).await.unwrap());

        f.clock.advance(chrono::Duration::hours(47));
        assert!(f.lifecycle.deletion_allowed(&account).await.unwrap());
    }

    #[tokio::test]
    async fn on_save_suspends_a_spammy_pending_account() {
        let f = fixture().await;
        let mut account = make_account(&f.accounts).await;

        account.description = "buy now ".repeat(20); // scores 2000/4 = 500
        f.lifecycle.on_save(&mut account).await.unwrap();

        assert_eq!(account.status, AccountStatus::Suspended);
        let stored = f.accounts.get_account(account.id).await.unwrap();
        assert_eq!(stored.status, AccountStatus::Suspended);
    }

    #[tokio::test]
    async fn on_save_leaves_confirmed_accounts_alone() {
        let f = fixture().await;
        let mut account = make_account(&f.accounts).await;
        f.accounts
            .transition(&mut account, StatusEvent::Confirm)
            .await
            .unwrap();

        account.description = "buy now ".repeat(20);
        f.lifecycle.on_save(&mut account).await.unwrap();

        assert_eq!(account.status, AccountStatus::Confirmed);
    }

    #[tokio::test]
    async fn on_save_keeps_clean_accounts_untouched() {
        let f = fixture().await;
        let mut account = make_account(&f.accounts).await;

        account.description = "I map park benches".to_string();
        f.lifecycle.on_save(&mut account).await.unwrap();

        assert_eq!(account.status, AccountStatus::Pending);
    }

    #[tokio::test]
    async fn purge_removes_the_avatar_blob() {
        let f = fixture().await;
        let mut account = make_account(&f.accounts).await;

        f.lifecycle
            .avatars
            .put("abcdef", vec![1, 2, 3])
            .await
            .unwrap();
        account.avatar_key = Some("abcdef".to_string());
        f.accounts.save(&mut account).await.unwrap();

        f.lifecycle.purge_personal_data(&mut account).await.unwrap();
        assert!(account.avatar_key.is_none());

        // The purge task is fire-and-forget; give it a beat to run
        for _ in 0..50 {
            if !f.avatar_dir.path().join("ab").join("abcdef").exists() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert!(!f.avatar_dir.path().join("ab").join("abcdef").exists());
    }

    #[tokio::test]
    async fn soft_destroy_runs_the_full_sequence() {
        let f = fixture().await;
        let mut account = make_account(&f.accounts).await;
        f.accounts
            .create_access_token(account.id, None)
            .await
            .unwrap();

        f.lifecycle.soft_destroy(&mut account).await.unwrap();

        assert_eq!(account.status, AccountStatus::Deleted);
        assert!(f
            .accounts
            .active_tokens(account.id)
            .await
            .unwrap()
            .is_empty());
        let stored = f.accounts.get_account(account.id).await.unwrap();
        assert_eq!(stored.display_name, format!("user_{}", account.id));

        // Deleted is terminal for soft_destroy: a second call is illegal
        assert!(f.lifecycle.soft_destroy(&mut account).await.is_err());
    }

    #[tokio::test]
    async fn revoke_tokens_is_idempotent_through_the_facade() {
        let f = fixture().await;
        let account = make_account(&f.accounts).await;
        f.accounts
            .create_access_token(account.id, None)
            .await
            .unwrap();

        assert_eq!(
            f.lifecycle
                .revoke_authentication_tokens(&account)
                .await
                .unwrap(),
            1
        );
        assert_eq!(
            f.lifecycle
                .revoke_authentication_tokens(&account)
                .await
                .unwrap(),
            0
        );
    }
}
