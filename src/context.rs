/// Application context and dependency injection
use crate::{
    account::AccountManager,
    auth::Authenticator,
    avatar::{AvatarStore, DiskAvatarStore},
    clock::{Clock, SystemClock},
    config::AppConfig,
    db,
    error::Result,
    lifecycle::LifecycleManager,
    rate_limit::RateLimiter,
    spam::{SpamClassifier, SpamScorer},
};
use sqlx::SqlitePool;
use std::sync::Arc;

/// Application context holding all shared services
///
/// The composition root the web layer builds once at startup. The spam
/// classifier is always injected; the clock and avatar store default to
/// the real implementations.
#[derive(Clone)]
pub struct CoreContext {
    pub config: Arc<AppConfig>,
    pub db: SqlitePool,
    pub accounts: Arc<AccountManager>,
    pub authenticator: Arc<Authenticator>,
    pub spam_scorer: Arc<SpamScorer>,
    pub rate_limiter: Arc<RateLimiter>,
    pub lifecycle: Arc<LifecycleManager>,
}

impl CoreContext {
    /// Create a context with the system clock and disk avatar storage
    pub async fn new(config: AppConfig, classifier: Arc<dyn SpamClassifier>) -> Result<Self> {
        let avatars = Arc::new(DiskAvatarStore::new(config.avatar.storage_directory.clone()));
        Self::assemble(config, classifier, avatars, Arc::new(SystemClock)).await
    }

    /// Create a context with explicit collaborators
    pub async fn assemble(
        config: AppConfig,
        classifier: Arc<dyn SpamClassifier>,
        avatars: Arc<dyn AvatarStore>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;

        let pool = db::create_pool(&config.database.path, db::DatabaseOptions::default()).await?;
        db::run_migrations(&pool).await?;
        db::test_connection(&pool).await?;

        let config = Arc::new(config);
        let accounts = Arc::new(AccountManager::new(pool.clone(), config.clone(), clock));
        let authenticator = Arc::new(Authenticator::new(accounts.clone()));
        let spam_scorer = Arc::new(SpamScorer::new(accounts.clone(), classifier));
        let rate_limiter = Arc::new(RateLimiter::new(accounts.clone()));
        let lifecycle = Arc::new(LifecycleManager::new(
            accounts.clone(),
            spam_scorer.clone(),
            avatars,
        ));

        Ok(Self {
            config,
            db: pool,
            accounts,
            authenticator,
            spam_scorer,
            rate_limiter,
            lifecycle,
        })
    }
}
