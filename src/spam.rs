/// Spam scoring
///
/// Produces a single signed score per account: diary and report activity
/// push it up, changesets and traces pull it down. The constants are
/// long-tuned policy; an apparent asymmetry (scores can go arbitrarily
/// negative with enough changesets) is intentional.
use crate::{
    account::{may, AccountManager, StatusEvent},
    db::account::Account,
    error::Result,
};
use chrono::Duration;
use std::sync::Arc;

/// Opaque free-text spam classifier
///
/// Returns a non-negative sub-score for a piece of text. The scoring model
/// itself lives outside this crate.
pub trait SpamClassifier: Send + Sync {
    fn score(&self, text: &str) -> u32;
}

/// Spam scorer service
pub struct SpamScorer {
    accounts: Arc<AccountManager>,
    classifier: Arc<dyn SpamClassifier>,
}

impl SpamScorer {
    pub fn new(accounts: Arc<AccountManager>, classifier: Arc<dyn SpamClassifier>) -> Self {
        Self {
            accounts,
            classifier,
        }
    }

    /// Compute the account's spam score
    ///
    /// Truncated toward zero; may be negative.
    pub async fn score(&self, account: &Account) -> Result<i64> {
        let entry_bodies = self
            .accounts
            .visible_diary_entry_bodies(account.id)
            .await?;
        let comment_bodies = self
            .accounts
            .visible_diary_comment_bodies(account.id)
            .await?;
        let day_ago = self.accounts.clock().now() - Duration::days(1);
        let recent_entries = self
            .accounts
            .visible_diary_entries_since(account.id, day_ago)
            .await?;
        let reporters = self.accounts.spam_issue_reporters(account.id).await?;

        let changeset_score = account.changesets_count * 50;
        let trace_score = account.traces_count * 50;
        let entry_score: i64 = entry_bodies
            .iter()
            .map(|body| self.classifier.score(body) as i64)
            .sum();
        let comment_score: i64 = comment_bodies
            .iter()
            .map(|body| self.classifier.score(body) as i64)
            .sum();

        let mut score = self.classifier.score(&account.description) as f64 / 4.0;
        score += (recent_entries * 10) as f64;
        if !entry_bodies.is_empty() {
            score += (entry_score / entry_bodies.len() as i64) as f64;
        }
        if !comment_bodies.is_empty() {
            score += (comment_score / comment_bodies.len() as i64) as f64;
        }
        score += (reporters * 20) as f64;
        score -= changeset_score as f64;
        score -= trace_score as f64;

        Ok(score.trunc() as i64)
    }

    /// Whether the account should be automatically suspended
    ///
    /// Only statuses with a legal suspend edge are eligible; a confirmed
    /// account keeps its score but is never auto-suspended.
    pub async fn should_suspend(&self, account: &Account) -> Result<bool> {
        if !may(account.status, StatusEvent::Suspend) {
            return Ok(false);
        }

        let threshold = self.accounts.config().limits.spam_threshold;
        Ok(self.score(account).await? > threshold)
    }
}
