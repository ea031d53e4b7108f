/// Rate limiting
///
/// Per-account hourly quotas derived from account age, recent inbound
/// activity, and open moderation reports. Quotas are recomputed on every
/// call and never persisted; a small race window between a check and a
/// concurrent new message is acceptable because the quotas are advisory.
use crate::{
    account::{AccountManager, RoleSet},
    db::account::Account,
    error::Result,
};
use chrono::Duration;
use std::sync::Arc;

/// Rate limiter service
pub struct RateLimiter {
    accounts: Arc<AccountManager>,
}

impl RateLimiter {
    pub fn new(accounts: Arc<AccountManager>) -> Self {
        Self { accounts }
    }

    /// Messages the account may send in the next hour
    ///
    /// Grows one per hour of account age plus one per message received in
    /// the last hour; each active report costs ten.
    pub async fn max_messages_per_hour(&self, account: &Account) -> Result<i64> {
        let now = self.accounts.clock().now();
        let age_hours = age_in_hours(now - account.created_at);
        let recent = self
            .accounts
            .messages_received_since(account.id, now - Duration::hours(1))
            .await?;
        let active_reports = self.accounts.active_reports(account.id).await?;

        let max = age_hours + recent - active_reports * 10;
        Ok(max.clamp(0, self.accounts.config().limits.max_messages_per_hour))
    }

    /// Follows the account may create in the next hour
    pub async fn max_follows_per_hour(&self, account: &Account) -> Result<i64> {
        let now = self.accounts.clock().now();
        let age_hours = age_in_hours(now - account.created_at);
        let recent = self
            .accounts
            .follows_received_since(account.id, now - Duration::hours(1))
            .await?;
        let active_reports = self.accounts.active_reports(account.id).await?;

        let max = age_hours + recent - active_reports * 10;
        Ok(max.clamp(0, self.accounts.config().limits.max_follows_per_hour))
    }

    /// Changeset comments the account may post in the next hour
    ///
    /// Moderators get a fixed allowance. Everyone else earns quota with
    /// comment history and loses half of it per active report.
    pub async fn max_changeset_comments_per_hour(
        &self,
        account: &Account,
        roles: &RoleSet,
    ) -> Result<i64> {
        let limits = &self.accounts.config().limits;

        if roles.is_moderator() {
            return Ok(limits.moderator_changeset_comments_per_hour);
        }

        let cap = limits.comments_to_max_changeset_comments;
        let previous = self
            .accounts
            .recent_changeset_comment_count(account.id, cap)
            .await?;

        let earned = (previous as f64 / cap as f64 * limits.max_changeset_comments_per_hour as f64)
            .floor() as i64;
        let earned = earned.clamp(
            limits.initial_changeset_comments_per_hour,
            limits.max_changeset_comments_per_hour,
        );

        let active_reports = self.accounts.active_reports(account.id).await?;
        // Integer division by 2^active_reports
        let halved = if active_reports >= i64::BITS as i64 {
            0
        } else {
            earned >> active_reports
        };

        Ok(halved.clamp(
            limits.min_changeset_comments_per_hour,
            limits.max_changeset_comments_per_hour,
        ))
    }
}

/// Account age in whole hours, rounded up
fn age_in_hours(age: Duration) -> i64 {
    (age.num_seconds() as f64 / 3600.0).ceil() as i64
}
