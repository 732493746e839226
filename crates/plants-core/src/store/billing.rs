use super::{parse_col, SqliteStore};
use crate::error::{PlantsError, Result};
use crate::types::{BillingProvider, PlanTier, SubscriptionStatus};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

const SUBSCRIPTION_COLUMNS: &str =
    "user_id, provider, external_id, customer_id, status, current_period_end, updated_at";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    pub user_id: String,
    pub provider: BillingProvider,
    /// Subscription id at the processor.
    pub external_id: String,
    pub customer_id: Option<String>,
    pub status: SubscriptionStatus,
    pub current_period_end: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl Subscription {
    /// Active and trialing subscriptions are pro. A past-due or canceled one
    /// stays pro until the period already paid for runs out.
    pub fn tier_at(&self, now: DateTime<Utc>) -> PlanTier {
        match self.status {
            SubscriptionStatus::Active | SubscriptionStatus::Trialing => PlanTier::Pro,
            SubscriptionStatus::PastDue | SubscriptionStatus::Canceled => match self.current_period_end {
                Some(end) if end > now => PlanTier::Pro,
                _ => PlanTier::Free,
            },
        }
    }
}

/// A normalized subscription change parsed from either processor's webhook.
#[derive(Debug, Clone, PartialEq)]
pub struct SubscriptionUpdate {
    pub user_id: String,
    pub provider: BillingProvider,
    pub external_id: String,
    pub customer_id: Option<String>,
    pub status: SubscriptionStatus,
    pub current_period_end: Option<DateTime<Utc>>,
}

/// Result of recording a processor webhook event.
#[derive(Debug, Clone, PartialEq)]
pub enum BillingEventOutcome {
    /// The event id was seen before; nothing was written.
    Duplicate,
    /// The event id was stored without a subscription change.
    Recorded,
    Applied(Subscription),
}

fn subscription_from_row(row: &Row<'_>) -> rusqlite::Result<Subscription> {
    Ok(Subscription {
        user_id: row.get(0)?,
        provider: parse_col(row, 1)?,
        external_id: row.get(2)?,
        customer_id: row.get(3)?,
        status: parse_col(row, 4)?,
        current_period_end: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

impl SqliteStore {
    pub fn get_subscription(&self, user_id: &str) -> Result<Option<Subscription>> {
        Ok(self
            .conn
            .query_row(
                &format!("SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions WHERE user_id = ?1"),
                params![user_id],
                subscription_from_row,
            )
            .optional()?)
    }

    /// One subscription per user; the latest update wins. A customer id
    /// already on file survives updates that omit it.
    pub fn upsert_subscription(&mut self, update: &SubscriptionUpdate, now: DateTime<Utc>) -> Result<Subscription> {
        write_subscription(&self.conn, update, now)?;
        self.subscription_written(update)
    }

    fn subscription_written(&self, update: &SubscriptionUpdate) -> Result<Subscription> {
        tracing::info!(
            user_id = %update.user_id,
            provider = %update.provider,
            status = %update.status,
            "subscription updated"
        );
        self.get_subscription(&update.user_id)?
            .ok_or_else(|| PlantsError::UserNotFound(update.user_id.clone()))
    }

    /// Processor webhooks for later lifecycle events may only carry the
    /// subscription id.
    pub fn find_subscription_by_external(
        &self,
        provider: BillingProvider,
        external_id: &str,
    ) -> Result<Option<Subscription>> {
        Ok(self
            .conn
            .query_row(
                &format!(
                    "SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions
                     WHERE provider = ?1 AND external_id = ?2"
                ),
                params![provider.as_str(), external_id],
                subscription_from_row,
            )
            .optional()?)
    }

    pub fn effective_tier(&self, user_id: &str, now: DateTime<Utc>) -> Result<PlanTier> {
        Ok(self
            .get_subscription(user_id)?
            .map(|s| s.tier_at(now))
            .unwrap_or(PlanTier::Free))
    }

    /// Store the event id and apply its subscription change in one
    /// transaction. When the change cannot be written the event id is not
    /// kept either, so a redelivery is applied rather than ignored.
    pub fn record_billing_event(
        &mut self,
        provider: BillingProvider,
        event_id: &str,
        update: Option<&SubscriptionUpdate>,
        now: DateTime<Utc>,
    ) -> Result<BillingEventOutcome> {
        let tx = self.conn.transaction()?;
        let inserted = tx.execute(
            "INSERT OR IGNORE INTO billing_events(provider, event_id, received_at) VALUES (?1, ?2, ?3)",
            params![provider.as_str(), event_id, now],
        )?;
        if inserted == 0 {
            return Ok(BillingEventOutcome::Duplicate);
        }
        if let Some(update) = update {
            write_subscription(&tx, update, now)?;
        }
        tx.commit()?;
        match update {
            Some(update) => Ok(BillingEventOutcome::Applied(self.subscription_written(update)?)),
            None => Ok(BillingEventOutcome::Recorded),
        }
    }
}

fn write_subscription(conn: &Connection, update: &SubscriptionUpdate, now: DateTime<Utc>) -> Result<()> {
    let known: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM users WHERE id = ?1",
            params![update.user_id],
            |row| row.get(0),
        )
        .optional()?;
    if known.is_none() {
        return Err(PlantsError::UserNotFound(update.user_id.clone()));
    }
    conn.execute(
        "INSERT INTO subscriptions(user_id, provider, external_id, customer_id, status,
                                   current_period_end, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         ON CONFLICT(user_id) DO UPDATE SET
           provider = excluded.provider,
           external_id = excluded.external_id,
           customer_id = COALESCE(excluded.customer_id, subscriptions.customer_id),
           status = excluded.status,
           current_period_end = COALESCE(excluded.current_period_end, subscriptions.current_period_end),
           updated_at = excluded.updated_at",
        params![
            update.user_id,
            update.provider.as_str(),
            update.external_id,
            update.customer_id,
            update.status.as_str(),
            update.current_period_end,
            now
        ],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use chrono::Duration;

    fn update(status: SubscriptionStatus, period_end: Option<DateTime<Utc>>) -> SubscriptionUpdate {
        SubscriptionUpdate {
            user_id: "owner".into(),
            provider: BillingProvider::Stripe,
            external_id: "sub_123".into(),
            customer_id: None,
            status,
            current_period_end: period_end,
        }
    }

    #[test]
    fn tier_follows_status_and_period() {
        let mut store = store_with_user("owner");
        assert_eq!(store.effective_tier("owner", now()).unwrap(), PlanTier::Free);

        store
            .upsert_subscription(&update(SubscriptionStatus::Active, None), now())
            .unwrap();
        assert_eq!(store.effective_tier("owner", now()).unwrap(), PlanTier::Pro);

        let end = now() + Duration::days(10);
        store
            .upsert_subscription(&update(SubscriptionStatus::Canceled, Some(end)), now())
            .unwrap();
        assert_eq!(store.effective_tier("owner", now()).unwrap(), PlanTier::Pro);
        assert_eq!(
            store.effective_tier("owner", end + Duration::seconds(1)).unwrap(),
            PlanTier::Free
        );
    }

    #[test]
    fn customer_id_survives_partial_updates() {
        let mut store = store_with_user("owner");
        let mut first = update(SubscriptionStatus::Active, None);
        first.customer_id = Some("cus_1".into());
        store.upsert_subscription(&first, now()).unwrap();
        let second = store
            .upsert_subscription(&update(SubscriptionStatus::PastDue, None), now())
            .unwrap();
        assert_eq!(second.customer_id.as_deref(), Some("cus_1"));
        assert_eq!(second.status, SubscriptionStatus::PastDue);

        let found = store
            .find_subscription_by_external(BillingProvider::Stripe, "sub_123")
            .unwrap()
            .unwrap();
        assert_eq!(found.user_id, "owner");
        assert!(store
            .find_subscription_by_external(BillingProvider::LemonSqueezy, "sub_123")
            .unwrap()
            .is_none());
    }

    #[test]
    fn unknown_user_is_rejected() {
        let mut store = store_with_user("owner");
        let mut stray = update(SubscriptionStatus::Active, None);
        stray.user_id = "ghost".into();
        assert!(store.upsert_subscription(&stray, now()).is_err());
    }

    #[test]
    fn billing_events_are_deduplicated() {
        let mut store = store_with_user("owner");
        let change = update(SubscriptionStatus::Active, None);
        let first = store
            .record_billing_event(BillingProvider::Stripe, "evt_1", Some(&change), now())
            .unwrap();
        assert!(matches!(first, BillingEventOutcome::Applied(ref s) if s.status == SubscriptionStatus::Active));
        assert_eq!(
            store
                .record_billing_event(BillingProvider::Stripe, "evt_1", Some(&change), now())
                .unwrap(),
            BillingEventOutcome::Duplicate
        );
        assert_eq!(
            store
                .record_billing_event(BillingProvider::LemonSqueezy, "evt_1", None, now())
                .unwrap(),
            BillingEventOutcome::Recorded
        );
    }

    #[test]
    fn failed_change_leaves_event_open_for_redelivery() {
        let mut store = store_with_user("owner");
        let mut early = update(SubscriptionStatus::Active, None);
        early.user_id = "late_user".into();
        assert!(matches!(
            store.record_billing_event(BillingProvider::Stripe, "evt_9", Some(&early), now()),
            Err(PlantsError::UserNotFound(_))
        ));
        assert!(store.get_subscription("late_user").unwrap().is_none());

        add_user(&mut store, "late_user");
        let redelivered = store
            .record_billing_event(BillingProvider::Stripe, "evt_9", Some(&early), now())
            .unwrap();
        let BillingEventOutcome::Applied(sub) = redelivered else {
            panic!("expected the redelivered event to apply, got {redelivered:?}");
        };
        assert_eq!(sub.user_id, "late_user");
        assert_eq!(store.effective_tier("late_user", now()).unwrap(), PlanTier::Pro);
    }
}
