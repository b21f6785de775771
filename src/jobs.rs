//! The two daily maintenance jobs: materializing due subscriptions and
//! sweeping accounts whose deletion date has arrived.
//!
//! Each run does all of its writes in one transaction. A failing write rolls
//! the whole run back and the error is returned to the scheduler; the next
//! scheduled firing is the only retry.

use time::{Date, OffsetDateTime};
use uuid::Uuid;

use crate::constants::{SUBSCRIPTIONS_TABLE, USERS_TABLE};
use crate::gateway::{Filter, Gateway, GatewayError, Sort};
use crate::models::{Subscription, Transaction, User};
use crate::utils::format_date;

#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

/// Creates one transaction for every unpaused subscription whose
/// `execute_at` equals today's day of the month. Returns the created
/// transactions.
///
/// Running twice on the same day materializes the same subscriptions twice.
/// Subscriptions set to a day the current month does not have (29-31 in
/// short months) are not picked up that month.
pub async fn process_recurring_payments(
    gateway: &Gateway,
    now: OffsetDateTime,
) -> Result<Vec<Transaction>, JobError> {
    gateway.require_table(SUBSCRIPTIONS_TABLE).await?;

    let today = now.day();
    warn_about_skipped_days(now.date());

    let due: Vec<Subscription> = gateway
        .find_by_filter(
            &Filter::new()
                .eq("paused", 0i64)
                .eq("execute_at", i64::from(today)),
            Sort::parse("-execute_at"),
            None,
            0,
        )
        .await?;

    tracing::info!(day = today, due = due.len(), "processing recurring payments");

    let transactions: Vec<Transaction> = due
        .iter()
        .map(|subscription| subscription.materialize(Uuid::new_v4().to_string(), now))
        .collect();

    let created = gateway
        .run_in_transaction(|tx| {
            Box::pin(async move {
                for transaction in &transactions {
                    tx.save(transaction).await?;
                    tracing::info!(
                        transaction_id = %transaction.id,
                        owner = %transaction.owner,
                        "transaction created"
                    );
                }
                Ok::<_, JobError>(transactions)
            })
        })
        .await?;

    Ok(created)
}

/// Deletes every user whose `marked_for_deletion` is exactly `today`. Their
/// transactions and subscriptions are left in place. Returns the ids of the
/// deleted users.
pub async fn delete_marked_users(gateway: &Gateway, today: Date) -> Result<Vec<String>, JobError> {
    gateway.require_table(USERS_TABLE).await?;

    let marked: Vec<User> = gateway
        .find_by_filter(
            &Filter::new().eq("marked_for_deletion", format_date(today)?),
            Sort::parse("-marked_for_deletion"),
            None,
            0,
        )
        .await?;

    tracing::info!(date = %today, marked = marked.len(), "sweeping users marked for deletion");

    let deleted = gateway
        .run_in_transaction(|tx| {
            Box::pin(async move {
                let mut deleted = Vec::with_capacity(marked.len());
                for user in &marked {
                    tx.delete(user).await?;
                    tracing::info!(user_id = %user.id, "user deleted");
                    deleted.push(user.id.clone());
                }
                Ok::<_, JobError>(deleted)
            })
        })
        .await?;

    Ok(deleted)
}

fn is_last_day_of_month(today: Date) -> bool {
    today
        .next_day()
        .map_or(true, |next| next.month() != today.month())
}

/// Whether `today` closes a month with fewer than 31 days, leaving the later
/// days unmatched this month.
fn skips_days_this_month(today: Date) -> bool {
    is_last_day_of_month(today) && today.day() < 31
}

fn warn_about_skipped_days(today: Date) {
    if skips_days_this_month(today) {
        tracing::warn!(
            skipped_from = today.day() + 1,
            "subscriptions executing after day {} are not processed this month",
            today.day()
        );
    }
}
