/// Recurring payment processing: due subscriptions become transactions in
/// one all-or-nothing run.
mod common;

use budget_buddy_server::{
    GatewayError, Job, JobHealth, Scheduler,
    gateway::{Filter, Sort},
    jobs::{self, JobError},
    models::Transaction,
    scheduler::{JobOutcome, Schedule},
};
use time::macros::{datetime, time};

use common::{count_rows, insert, setup_gateway, subscription};

const RUN_AT: time::OffsetDateTime = datetime!(2026-10-15 01:30 UTC);

#[tokio::test]
async fn due_subscriptions_are_materialized() {
    let gateway = setup_gateway().await.expect("setup failed");

    let rent = insert(&gateway, subscription("alice", -950.0, 15, false))
        .await
        .expect("insert subscription");
    insert(&gateway, subscription("alice", -12.0, 16, false))
        .await
        .expect("insert subscription");
    insert(&gateway, subscription("bobby", 2400.0, 15, false))
        .await
        .expect("insert subscription");

    let created = jobs::process_recurring_payments(&gateway, RUN_AT)
        .await
        .expect("run succeeds");

    assert_eq!(created.len(), 2);

    let stored: Vec<Transaction> = gateway
        .find_by_filter(
            &Filter::new().eq("owner", "alice"),
            Sort::parse("-processed_at"),
            None,
            0,
        )
        .await
        .expect("query transactions");
    assert_eq!(stored.len(), 1);

    let tx = &stored[0];
    assert_eq!(tx.owner, rent.owner);
    assert_eq!(tx.category, rent.category);
    assert_eq!(tx.payment_method, rent.payment_method);
    assert_eq!(tx.receiver, rent.receiver);
    assert_eq!(tx.information, rent.information);
    assert_eq!(tx.transfer_amount, -950.0);
    assert_eq!(tx.processed_at, RUN_AT);
    assert_ne!(tx.id, rent.id);

    // Subscriptions are templates and stay untouched.
    assert_eq!(count_rows(&gateway, "subscriptions").await.unwrap(), 3);
}

#[tokio::test]
async fn paused_subscriptions_are_skipped() {
    let gateway = setup_gateway().await.expect("setup failed");

    insert(&gateway, subscription("alice", -30.0, 15, true))
        .await
        .expect("insert subscription");

    let created = jobs::process_recurring_payments(&gateway, RUN_AT)
        .await
        .expect("run succeeds");

    assert!(created.is_empty());
    assert_eq!(count_rows(&gateway, "transactions").await.unwrap(), 0);
}

#[tokio::test]
async fn running_twice_on_the_same_day_duplicates_transactions() {
    // There is no dedup guard: every run materializes every due subscription.
    let gateway = setup_gateway().await.expect("setup failed");
    insert(&gateway, subscription("alice", -9.99, 15, false))
        .await
        .expect("insert subscription");

    jobs::process_recurring_payments(&gateway, RUN_AT)
        .await
        .expect("first run");
    jobs::process_recurring_payments(&gateway, RUN_AT)
        .await
        .expect("second run");

    assert_eq!(count_rows(&gateway, "transactions").await.unwrap(), 2);
}

#[tokio::test]
async fn day_31_subscriptions_are_not_processed_in_short_months() {
    let gateway = setup_gateway().await.expect("setup failed");
    insert(&gateway, subscription("alice", -100.0, 31, false))
        .await
        .expect("insert subscription");

    // November has 30 days; its last day does not pick up day 31.
    let created = jobs::process_recurring_payments(&gateway, datetime!(2026-11-30 01:30 UTC))
        .await
        .expect("run succeeds");
    assert!(created.is_empty());

    let created = jobs::process_recurring_payments(&gateway, datetime!(2026-12-31 01:30 UTC))
        .await
        .expect("run succeeds");
    assert_eq!(created.len(), 1);
}

#[tokio::test]
async fn failing_write_rolls_back_the_whole_run() {
    let gateway = setup_gateway().await.expect("setup failed");

    insert(&gateway, subscription("alice", -10.0, 15, false))
        .await
        .expect("insert subscription");
    let mut broken = subscription("alice", -20.0, 15, false);
    broken.receiver = "reject-me".to_string();
    insert(&gateway, broken).await.expect("insert subscription");
    insert(&gateway, subscription("bobby", -30.0, 15, false))
        .await
        .expect("insert subscription");

    {
        let conn = gateway.db().write().await;
        conn.execute(
            "CREATE TRIGGER reject_insert BEFORE INSERT ON transactions \
             WHEN NEW.receiver = 'reject-me' \
             BEGIN SELECT RAISE(ABORT, 'rejected'); END;",
            (),
        )
        .await
        .expect("create trigger");
    }

    let result = jobs::process_recurring_payments(&gateway, RUN_AT).await;

    assert!(matches!(
        result,
        Err(JobError::Gateway(GatewayError::Write(_)))
    ));
    assert_eq!(count_rows(&gateway, "transactions").await.unwrap(), 0);
}

#[tokio::test]
async fn missing_subscriptions_table_fails_the_run() {
    let gateway = setup_gateway().await.expect("setup failed");
    {
        let conn = gateway.db().write().await;
        conn.execute("DROP TABLE subscriptions", ())
            .await
            .expect("drop table");
    }

    let result = jobs::process_recurring_payments(&gateway, RUN_AT).await;

    assert!(matches!(
        result,
        Err(JobError::Gateway(GatewayError::MissingTable(ref table))) if table == "subscriptions"
    ));
}

#[tokio::test]
async fn scheduler_records_job_outcomes() {
    let gateway = setup_gateway().await.expect("setup failed");
    let health = JobHealth::new();
    let scheduler = Scheduler::new(
        gateway.clone(),
        health.clone(),
        Schedule {
            deletion_sweep_at: time!(00:30),
            recurring_payments_at: time!(01:30),
        },
    );

    insert(&gateway, subscription("alice", -5.0, 15, false))
        .await
        .expect("insert subscription");

    let affected = scheduler
        .run_at(Job::RecurringPayments, RUN_AT)
        .await
        .expect("run succeeds");
    assert_eq!(affected, 1);

    let run = health
        .last_run(Job::RecurringPayments)
        .await
        .expect("run recorded");
    assert_eq!(run.outcome, JobOutcome::Succeeded { affected: 1 });

    {
        let conn = gateway.db().write().await;
        conn.execute("DROP TABLE subscriptions", ())
            .await
            .expect("drop table");
    }

    assert!(scheduler.run_at(Job::RecurringPayments, RUN_AT).await.is_err());

    let run = health
        .last_run(Job::RecurringPayments)
        .await
        .expect("run recorded");
    assert!(matches!(run.outcome, JobOutcome::Failed { .. }));
    // Earlier transactions are unaffected by the failed run.
    assert_eq!(count_rows(&gateway, "transactions").await.unwrap(), 1);
}
