//! Report endpoints. Each request reads only the requester's own rows and
//! hands them to the aggregator.

use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
};
use time::OffsetDateTime;
use tower_sessions::Session;

use crate::AppState;
use crate::aggregator::{self, Buckets};
use crate::auth::get_current_user;
use crate::constants::{CATEGORIES_TABLE, SUBSCRIPTIONS_TABLE, TRANSACTIONS_TABLE};
use crate::gateway::{Filter, Gateway, GatewayError, Sort};
use crate::models::{
    BudgetSummary, Category, CategoryBreakdown, OverviewStats, ReportQuery, ReportResponse,
    Subscription, Transaction,
};

type ReportResult<T> = Result<(StatusCode, Json<ReportResponse<T>>), (StatusCode, String)>;

/// The owner's transactions with `start_date <= processed_at <= end_date`.
/// Both bounds are compared as given, without validation.
pub async fn transactions_in_window(
    gateway: &Gateway,
    owner: &str,
    query: &ReportQuery,
) -> Result<Vec<Transaction>, GatewayError> {
    gateway.require_table(TRANSACTIONS_TABLE).await?;
    gateway
        .find_by_filter(
            &Filter::new()
                .eq("owner", owner)
                .gte("processed_at", query.start_date.as_str())
                .lte("processed_at", query.end_date.as_str()),
            Sort::parse("-processed_at"),
            None,
            0,
        )
        .await
}

/// The owner's unpaused subscriptions that execute later this month.
pub async fn upcoming_subscriptions(
    gateway: &Gateway,
    owner: &str,
    now: OffsetDateTime,
) -> Result<Vec<Subscription>, GatewayError> {
    gateway.require_table(SUBSCRIPTIONS_TABLE).await?;
    gateway
        .find_by_filter(
            &Filter::new()
                .eq("owner", owner)
                .eq("paused", 0i64)
                .gt("execute_at", i64::from(now.day())),
            Sort::parse("-execute_at"),
            None,
            0,
        )
        .await
}

async fn collect_buckets(
    gateway: &Gateway,
    owner: &str,
    query: &ReportQuery,
) -> Result<Buckets, GatewayError> {
    let now = OffsetDateTime::now_utc();
    let transactions = transactions_in_window(gateway, owner, query).await?;
    let subscriptions = upcoming_subscriptions(gateway, owner, now).await?;
    Ok(Buckets::collect(&transactions, &subscriptions, now))
}

fn respond<T>(query: ReportQuery, report: T) -> ReportResult<T> {
    Ok((
        StatusCode::OK,
        Json(ReportResponse {
            start_date: query.start_date,
            end_date: query.end_date,
            report,
        }),
    ))
}

/// `GET /transactions/stats`
pub async fn transaction_stats(
    State(app_state): State<AppState>,
    session: Session,
    Query(query): Query<ReportQuery>,
) -> ReportResult<OverviewStats> {
    let user = get_current_user(&session).await?;

    let buckets = collect_buckets(&app_state.gateway, &user.id, &query).await?;

    respond(query, aggregator::overview(&buckets))
}

/// `GET /transactions/budget`
pub async fn transaction_budget(
    State(app_state): State<AppState>,
    session: Session,
    Query(query): Query<ReportQuery>,
) -> ReportResult<BudgetSummary> {
    let user = get_current_user(&session).await?;

    let buckets = collect_buckets(&app_state.gateway, &user.id, &query).await?;

    respond(query, aggregator::budget(&buckets))
}

/// `GET /categories/stats`
pub async fn category_stats(
    State(app_state): State<AppState>,
    session: Session,
    Query(query): Query<ReportQuery>,
) -> ReportResult<CategoryBreakdown> {
    let user = get_current_user(&session).await?;
    let gateway = &app_state.gateway;

    let transactions = transactions_in_window(gateway, &user.id, &query).await?;

    gateway.require_table(CATEGORIES_TABLE).await?;
    let categories: Vec<Category> = gateway
        .find_by_ids(&aggregator::category_ids(&transactions))
        .await?;

    respond(
        query,
        aggregator::category_breakdown(&transactions, &categories),
    )
}
