use axum::{Json, extract::State, http::StatusCode};
use time::{Date, Duration, OffsetDateTime};
use tower_sessions::Session;

use crate::AppState;
use crate::auth::get_current_user;
use crate::models::{DeletionScheduleResponse, User};
use crate::utils::format_date;

async fn load_user(app_state: &AppState, user_id: &str) -> Result<User, (StatusCode, String)> {
    let users: Vec<User> = app_state.gateway.find_by_ids(&[user_id.to_string()]).await?;
    users
        .into_iter()
        .next()
        .ok_or((StatusCode::NOT_FOUND, "User not found".to_string()))
}

async fn save_user(app_state: &AppState, user: User) -> Result<User, (StatusCode, String)> {
    let saved = app_state
        .gateway
        .run_in_transaction(|tx| {
            Box::pin(async move {
                tx.save(&user).await?;
                Ok::<_, crate::gateway::GatewayError>(user)
            })
        })
        .await?;
    Ok(saved)
}

fn schedule_response(user: &User) -> Result<DeletionScheduleResponse, (StatusCode, String)> {
    let marked_for_deletion = user
        .marked_for_deletion
        .map(format_date)
        .transpose()?;
    Ok(DeletionScheduleResponse {
        marked_for_deletion,
    })
}

/// The day the account is removed, or `None` when it falls outside the
/// supported calendar.
pub fn deletion_date(today: Date, grace_days: i64) -> Option<Date> {
    today.checked_add(Duration::days(grace_days))
}

/// `POST /account/deletion`: schedules the requester's account for removal
/// once the grace period has passed. The deletion sweep removes it on that
/// exact date.
pub async fn mark_for_deletion(
    State(app_state): State<AppState>,
    session: Session,
) -> Result<(StatusCode, Json<DeletionScheduleResponse>), (StatusCode, String)> {
    let current = get_current_user(&session).await?;
    let mut user = load_user(&app_state, &current.id).await?;

    if user.marked_for_deletion.is_some() {
        return Err((
            StatusCode::CONFLICT,
            "Account already marked for deletion".to_string(),
        ));
    }

    let today = OffsetDateTime::now_utc().date();
    let marked = deletion_date(today, app_state.deletion_grace_days).ok_or((
        StatusCode::INTERNAL_SERVER_ERROR,
        "Deletion date is out of range".to_string(),
    ))?;
    user.marked_for_deletion = Some(marked);
    let user = save_user(&app_state, user).await?;

    tracing::info!(
        user_id = %user.id,
        marked_for_deletion = ?user.marked_for_deletion,
        "account marked for deletion"
    );

    Ok((StatusCode::OK, Json(schedule_response(&user)?)))
}

/// `DELETE /account/deletion`: withdraws a pending deletion.
pub async fn cancel_deletion(
    State(app_state): State<AppState>,
    session: Session,
) -> Result<(StatusCode, Json<DeletionScheduleResponse>), (StatusCode, String)> {
    let current = get_current_user(&session).await?;
    let mut user = load_user(&app_state, &current.id).await?;

    if user.marked_for_deletion.is_none() {
        return Err((
            StatusCode::NOT_FOUND,
            "Account is not marked for deletion".to_string(),
        ));
    }

    user.marked_for_deletion = None;
    let user = save_user(&app_state, user).await?;

    tracing::info!(user_id = %user.id, "account deletion cancelled");

    Ok((StatusCode::OK, Json(schedule_response(&user)?)))
}
