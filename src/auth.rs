use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
};
use axum::{Json, extract::State, http::StatusCode};
use password_hash::rand_core::OsRng;
use tower_sessions::Session;
use uuid::Uuid;

use crate::AppState;
use crate::constants::*;
use crate::gateway::{Filter, GatewayError, Sort};
use crate::models::{LoginPayload, PublicUser, RegisterPayload, User};
use crate::utils::{db_error, db_error_with_context, validate_string_length};

const SESSION_USER_KEY: &str = "user";

pub fn validate_username(username: &str) -> Result<(), (StatusCode, String)> {
    validate_string_length(username, "Username", MAX_USERNAME_LENGTH)?;
    if username.trim().len() < MIN_USERNAME_LENGTH {
        return Err((
            StatusCode::BAD_REQUEST,
            format!(
                "Username must be at least {} characters",
                MIN_USERNAME_LENGTH
            ),
        ));
    }
    Ok(())
}

pub fn validate_password(password: &str) -> Result<(), (StatusCode, String)> {
    if password.len() < MIN_PASSWORD_LENGTH {
        return Err((
            StatusCode::BAD_REQUEST,
            format!(
                "Password must be at least {} characters",
                MIN_PASSWORD_LENGTH
            ),
        ));
    }
    Ok(())
}

/// The authenticated requester stored in the session. Every report query is
/// scoped to this user's id.
pub async fn get_current_user(session: &Session) -> Result<PublicUser, (StatusCode, String)> {
    session
        .get::<PublicUser>(SESSION_USER_KEY)
        .await
        .map_err(|_| (StatusCode::UNAUTHORIZED, ERR_INVALID_SESSION.to_string()))?
        .ok_or((StatusCode::UNAUTHORIZED, ERR_UNAUTHORIZED.to_string()))
}

async fn find_user_by_username(
    app_state: &AppState,
    username: &str,
) -> Result<Option<User>, (StatusCode, String)> {
    let users: Vec<User> = app_state
        .gateway
        .find_by_filter(
            &Filter::new().eq("username", username),
            Sort::parse("username"),
            Some(1),
            0,
        )
        .await?;
    Ok(users.into_iter().next())
}

/// A concurrent registration can claim the username between the lookup and
/// the insert; the UNIQUE constraint then decides.
fn registration_error(e: GatewayError) -> (StatusCode, String) {
    if e.is_unique_violation() {
        return (StatusCode::CONFLICT, "Username already exists".to_string());
    }
    tracing::error!(error = %e, "user creation failed");
    db_error()
}

pub async fn register(
    State(app_state): State<AppState>,
    Json(payload): Json<RegisterPayload>,
) -> Result<(StatusCode, Json<PublicUser>), (StatusCode, String)> {
    validate_username(&payload.username)?;
    validate_password(&payload.password)?;
    let username = payload.username.trim().to_string();

    if find_user_by_username(&app_state, &username).await?.is_some() {
        return Err((StatusCode::CONFLICT, "Username already exists".to_string()));
    }

    let salt = SaltString::generate(&mut OsRng);
    let password_hash = Argon2::default()
        .hash_password(payload.password.as_bytes(), &salt)
        .map_err(|_| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Password hashing failed".to_string(),
            )
        })?
        .to_string();

    let user = User {
        id: Uuid::new_v4().to_string(),
        username,
        password_hash,
        marked_for_deletion: None,
    };

    app_state
        .gateway
        .run_in_transaction(|tx| {
            let user = user.clone();
            Box::pin(async move { tx.insert(&user).await })
        })
        .await
        .map_err(registration_error)?;

    tracing::info!(user_id = %user.id, "user registered");

    Ok((
        StatusCode::CREATED,
        Json(PublicUser {
            id: user.id,
            username: user.username,
        }),
    ))
}

pub async fn login(
    State(app_state): State<AppState>,
    session: Session,
    Json(payload): Json<LoginPayload>,
) -> Result<(StatusCode, Json<PublicUser>), (StatusCode, String)> {
    let invalid = || {
        (
            StatusCode::UNAUTHORIZED,
            "Invalid username or password".to_string(),
        )
    };

    let user = find_user_by_username(&app_state, payload.username.trim())
        .await?
        .ok_or_else(invalid)?;

    let parsed_hash = PasswordHash::new(&user.password_hash)
        .map_err(|_| db_error_with_context("invalid password hash"))?;
    Argon2::default()
        .verify_password(payload.password.as_bytes(), &parsed_hash)
        .map_err(|_| invalid())?;

    let public_user = PublicUser {
        id: user.id,
        username: user.username,
    };

    session
        .insert(SESSION_USER_KEY, public_user.clone())
        .await
        .map_err(|_| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to create session".to_string(),
            )
        })?;

    Ok((StatusCode::OK, Json(public_user)))
}

pub async fn me(session: Session) -> Result<Json<PublicUser>, (StatusCode, String)> {
    let user = get_current_user(&session).await?;
    Ok(Json(user))
}

pub async fn logout(session: Session) -> Result<StatusCode, (StatusCode, String)> {
    session.flush().await.map_err(|_| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to end session".to_string(),
        )
    })?;
    Ok(StatusCode::NO_CONTENT)
}
