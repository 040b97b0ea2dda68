// src/handlers/auth.rs

use axum::{Json, extract::State, response::IntoResponse};
use serde_json::json;
use sqlx::{FromRow, PgPool};
use validator::Validate;

use crate::{
    error::AppError,
    extract::JsonBody,
    models::user::{SignupRequest, TokenRequest, USER_COLUMNS, User, ensure_not_reserved},
    state::AppState,
    utils::{
        confirmation::CodeSubject,
        jwt::sign_jwt,
        mailer::{self, Email},
    },
};

/// A user row that shares the requested username or email.
#[derive(Debug, Clone, FromRow)]
struct ExistingAccount {
    id: i64,
    username: String,
    email: String,
}

#[derive(Debug, PartialEq, Eq)]
enum SignupPlan {
    Create,
    Reuse(i64),
}

/// Decides what a signup does given the rows matching its username or email.
///
/// Neither exists: create. Both exist on the same row: reuse. Anything else
/// is rejected.
fn plan_signup(req: &SignupRequest, existing: &[ExistingAccount]) -> Result<SignupPlan, AppError> {
    let by_username = existing.iter().find(|a| a.username == req.username);
    let by_email = existing.iter().find(|a| a.email == req.email);

    match (by_username, by_email) {
        (None, None) => Ok(SignupPlan::Create),
        (Some(u), Some(e)) if u.id == e.id => Ok(SignupPlan::Reuse(u.id)),
        (Some(_), None) => Err(AppError::field(
            "username",
            "A user with that username already exists.",
        )),
        (None, Some(_)) => Err(AppError::field(
            "email",
            "A user with that email already exists.",
        )),
        (Some(_), Some(_)) => Err(AppError::field(
            "email",
            "This email belongs to a different account.",
        )),
    }
}

/// Inserts the (username, email) pair unless either value is taken, then
/// reads back the row holding exactly that pair.
///
/// Under concurrent signups the unique constraints pick the winner; a loser
/// whose pair does not match the stored row gets a validation error.
async fn insert_or_fetch(pool: &PgPool, req: &SignupRequest) -> Result<User, AppError> {
    let inserted = sqlx::query_as::<_, User>(&format!(
        "INSERT INTO users (username, email) VALUES ($1, $2) \
         ON CONFLICT DO NOTHING RETURNING {}",
        USER_COLUMNS
    ))
    .bind(&req.username)
    .bind(&req.email)
    .fetch_optional(pool)
    .await?;

    if let Some(user) = inserted {
        tracing::info!("Created user {}", user.username);
        return Ok(user);
    }

    sqlx::query_as::<_, User>(&format!(
        "SELECT {} FROM users WHERE username = $1 AND email = $2",
        USER_COLUMNS
    ))
    .bind(&req.username)
    .bind(&req.email)
    .fetch_optional(pool)
    .await?
    .ok_or(AppError::field(
        "username",
        "A user with that username or email already exists.",
    ))
}

/// Registers (or re-registers) a user and mails a confirmation code.
///
/// Idempotent for a matching (username, email) pair. Mail goes out on a
/// background task; the response does not depend on delivery.
pub async fn signup(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<SignupRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    ensure_not_reserved(&payload.username)?;

    let existing = sqlx::query_as::<_, ExistingAccount>(
        "SELECT id, username, email FROM users WHERE username = $1 OR email = $2",
    )
    .bind(&payload.username)
    .bind(&payload.email)
    .fetch_all(&state.pool)
    .await?;

    let user = match plan_signup(&payload, &existing)? {
        SignupPlan::Create => insert_or_fetch(&state.pool, &payload).await?,
        SignupPlan::Reuse(id) => sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users WHERE id = $1",
            USER_COLUMNS
        ))
        .bind(id)
        .fetch_one(&state.pool)
        .await?,
    };

    let code = state.confirmation_codes().issue(CodeSubject::from(&user));
    mailer::dispatch(
        state.mailer.clone(),
        Email::confirmation_code(&state.config.email_from, &user.email, &user.username, &code),
    );
    tracing::info!("Confirmation code issued for {}", user.username);

    Ok(Json(payload))
}

/// Exchanges a confirmation code for an access token.
///
/// The code is consumed by bumping the user's confirmation generation with a
/// compare-and-swap, so two concurrent exchanges of one code yield one token.
pub async fn token(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<TokenRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let user = sqlx::query_as::<_, User>(&format!(
        "SELECT {} FROM users WHERE username = $1",
        USER_COLUMNS
    ))
    .bind(&payload.username)
    .fetch_optional(&state.pool)
    .await?
    .ok_or(AppError::NotFound("User not found".to_string()))?;

    let invalid_code = || AppError::field("confirmation_code", "Invalid confirmation code.");

    if let Err(e) = state
        .confirmation_codes()
        .verify(CodeSubject::from(&user), &payload.confirmation_code)
    {
        tracing::debug!("Rejected confirmation code for {}: {}", user.username, e);
        return Err(invalid_code());
    }

    let consumed = sqlx::query(
        r#"
        UPDATE users
        SET confirmation_generation = confirmation_generation + 1, last_login = NOW()
        WHERE id = $1 AND confirmation_generation = $2
        "#,
    )
    .bind(user.id)
    .bind(user.confirmation_generation)
    .execute(&state.pool)
    .await?;

    if consumed.rows_affected() == 0 {
        return Err(invalid_code());
    }

    let token = sign_jwt(
        user.id,
        &user.username,
        &state.config.jwt_secret,
        state.config.jwt_expiration,
    )?;

    Ok(Json(json!({ "token": token })))
}
