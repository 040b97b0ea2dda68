// src/handlers/users.rs

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use sqlx::{PgPool, Postgres, QueryBuilder};
use validator::Validate;

use crate::{
    error::AppError,
    extract::{JsonBody, QueryParams},
    models::{
        pagination::{Page, PageWindow},
        title::escape_like,
        user::{
            CreateUserRequest, ProfileUpdateRequest, UpdateUserRequest, USER_COLUMNS, User,
            UserListParams, UserResponse, ensure_not_reserved,
        },
    },
    permissions::Identity,
    utils::html::clean_html,
};

/// Which user row an update addresses.
enum Target {
    Id(i64),
    Username(String),
}

impl Target {
    fn push_where(self, builder: &mut QueryBuilder<'_, Postgres>) {
        match self {
            Target::Id(id) => {
                builder.push(" WHERE id = ").push_bind(id);
            }
            Target::Username(username) => {
                builder.push(" WHERE username = ").push_bind(username);
            }
        }
    }
}

async fn fetch_by_username(pool: &PgPool, username: &str) -> Result<User, AppError> {
    sqlx::query_as::<_, User>(&format!(
        "SELECT {} FROM users WHERE username = $1",
        USER_COLUMNS
    ))
    .bind(username)
    .fetch_optional(pool)
    .await?
    .ok_or(AppError::NotFound("User not found".to_string()))
}

async fn fetch_by_id(pool: &PgPool, id: i64) -> Result<User, AppError> {
    sqlx::query_as::<_, User>(&format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS))
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::NotFound("User not found".to_string()))
}

/// Applies the present fields of `payload` in one UPDATE.
async fn apply_update(
    pool: &PgPool,
    target: Target,
    payload: UpdateUserRequest,
) -> Result<User, AppError> {
    payload.validate()?;
    if let Some(username) = &payload.username {
        ensure_not_reserved(username)?;
    }

    if payload.is_empty() {
        return match target {
            Target::Id(id) => fetch_by_id(pool, id).await,
            Target::Username(username) => fetch_by_username(pool, &username).await,
        };
    }

    let mut builder: QueryBuilder<Postgres> = QueryBuilder::new("UPDATE users SET ");
    let mut separated = builder.separated(", ");

    if let Some(username) = payload.username {
        separated.push("username = ");
        separated.push_bind_unseparated(username);
    }

    if let Some(email) = payload.email {
        separated.push("email = ");
        separated.push_bind_unseparated(email);
    }

    if let Some(first_name) = payload.first_name {
        separated.push("first_name = ");
        separated.push_bind_unseparated(first_name);
    }

    if let Some(last_name) = payload.last_name {
        separated.push("last_name = ");
        separated.push_bind_unseparated(last_name);
    }

    if let Some(bio) = payload.bio {
        separated.push("bio = ");
        separated.push_bind_unseparated(clean_html(&bio));
    }

    if let Some(role) = payload.role {
        separated.push("role = ");
        separated.push_bind_unseparated(role.as_str());
    }

    target.push_where(&mut builder);
    builder.push(" RETURNING ");
    builder.push(USER_COLUMNS);

    builder
        .build_query_as::<User>()
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::NotFound("User not found".to_string()))
}

/// Lists users, optionally filtered by a username substring.
/// Admin only.
pub async fn list_users(
    State(pool): State<PgPool>,
    QueryParams(params): QueryParams<UserListParams>,
) -> Result<impl IntoResponse, AppError> {
    let window = PageWindow::new(params.limit, params.offset);
    let pattern = params
        .search
        .as_deref()
        .filter(|s| !s.is_empty())
        .map(escape_like);

    let count = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM users WHERE $1::TEXT IS NULL OR username ILIKE '%' || $1 || '%'",
    )
    .bind(&pattern)
    .fetch_one(&pool)
    .await?;

    let users = sqlx::query_as::<_, User>(&format!(
        "SELECT {} FROM users \
         WHERE $1::TEXT IS NULL OR username ILIKE '%' || $1 || '%' \
         ORDER BY username LIMIT $2 OFFSET $3",
        USER_COLUMNS
    ))
    .bind(&pattern)
    .bind(window.limit)
    .bind(window.offset)
    .fetch_all(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to list users: {:?}", e);
        AppError::from(e)
    })?;

    let results = users.into_iter().map(UserResponse::from).collect();
    Ok(Json(Page::new(count, window, results)))
}

/// Creates a user with a specific role. The account signs in through the
/// regular confirmation code flow.
/// Admin only.
pub async fn create_user(
    State(pool): State<PgPool>,
    JsonBody(payload): JsonBody<CreateUserRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    ensure_not_reserved(&payload.username)?;

    let user = sqlx::query_as::<_, User>(&format!(
        r#"
        INSERT INTO users (username, email, first_name, last_name, bio, role)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING {}
        "#,
        USER_COLUMNS
    ))
    .bind(&payload.username)
    .bind(&payload.email)
    .bind(&payload.first_name)
    .bind(&payload.last_name)
    .bind(clean_html(&payload.bio))
    .bind(payload.role.as_str())
    .fetch_one(&pool)
    .await?;

    tracing::info!("Admin created user {} with role {}", user.username, user.role);
    Ok((StatusCode::CREATED, Json(UserResponse::from(user))))
}

/// Admin only.
pub async fn get_user(
    State(pool): State<PgPool>,
    Path(username): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(UserResponse::from(
        fetch_by_username(&pool, &username).await?,
    )))
}

/// Updates user information, including the role.
/// Admin only.
pub async fn update_user(
    State(pool): State<PgPool>,
    Path(username): Path<String>,
    JsonBody(payload): JsonBody<UpdateUserRequest>,
) -> Result<impl IntoResponse, AppError> {
    let user = apply_update(&pool, Target::Username(username), payload).await?;
    Ok(Json(UserResponse::from(user)))
}

/// Replaces user information. Same body as creation.
/// Admin only.
pub async fn replace_user(
    State(pool): State<PgPool>,
    Path(username): Path<String>,
    JsonBody(payload): JsonBody<CreateUserRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    let user = apply_update(&pool, Target::Username(username), payload.into()).await?;
    Ok(Json(UserResponse::from(user)))
}

/// Deletes a user with their reviews and comments.
/// Admin only. Prevents deleting self.
pub async fn delete_user(
    State(pool): State<PgPool>,
    Extension(identity): Extension<Identity>,
    Path(username): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let caller = identity.caller()?;
    if caller.username == username {
        return Err(AppError::BadRequest("Cannot delete yourself".to_string()));
    }

    let result = sqlx::query("DELETE FROM users WHERE username = $1")
        .bind(&username)
        .execute(&pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to delete user: {:?}", e);
            AppError::from(e)
        })?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("User not found".to_string()));
    }

    tracing::info!("User {} deleted by {}", username, caller.username);
    Ok(StatusCode::NO_CONTENT)
}

/// Get the current user's profile.
pub async fn get_me(
    State(pool): State<PgPool>,
    Extension(identity): Extension<Identity>,
) -> Result<impl IntoResponse, AppError> {
    let caller = identity.caller()?;
    Ok(Json(UserResponse::from(fetch_by_id(&pool, caller.id).await?)))
}

/// Edit the current user's profile. The role cannot be changed here.
pub async fn update_me(
    State(pool): State<PgPool>,
    Extension(identity): Extension<Identity>,
    JsonBody(payload): JsonBody<ProfileUpdateRequest>,
) -> Result<impl IntoResponse, AppError> {
    let caller = identity.caller()?;
    let user = apply_update(&pool, Target::Id(caller.id), payload.into()).await?;
    Ok(Json(UserResponse::from(user)))
}
