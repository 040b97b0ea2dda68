use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use sqlx::PgPool;
use validator::Validate;

use crate::{
    error::AppError,
    extract::{JsonBody, QueryParams},
    models::{
        comment::{Comment, CommentRequest},
        pagination::{Page, PageParams, PageWindow},
    },
    permissions::{Identity, Policy},
    utils::html::clean_html,
};

const COMMENT_SELECT: &str = r#"
    SELECT c.id, c.review_id, c.author_id, u.username AS author, c.text, c.pub_date
    FROM comments c
    JOIN users u ON u.id = c.author_id
"#;

/// The review must exist and belong to the title in the path.
async fn ensure_review_exists(pool: &PgPool, title_id: i64, review_id: i64) -> Result<(), AppError> {
    sqlx::query_scalar::<_, i64>("SELECT id FROM reviews WHERE id = $1 AND title_id = $2")
        .bind(review_id)
        .bind(title_id)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::NotFound("Review not found".to_string()))?;
    Ok(())
}

async fn fetch_comment(
    pool: &PgPool,
    title_id: i64,
    review_id: i64,
    comment_id: i64,
) -> Result<Comment, AppError> {
    ensure_review_exists(pool, title_id, review_id).await?;

    sqlx::query_as::<_, Comment>(&format!(
        "{} WHERE c.id = $1 AND c.review_id = $2",
        COMMENT_SELECT
    ))
    .bind(comment_id)
    .bind(review_id)
    .fetch_optional(pool)
    .await?
    .ok_or(AppError::NotFound("Comment not found".to_string()))
}

/// List comments on a review in chronological order.
pub async fn list_comments(
    State(pool): State<PgPool>,
    Path((title_id, review_id)): Path<(i64, i64)>,
    QueryParams(params): QueryParams<PageParams>,
) -> Result<impl IntoResponse, AppError> {
    ensure_review_exists(&pool, title_id, review_id).await?;
    let window = PageWindow::new(params.limit, params.offset);

    let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM comments WHERE review_id = $1")
        .bind(review_id)
        .fetch_one(&pool)
        .await?;

    let comments = sqlx::query_as::<_, Comment>(&format!(
        "{} WHERE c.review_id = $1 ORDER BY c.pub_date, c.id LIMIT $2 OFFSET $3",
        COMMENT_SELECT
    ))
    .bind(review_id)
    .bind(window.limit)
    .bind(window.offset)
    .fetch_all(&pool)
    .await?;

    Ok(Json(Page::new(count, window, comments)))
}

pub async fn get_comment(
    State(pool): State<PgPool>,
    Path((title_id, review_id, comment_id)): Path<(i64, i64, i64)>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(
        fetch_comment(&pool, title_id, review_id, comment_id).await?,
    ))
}

pub async fn create_comment(
    State(pool): State<PgPool>,
    Extension(identity): Extension<Identity>,
    Path((title_id, review_id)): Path<(i64, i64)>,
    JsonBody(payload): JsonBody<CommentRequest>,
) -> Result<impl IntoResponse, AppError> {
    let caller = identity.caller()?;
    payload.validate()?;
    ensure_review_exists(&pool, title_id, review_id).await?;

    let id = sqlx::query_scalar::<_, i64>(
        "INSERT INTO comments (review_id, author_id, text) VALUES ($1, $2, $3) RETURNING id",
    )
    .bind(review_id)
    .bind(caller.id)
    .bind(clean_html(&payload.text))
    .fetch_one(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to create comment: {:?}", e);
        AppError::from(e)
    })?;

    let comment = fetch_comment(&pool, title_id, review_id, id).await?;
    Ok((StatusCode::CREATED, Json(comment)))
}

/// Edit a comment's text. PATCH and PUT behave the same: text is the only
/// writable field. Author, moderator or admin.
pub async fn update_comment(
    State(pool): State<PgPool>,
    Extension(identity): Extension<Identity>,
    Path((title_id, review_id, comment_id)): Path<(i64, i64, i64)>,
    JsonBody(payload): JsonBody<CommentRequest>,
) -> Result<impl IntoResponse, AppError> {
    let comment = fetch_comment(&pool, title_id, review_id, comment_id).await?;
    Policy::AuthorOrStaffOrReadOnly.check_object(&identity, comment.author_id)?;
    payload.validate()?;

    sqlx::query("UPDATE comments SET text = $1 WHERE id = $2")
        .bind(clean_html(&payload.text))
        .bind(comment_id)
        .execute(&pool)
        .await?;

    Ok(Json(
        fetch_comment(&pool, title_id, review_id, comment_id).await?,
    ))
}

/// Delete a comment. Author, moderator or admin.
pub async fn delete_comment(
    State(pool): State<PgPool>,
    Extension(identity): Extension<Identity>,
    Path((title_id, review_id, comment_id)): Path<(i64, i64, i64)>,
) -> Result<impl IntoResponse, AppError> {
    let comment = fetch_comment(&pool, title_id, review_id, comment_id).await?;
    Policy::AuthorOrStaffOrReadOnly.check_object(&identity, comment.author_id)?;

    sqlx::query("DELETE FROM comments WHERE id = $1")
        .bind(comment_id)
        .execute(&pool)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}
