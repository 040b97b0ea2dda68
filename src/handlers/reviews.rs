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
        pagination::{Page, PageParams, PageWindow},
        review::{CreateReviewRequest, Review, UpdateReviewRequest},
    },
    permissions::{Identity, Policy},
    utils::html::clean_html,
};

const REVIEW_SELECT: &str = r#"
    SELECT r.id, r.title_id, r.author_id, u.username AS author, r.text, r.score, r.pub_date
    FROM reviews r
    JOIN users u ON u.id = r.author_id
"#;

async fn ensure_title_exists(pool: &PgPool, title_id: i64) -> Result<(), AppError> {
    sqlx::query_scalar::<_, i64>("SELECT id FROM titles WHERE id = $1")
        .bind(title_id)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::NotFound("Title not found".to_string()))?;
    Ok(())
}

async fn fetch_review(pool: &PgPool, title_id: i64, review_id: i64) -> Result<Review, AppError> {
    sqlx::query_as::<_, Review>(&format!(
        "{} WHERE r.id = $1 AND r.title_id = $2",
        REVIEW_SELECT
    ))
    .bind(review_id)
    .bind(title_id)
    .fetch_optional(pool)
    .await?
    .ok_or(AppError::NotFound("Review not found".to_string()))
}

/// List reviews of a title, oldest first.
pub async fn list_reviews(
    State(pool): State<PgPool>,
    Path(title_id): Path<i64>,
    QueryParams(params): QueryParams<PageParams>,
) -> Result<impl IntoResponse, AppError> {
    ensure_title_exists(&pool, title_id).await?;
    let window = PageWindow::new(params.limit, params.offset);

    let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM reviews WHERE title_id = $1")
        .bind(title_id)
        .fetch_one(&pool)
        .await?;

    let reviews = sqlx::query_as::<_, Review>(&format!(
        "{} WHERE r.title_id = $1 ORDER BY r.pub_date, r.id LIMIT $2 OFFSET $3",
        REVIEW_SELECT
    ))
    .bind(title_id)
    .bind(window.limit)
    .bind(window.offset)
    .fetch_all(&pool)
    .await?;

    Ok(Json(Page::new(count, window, reviews)))
}

pub async fn get_review(
    State(pool): State<PgPool>,
    Path((title_id, review_id)): Path<(i64, i64)>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(fetch_review(&pool, title_id, review_id).await?))
}

/// Create a review. One per author per title.
///
/// The explicit check gives a clear message in the common case; the unique
/// constraint settles concurrent submissions with the same conflict.
pub async fn create_review(
    State(pool): State<PgPool>,
    Extension(identity): Extension<Identity>,
    Path(title_id): Path<i64>,
    JsonBody(payload): JsonBody<CreateReviewRequest>,
) -> Result<impl IntoResponse, AppError> {
    let caller = identity.caller()?;
    payload.validate()?;
    ensure_title_exists(&pool, title_id).await?;

    let already_reviewed = sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS (SELECT 1 FROM reviews WHERE author_id = $1 AND title_id = $2)",
    )
    .bind(caller.id)
    .bind(title_id)
    .fetch_one(&pool)
    .await?;

    if already_reviewed {
        return Err(AppError::Conflict(
            "You have already reviewed this title".to_string(),
        ));
    }

    let id = sqlx::query_scalar::<_, i64>(
        r#"
        INSERT INTO reviews (title_id, author_id, text, score)
        VALUES ($1, $2, $3, $4)
        RETURNING id
        "#,
    )
    .bind(title_id)
    .bind(caller.id)
    .bind(clean_html(&payload.text))
    .bind(payload.score)
    .fetch_one(&pool)
    .await?;

    tracing::info!("User {} reviewed title {}", caller.username, title_id);
    let review = fetch_review(&pool, title_id, id).await?;
    Ok((StatusCode::CREATED, Json(review)))
}

async fn apply_update(
    pool: &PgPool,
    identity: &Identity,
    title_id: i64,
    review_id: i64,
    payload: UpdateReviewRequest,
) -> Result<Review, AppError> {
    let review = fetch_review(pool, title_id, review_id).await?;
    Policy::AuthorOrStaffOrReadOnly.check_object(identity, review.author_id)?;
    payload.validate()?;

    if payload.text.is_none() && payload.score.is_none() {
        return Ok(review);
    }

    let mut builder: QueryBuilder<Postgres> = QueryBuilder::new("UPDATE reviews SET ");
    let mut separated = builder.separated(", ");

    if let Some(text) = payload.text {
        separated.push("text = ");
        separated.push_bind_unseparated(clean_html(&text));
    }

    if let Some(score) = payload.score {
        separated.push("score = ");
        separated.push_bind_unseparated(score);
    }

    builder.push(" WHERE id = ");
    builder.push_bind(review_id);
    builder.build().execute(pool).await?;

    fetch_review(pool, title_id, review_id).await
}

/// Partially update a review. Author, moderator or admin.
pub async fn update_review(
    State(pool): State<PgPool>,
    Extension(identity): Extension<Identity>,
    Path((title_id, review_id)): Path<(i64, i64)>,
    JsonBody(payload): JsonBody<UpdateReviewRequest>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(
        apply_update(&pool, &identity, title_id, review_id, payload).await?,
    ))
}

/// Replace a review's text and score. Author, moderator or admin.
pub async fn replace_review(
    State(pool): State<PgPool>,
    Extension(identity): Extension<Identity>,
    Path((title_id, review_id)): Path<(i64, i64)>,
    JsonBody(payload): JsonBody<CreateReviewRequest>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(
        apply_update(&pool, &identity, title_id, review_id, payload.into()).await?,
    ))
}

/// Delete a review and its comments. Author, moderator or admin.
pub async fn delete_review(
    State(pool): State<PgPool>,
    Extension(identity): Extension<Identity>,
    Path((title_id, review_id)): Path<(i64, i64)>,
) -> Result<impl IntoResponse, AppError> {
    let review = fetch_review(&pool, title_id, review_id).await?;
    Policy::AuthorOrStaffOrReadOnly.check_object(&identity, review.author_id)?;

    sqlx::query("DELETE FROM reviews WHERE id = $1")
        .bind(review_id)
        .execute(&pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to delete review: {:?}", e);
            AppError::from(e)
        })?;

    Ok(StatusCode::NO_CONTENT)
}
