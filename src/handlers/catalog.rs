//! Categories and genres. Admins write, anyone reads; both are addressed by slug.

use axum::{
    Json,
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
        catalog::{CatalogEntry, CatalogKind, CatalogListParams, CreateCatalogEntryRequest},
        pagination::{Page, PageWindow},
        title::escape_like,
    },
};

fn push_search(builder: &mut QueryBuilder<'_, Postgres>, search: &Option<String>) {
    if let Some(search) = search.as_deref().filter(|s| !s.is_empty()) {
        builder.push(" WHERE name ILIKE '%' || ");
        builder.push_bind(escape_like(search));
        builder.push(" || '%'");
    }
}

async fn list(
    pool: &PgPool,
    kind: CatalogKind,
    params: CatalogListParams,
) -> Result<Page<CatalogEntry>, AppError> {
    let window = PageWindow::new(params.limit, params.offset);

    let mut count_query: QueryBuilder<Postgres> =
        QueryBuilder::new(format!("SELECT COUNT(*) FROM {}", kind.table()));
    push_search(&mut count_query, &params.search);
    let count: i64 = count_query.build_query_scalar().fetch_one(pool).await?;

    let mut builder: QueryBuilder<Postgres> =
        QueryBuilder::new(format!("SELECT id, name, slug FROM {}", kind.table()));
    push_search(&mut builder, &params.search);
    builder.push(" ORDER BY name, id LIMIT ");
    builder.push_bind(window.limit);
    builder.push(" OFFSET ");
    builder.push_bind(window.offset);

    let entries = builder
        .build_query_as::<CatalogEntry>()
        .fetch_all(pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to list {}: {:?}", kind.table(), e);
            AppError::from(e)
        })?;

    Ok(Page::new(count, window, entries))
}

async fn create(
    pool: &PgPool,
    kind: CatalogKind,
    payload: CreateCatalogEntryRequest,
) -> Result<CatalogEntry, AppError> {
    payload.validate()?;

    let entry = sqlx::query_as::<_, CatalogEntry>(&format!(
        "INSERT INTO {} (name, slug) VALUES ($1, $2) RETURNING id, name, slug",
        kind.table()
    ))
    .bind(&payload.name)
    .bind(&payload.slug)
    .fetch_one(pool)
    .await?;

    tracing::info!("{} '{}' created", kind.label(), entry.slug);
    Ok(entry)
}

/// Deleting a category cascades to its titles; deleting a genre only unlinks it.
async fn delete(pool: &PgPool, kind: CatalogKind, slug: &str) -> Result<(), AppError> {
    let result = sqlx::query(&format!("DELETE FROM {} WHERE slug = $1", kind.table()))
        .bind(slug)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound(format!("{} not found", kind.label())));
    }

    tracing::info!("{} '{}' deleted", kind.label(), slug);
    Ok(())
}

pub async fn list_categories(
    State(pool): State<PgPool>,
    QueryParams(params): QueryParams<CatalogListParams>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(list(&pool, CatalogKind::Category, params).await?))
}

pub async fn create_category(
    State(pool): State<PgPool>,
    JsonBody(payload): JsonBody<CreateCatalogEntryRequest>,
) -> Result<impl IntoResponse, AppError> {
    let entry = create(&pool, CatalogKind::Category, payload).await?;
    Ok((StatusCode::CREATED, Json(entry)))
}

pub async fn delete_category(
    State(pool): State<PgPool>,
    Path(slug): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    delete(&pool, CatalogKind::Category, &slug).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_genres(
    State(pool): State<PgPool>,
    QueryParams(params): QueryParams<CatalogListParams>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(list(&pool, CatalogKind::Genre, params).await?))
}

pub async fn create_genre(
    State(pool): State<PgPool>,
    JsonBody(payload): JsonBody<CreateCatalogEntryRequest>,
) -> Result<impl IntoResponse, AppError> {
    let entry = create(&pool, CatalogKind::Genre, payload).await?;
    Ok((StatusCode::CREATED, Json(entry)))
}

pub async fn delete_genre(
    State(pool): State<PgPool>,
    Path(slug): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    delete(&pool, CatalogKind::Genre, &slug).await?;
    Ok(StatusCode::NO_CONTENT)
}
