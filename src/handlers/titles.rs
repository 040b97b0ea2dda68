// src/handlers/titles.rs

use std::collections::HashMap;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use sqlx::{FromRow, PgConnection, PgPool, Postgres, QueryBuilder};
use validator::Validate;

use crate::{
    error::AppError,
    extract::{JsonBody, QueryParams},
    models::{
        catalog::CatalogEntry,
        pagination::{Page, PageWindow},
        title::{
            CreateTitleRequest, TitleListParams, TitleResponse, TitleRow, UpdateTitleRequest,
            escape_like, validate_year,
        },
    },
    utils::html::clean_html,
};

/// Titles joined with their category and per-title review totals.
/// Review totals come from one grouped sub-select, never a query per title.
const TITLE_SELECT: &str = r#"
    SELECT
        t.id, t.name, t.year, t.description,
        c.name AS category_name, c.slug AS category_slug,
        COALESCE(r.score_total, 0)::BIGINT AS score_total,
        COALESCE(r.review_count, 0)::BIGINT AS review_count
    FROM titles t
    JOIN categories c ON c.id = t.category_id
    LEFT JOIN (
        SELECT title_id, SUM(score)::BIGINT AS score_total, COUNT(*) AS review_count
        FROM reviews
        GROUP BY title_id
    ) r ON r.title_id = t.id
"#;

#[derive(Debug, FromRow)]
struct TitleGenre {
    title_id: i64,
    id: i64,
    name: String,
    slug: String,
}

fn push_filters(builder: &mut QueryBuilder<'_, Postgres>, params: &TitleListParams) {
    builder.push(" WHERE TRUE");

    if let Some(category) = &params.category {
        builder.push(" AND c.slug = ").push_bind(category.clone());
    }
    if let Some(genre) = &params.genre {
        builder
            .push(
                " AND EXISTS (SELECT 1 FROM title_genres tg JOIN genres g ON g.id = tg.genre_id \
                 WHERE tg.title_id = t.id AND g.slug = ",
            )
            .push_bind(genre.clone())
            .push(")");
    }
    if let Some(year) = params.year {
        builder.push(" AND t.year = ").push_bind(year);
    }
    if let Some(name) = params.name.as_deref().filter(|n| !n.is_empty()) {
        builder
            .push(" AND t.name ILIKE '%' || ")
            .push_bind(escape_like(name))
            .push(" || '%'");
    }
}

/// Genres for a batch of titles, in one query.
async fn load_genres(
    conn: &mut PgConnection,
    title_ids: &[i64],
) -> Result<HashMap<i64, Vec<CatalogEntry>>, AppError> {
    let rows = sqlx::query_as::<_, TitleGenre>(
        r#"
        SELECT tg.title_id, g.id, g.name, g.slug
        FROM title_genres tg
        JOIN genres g ON g.id = tg.genre_id
        WHERE tg.title_id = ANY($1)
        ORDER BY g.name, g.id
        "#,
    )
    .bind(title_ids)
    .fetch_all(&mut *conn)
    .await?;

    let mut by_title: HashMap<i64, Vec<CatalogEntry>> = HashMap::new();
    for row in rows {
        by_title.entry(row.title_id).or_default().push(CatalogEntry {
            id: row.id,
            name: row.name,
            slug: row.slug,
        });
    }
    Ok(by_title)
}

fn assemble(rows: Vec<TitleRow>, mut genres: HashMap<i64, Vec<CatalogEntry>>) -> Vec<TitleResponse> {
    rows.into_iter()
        .map(|row| {
            let genre = genres.remove(&row.id).unwrap_or_default();
            TitleResponse::from_row(row, genre)
        })
        .collect()
}

async fn fetch_title(conn: &mut PgConnection, id: i64) -> Result<TitleResponse, AppError> {
    let row = sqlx::query_as::<_, TitleRow>(&format!("{} WHERE t.id = $1", TITLE_SELECT))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or(AppError::NotFound("Title not found".to_string()))?;

    let genres = load_genres(conn, &[row.id]).await?;
    assemble(vec![row], genres)
        .pop()
        .ok_or(AppError::NotFound("Title not found".to_string()))
}

/// Opens a read-only transaction whose statements all see one snapshot.
async fn snapshot(pool: &PgPool) -> Result<sqlx::Transaction<'static, Postgres>, AppError> {
    let mut tx = pool.begin().await?;
    sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ READ ONLY")
        .execute(&mut *tx)
        .await?;
    Ok(tx)
}

async fn resolve_category(conn: &mut PgConnection, slug: &str) -> Result<i64, AppError> {
    sqlx::query_scalar::<_, i64>("SELECT id FROM categories WHERE slug = $1")
        .bind(slug)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or(AppError::field(
            "category",
            format!("Category '{}' does not exist.", slug),
        ))
}

async fn resolve_genres(conn: &mut PgConnection, slugs: &[String]) -> Result<Vec<i64>, AppError> {
    let mut wanted: Vec<String> = slugs.to_vec();
    wanted.sort();
    wanted.dedup();

    let found = sqlx::query_as::<_, (i64, String)>("SELECT id, slug FROM genres WHERE slug = ANY($1)")
        .bind(wanted.as_slice())
        .fetch_all(&mut *conn)
        .await?;

    if found.len() != wanted.len() {
        let missing: Vec<&str> = wanted
            .iter()
            .filter(|slug| !found.iter().any(|(_, s)| s == *slug))
            .map(String::as_str)
            .collect();
        return Err(AppError::field(
            "genre",
            format!("Unknown genre(s): {}.", missing.join(", ")),
        ));
    }

    Ok(found.into_iter().map(|(id, _)| id).collect())
}

async fn link_genres(conn: &mut PgConnection, title_id: i64, genre_ids: &[i64]) -> Result<(), AppError> {
    sqlx::query("DELETE FROM title_genres WHERE title_id = $1")
        .bind(title_id)
        .execute(&mut *conn)
        .await?;

    if !genre_ids.is_empty() {
        sqlx::query(
            "INSERT INTO title_genres (title_id, genre_id) SELECT $1, UNNEST($2::BIGINT[])",
        )
        .bind(title_id)
        .bind(genre_ids)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

/// List titles with optional filters (category, genre, year, name).
pub async fn list_titles(
    State(pool): State<PgPool>,
    QueryParams(params): QueryParams<TitleListParams>,
) -> Result<impl IntoResponse, AppError> {
    let window = PageWindow::new(params.limit, params.offset);
    let mut tx = snapshot(&pool).await?;

    let mut count_query: QueryBuilder<Postgres> = QueryBuilder::new(
        "SELECT COUNT(*) FROM titles t JOIN categories c ON c.id = t.category_id",
    );
    push_filters(&mut count_query, &params);
    let count: i64 = count_query.build_query_scalar().fetch_one(&mut *tx).await?;

    let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(TITLE_SELECT);
    push_filters(&mut builder, &params);
    builder.push(" ORDER BY t.id LIMIT ");
    builder.push_bind(window.limit);
    builder.push(" OFFSET ");
    builder.push_bind(window.offset);

    let rows = builder
        .build_query_as::<TitleRow>()
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| {
            tracing::error!("Failed to list titles: {:?}", e);
            AppError::from(e)
        })?;

    let ids: Vec<i64> = rows.iter().map(|row| row.id).collect();
    let genres = load_genres(&mut tx, &ids).await?;
    tx.commit().await?;

    Ok(Json(Page::new(count, window, assemble(rows, genres))))
}

/// Get a single title with its genres, category and rating.
pub async fn get_title(
    State(pool): State<PgPool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let mut tx = snapshot(&pool).await?;
    let title = fetch_title(&mut tx, id).await?;
    tx.commit().await?;
    Ok(Json(title))
}

/// Create a title. Admin only.
pub async fn create_title(
    State(pool): State<PgPool>,
    JsonBody(payload): JsonBody<CreateTitleRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    validate_year(payload.year)?;

    let mut tx = pool.begin().await?;
    let category_id = resolve_category(&mut tx, &payload.category).await?;
    let genre_ids = resolve_genres(&mut tx, &payload.genre).await?;

    let id = sqlx::query_scalar::<_, i64>(
        r#"
        INSERT INTO titles (name, year, description, category_id)
        VALUES ($1, $2, $3, $4)
        RETURNING id
        "#,
    )
    .bind(&payload.name)
    .bind(payload.year)
    .bind(clean_html(&payload.description))
    .bind(category_id)
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| {
        tracing::error!("Failed to create title: {:?}", e);
        AppError::from(e)
    })?;

    link_genres(&mut tx, id, &genre_ids).await?;
    let title = fetch_title(&mut tx, id).await?;
    tx.commit().await?;

    tracing::info!("Title {} created", id);
    Ok((StatusCode::CREATED, Json(title)))
}

async fn apply_update(
    pool: &PgPool,
    id: i64,
    payload: UpdateTitleRequest,
) -> Result<TitleResponse, AppError> {
    payload.validate()?;
    if let Some(year) = payload.year {
        validate_year(year)?;
    }

    let mut tx = pool.begin().await?;

    sqlx::query_scalar::<_, i64>("SELECT id FROM titles WHERE id = $1 FOR UPDATE")
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(AppError::NotFound("Title not found".to_string()))?;

    let category_id = match &payload.category {
        Some(slug) => Some(resolve_category(&mut tx, slug).await?),
        None => None,
    };

    if payload.name.is_some()
        || payload.year.is_some()
        || payload.description.is_some()
        || category_id.is_some()
    {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new("UPDATE titles SET ");
        let mut separated = builder.separated(", ");

        if let Some(name) = payload.name {
            separated.push("name = ");
            separated.push_bind_unseparated(name);
        }

        if let Some(year) = payload.year {
            separated.push("year = ");
            separated.push_bind_unseparated(year);
        }

        if let Some(description) = payload.description {
            separated.push("description = ");
            separated.push_bind_unseparated(clean_html(&description));
        }

        if let Some(category_id) = category_id {
            separated.push("category_id = ");
            separated.push_bind_unseparated(category_id);
        }

        builder.push(" WHERE id = ");
        builder.push_bind(id);
        builder.build().execute(&mut *tx).await.map_err(|e| {
            tracing::error!("Failed to update title {}: {:?}", id, e);
            AppError::from(e)
        })?;
    }

    if let Some(slugs) = &payload.genre {
        let genre_ids = resolve_genres(&mut tx, slugs).await?;
        link_genres(&mut tx, id, &genre_ids).await?;
    }

    let title = fetch_title(&mut tx, id).await?;
    tx.commit().await?;
    Ok(title)
}

/// Partially update a title. Admin only.
pub async fn update_title(
    State(pool): State<PgPool>,
    Path(id): Path<i64>,
    JsonBody(payload): JsonBody<UpdateTitleRequest>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(apply_update(&pool, id, payload).await?))
}

/// Replace a title. Admin only. Every field is required.
pub async fn replace_title(
    State(pool): State<PgPool>,
    Path(id): Path<i64>,
    JsonBody(payload): JsonBody<CreateTitleRequest>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(apply_update(&pool, id, payload.into()).await?))
}

/// Delete a title. Reviews and their comments go with it.
pub async fn delete_title(
    State(pool): State<PgPool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let result = sqlx::query("DELETE FROM titles WHERE id = $1")
        .bind(id)
        .execute(&pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to delete title: {:?}", e);
            AppError::from(e)
        })?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Title not found".to_string()));
    }

    Ok(StatusCode::NO_CONTENT)
}
