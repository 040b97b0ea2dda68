// src/models/title.rs

use chrono::Datelike;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

use crate::{error::AppError, models::catalog::CatalogEntry, rating::compute_rating};

/// Earliest year accepted for a title.
pub const MIN_YEAR: i32 = 1;

/// A title joined with its category and review totals.
#[derive(Debug, Clone, FromRow)]
pub struct TitleRow {
    pub id: i64,
    pub name: String,
    pub year: i32,
    pub description: String,
    pub category_name: String,
    pub category_slug: String,
    pub score_total: i64,
    pub review_count: i64,
}

/// Read representation of a title.
#[derive(Debug, Serialize)]
pub struct TitleResponse {
    pub id: i64,
    pub name: String,
    pub year: i32,
    pub description: String,
    pub genre: Vec<CatalogEntry>,
    pub category: CatalogEntry,
    pub rating: Option<f64>,
}

impl TitleResponse {
    pub fn from_row(row: TitleRow, genre: Vec<CatalogEntry>) -> Self {
        Self {
            id: row.id,
            name: row.name,
            year: row.year,
            description: row.description,
            genre,
            category: CatalogEntry {
                id: 0,
                name: row.category_name,
                slug: row.category_slug,
            },
            rating: compute_rating(row.score_total, row.review_count),
        }
    }
}

/// DTO for creating (or fully replacing) a title.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateTitleRequest {
    #[validate(length(min = 1, max = 256, message = "Name must be between 1 and 256 characters."))]
    pub name: String,
    pub year: i32,
    #[serde(default)]
    pub description: String,
    /// Genre slugs.
    #[serde(default)]
    pub genre: Vec<String>,
    /// Category slug.
    pub category: String,
}

/// DTO for updating a title. Fields are optional.
#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateTitleRequest {
    #[validate(length(min = 1, max = 256, message = "Name must be between 1 and 256 characters."))]
    pub name: Option<String>,
    pub year: Option<i32>,
    pub description: Option<String>,
    pub genre: Option<Vec<String>>,
    pub category: Option<String>,
}

impl From<CreateTitleRequest> for UpdateTitleRequest {
    fn from(req: CreateTitleRequest) -> Self {
        Self {
            name: Some(req.name),
            year: Some(req.year),
            description: Some(req.description),
            genre: Some(req.genre),
            category: Some(req.category),
        }
    }
}

/// Query parameters for listing titles. All filters combine with AND.
#[derive(Debug, Default, Deserialize)]
pub struct TitleListParams {
    /// Exact category slug.
    pub category: Option<String>,
    /// Exact genre slug.
    pub genre: Option<String>,
    pub year: Option<i32>,
    /// Case-insensitive substring of the name.
    pub name: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Rejects years in the future and years before [`MIN_YEAR`].
pub fn validate_year(year: i32) -> Result<(), AppError> {
    check_year(year, chrono::Utc::now().year()).map_err(|msg| AppError::field("year", msg))
}

fn check_year(year: i32, current_year: i32) -> Result<(), &'static str> {
    if year > current_year {
        return Err("Titles that have not been released yet cannot be added.");
    }
    if year < MIN_YEAR {
        return Err("Year must be a positive number.");
    }
    Ok(())
}

/// Escapes `%`, `_` and `\` so user input matches literally inside ILIKE.
pub fn escape_like(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn year_bounds() {
        assert!(check_year(2026, 2026).is_ok());
        assert!(check_year(1999, 2026).is_ok());
        assert!(check_year(2027, 2026).is_err());
        assert!(check_year(0, 2026).is_err());
        assert!(check_year(-500, 2026).is_err());
    }

    #[test]
    fn future_year_is_a_field_error() {
        let next_year = chrono::Utc::now().year() + 1;
        match validate_year(next_year) {
            Err(AppError::Validation(fields)) => assert!(fields.contains_key("year")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn like_escaping() {
        assert_eq!(escape_like("matrix"), "matrix");
        assert_eq!(escape_like("100%_\\"), "100\\%\\_\\\\");
    }

    #[test]
    fn response_rating_is_null_without_reviews() {
        let row = TitleRow {
            id: 1,
            name: "Solaris".into(),
            year: 1972,
            description: String::new(),
            category_name: "Film".into(),
            category_slug: "film".into(),
            score_total: 0,
            review_count: 0,
        };
        let json = serde_json::to_value(TitleResponse::from_row(row, vec![])).unwrap();
        assert!(json["rating"].is_null());
        assert_eq!(json["category"], serde_json::json!({ "name": "Film", "slug": "film" }));
    }
}
