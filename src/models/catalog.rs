// src/models/catalog.rs

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

pub static SLUG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[-a-zA-Z0-9_]+$").expect("slug pattern is valid"));

/// Categories and genres share one shape and differ only by table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogKind {
    Category,
    Genre,
}

impl CatalogKind {
    pub fn table(self) -> &'static str {
        match self {
            CatalogKind::Category => "categories",
            CatalogKind::Genre => "genres",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            CatalogKind::Category => "Category",
            CatalogKind::Genre => "Genre",
        }
    }
}

/// A row of the 'categories' or 'genres' table.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, PartialEq)]
pub struct CatalogEntry {
    #[serde(skip)]
    pub id: i64,
    pub name: String,
    pub slug: String,
}

/// DTO for creating a category or genre.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateCatalogEntryRequest {
    #[validate(length(min = 1, max = 256, message = "Name must be between 1 and 256 characters."))]
    pub name: String,
    #[validate(
        length(min = 1, max = 50, message = "Slug must be between 1 and 50 characters."),
        regex(path = *SLUG_RE, message = "Slug may contain only letters, digits, '-' and '_'.")
    )]
    pub slug: String,
}

/// Query parameters for listing categories or genres.
#[derive(Debug, Deserialize)]
pub struct CatalogListParams {
    /// Case-insensitive substring match on name.
    pub search: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}
