// src/models/review.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

/// A row of the 'reviews' table joined with the author's username.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Review {
    pub id: i64,
    #[serde(rename = "title")]
    pub title_id: i64,
    #[serde(skip)]
    pub author_id: i64,
    /// Author's username.
    pub author: String,
    pub text: String,
    pub score: i16,
    pub pub_date: chrono::DateTime<chrono::Utc>,
}

/// DTO for creating (or fully replacing) a review.
/// The title comes from the path and the author from the token.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateReviewRequest {
    #[validate(length(min = 1, max = 10000, message = "Text must be between 1 and 10000 characters."))]
    pub text: String,
    #[validate(range(min = 1, max = 10, message = "Score must be between 1 and 10."))]
    pub score: i16,
}

/// DTO for updating a review. Fields are optional.
#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateReviewRequest {
    #[validate(length(min = 1, max = 10000, message = "Text must be between 1 and 10000 characters."))]
    pub text: Option<String>,
    #[validate(range(min = 1, max = 10, message = "Score must be between 1 and 10."))]
    pub score: Option<i16>,
}

impl From<CreateReviewRequest> for UpdateReviewRequest {
    fn from(req: CreateReviewRequest) -> Self {
        Self {
            text: Some(req.text),
            score: Some(req.score),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn score_range() {
        for score in [1, 5, 10] {
            let req = CreateReviewRequest { text: "ok".into(), score };
            assert!(req.validate().is_ok(), "{score}");
        }
        for score in [0, 11, -3] {
            let req = CreateReviewRequest { text: "ok".into(), score };
            assert!(req.validate().is_err(), "{score}");
        }
    }

    #[test]
    fn client_supplied_author_and_title_are_ignored() {
        let req: CreateReviewRequest = serde_json::from_value(serde_json::json!({
            "text": "Great", "score": 9, "author": "mallory", "title": 999
        }))
        .unwrap();
        assert_eq!(req.score, 9);
    }
}
