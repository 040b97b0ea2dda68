use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

/// A row of the 'comments' table joined with the author's username.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Comment {
    pub id: i64,
    #[serde(rename = "review")]
    pub review_id: i64,
    #[serde(skip)]
    pub author_id: i64,
    pub author: String,
    pub text: String,
    pub pub_date: chrono::DateTime<chrono::Utc>,
}

/// DTO for creating or replacing a comment.
#[derive(Debug, Deserialize, Validate)]
pub struct CommentRequest {
    #[validate(length(
        min = 1,
        max = 5000,
        message = "Comment must be between 1 and 5000 characters"
    ))]
    pub text: String,
}
