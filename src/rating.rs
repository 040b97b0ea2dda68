//! Title rating aggregation.
//!
//! Titles are read together with per-title `SUM(score)` and `COUNT(score)`
//! totals in the same query; the mean is derived here.

/// Mean review score from pre-aggregated totals. `None` when there are no reviews.
pub fn compute_rating(score_total: i64, review_count: i64) -> Option<f64> {
    if review_count <= 0 {
        return None;
    }
    Some(score_total as f64 / review_count as f64)
}
