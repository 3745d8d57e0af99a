//! Offset pagination and rating aggregation shared by the book listing
//! and the per-book review pages.

pub const DEFAULT_BOOKS_PAGE_SIZE: i64 = 10;
pub const DEFAULT_REVIEWS_PAGE_SIZE: i64 = 5;
pub const SEARCH_RESULTS_CAP: i64 = 20;

/// Pages are 1-based; anything below 1 is treated as the first page.
pub fn clamp_page(page: Option<i64>) -> i64 {
    page.unwrap_or(1).max(1)
}

/// A non-positive limit falls back to the caller's default.
pub fn clamp_limit(limit: Option<i64>, default: i64) -> i64 {
    match limit {
        Some(limit) if limit >= 1 => limit,
        _ => default,
    }
}

/// Saturates instead of overflowing so absurdly large page numbers become
/// an offset past the end of the data, not a panic or a negative offset.
pub fn skip(page: i64, limit: i64) -> i64 {
    page.saturating_sub(1).saturating_mul(limit)
}

pub fn total_pages(total: i64, limit: i64) -> i64 {
    (total + limit - 1) / limit
}

/// Slices one page out of the full ordered sequence.
/// Out-of-range pages yield an empty slice rather than an error.
pub fn slice_page<T: Clone>(items: &[T], page: i64, limit: i64) -> Vec<T> {
    let start = skip(page, limit).clamp(0, items.len() as i64) as usize;
    let end = start.saturating_add(limit.max(0) as usize).min(items.len());
    items[start..end].to_vec()
}

/// Arithmetic mean of the ratings rounded to two decimal places,
/// 0.00 when there are no reviews yet.
pub fn average_rating(ratings: &[i32]) -> f64 {
    if ratings.is_empty() {
        return 0.0;
    }
    let sum: i64 = ratings.iter().map(|&r| r as i64).sum();
    let mean = sum as f64 / ratings.len() as f64;
    (mean * 100.0).round() / 100.0
}
