use crate::errors::ApiError;
use axum::http::HeaderValue;
use axum::http::header::{CONTENT_RANGE, HeaderMap};
use serde::Deserialize;

/// Query parameters accepted by list endpoints.
///
/// `range` is a JSON array `[start, end]` of inclusive row indices, for example:
///
/// ```text
/// GET /api/users?range=[0,9]
/// ```
#[derive(Clone, Debug, Default, Deserialize)]
pub struct ListParams {
    pub range: Option<String>,
}

/// Largest row index a window may reference. Storage drivers bind offsets
/// and limits as signed 64-bit integers.
pub const MAX_ROW_INDEX: u64 = i64::MAX.unsigned_abs();

/// Parse a `range` parameter into an `(offset, limit)` window.
///
/// No parameter means no window. The limit is clamped to `max_page_size`.
///
/// # Errors
///
/// `Validation` when the value is not two non-negative integers in order, or
/// when either bound is above [`MAX_ROW_INDEX`].
///
/// # Example
///
/// ```
/// use autocrud::pagination::parse_range;
///
/// assert_eq!(parse_range(Some("[20,29]"), 1000).unwrap(), Some((20, 10)));
/// assert_eq!(parse_range(Some("[0,99999]"), 50).unwrap(), Some((0, 50)));
/// assert!(parse_range(Some("[5,1]"), 1000).is_err());
/// ```
pub fn parse_range(range: Option<&str>, max_page_size: u64) -> Result<Option<(u64, u64)>, ApiError> {
    let Some(range) = range else {
        return Ok(None);
    };
    let bounds: Vec<u64> = serde_json::from_str(range).map_err(|_| malformed(range))?;
    let &[start, end] = bounds.as_slice() else {
        return Err(malformed(range));
    };
    if end < start || end > MAX_ROW_INDEX {
        return Err(malformed(range));
    }
    let limit = (end - start + 1)
        .min(max_page_size.max(1))
        .min(MAX_ROW_INDEX);
    Ok(Some((start, limit)))
}

fn malformed(range: &str) -> ApiError {
    ApiError::invalid(format!(
        "range must be [start, end] with 0 <= start <= end <= {MAX_ROW_INDEX}, got '{}'",
        sanitize(range)
    ))
}

/// Build the `Content-Range` header for a page of `returned` rows.
///
/// An empty page is reported as `<resource> */<total>`. Control characters
/// in `resource` are dropped.
///
/// # Example
///
/// ```
/// use autocrud::pagination::calculate_content_range;
/// use axum::http::header::CONTENT_RANGE;
///
/// let headers = calculate_content_range(20, 10, 312, "users");
/// assert_eq!(headers[CONTENT_RANGE], "users 20-29/312");
///
/// let headers = calculate_content_range(400, 0, 312, "users");
/// assert_eq!(headers[CONTENT_RANGE], "users */312");
/// ```
#[must_use]
pub fn calculate_content_range(offset: u64, returned: u64, total: u64, resource: &str) -> HeaderMap {
    let resource = sanitize(resource);
    let content_range = if returned == 0 {
        format!("{resource} */{total}")
    } else {
        let last = offset.saturating_add(returned - 1);
        format!("{resource} {offset}-{last}/{total}")
    };

    let mut headers = HeaderMap::new();
    if let Ok(value) = HeaderValue::from_str(&content_range) {
        headers.insert(CONTENT_RANGE, value);
    }
    headers
}

fn sanitize(text: &str) -> String {
    text.chars().filter(|c| !c.is_control()).collect()
}
