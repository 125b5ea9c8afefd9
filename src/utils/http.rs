//! HTTP header helpers for ranged transfers

use chrono::{DateTime, Utc};

/// Value for a `Range` header covering `start..=end`
pub fn range_header(start: u64, end: u64) -> String {
    format!("bytes={start}-{end}")
}

/// Parsed `Content-Range: bytes <start>-<end>/<total>` header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentRange {
    pub start: u64,
    pub end: u64,
    /// `None` when the server sends `*` for the complete length
    pub total: Option<u64>,
}

/// Parse a `Content-Range` header value
///
/// Examples: `"bytes 0-262143/1048576"`, `"bytes 0-99/*"`.
pub fn parse_content_range(value: &str) -> Option<ContentRange> {
    let rest = value.trim().strip_prefix("bytes")?.trim_start();
    let (range, total) = rest.split_once('/')?;
    let (start, end) = range.trim().split_once('-')?;

    let start = start.trim().parse::<u64>().ok()?;
    let end = end.trim().parse::<u64>().ok()?;
    if end < start {
        return None;
    }

    let total = match total.trim() {
        "*" => None,
        n => Some(n.parse::<u64>().ok()?),
    };

    Some(ContentRange { start, end, total })
}

/// Parse an HTTP date such as a `Last-Modified` header
///
/// RFC 1123 (`"Mon, 08 Oct 2018 01:50:19 GMT"`) is what servers send in
/// practice; RFC 3339 is accepted as a courtesy.
pub fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    let trimmed = value.trim();
    DateTime::parse_from_rfc2822(trimmed)
        .or_else(|_| DateTime::parse_from_rfc3339(trimmed))
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}

/// Whether a `Content-Encoding` header value names gzip
pub fn is_gzip_encoding(value: &str) -> bool {
    value
        .split(',')
        .any(|enc| matches!(enc.trim().to_ascii_lowercase().as_str(), "gzip" | "x-gzip"))
}
