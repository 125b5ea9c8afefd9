//! URL utilities for listing and device addresses

use url::Url;

/// Parse a listing URL, accepting only absolute `http`/`https` URLs with a host
///
/// ```rust
/// use skyq_epg::utils::url::validate_listing_url;
///
/// assert!(validate_listing_url("http://example.com/feed.xml").is_ok());
/// assert!(validate_listing_url("ftp://example.com/feed.xml").is_err());
/// ```
pub fn validate_listing_url(url: &str) -> Result<Url, String> {
    let trimmed = url.trim();
    let parsed = Url::parse(trimmed).map_err(|e| format!("Invalid URL '{trimmed}': {e}"))?;

    match parsed.scheme() {
        "http" | "https" => {}
        other => return Err(format!("Unsupported URL scheme '{other}' in '{trimmed}'")),
    }

    if parsed.host_str().is_none_or(str::is_empty) {
        return Err(format!("URL '{trimmed}' has no host"));
    }

    Ok(parsed)
}

/// Normalize a device base address: default the scheme to `http` and drop any
/// trailing slash so endpoint paths can be appended directly
pub fn normalize_base_url(base: &str) -> Result<Url, String> {
    let trimmed = base.trim().trim_end_matches('/');
    let with_scheme = if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("http://{trimmed}")
    };
    validate_listing_url(&with_scheme)
}

/// Append `path` to `base`, keeping any path prefix `base` already carries
pub fn join_path(base: &Url, path: &str) -> Result<Url, url::ParseError> {
    let prefix = base.as_str().trim_end_matches('/');
    Url::parse(&format!("{prefix}/{}", path.trim_start_matches('/')))
}
