//! URL resolution and normalization for consistent cache identities.

use url::Url;

/// Error type for URL resolution failures.
#[derive(Debug, Clone, thiserror::Error)]
pub enum UrlError {
    #[error("empty URL")]
    Empty,

    #[error("invalid URL: {0}")]
    InvalidUrl(String),
}

/// Resolve a possibly relative URL against `base` and normalize it.
///
/// Absolute inputs keep their own scheme and host, so non-http URLs come
/// back unchanged apart from normalization and can be routed around the
/// cache by the caller.
pub fn canonicalize(base: &Url, input: &str) -> Result<Url, UrlError> {
    let trimmed = input.trim();

    if trimmed.is_empty() {
        return Err(UrlError::Empty);
    }

    let parsed = base.join(trimmed).map_err(|e| UrlError::InvalidUrl(e.to_string()))?;
    normalize(parsed)
}

/// Normalize an absolute URL into its cache identity form.
///
/// 1. Lowercase the host
/// 2. Remove fragment (#...)
/// 3. Keep query string intact (do not reorder)
pub fn normalize(mut url: Url) -> Result<Url, UrlError> {
    if let Some(host) = url.host_str()
        && host.chars().any(|c| c.is_ascii_uppercase())
    {
        let lowered = host.to_lowercase();
        url.set_host(Some(&lowered))
            .map_err(|e| UrlError::InvalidUrl(e.to_string()))?;
    }

    url.set_fragment(None);

    Ok(url)
}

/// True for `http` and `https` URLs, the only schemes the cache handles.
pub fn is_http(url: &Url) -> bool {
    matches!(url.scheme(), "http" | "https")
}
