use crate::UrlError;
use url::Url;

/// Tracking query parameters dropped during canonicalization
const TRACKING_PARAMS: &[&str] = &["fbclid", "gclid", "mc_eid", "mc_cid"];

/// Canonicalizes a URL, optionally resolving it against a context URL first
///
/// The canonical string is the identity of a page: the document id registry and the
/// frontier both key on it, so two spellings of the same resource must collapse to
/// one value.
///
/// # Canonicalization Steps
///
/// 1. Resolve `href` against `context` when one is given (dot segments are removed here)
/// 2. Reject anything that is not http or https, or that has no host
/// 3. Lowercase the host and drop the scheme's default port
/// 4. Collapse repeated slashes in the path; an empty path becomes `/`
/// 5. Remove the fragment
/// 6. Remove tracking query parameters and sort the rest by key
/// 7. Remove an empty query string
///
/// # Arguments
///
/// * `href` - Absolute or relative URL text
/// * `context` - URL the href was found on, if any
///
/// # Returns
///
/// * `Ok(String)` - Canonical URL
/// * `Err(UrlError)` - The href could not be resolved to a crawlable URL
///
/// # Examples
///
/// ```
/// use nanocrawl::url::canonicalize;
///
/// let url = canonicalize("../b?z=1&a=2#top", Some("http://Example.COM:80/x/y/")).unwrap();
/// assert_eq!(url, "http://example.com/x/b?a=2&z=1");
/// ```
pub fn canonicalize(href: &str, context: Option<&str>) -> Result<String, UrlError> {
    canonicalize_url(href, context).map(String::from)
}

/// Same as [`canonicalize`] but returns the parsed [`Url`]
pub fn canonicalize_url(href: &str, context: Option<&str>) -> Result<Url, UrlError> {
    let href = href.trim();
    if href.is_empty() {
        return Err(UrlError::Malformed("empty URL".to_string()));
    }

    let mut url = match context {
        Some(base) => {
            let base = Url::parse(base.trim()).map_err(|e| UrlError::Parse(e.to_string()))?;
            base.join(href).map_err(|e| UrlError::Parse(e.to_string()))?
        }
        None => Url::parse(href).map_err(|e| UrlError::Parse(e.to_string()))?,
    };

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(url.scheme().to_string()));
    }

    let host = match url.host_str() {
        Some(host) if !host.is_empty() => host.to_lowercase(),
        _ => return Err(UrlError::MissingHost),
    };
    url.set_host(Some(&host))
        .map_err(|e| UrlError::Malformed(format!("Failed to set host: {}", e)))?;

    let normalized_path = normalize_path(url.path());
    url.set_path(&normalized_path);

    url.set_fragment(None);

    if url.query().is_some() {
        let params = filter_and_sort_query_params(&url);
        if params.is_empty() {
            url.set_query(None);
        } else {
            url.query_pairs_mut().clear().extend_pairs(params);
        }
    }

    Ok(url)
}

/// Collapses empty segments while keeping a trailing slash
fn normalize_path(path: &str) -> String {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    if segments.is_empty() {
        return "/".to_string();
    }

    let mut result = format!("/{}", segments.join("/"));
    if path.ends_with('/') {
        result.push('/');
    }
    result
}

/// Filters out tracking parameters and sorts remaining query parameters
fn filter_and_sort_query_params(url: &Url) -> Vec<(String, String)> {
    let mut params: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| !is_tracking_param(key))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    // Stable sort keeps repeated keys in document order
    params.sort_by(|a, b| a.0.cmp(&b.0));

    params
}

fn is_tracking_param(key: &str) -> bool {
    key.starts_with("utm_") || TRACKING_PARAMS.contains(&key)
}
