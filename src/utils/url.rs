//! Endpoint construction that tolerates trailing slashes in configured base
//! URLs.

/// Strip trailing slashes from a base URL.
///
/// ```
/// use omnichat::utils::url::normalize_base_url;
///
/// assert_eq!(
///     normalize_base_url("https://generativelanguage.googleapis.com/v1beta//"),
///     "https://generativelanguage.googleapis.com/v1beta"
/// );
/// ```
pub fn normalize_base_url(base_url: &str) -> String {
    base_url.trim_end_matches('/').to_string()
}

/// Join a base URL and an endpoint path with exactly one slash.
///
/// ```
/// use omnichat::utils::url::construct_api_url;
///
/// assert_eq!(
///     construct_api_url("http://localhost:8080/v1beta/", "/models/m:streamGenerateContent"),
///     "http://localhost:8080/v1beta/models/m:streamGenerateContent"
/// );
/// ```
pub fn construct_api_url(base_url: &str, endpoint: &str) -> String {
    let normalized_base = normalize_base_url(base_url);
    let endpoint = endpoint.trim_start_matches('/');
    format!("{}/{}", normalized_base, endpoint)
}
