use url::Url;

/// Extracts the lowercase host of a URL
///
/// # Examples
///
/// ```
/// use url::Url;
/// use sumi_reader::url::extract_domain;
///
/// let url = Url::parse("https://Docs.Example.COM/path").unwrap();
/// assert_eq!(extract_domain(&url), Some("docs.example.com".to_string()));
/// ```
pub fn extract_domain(url: &Url) -> Option<String> {
    url.host_str().map(|h| h.to_lowercase())
}

/// Returns true when both URLs point at the same host, ignoring a leading `www.`
///
/// Used by link extraction to separate internal links from external ones.
pub fn same_host(a: &Url, b: &Url) -> bool {
    match (extract_domain(a), extract_domain(b)) {
        (Some(x), Some(y)) => x.trim_start_matches("www.") == y.trim_start_matches("www."),
        _ => false,
    }
}
