use crate::UrlError;
use url::Url;

/// Schemes that are never resolved against a base URL
const PASSTHROUGH_SCHEMES: &[&str] = &["mailto:", "tel:", "data:", "javascript:"];

/// Resolves a raw `href`/`src` value to an absolute URL
///
/// Normalization is best-effort and never fails:
///
/// 1. `mailto:`, `tel:`, `data:` and `javascript:` values are returned verbatim
/// 2. Protocol-relative (`//host/path`), absolute-path (`/path`) and relative
///    (`page`, `../page`) values are resolved against `base`
/// 3. When `strip_fragment` is set, everything after `#` is dropped
/// 4. Anything that cannot be resolved is returned unchanged
///
/// Normalizing an already normalized URL returns the same string.
///
/// # Examples
///
/// ```
/// use sumi_reader::url::normalize_url;
/// use url::Url;
///
/// let base = Url::parse("https://example.com/docs/intro").unwrap();
/// assert_eq!(normalize_url("../api#x", &base, true), "https://example.com/api");
/// assert_eq!(normalize_url("//cdn.example.com/a.png", &base, false), "https://cdn.example.com/a.png");
/// assert_eq!(normalize_url("mailto:hi@example.com", &base, true), "mailto:hi@example.com");
/// ```
pub fn normalize_url(raw: &str, base: &Url, strip_fragment: bool) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() || is_passthrough(trimmed) {
        return raw.to_string();
    }

    match base.join(trimmed) {
        Ok(mut resolved) => {
            if strip_fragment {
                resolved.set_fragment(None);
            }
            resolved.to_string()
        }
        Err(e) => {
            tracing::trace!(url = raw, error = %e, "Leaving unresolvable URL untouched");
            raw.to_string()
        }
    }
}

/// Returns true for hrefs that only point at an anchor on the current page
pub fn is_fragment_only(href: &str) -> bool {
    href.trim_start().starts_with('#')
}

fn is_passthrough(value: &str) -> bool {
    let lower = value.to_ascii_lowercase();
    PASSTHROUGH_SCHEMES
        .iter()
        .any(|scheme| lower.starts_with(scheme))
}

/// Parses and validates the target URL of a request
///
/// # Validation Steps
///
/// 1. Trim surrounding whitespace; reject empty input
/// 2. Assume `https://` when no scheme is given (`example.com/page`)
/// 3. Parse; reject if malformed
/// 4. Only HTTP and HTTPS schemes are accepted
/// 5. A host is required
/// 6. The fragment is removed
///
/// # Arguments
///
/// * `raw` - The target URL as supplied by the caller
///
/// # Returns
///
/// * `Ok(Url)` - The canonical target URL
/// * `Err(UrlError)` - The target cannot be fetched
pub fn parse_target_url(raw: &str) -> Result<Url, UrlError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(UrlError::Malformed("URL is empty".to_string()));
    }

    let candidate = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed.trim_start_matches('/'))
    };

    let mut url = Url::parse(&candidate).map_err(|e| UrlError::Parse(e.to_string()))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(format!(
            "Only HTTP and HTTPS schemes are supported, got: {}",
            url.scheme()
        )));
    }

    if url.host_str().map_or(true, str::is_empty) {
        return Err(UrlError::MissingDomain);
    }

    url.set_fragment(None);
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://example.com/docs/guide/intro").unwrap()
    }

    #[test]
    fn test_protocol_relative() {
        assert_eq!(
            normalize_url("//cdn.example.com/img.png", &base(), false),
            "https://cdn.example.com/img.png"
        );
    }

    #[test]
    fn test_absolute_path() {
        assert_eq!(
            normalize_url("/about", &base(), false),
            "https://example.com/about"
        );
    }

    #[test]
    fn test_relative_path() {
        assert_eq!(
            normalize_url("setup", &base(), false),
            "https://example.com/docs/guide/setup"
        );
        assert_eq!(
            normalize_url("../api", &base(), false),
            "https://example.com/docs/api"
        );
    }

    #[test]
    fn test_absolute_url_kept() {
        assert_eq!(
            normalize_url("https://other.org/x?y=1", &base(), false),
            "https://other.org/x?y=1"
        );
    }

    #[test]
    fn test_strip_fragment() {
        assert_eq!(
            normalize_url("/page#section", &base(), true),
            "https://example.com/page"
        );
        assert_eq!(
            normalize_url("/page#section", &base(), false),
            "https://example.com/page#section"
        );
    }

    #[test]
    fn test_passthrough_schemes() {
        for raw in [
            "mailto:someone@example.com",
            "tel:+15550100",
            "data:image/png;base64,AAAA",
            "JavaScript:void(0)",
        ] {
            assert_eq!(normalize_url(raw, &base(), true), raw);
        }
    }

    #[test]
    fn test_unparseable_returned_unchanged() {
        assert_eq!(normalize_url("http://[::1", &base(), true), "http://[::1");
        assert_eq!(normalize_url("", &base(), true), "");
    }

    #[test]
    fn test_idempotent() {
        let inputs = [
            "/a/./b/../c",
            "//cdn.example.com/x y.png",
            "relative?q=1#frag",
            "HTTPS://EXAMPLE.COM/Path",
            "mailto:x@y.z",
        ];
        for raw in inputs {
            for strip in [true, false] {
                let once = normalize_url(raw, &base(), strip);
                let twice = normalize_url(&once, &base(), strip);
                assert_eq!(once, twice, "not idempotent for {raw}");
            }
        }
    }

    #[test]
    fn test_fragment_only_detection() {
        assert!(is_fragment_only("#top"));
        assert!(is_fragment_only("  #x"));
        assert!(!is_fragment_only("/page#x"));
    }

    #[test]
    fn test_parse_target_adds_scheme() {
        let url = parse_target_url("example.com/page").unwrap();
        assert_eq!(url.as_str(), "https://example.com/page");
    }

    #[test]
    fn test_parse_target_strips_fragment() {
        let url = parse_target_url(" https://example.com/page#intro ").unwrap();
        assert_eq!(url.as_str(), "https://example.com/page");
    }

    #[test]
    fn test_parse_target_invalid_scheme() {
        let result = parse_target_url("ftp://example.com/file");
        assert!(matches!(result, Err(UrlError::InvalidScheme(_))));
    }

    #[test]
    fn test_parse_target_empty() {
        assert!(matches!(parse_target_url("   "), Err(UrlError::Malformed(_))));
    }

    #[test]
    fn test_parse_target_malformed() {
        assert!(parse_target_url("http://exa mple.com").is_err());
    }
}
