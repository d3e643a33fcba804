use url::Url;

/// Extracts the domain from a URL
///
/// Returns the lowercase host portion of the URL. Ports are not part of the
/// domain.
///
/// # Examples
///
/// ```
/// use url::Url;
/// use site_harvest::url::extract_domain;
///
/// let url = Url::parse("https://EXAMPLE.COM/path").unwrap();
/// assert_eq!(extract_domain(&url), Some("example.com".to_string()));
///
/// let url = Url::parse("https://sub.example.com:8443/path").unwrap();
/// assert_eq!(extract_domain(&url), Some("sub.example.com".to_string()));
/// ```
pub fn extract_domain(url: &Url) -> Option<String> {
    url.host_str().map(|h| h.to_lowercase())
}

/// Cleans user input into a bare scoped domain
///
/// Accepts either a bare host (`example.com`) or a URL
/// (`https://example.com/path`) and returns the lowercase host.
///
/// # Examples
///
/// ```
/// use site_harvest::url::clean_domain;
///
/// assert_eq!(clean_domain("https://Example.com/about"), Some("example.com".to_string()));
/// assert_eq!(clean_domain("  example.com "), Some("example.com".to_string()));
/// assert_eq!(clean_domain(""), None);
/// ```
pub fn clean_domain(input: &str) -> Option<String> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return None;
    }

    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        return Url::parse(trimmed).ok().as_ref().and_then(extract_domain);
    }

    // Bare host, possibly followed by a path
    let host = trimmed.split('/').next().unwrap_or(trimmed);
    let host = host.split(':').next().unwrap_or(host);
    if host.is_empty() {
        None
    } else {
        Some(host.to_lowercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_simple_domain() {
        let url = Url::parse("https://example.com/").unwrap();
        assert_eq!(extract_domain(&url), Some("example.com".to_string()));
    }

    #[test]
    fn test_extract_subdomain() {
        let url = Url::parse("https://blog.example.com/post").unwrap();
        assert_eq!(extract_domain(&url), Some("blog.example.com".to_string()));
    }

    #[test]
    fn test_extract_with_port() {
        let url = Url::parse("http://127.0.0.1:8080/").unwrap();
        assert_eq!(extract_domain(&url), Some("127.0.0.1".to_string()));
    }

    #[test]
    fn test_extract_mixed_case() {
        let url = Url::parse("https://Example.COM/").unwrap();
        assert_eq!(extract_domain(&url), Some("example.com".to_string()));
    }

    #[test]
    fn test_clean_domain_from_url() {
        assert_eq!(
            clean_domain("http://example.com:8080/a/b"),
            Some("example.com".to_string())
        );
    }

    #[test]
    fn test_clean_domain_bare_host_with_path() {
        assert_eq!(clean_domain("Example.com/blog"), Some("example.com".to_string()));
    }

    #[test]
    fn test_clean_domain_rejects_blank() {
        assert_eq!(clean_domain("   "), None);
    }
}
