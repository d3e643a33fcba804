//! URL handling module for Site-Harvest
//!
//! This module provides URL normalization, fingerprinting, domain extraction,
//! and the crawlability checks shared by the frontier and the page processor.

mod domain;
mod normalize;

// Re-export main functions
pub use domain::{clean_domain, extract_domain};
pub use normalize::{fingerprint, normalize_url, Fingerprint};

use url::Url;

/// Path extensions that are never fetched as pages
pub const SKIP_EXTENSIONS: &[&str] = &[
    ".pdf", ".jpg", ".jpeg", ".png", ".gif", ".webp", ".svg", ".ico", ".bmp", ".zip", ".gz",
    ".tar", ".rar", ".7z", ".exe", ".dmg", ".iso", ".mp4", ".mp3", ".avi", ".mov", ".wav",
    ".woff", ".woff2", ".ttf", ".eot", ".doc", ".docx", ".xls", ".xlsx", ".ppt", ".pptx",
];

/// Returns true if the URL uses a scheme the crawler fetches
pub fn is_http_scheme(url: &Url) -> bool {
    matches!(url.scheme(), "http" | "https")
}

/// Returns true if the URL path ends with a binary extension from the skip-list
///
/// # Examples
///
/// ```
/// use url::Url;
/// use site_harvest::url::has_skipped_extension;
///
/// assert!(has_skipped_extension(&Url::parse("https://example.com/report.PDF").unwrap()));
/// assert!(!has_skipped_extension(&Url::parse("https://example.com/about").unwrap()));
/// ```
pub fn has_skipped_extension(url: &Url) -> bool {
    let path = url.path().to_lowercase();
    SKIP_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
}

/// Returns true if the URL could be crawled as a page of `domain`
///
/// Checks scheme, exact host match (no subdomains), and the extension
/// skip-list. Depth, ceiling, and dedup are the frontier's business.
pub fn is_crawlable(url: &Url, domain: &str) -> bool {
    if !is_http_scheme(url) {
        return false;
    }

    match extract_domain(url) {
        Some(host) if host == domain => !has_skipped_extension(url),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_same_domain_is_crawlable() {
        assert!(is_crawlable(&parse("https://example.com/page"), "example.com"));
        assert!(is_crawlable(&parse("http://example.com/"), "example.com"));
    }

    #[test]
    fn test_subdomain_is_not_crawlable() {
        assert!(!is_crawlable(&parse("https://blog.example.com/"), "example.com"));
        assert!(!is_crawlable(&parse("https://www.example.com/"), "example.com"));
    }

    #[test]
    fn test_other_domain_is_not_crawlable() {
        assert!(!is_crawlable(&parse("https://other.com/"), "example.com"));
    }

    #[test]
    fn test_non_http_scheme_is_not_crawlable() {
        assert!(!is_crawlable(&parse("ftp://example.com/file"), "example.com"));
    }

    #[test]
    fn test_binary_extensions_are_skipped() {
        for path in ["/a.pdf", "/b.JPG", "/c.zip", "/d.mp4", "/e.woff2"] {
            let url = parse(&format!("https://example.com{}", path));
            assert!(!is_crawlable(&url, "example.com"), "{} should be skipped", path);
        }
    }

    #[test]
    fn test_extension_check_ignores_query() {
        let url = parse("https://example.com/page?download=file.pdf");
        assert!(is_crawlable(&url, "example.com"));
    }
}
