//! HTML page processor
//!
//! This module turns a fetched page into a structured `PageResult`:
//! - Title, with fallbacks (title tag, first h1, og:title, fixed literal)
//! - Whitespace-collapsed body text from paragraphs and headings
//! - Meta tag map
//! - Optional article (body text, headline, author, published date)
//! - Image, script, and stylesheet candidates for the asset pipeline
//! - Same-domain links to feed back into the frontier
//!
//! Extraction is pure: no I/O, no shared state.

use crate::url::{fingerprint, is_crawlable};
use scraper::{ElementRef, Html, Selector};
use std::collections::{BTreeMap, HashSet};
use url::Url;

/// Title used when a page has none
pub const UNTITLED: &str = "Untitled Page";

/// Maximum characters of body text kept per page
pub const MAX_BODY_CHARS: usize = 20_000;

/// Maximum characters kept per meta tag value
pub const MAX_META_VALUE_CHARS: usize = 500;

/// Maximum characters of article text kept per page
pub const MAX_ARTICLE_CHARS: usize = 30_000;

/// Article text shorter than this is not treated as an article
pub const MIN_ARTICLE_CHARS: usize = 100;

pub const MAX_IMAGES: usize = 10;
pub const MAX_SCRIPTS: usize = 8;
pub const MAX_STYLESHEETS: usize = 8;

/// Maximum links fed back into the frontier per page
pub const MAX_LINKS: usize = 30;

const ARTICLE_SELECTOR: &str = "article p, .post-content p, .entry-content p, main p";

/// A fetched page handed to the processor
#[derive(Debug, Clone)]
pub struct RawPage {
    /// Final URL after redirects
    pub url: Url,
    pub status_code: u16,
    pub content_type: String,
    pub body: String,
}

/// Kind of asset referenced by a page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssetKind {
    Image,
    Script,
    Stylesheet,
}

impl AssetKind {
    /// Name stored in the database and used in upload folders
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Script => "script",
            Self::Stylesheet => "stylesheet",
        }
    }

    /// Resource kind passed to the asset store
    ///
    /// Images may be optimized by the store; everything else is kept byte for byte.
    pub fn resource_kind(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Script | Self::Stylesheet => "raw",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "image" => Some(Self::Image),
            "script" => Some(Self::Script),
            "stylesheet" => Some(Self::Stylesheet),
            _ => None,
        }
    }
}

/// An asset found on a page
///
/// `uploaded_url` and `size` stay `None` until the asset pipeline succeeds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetRef {
    pub kind: AssetKind,
    pub source_url: Url,
    pub uploaded_url: Option<String>,
    pub size: Option<u64>,
}

impl AssetRef {
    pub fn new(kind: AssetKind, source_url: Url) -> Self {
        Self {
            kind,
            source_url,
            uploaded_url: None,
            size: None,
        }
    }

    pub fn is_uploaded(&self) -> bool {
        self.uploaded_url.is_some()
    }
}

/// Article content of a page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Article {
    pub headline: Option<String>,
    pub author: Option<String>,
    pub published_date: Option<String>,
    pub text: String,
}

/// Structured result of one processed page
#[derive(Debug, Clone)]
pub struct PageResult {
    pub url: Url,
    pub domain: String,
    pub title: String,
    pub body_text: String,
    pub status_code: u16,
    pub content_type: String,
    pub metadata: BTreeMap<String, String>,
    pub article: Option<Article>,
    pub assets: Vec<AssetRef>,
}

/// Output of the page processor
#[derive(Debug, Clone)]
pub struct ExtractedPage {
    pub result: PageResult,
    /// Same-domain link candidates, fragment-free and deduplicated
    pub links: Vec<Url>,
}

/// Extracts everything the engine needs from a fetched page
///
/// # Arguments
///
/// * `raw` - The fetched page; its URL is the base for relative references
/// * `domain` - The scoped domain; only links on this exact host are returned
///
/// # Example
///
/// ```
/// use site_harvest::crawler::{extract, RawPage};
/// use url::Url;
///
/// let raw = RawPage {
///     url: Url::parse("https://example.com/").unwrap(),
///     status_code: 200,
///     content_type: "text/html".to_string(),
///     body: r#"<title>Home</title><a href="/about">About</a>"#.to_string(),
/// };
/// let page = extract(&raw, "example.com");
/// assert_eq!(page.result.title, "Home");
/// assert_eq!(page.links[0].as_str(), "https://example.com/about");
/// ```
pub fn extract(raw: &RawPage, domain: &str) -> ExtractedPage {
    let document = Html::parse_document(&raw.body);

    let result = PageResult {
        url: raw.url.clone(),
        domain: domain.to_string(),
        title: extract_title(&document),
        body_text: extract_body_text(&document),
        status_code: raw.status_code,
        content_type: raw.content_type.clone(),
        metadata: extract_metadata(&document),
        article: extract_article(&document),
        assets: extract_assets(&document, &raw.url),
    };
    let links = extract_links(&document, &raw.url, domain);

    ExtractedPage { result, links }
}

fn selector(css: &str) -> Option<Selector> {
    Selector::parse(css).ok()
}

/// Trimmed, whitespace-collapsed text of an element
fn element_text(element: ElementRef<'_>) -> String {
    collapse_whitespace(&element.text().collect::<String>())
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

fn first_text(document: &Html, css: &str) -> Option<String> {
    let sel = selector(css)?;
    document
        .select(&sel)
        .map(element_text)
        .find(|text| !text.is_empty())
}

fn first_attr(document: &Html, css: &str, attr: &str) -> Option<String> {
    let sel = selector(css)?;
    document
        .select(&sel)
        .filter_map(|element| element.value().attr(attr))
        .map(str::trim)
        .find(|value| !value.is_empty())
        .map(String::from)
}

/// Extracts the page title
fn extract_title(document: &Html) -> String {
    first_text(document, "title")
        .or_else(|| first_text(document, "h1"))
        .or_else(|| first_attr(document, "meta[property='og:title']", "content"))
        .unwrap_or_else(|| UNTITLED.to_string())
}

/// Paragraph text followed by heading text, collapsed and capped
fn extract_body_text(document: &Html) -> String {
    let mut parts = Vec::new();

    for css in ["p", "h1, h2, h3"] {
        if let Some(sel) = selector(css) {
            parts.extend(
                document
                    .select(&sel)
                    .map(element_text)
                    .filter(|text| !text.is_empty()),
            );
        }
    }

    truncate_chars(&parts.join(" "), MAX_BODY_CHARS)
}

/// Meta tag `name` (or `property`) to `content`, values capped
fn extract_metadata(document: &Html) -> BTreeMap<String, String> {
    let mut metadata = BTreeMap::new();
    let Some(sel) = selector("meta") else {
        return metadata;
    };

    for element in document.select(&sel) {
        let attrs = element.value();
        let key = attrs
            .attr("name")
            .filter(|name| !name.trim().is_empty())
            .or_else(|| attrs.attr("property"))
            .map(str::trim)
            .unwrap_or("");
        let value = attrs.attr("content").map(str::trim).unwrap_or("");

        if key.is_empty() || value.is_empty() {
            continue;
        }
        metadata.insert(key.to_string(), truncate_chars(value, MAX_META_VALUE_CHARS));
    }

    metadata
}

/// Article text from the usual content containers
///
/// Returns None when the combined text is shorter than `MIN_ARTICLE_CHARS`.
fn extract_article(document: &Html) -> Option<Article> {
    let sel = selector(ARTICLE_SELECTOR)?;
    let text = document
        .select(&sel)
        .map(element_text)
        .filter(|text| !text.is_empty())
        .collect::<Vec<_>>()
        .join(" ");

    if text.chars().count() < MIN_ARTICLE_CHARS {
        return None;
    }

    let headline = first_text(document, "h1");
    let author = first_text(document, "[rel='author']")
        .or_else(|| first_text(document, ".author"))
        .or_else(|| first_attr(document, "meta[name='author']", "content"));
    let published_date = first_attr(document, "time[datetime]", "datetime").or_else(|| {
        first_attr(
            document,
            "meta[property='article:published_time']",
            "content",
        )
    });

    Some(Article {
        headline,
        author,
        published_date,
        text: truncate_chars(&text, MAX_ARTICLE_CHARS),
    })
}

/// Resolves an asset reference against the page URL
fn resolve_asset(reference: &str, base_url: &Url) -> Option<Url> {
    let reference = reference.trim();
    if reference.is_empty() || reference.starts_with("data:") {
        return None;
    }

    let mut url = base_url.join(reference).ok()?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return None;
    }
    url.set_fragment(None);
    Some(url)
}

/// Collects asset candidates, deduplicated by absolute URL and capped per kind
fn extract_assets(document: &Html, base_url: &Url) -> Vec<AssetRef> {
    let groups: [(AssetKind, &str, &[&str], usize); 3] = [
        (AssetKind::Image, "img", &["src", "data-src"], MAX_IMAGES),
        (AssetKind::Script, "script[src]", &["src"], MAX_SCRIPTS),
        (
            AssetKind::Stylesheet,
            "link[rel='stylesheet'][href]",
            &["href"],
            MAX_STYLESHEETS,
        ),
    ];

    let mut seen = HashSet::new();
    let mut assets = Vec::new();

    for (kind, css, attrs, cap) in groups {
        let Some(sel) = selector(css) else {
            continue;
        };

        let mut taken = 0;
        'elements: for element in document.select(&sel) {
            for attr in attrs {
                if taken >= cap {
                    break 'elements;
                }
                let Some(url) = element
                    .value()
                    .attr(attr)
                    .and_then(|reference| resolve_asset(reference, base_url))
                else {
                    continue;
                };
                if seen.insert(url.clone()) {
                    assets.push(AssetRef::new(kind, url));
                    taken += 1;
                }
            }
        }
    }

    assets
}

/// Resolves a link href to an absolute, fragment-free URL
///
/// Returns None if the link should be excluded:
/// - empty or fragment-only hrefs
/// - javascript:, mailto:, tel: schemes
/// - data: URIs
/// - invalid URLs
fn resolve_link(href: &str, base_url: &Url) -> Option<Url> {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    let lower = href.to_ascii_lowercase();
    if lower.starts_with("javascript:")
        || lower.starts_with("mailto:")
        || lower.starts_with("tel:")
        || lower.starts_with("data:")
    {
        return None;
    }

    let mut url = base_url.join(href).ok()?;
    url.set_fragment(None);
    Some(url)
}

/// Extracts crawlable same-domain links, deduplicated and capped
fn extract_links(document: &Html, base_url: &Url, domain: &str) -> Vec<Url> {
    let mut links = Vec::new();
    let Some(sel) = selector("a[href]") else {
        return links;
    };

    let mut seen = HashSet::new();
    for element in document.select(&sel) {
        if links.len() >= MAX_LINKS {
            break;
        }

        // Download links point at files, not pages
        if element.value().attr("download").is_some() {
            continue;
        }

        let Some(url) = element
            .value()
            .attr("href")
            .and_then(|href| resolve_link(href, base_url))
        else {
            continue;
        };

        if is_crawlable(&url, domain) && seen.insert(fingerprint(&url)) {
            links.push(url);
        }
    }

    links
}
