use std::fmt;

use serde::Serialize;

pub type Depth = u32;

/// One unit of crawl work. Created once, consumed once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlTask {
    pub url: String,
    pub depth: Depth,
    pub origin_referrer: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DiscoveredLink {
    pub url: String,
    pub is_internal: bool,
}

/// Everything the fetcher learned about one URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResult {
    pub url: String,
    pub final_url: String,
    pub status_code: u16,
    /// Empty without redirects, otherwise requested URL through final URL.
    pub redirect_chain: Vec<String>,
    pub latency_ms: u64,
    pub content_type: Option<String>,
    pub byte_len: u64,
    /// Decoded body for textual content types.
    pub body: Option<String>,
    pub discovered_links: Vec<DiscoveredLink>,
    /// Hrefs that could not be resolved into an absolute URL.
    pub invalid_links: Vec<String>,
}

impl FetchResult {
    pub fn is_html(&self) -> bool {
        match self.content_type.as_deref() {
            Some(ct) => {
                let essence = ct.split(';').next().unwrap_or(ct).trim();
                essence.eq_ignore_ascii_case("text/html")
                    || essence.eq_ignore_ascii_case("application/xhtml+xml")
            }
            None => self.body.is_some(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchErrorKind {
    Timeout,
    Connection,
    HttpError,
    RedirectLoop,
    TooLarge,
}

impl fmt::Display for FetchErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchErrorKind::Timeout => write!(f, "timeout"),
            FetchErrorKind::Connection => write!(f, "connection error"),
            FetchErrorKind::HttpError => write!(f, "http error"),
            FetchErrorKind::RedirectLoop => write!(f, "redirect loop"),
            FetchErrorKind::TooLarge => write!(f, "response too large"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct FetchError {
    pub kind: FetchErrorKind,
    pub status_code: Option<u16>,
    pub message: String,
}

impl FetchError {
    pub fn new(kind: FetchErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            status_code: None,
            message: message.into(),
        }
    }

    pub fn http(status_code: u16, message: impl Into<String>) -> Self {
        Self {
            kind: FetchErrorKind::HttpError,
            status_code: Some(status_code),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Heading {
    pub level: u8,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageInfo {
    pub src: String,
    pub has_alt: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageLink {
    pub href: String,
    pub is_internal: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaMethod {
    JsonLd,
    Microdata,
    Rdfa,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct StructuredData {
    pub method: Option<SchemaMethod>,
    pub schema_types: Vec<String>,
    pub valid: bool,
}

/// Why a page's canonical link is worth a second look.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CanonicalIssue {
    MissingCanonical,
    /// The href was not absolute; it was resolved against the page URL.
    RelativeUrl,
    PointsToDifferentDomain,
    PointsToDifferentUrl,
}

impl fmt::Display for CanonicalIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CanonicalIssue::MissingCanonical => write!(f, "missing canonical"),
            CanonicalIssue::RelativeUrl => write!(f, "relative canonical url"),
            CanonicalIssue::PointsToDifferentDomain => {
                write!(f, "canonical points to a different domain")
            }
            CanonicalIssue::PointsToDifferentUrl => write!(f, "canonical points to a different url"),
        }
    }
}

/// Per-page SEO, content-structure and accessibility signals.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageInfo {
    pub url: String,
    pub final_url: String,
    pub depth: Depth,
    pub title: Option<String>,
    pub title_present: bool,
    pub meta_description: Option<String>,
    pub meta_description_present: bool,
    pub h1_present: bool,
    pub heading_hierarchy: Vec<Heading>,
    pub images: Vec<ImageInfo>,
    pub canonical_url: Option<String>,
    pub canonical_issues: Vec<CanonicalIssue>,
    pub links: Vec<PageLink>,
    pub lang: Option<String>,
    pub meta_robots: Option<String>,
    pub indexable: bool,
    pub robots_txt_allowed: bool,
    pub structured_data: StructuredData,
    pub word_count: usize,
    /// Grade level of the main content; `None` when the page has no main region.
    pub flesch_kincaid_grade: Option<f64>,
    pub inbound_links: usize,
    pub outbound_links: usize,
    #[serde(skip)]
    pub content_fingerprint: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueCategory {
    BrokenLink,
    MissingMeta,
    MissingHeading,
    MissingAlt,
    CanonicalMismatch,
    HeadingHierarchy,
    InvalidUrl,
    FetchFailed,
    AnalysisFailed,
    RedirectLoop,
    NonIndexable,
    DuplicateTitle,
    DuplicateMetaDescription,
    DuplicateContent,
    MissingLang,
    EmptyLinkText,
    InvalidStructuredData,
    Sitemap,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Issue {
    pub url: String,
    pub category: IssueCategory,
    pub severity: Severity,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
}

impl Issue {
    pub fn new(
        url: impl Into<String>,
        category: IssueCategory,
        severity: Severity,
        description: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            category,
            severity,
            description: description.into(),
            source_url: None,
        }
    }

    pub fn with_source(mut self, source_url: impl Into<String>) -> Self {
        self.source_url = Some(source_url.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AnalysisError {
    #[error("content type {0:?} is not html")]
    NotHtml(Option<String>),
    #[error("document is empty")]
    EmptyDocument,
}

/// Analyzer output for one fetched page.
#[derive(Debug, Clone, PartialEq)]
pub struct PageAnalysis {
    pub page: PageInfo,
    pub issues: Vec<Issue>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fetched(content_type: Option<&str>, body: Option<&str>) -> FetchResult {
        FetchResult {
            url: "https://example.com/".into(),
            final_url: "https://example.com/".into(),
            status_code: 200,
            redirect_chain: Vec::new(),
            latency_ms: 1,
            content_type: content_type.map(str::to_string),
            byte_len: 0,
            body: body.map(str::to_string),
            discovered_links: Vec::new(),
            invalid_links: Vec::new(),
        }
    }

    #[test]
    fn html_detection_uses_content_type_essence() {
        assert!(fetched(Some("text/html; charset=utf-8"), None).is_html());
        assert!(fetched(Some("Application/XHTML+XML"), None).is_html());
        assert!(!fetched(Some("application/xml"), Some("<urlset/>")).is_html());
        assert!(fetched(None, Some("<p>hi</p>")).is_html());
        assert!(!fetched(None, None).is_html());
    }

    #[test]
    fn fetch_error_display_includes_kind() {
        let err = FetchError::http(404, "404 Not Found");
        assert_eq!(err.to_string(), "http error: 404 Not Found");
        assert_eq!(err.status_code, Some(404));
    }
}
