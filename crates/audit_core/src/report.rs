use std::collections::BTreeMap;

use serde::Serialize;

use crate::model::{
    CanonicalIssue, Depth, FetchErrorKind, FetchResult, Issue, IssueCategory, PageInfo,
    SchemaMethod, Severity,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TechnicalRecord {
    pub url: String,
    pub final_url: String,
    pub status_code: u16,
    pub redirect_chain: Vec<String>,
    pub latency_ms: u64,
    pub depth: Depth,
    pub content_type: Option<String>,
    pub byte_len: u64,
}

impl TechnicalRecord {
    pub fn from_fetch(fetched: &FetchResult, depth: Depth) -> Self {
        Self {
            url: fetched.url.clone(),
            final_url: fetched.final_url.clone(),
            status_code: fetched.status_code,
            redirect_chain: fetched.redirect_chain.clone(),
            latency_ms: fetched.latency_ms,
            depth,
            content_type: fetched.content_type.clone(),
            byte_len: fetched.byte_len,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedFetch {
    pub url: String,
    pub depth: Depth,
    pub kind: FetchErrorKind,
    pub status_code: Option<u16>,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct RobotsSummary {
    pub url: Option<String>,
    pub found: bool,
    pub sitemaps: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SitemapKind {
    Urlset,
    Index,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SitemapFinding {
    pub url: String,
    pub severity: Severity,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct SitemapReport {
    pub url: Option<String>,
    pub found: bool,
    pub kind: Option<SitemapKind>,
    pub url_count: usize,
    pub findings: Vec<SitemapFinding>,
    /// Page URLs listed across all visited sitemaps.
    #[serde(skip)]
    pub entries: Vec<String>,
}

/// Site-wide findings gathered before the pool starts.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SiteFindings {
    pub robots: RobotsSummary,
    pub sitemap: SitemapReport,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct StructuredDataSummary {
    pub by_method: BTreeMap<SchemaMethod, usize>,
    pub schema_types: BTreeMap<String, usize>,
    pub pages_with_schema: usize,
    pub pages_without_schema: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TechnicalDiscovery {
    pub domain: String,
    pub crawl_timestamp: String,
    pub seed: String,
    pub max_depth: Depth,
    pub pages_crawled: usize,
    pub records: Vec<TechnicalRecord>,
    pub failures: Vec<FailedFetch>,
    pub redirect_loops: usize,
    pub depth_distribution: BTreeMap<Depth, usize>,
    pub robots_txt: RobotsSummary,
    pub sitemap: SitemapReport,
    pub orphan_pages: Vec<String>,
    pub structured_data: StructuredDataSummary,
    pub canonical_issues_summary: BTreeMap<CanonicalIssue, usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct IssueSummary {
    pub total: usize,
    pub by_severity: BTreeMap<Severity, usize>,
    pub by_category: BTreeMap<IssueCategory, usize>,
}

impl IssueSummary {
    pub fn from_issues(issues: &[Issue]) -> Self {
        let mut by_severity: BTreeMap<Severity, usize> =
            [Severity::High, Severity::Medium, Severity::Low]
                .into_iter()
                .map(|severity| (severity, 0))
                .collect();
        let mut by_category = BTreeMap::new();
        for issue in issues {
            *by_severity.entry(issue.severity).or_default() += 1;
            *by_category.entry(issue.category).or_default() += 1;
        }
        Self {
            total: issues.len(),
            by_severity,
            by_category,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IssueReport {
    pub issues: Vec<Issue>,
    pub summary: IssueSummary,
}

impl IssueReport {
    pub fn new(issues: Vec<Issue>) -> Self {
        let summary = IssueSummary::from_issues(&issues);
        Self { issues, summary }
    }

    pub fn count(&self, category: IssueCategory) -> usize {
        self.summary.by_category.get(&category).copied().unwrap_or(0)
    }

    pub fn for_url<'a>(&'a self, url: &'a str) -> impl Iterator<Item = &'a Issue> + 'a {
        self.issues.iter().filter(move |issue| issue.url == url)
    }
}

/// Identifies the crawl in the emitted documents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportContext {
    pub domain: String,
    pub seed: String,
    pub crawl_timestamp: String,
}

/// The three result documents of one crawl.
#[derive(Debug, Clone, PartialEq)]
pub struct CrawlReport {
    pub technical: TechnicalDiscovery,
    pub issues: IssueReport,
    pub pages: Vec<PageInfo>,
}

impl CrawlReport {
    pub fn page(&self, url: &str) -> Option<&PageInfo> {
        self.pages.iter().find(|page| page.url == url)
    }
}
