use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use audit_logging::{audit_debug, audit_warn};

use crate::frontier::{Frontier, OfferOutcome};
use crate::model::{
    AnalysisError, CanonicalIssue, CrawlTask, FetchError, FetchErrorKind, FetchResult, Issue,
    IssueCategory, PageAnalysis, PageInfo, Severity,
};
use crate::normalize::normalize_url_for_dedupe;
use crate::report::{
    CrawlReport, FailedFetch, IssueReport, ReportContext, SiteFindings, StructuredDataSummary,
    TechnicalDiscovery, TechnicalRecord,
};

/// Decides whether a discovered internal link may be queued.
pub type LinkFilter = Box<dyn Fn(&str) -> bool + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    /// `beyond_depth` holds internal links that were not queued because they
    /// sit below `max_depth`; nothing else will ever learn their status.
    Merged {
        queued: usize,
        beyond_depth: Vec<String>,
    },
    AlreadyMerged,
}

impl MergeOutcome {
    fn empty() -> Self {
        MergeOutcome::Merged {
            queued: 0,
            beyond_depth: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum LinkStatus {
    Ok,
    Broken {
        status_code: Option<u16>,
        reason: String,
    },
}

#[derive(Debug, Clone)]
struct LinkEdge {
    source: String,
    target: String,
    is_internal: bool,
}

#[derive(Debug, Default)]
struct Collections {
    merged: HashSet<String>,
    technical: BTreeMap<String, TechnicalRecord>,
    failures: BTreeMap<String, FailedFetch>,
    pages: BTreeMap<String, PageInfo>,
    issues: Vec<Issue>,
    /// Keyed by (source page, normalized target).
    edges: BTreeMap<(String, String), LinkEdge>,
    link_status: HashMap<String, LinkStatus>,
    checks_claimed: HashSet<String>,
    redirect_loops: usize,
}

/// Result sink shared by all workers.
///
/// Every URL is merged exactly once; a second merge for the same key is
/// refused. Broken-link issues are materialized in [`Aggregator::finish`],
/// once per distinct (source page, target) edge whose target failed.
pub struct Aggregator {
    inner: Mutex<Collections>,
    link_filter: Option<LinkFilter>,
}

impl Default for Aggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl Aggregator {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Collections::default()),
            link_filter: None,
        }
    }

    pub fn with_link_filter(link_filter: LinkFilter) -> Self {
        Self {
            inner: Mutex::new(Collections::default()),
            link_filter: Some(link_filter),
        }
    }

    /// Stores one fetched page and offers its internal links at `depth + 1`.
    pub fn merge(
        &self,
        task: &CrawlTask,
        fetched: &FetchResult,
        analysis: Result<PageAnalysis, AnalysisError>,
        frontier: &Frontier,
    ) -> MergeOutcome {
        let key = url_key(&task.url);
        let mut internal_links = Vec::new();
        {
            let mut c = self.lock();
            if !c.merged.insert(key.clone()) {
                audit_warn!("Aggregator refused second merge for {}", task.url);
                return MergeOutcome::AlreadyMerged;
            }

            c.technical.insert(
                task.url.clone(),
                TechnicalRecord::from_fetch(fetched, task.depth),
            );
            c.link_status.insert(key, LinkStatus::Ok);
            c.link_status
                .entry(url_key(&fetched.final_url))
                .or_insert(LinkStatus::Ok);

            for href in &fetched.invalid_links {
                c.issues.push(
                    Issue::new(
                        href.clone(),
                        IssueCategory::InvalidUrl,
                        Severity::Low,
                        format!("link {href:?} cannot be resolved to an absolute URL"),
                    )
                    .with_source(task.url.clone()),
                );
            }

            for link in &fetched.discovered_links {
                let Ok(target) = normalize_url_for_dedupe(&link.url) else {
                    continue;
                };
                if link.is_internal {
                    internal_links.push(link.url.clone());
                }
                c.edges
                    .entry((task.url.clone(), target))
                    .or_insert_with(|| LinkEdge {
                        source: task.url.clone(),
                        target: link.url.clone(),
                        is_internal: link.is_internal,
                    });
            }

            match analysis {
                Ok(PageAnalysis { page, issues }) => {
                    c.issues.extend(issues);
                    c.pages.insert(task.url.clone(), page);
                }
                Err(AnalysisError::NotHtml(content_type)) => {
                    audit_debug!(
                        "Skipping analysis of {} with content type {:?}",
                        task.url,
                        content_type
                    );
                }
                Err(err) => {
                    c.issues.push(Issue::new(
                        task.url.clone(),
                        IssueCategory::AnalysisFailed,
                        Severity::Medium,
                        err.to_string(),
                    ));
                }
            }
        }

        let (queued, beyond_depth) = self.offer_links(task, internal_links, frontier);
        MergeOutcome::Merged {
            queued,
            beyond_depth,
        }
    }

    /// Stores a URL that redirected onto a page the crawl already owns.
    ///
    /// Only the technical record is kept; the target is analysed under its
    /// own task, so nothing from this fetch reaches the page documents.
    pub fn record_redirect_to_known(
        &self,
        task: &CrawlTask,
        fetched: &FetchResult,
    ) -> MergeOutcome {
        let key = url_key(&task.url);
        let mut c = self.lock();
        if !c.merged.insert(key.clone()) {
            audit_warn!("Aggregator refused second merge for {}", task.url);
            return MergeOutcome::AlreadyMerged;
        }
        audit_debug!(
            "{} redirects to already known {}",
            task.url,
            fetched.final_url
        );
        c.technical.insert(
            task.url.clone(),
            TechnicalRecord::from_fetch(fetched, task.depth),
        );
        c.link_status.insert(key, LinkStatus::Ok);
        MergeOutcome::empty()
    }

    /// Stores a URL whose fetch failed.
    pub fn record_failure(&self, task: &CrawlTask, error: &FetchError) -> MergeOutcome {
        let key = url_key(&task.url);
        let mut c = self.lock();
        if !c.merged.insert(key.clone()) {
            audit_warn!("Aggregator refused second failure record for {}", task.url);
            return MergeOutcome::AlreadyMerged;
        }
        c.failures.insert(
            task.url.clone(),
            FailedFetch {
                url: task.url.clone(),
                depth: task.depth,
                kind: error.kind,
                status_code: error.status_code,
                message: error.message.clone(),
            },
        );
        c.link_status.insert(
            key,
            LinkStatus::Broken {
                status_code: error.status_code,
                reason: error.to_string(),
            },
        );
        if error.kind == FetchErrorKind::RedirectLoop {
            c.redirect_loops += 1;
            c.issues.push(Issue::new(
                task.url.clone(),
                IssueCategory::RedirectLoop,
                Severity::Medium,
                error.message.clone(),
            ));
        }
        if task.origin_referrer.is_none() {
            c.issues.push(Issue::new(
                task.url.clone(),
                IssueCategory::FetchFailed,
                Severity::High,
                error.to_string(),
            ));
        }
        MergeOutcome::empty()
    }

    /// Claims a link target for a status check. Returns false when it was
    /// already checked or its status is otherwise known.
    pub fn claim_link_check(&self, url: &str) -> bool {
        let key = url_key(url);
        let mut c = self.lock();
        if c.link_status.contains_key(&key) {
            return false;
        }
        c.checks_claimed.insert(key)
    }

    pub fn record_link_check(&self, url: &str, result: Result<u16, FetchError>) {
        let status = match result {
            Ok(_) => LinkStatus::Ok,
            Err(err) => LinkStatus::Broken {
                status_code: err.status_code,
                reason: err.to_string(),
            },
        };
        self.lock().link_status.insert(url_key(url), status);
    }

    pub fn pages_merged(&self) -> usize {
        self.lock().merged.len()
    }

    /// Builds the three result documents.
    pub fn finish(
        &self,
        frontier: &Frontier,
        findings: SiteFindings,
        context: ReportContext,
    ) -> CrawlReport {
        let c = self.lock();

        let mut issues = c.issues.clone();
        issues.extend(broken_link_issues(&c));
        issues.extend(findings.sitemap.findings.iter().map(|finding| {
            Issue::new(
                finding.url.clone(),
                IssueCategory::Sitemap,
                finding.severity,
                finding.message.clone(),
            )
        }));

        let mut pages: Vec<PageInfo> = c.pages.values().cloned().collect();
        apply_linking_metrics(&mut pages, &c.edges);
        issues.extend(duplicate_issues(
            &pages,
            IssueCategory::DuplicateTitle,
            Severity::Low,
            "title",
            |page| page.title.clone(),
        ));
        issues.extend(duplicate_issues(
            &pages,
            IssueCategory::DuplicateMetaDescription,
            Severity::Low,
            "meta description",
            |page| page.meta_description.clone(),
        ));
        issues.extend(duplicate_issues(
            &pages,
            IssueCategory::DuplicateContent,
            Severity::Medium,
            "main content",
            |page| page.content_fingerprint.clone(),
        ));
        issues.sort_by(|a, b| {
            (&a.url, a.category, &a.source_url, &a.description)
                .cmp(&(&b.url, b.category, &b.source_url, &b.description))
        });

        let mut depth_distribution = BTreeMap::new();
        for record in c.technical.values() {
            *depth_distribution.entry(record.depth).or_default() += 1;
        }

        let orphan_pages = orphan_pages(&findings, &context, &c.edges);
        let technical = TechnicalDiscovery {
            domain: context.domain,
            crawl_timestamp: context.crawl_timestamp,
            seed: context.seed,
            max_depth: frontier.max_depth(),
            pages_crawled: c.technical.len(),
            records: c.technical.values().cloned().collect(),
            failures: c.failures.values().cloned().collect(),
            redirect_loops: c.redirect_loops,
            depth_distribution,
            robots_txt: findings.robots,
            sitemap: findings.sitemap,
            orphan_pages,
            structured_data: structured_data_summary(&pages),
            canonical_issues_summary: canonical_issues_summary(&pages),
        };

        CrawlReport {
            technical,
            issues: IssueReport::new(issues),
            pages,
        }
    }

    fn offer_links(
        &self,
        task: &CrawlTask,
        links: Vec<String>,
        frontier: &Frontier,
    ) -> (usize, Vec<String>) {
        let mut queued = 0;
        let mut beyond_depth = Vec::new();
        let mut beyond_keys = HashSet::new();
        let mut rejected = Vec::new();
        for link in links {
            if let Some(filter) = &self.link_filter {
                if !filter(&link) {
                    audit_debug!("Link filter skipped {}", link);
                    continue;
                }
            }
            match frontier.offer(&link, task.depth + 1, Some(&task.url)) {
                Ok(OfferOutcome::Queued) => queued += 1,
                Ok(OfferOutcome::TooDeep) => {
                    if beyond_keys.insert(url_key(&link)) {
                        beyond_depth.push(link);
                    }
                }
                Ok(OfferOutcome::Duplicate) => {}
                Err(err) => rejected.push(
                    Issue::new(
                        link.clone(),
                        IssueCategory::InvalidUrl,
                        Severity::Low,
                        err.to_string(),
                    )
                    .with_source(task.url.clone()),
                ),
            }
        }
        if !rejected.is_empty() {
            self.lock().issues.extend(rejected);
        }
        (queued, beyond_depth)
    }

    fn lock(&self) -> MutexGuard<'_, Collections> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn url_key(url: &str) -> String {
    normalize_url_for_dedupe(url).unwrap_or_else(|_| url.trim().to_string())
}

fn broken_link_issues(c: &Collections) -> Vec<Issue> {
    c.edges
        .iter()
        .filter_map(|((_, target_key), edge)| match c.link_status.get(target_key) {
            Some(LinkStatus::Broken {
                status_code,
                reason,
            }) => {
                let severity = if edge.is_internal {
                    Severity::High
                } else {
                    Severity::Medium
                };
                let description = match status_code {
                    Some(code) => format!("link returns HTTP {code}"),
                    None => format!("link is unreachable ({reason})"),
                };
                Some(
                    Issue::new(
                        edge.target.clone(),
                        IssueCategory::BrokenLink,
                        severity,
                        description,
                    )
                    .with_source(edge.source.clone()),
                )
            }
            _ => None,
        })
        .collect()
}

fn apply_linking_metrics(pages: &mut [PageInfo], edges: &BTreeMap<(String, String), LinkEdge>) {
    let mut inbound: HashMap<&str, BTreeSet<&str>> = HashMap::new();
    let mut outbound: HashMap<&str, usize> = HashMap::new();
    for ((source, target_key), edge) in edges {
        if !edge.is_internal {
            continue;
        }
        *outbound.entry(source.as_str()).or_default() += 1;
        inbound
            .entry(target_key.as_str())
            .or_default()
            .insert(source.as_str());
    }

    for page in pages.iter_mut() {
        let own_keys = [url_key(&page.url), url_key(&page.final_url)];
        let sources: BTreeSet<&str> = own_keys
            .iter()
            .filter_map(|key| inbound.get(key.as_str()))
            .flatten()
            .copied()
            .filter(|source| url_key(source) != own_keys[0])
            .collect();
        page.inbound_links = sources.len();
        page.outbound_links = outbound.get(page.url.as_str()).copied().unwrap_or(0);
    }
}

fn duplicate_issues(
    pages: &[PageInfo],
    category: IssueCategory,
    severity: Severity,
    label: &str,
    value_of: impl Fn(&PageInfo) -> Option<String>,
) -> Vec<Issue> {
    let mut groups: BTreeMap<String, Vec<&str>> = BTreeMap::new();
    for page in pages {
        if let Some(value) = value_of(page).filter(|v| !v.trim().is_empty()) {
            groups.entry(value).or_default().push(page.url.as_str());
        }
    }

    let mut issues = Vec::new();
    for urls in groups.values().filter(|urls| urls.len() > 1) {
        for url in urls {
            issues.push(Issue::new(
                *url,
                category,
                severity,
                format!("{label} is shared with {} other page(s)", urls.len() - 1),
            ));
        }
    }
    issues
}

fn orphan_pages(
    findings: &SiteFindings,
    context: &ReportContext,
    edges: &BTreeMap<(String, String), LinkEdge>,
) -> Vec<String> {
    let linked: HashSet<&str> = edges
        .iter()
        .filter(|(_, edge)| edge.is_internal)
        .map(|((_, target_key), _)| target_key.as_str())
        .collect();
    let seed_key = url_key(&context.seed);

    let mut orphans: Vec<String> = findings
        .sitemap
        .entries
        .iter()
        .filter(|entry| {
            let key = url_key(entry);
            key != seed_key && !linked.contains(key.as_str())
        })
        .cloned()
        .collect();
    orphans.sort();
    orphans.dedup();
    orphans
}

fn canonical_issues_summary(pages: &[PageInfo]) -> BTreeMap<CanonicalIssue, usize> {
    let mut summary = BTreeMap::new();
    for issue in pages.iter().flat_map(|page| &page.canonical_issues) {
        *summary.entry(*issue).or_default() += 1;
    }
    summary
}

fn structured_data_summary(pages: &[PageInfo]) -> StructuredDataSummary {
    let mut summary = StructuredDataSummary::default();
    for page in pages {
        let data = &page.structured_data;
        match data.method {
            Some(method) if !data.schema_types.is_empty() => {
                summary.pages_with_schema += 1;
                *summary.by_method.entry(method).or_default() += 1;
                for schema_type in &data.schema_types {
                    *summary
                        .schema_types
                        .entry(schema_type.clone())
                        .or_default() += 1;
                }
            }
            _ => summary.pages_without_schema.push(page.url.clone()),
        }
    }
    summary
}
