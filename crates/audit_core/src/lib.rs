//! Site audit core: crawl model, frontier, aggregation and the coordinator state machine.
//!
//! Nothing in this crate performs I/O; fetching and parsing live in `audit_engine`.
mod aggregate;
mod effect;
mod frontier;
mod model;
mod msg;
mod normalize;
mod report;
mod state;
mod update;

pub use aggregate::{Aggregator, LinkFilter, MergeOutcome};
pub use effect::Effect;
pub use frontier::{Frontier, OfferOutcome, Take};
pub use model::{
    AnalysisError, CanonicalIssue, CrawlTask, Depth, DiscoveredLink, FetchError, FetchErrorKind,
    FetchResult, Heading, ImageInfo, Issue, IssueCategory, PageAnalysis, PageInfo, PageLink,
    SchemaMethod, Severity, StructuredData,
};
pub use msg::Msg;
pub use normalize::{normalize_url_for_dedupe, parse_http_url, InvalidUrl, LinkScope};
pub use report::{
    CrawlReport, FailedFetch, IssueReport, IssueSummary, ReportContext, RobotsSummary,
    SiteFindings, SitemapFinding, SitemapKind, SitemapReport, StructuredDataSummary,
    TechnicalDiscovery, TechnicalRecord,
};
pub use state::{CrawlPhase, CrawlSession};
pub use update::update;

use std::sync::Arc;

/// Shared mutable state of one crawl: the frontier and the result sink.
///
/// Constructed per crawl and dropped once the report has been built, so
/// several crawls can run in one process.
#[derive(Clone)]
pub struct CrawlState {
    pub frontier: Arc<Frontier>,
    pub aggregator: Arc<Aggregator>,
}

impl CrawlState {
    pub fn new(max_depth: Depth, aggregator: Aggregator) -> Self {
        Self {
            frontier: Arc::new(Frontier::new(max_depth)),
            aggregator: Arc::new(aggregator),
        }
    }
}
