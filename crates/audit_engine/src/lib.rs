//! Site audit engine: fetching, page analysis, robots/sitemap checks, the crawl
//! worker pool and report persistence.
mod analyze;
mod crawl;
mod decode;
mod export;
mod fetch;
mod filename;
mod links;
mod persist;
mod readability;
mod robots;
mod sitemap;

pub use analyze::{PageAnalyzer, SeoAnalyzer};
pub use crawl::{system_clock, Clock, ConfigError, CrawlSettings, Crawler};
pub use decode::{decode_body, is_textual, DecodedBody};
pub use export::{write_reports, ExportError, ReportPaths};
pub use fetch::{FetchSettings, Fetcher, ReqwestFetcher, DEFAULT_USER_AGENT};
pub use filename::{domain_label, report_filename, ReportKind};
pub use links::{ExtractedLinks, LinkExtractor};
pub use persist::{ensure_output_dir, AtomicFileWriter, PersistError};
pub use robots::{load_robots, robots_url, RobotsRules};
pub use sitemap::{
    audit_sitemap, check_entry, parse_sitemap, ParsedSitemap, SitemapEntry, SitemapError,
    MAX_CHECKED_LOCS, MAX_CHILD_SITEMAPS,
};

pub use tokio_util::sync::CancellationToken;
