use std::path::PathBuf;

use clap::Parser;

/// Crawls a site to a bounded depth and writes technical, issue and page reports.
#[derive(Parser, Debug)]
#[command(name = "site_audit", version, about)]
pub struct Cli {
    /// Absolute http(s) URL the crawl starts from.
    pub seed: String,

    /// Maximum link depth followed from the seed (seed is depth 0).
    #[arg(long)]
    pub max_depth: Option<u32>,

    /// Number of concurrent crawl workers [default: 2 x CPU count].
    #[arg(long)]
    pub workers: Option<usize>,

    /// Per-fetch timeout in seconds, covering redirects and body.
    #[arg(long)]
    pub timeout_secs: Option<u64>,

    #[arg(long)]
    pub max_redirects: Option<usize>,

    /// Directory the three JSON reports are written to [default: ./output].
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// RON file with default settings; flags given here take precedence.
    #[arg(long, value_name = "FILE.ron")]
    pub config: Option<PathBuf>,

    /// Do not check links that leave the crawled site.
    #[arg(long)]
    pub no_external_checks: bool,

    /// Do not queue internal links disallowed by robots.txt.
    #[arg(long)]
    pub respect_robots: bool,

    #[arg(long)]
    pub user_agent: Option<String>,

    /// Also write the log to a file (./site_audit.log unless the config names one).
    #[arg(long)]
    pub log_file: bool,

    /// Log debug output.
    #[arg(short, long)]
    pub verbose: bool,
}
