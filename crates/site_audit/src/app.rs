use anyhow::Context;
use audit_core::{CrawlReport, Severity};
use audit_engine::{write_reports, CancellationToken, ConfigError, Crawler, ReportPaths};
use audit_logging::{audit_info, audit_warn};
use chrono::Utc;

use crate::cli::Cli;
use crate::config::{load_config, AuditConfig, ConfigFileError, RunOptions};

/// Exit status of a crawl that could not start or whose settings are invalid.
pub const EXIT_CONFIG: u8 = 2;
/// Exit status when the reports could not be written.
pub const EXIT_FAILURE: u8 = 1;

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let file = match &cli.config {
        Some(path) => load_config(path)?,
        None => AuditConfig::default(),
    };
    let options = RunOptions::resolve(&cli, file);
    audit_logging::initialize(&options.log);

    let stop = CancellationToken::new();
    spawn_interrupt_handler(stop.clone());

    let started = Utc::now();
    let crawler = Crawler::new(options.crawl);
    let report = crawler
        .run(&options.seed, stop)
        .await
        .with_context(|| format!("crawl of {} did not start", options.seed))?;
    let elapsed = Utc::now() - started;

    let paths = write_reports(&report, &options.output_dir)
        .with_context(|| format!("cannot write reports to {}", options.output_dir.display()))?;
    audit_info!("Audit finished in {} ms", elapsed.num_milliseconds());
    print_summary(&report, &paths);
    Ok(())
}

/// Maps a failed run to the process exit status.
pub fn exit_code(err: &anyhow::Error) -> u8 {
    if err.downcast_ref::<ConfigError>().is_some() || err.downcast_ref::<ConfigFileError>().is_some()
    {
        EXIT_CONFIG
    } else {
        EXIT_FAILURE
    }
}

fn spawn_interrupt_handler(stop: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            audit_warn!("Interrupt received, finishing in-flight pages");
            stop.cancel();
        }
    });
}

fn print_summary(report: &CrawlReport, paths: &ReportPaths) {
    let summary = &report.issues.summary;
    let count = |severity| summary.by_severity.get(&severity).copied().unwrap_or(0);

    println!("Crawled {} page(s) from {}", report.technical.pages_crawled, report.technical.seed);
    println!(
        "Issues: {} total ({} high, {} medium, {} low)",
        summary.total,
        count(Severity::High),
        count(Severity::Medium),
        count(Severity::Low)
    );
    for path in [&paths.technical_discovery, &paths.issues, &paths.page_info] {
        println!("  {}", path.display());
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use audit_core::InvalidUrl;

    #[test]
    fn configuration_failures_exit_with_two() {
        let seed: anyhow::Error = ConfigError::InvalidSeed(InvalidUrl::MissingHost("http://".into())).into();
        assert_eq!(exit_code(&seed.context("crawl of http:// did not start")), EXIT_CONFIG);

        let file: anyhow::Error = ConfigFileError::Value {
            path: PathBuf::from("audit.ron"),
            reason: "workers must be at least 1".to_string(),
        }
        .into();
        assert_eq!(exit_code(&file), EXIT_CONFIG);
    }

    #[test]
    fn other_failures_exit_with_one() {
        let err = anyhow::anyhow!("disk full").context("cannot write reports to out");
        assert_eq!(exit_code(&err), EXIT_FAILURE);
    }
}
