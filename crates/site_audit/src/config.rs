use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use audit_engine::{CrawlSettings, FetchSettings};
use audit_logging::{LogDestination, LogSettings, DEFAULT_LOG_FILE};
use log::LevelFilter;
use serde::{Deserialize, Serialize};

use crate::cli::Cli;

const DEFAULT_OUTPUT_DIR: &str = "output";

/// Settings read from a `--config` RON file. Every field is optional.
///
/// ```ron
/// (
///     max_depth: Some(2),
///     output_dir: Some("reports"),
///     check_external_links: Some(false),
/// )
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AuditConfig {
    pub max_depth: Option<u32>,
    pub workers: Option<usize>,
    pub timeout_secs: Option<u64>,
    pub connect_timeout_secs: Option<u64>,
    pub max_redirects: Option<usize>,
    pub max_bytes: Option<u64>,
    /// Attempts per link status check.
    pub check_attempts: Option<u32>,
    pub retry_backoff_ms: Option<u64>,
    pub output_dir: Option<PathBuf>,
    pub check_external_links: Option<bool>,
    pub respect_robots: Option<bool>,
    pub user_agent: Option<String>,
    pub log_file: Option<PathBuf>,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigFileError {
    #[error("cannot read config {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid config {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: ron::error::SpannedError,
    },
    #[error("invalid config {path:?}: {reason}")]
    Value { path: PathBuf, reason: String },
}

pub fn load_config(path: &Path) -> Result<AuditConfig, ConfigFileError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigFileError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let config: AuditConfig = ron::from_str(&content).map_err(|source| ConfigFileError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    config.validate(path)?;
    Ok(config)
}

impl AuditConfig {
    fn validate(&self, path: &Path) -> Result<(), ConfigFileError> {
        let reason = if self.workers == Some(0) {
            Some("workers must be at least 1")
        } else if self.timeout_secs == Some(0) {
            Some("timeout_secs must be at least 1")
        } else if self.max_bytes == Some(0) {
            Some("max_bytes must be at least 1")
        } else if self.check_attempts == Some(0) {
            Some("check_attempts must be at least 1")
        } else {
            None
        };
        match reason {
            Some(reason) => Err(ConfigFileError::Value {
                path: path.to_path_buf(),
                reason: reason.to_string(),
            }),
            None => Ok(()),
        }
    }
}

/// Everything one run needs, after CLI flags are layered over the file over defaults.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub seed: String,
    pub crawl: CrawlSettings,
    pub output_dir: PathBuf,
    pub log: LogSettings,
}

impl RunOptions {
    pub fn resolve(cli: &Cli, file: AuditConfig) -> Self {
        let defaults = CrawlSettings::default();
        let fetch_defaults = FetchSettings::default();

        let fetch = FetchSettings {
            connect_timeout: file
                .connect_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(fetch_defaults.connect_timeout),
            request_timeout: cli
                .timeout_secs
                .or(file.timeout_secs)
                .map(|secs| Duration::from_secs(secs.max(1)))
                .unwrap_or(fetch_defaults.request_timeout),
            max_redirects: cli
                .max_redirects
                .or(file.max_redirects)
                .unwrap_or(fetch_defaults.max_redirects),
            max_bytes: file.max_bytes.unwrap_or(fetch_defaults.max_bytes),
            user_agent: cli
                .user_agent
                .clone()
                .or(file.user_agent)
                .unwrap_or(fetch_defaults.user_agent),
            check_attempts: file
                .check_attempts
                .unwrap_or(fetch_defaults.check_attempts),
            retry_backoff: file
                .retry_backoff_ms
                .map(Duration::from_millis)
                .unwrap_or(fetch_defaults.retry_backoff),
        };

        let crawl = CrawlSettings {
            max_depth: cli.max_depth.or(file.max_depth).unwrap_or(defaults.max_depth),
            workers: cli
                .workers
                .or(file.workers)
                .unwrap_or(defaults.workers)
                .max(1),
            check_external_links: !cli.no_external_checks
                && file
                    .check_external_links
                    .unwrap_or(defaults.check_external_links),
            respect_robots: cli.respect_robots
                || file.respect_robots.unwrap_or(defaults.respect_robots),
            fetch,
        };

        let log_to_file = cli.log_file || file.log_file.is_some();
        let log = LogSettings {
            level: if cli.verbose {
                LevelFilter::Debug
            } else {
                LevelFilter::Info
            },
            destination: if log_to_file {
                LogDestination::Both
            } else {
                LogDestination::Terminal
            },
            file_path: file
                .log_file
                .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_FILE)),
        };

        Self {
            seed: cli.seed.clone(),
            crawl,
            output_dir: cli
                .output_dir
                .clone()
                .or(file.output_dir)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR)),
            log,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn cli(args: &[&str]) -> Cli {
        let mut argv = vec!["site_audit"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }

    #[test]
    fn defaults_apply_without_flags_or_file() {
        let options = RunOptions::resolve(&cli(&["https://example.com"]), AuditConfig::default());
        let defaults = CrawlSettings::default();

        assert_eq!(options.seed, "https://example.com");
        assert_eq!(options.crawl.max_depth, defaults.max_depth);
        assert_eq!(options.crawl.workers, defaults.workers);
        assert!(options.crawl.check_external_links);
        assert!(!options.crawl.respect_robots);
        assert_eq!(options.crawl.fetch.request_timeout, Duration::from_secs(30));
        assert_eq!(options.crawl.fetch.check_attempts, 3);
        assert_eq!(options.output_dir, PathBuf::from("output"));
        assert_eq!(options.log.destination, LogDestination::Terminal);
    }

    #[test]
    fn flags_override_file_values() {
        let file = AuditConfig {
            max_depth: Some(5),
            workers: Some(3),
            timeout_secs: Some(60),
            output_dir: Some(PathBuf::from("from-file")),
            user_agent: Some("file-agent".to_string()),
            check_external_links: Some(true),
            ..AuditConfig::default()
        };
        let options = RunOptions::resolve(
            &cli(&[
                "https://example.com",
                "--max-depth",
                "1",
                "--timeout-secs",
                "5",
                "--output-dir",
                "from-cli",
                "--no-external-checks",
            ]),
            file,
        );

        assert_eq!(options.crawl.max_depth, 1);
        assert_eq!(options.crawl.workers, 3);
        assert_eq!(options.crawl.fetch.request_timeout, Duration::from_secs(5));
        assert_eq!(options.crawl.fetch.user_agent, "file-agent");
        assert_eq!(options.output_dir, PathBuf::from("from-cli"));
        assert!(!options.crawl.check_external_links);
    }

    #[test]
    fn log_file_flag_logs_to_both() {
        let options =
            RunOptions::resolve(&cli(&["https://example.com", "--log-file"]), AuditConfig::default());
        assert_eq!(options.log.destination, LogDestination::Both);
        assert_eq!(options.log.file_path, PathBuf::from(DEFAULT_LOG_FILE));
    }

    #[test]
    fn loads_ron_config() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("audit.ron");
        fs::write(
            &path,
            r#"(
    max_depth: Some(2),
    respect_robots: Some(true),
    output_dir: Some("reports"),
    check_attempts: Some(5),
    retry_backoff_ms: Some(250),
)"#,
        )
        .unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(
            config,
            AuditConfig {
                max_depth: Some(2),
                respect_robots: Some(true),
                output_dir: Some(PathBuf::from("reports")),
                check_attempts: Some(5),
                retry_backoff_ms: Some(250),
                ..AuditConfig::default()
            }
        );

        let options = RunOptions::resolve(&cli(&["https://example.com"]), config);
        assert_eq!(options.crawl.fetch.check_attempts, 5);
        assert_eq!(options.crawl.fetch.retry_backoff, Duration::from_millis(250));
    }

    #[test]
    fn rejects_unknown_fields_and_bad_values() {
        let temp = TempDir::new().unwrap();
        let unknown = temp.path().join("unknown.ron");
        fs::write(&unknown, "(max_deepth: Some(2))").unwrap();
        assert!(matches!(
            load_config(&unknown),
            Err(ConfigFileError::Parse { .. })
        ));

        let zero = temp.path().join("zero.ron");
        fs::write(&zero, "(workers: Some(0))").unwrap();
        assert!(matches!(load_config(&zero), Err(ConfigFileError::Value { .. })));

        assert!(matches!(
            load_config(&temp.path().join("missing.ron")),
            Err(ConfigFileError::Read { .. })
        ));
    }
}
