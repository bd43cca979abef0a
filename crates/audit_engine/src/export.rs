use std::path::{Path, PathBuf};

use audit_core::CrawlReport;
use audit_logging::audit_info;

use crate::filename::{report_filename, ReportKind};
use crate::persist::{AtomicFileWriter, PersistError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportPaths {
    pub technical_discovery: PathBuf,
    pub issues: PathBuf,
    pub page_info: PathBuf,
}

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("cannot write {filename}: {source}")]
    Write {
        filename: String,
        #[source]
        source: PersistError,
    },
}

/// Writes the three result documents of a finished crawl into `output_dir`.
pub fn write_reports(report: &CrawlReport, output_dir: &Path) -> Result<ReportPaths, ExportError> {
    let writer = AtomicFileWriter::new(output_dir.to_path_buf());
    let domain = report.technical.domain.as_str();

    let write = |kind: ReportKind| -> Result<PathBuf, ExportError> {
        let filename = report_filename(domain, kind);
        let written = match kind {
            ReportKind::TechnicalDiscovery => writer.write_json(&filename, &report.technical),
            ReportKind::Issues => writer.write_json(&filename, &report.issues),
            ReportKind::PageInfo => writer.write_json(&filename, &report.pages),
        };
        written.map_err(|source| ExportError::Write { filename, source })
    };

    let paths = ReportPaths {
        technical_discovery: write(ReportKind::TechnicalDiscovery)?,
        issues: write(ReportKind::Issues)?,
        page_info: write(ReportKind::PageInfo)?,
    };
    audit_info!(
        "Wrote {} page(s) and {} issue(s) to {}",
        report.pages.len(),
        report.issues.summary.total,
        writer.dir().display()
    );
    Ok(paths)
}
