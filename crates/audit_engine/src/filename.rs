use url::Url;

/// The three documents written per crawl.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportKind {
    TechnicalDiscovery,
    Issues,
    PageInfo,
}

impl ReportKind {
    fn suffix(self) -> &'static str {
        match self {
            ReportKind::TechnicalDiscovery => "technical-discovery",
            ReportKind::Issues => "issues",
            ReportKind::PageInfo => "page-info",
        }
    }
}

/// File-name-safe label of the crawled site: the seed host, plus `_port` when the
/// seed names a port.
pub fn domain_label(seed: &Url) -> String {
    let host = seed.host_str().unwrap_or("unknown").to_ascii_lowercase();
    let raw = match seed.port() {
        Some(port) => format!("{host}_{port}"),
        None => host,
    };
    sanitize(&raw)
}

/// `{domain}-{kind}.json`
pub fn report_filename(domain: &str, kind: ReportKind) -> String {
    format!("{}-{}.json", sanitize(domain), kind.suffix())
}

fn sanitize(input: &str) -> String {
    let cleaned: String = input
        .chars()
        .map(|c| if is_forbidden(c) { '_' } else { c })
        .collect();
    let cleaned = cleaned.trim_matches(&['_', ' ', '.'][..]);
    if cleaned.is_empty() {
        "site".to_string()
    } else {
        cleaned.to_string()
    }
}

fn is_forbidden(c: char) -> bool {
    matches!(c,
        '\\' | '/' | ':' | '*' | '?' | '"' | '<' | '>' | '|' | '[' | ']' | '\0'..='\u{1F}'
    )
}
