use std::collections::{HashSet, VecDeque};

use audit_core::{parse_http_url, LinkScope, Severity, SitemapFinding, SitemapKind, SitemapReport};
use audit_logging::{audit_debug, audit_info};
use futures_util::{stream, StreamExt};
use sxd_document::parser;
use sxd_xpath::nodeset::Node;
use sxd_xpath::{Context, Factory, Value, XPath};
use url::Url;

use crate::fetch::Fetcher;

/// Child sitemaps followed from one sitemap index.
pub const MAX_CHILD_SITEMAPS: usize = 10;

/// Listed URLs whose status is checked; the rest are only validated.
pub const MAX_CHECKED_LOCS: usize = 500;

const LOC_CHECK_CONCURRENCY: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SitemapEntry {
    pub loc: String,
    pub lastmod: Option<String>,
    pub priority: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedSitemap {
    Urlset(Vec<SitemapEntry>),
    Index(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SitemapError {
    #[error("invalid XML: {0}")]
    InvalidXml(String),
    #[error("unknown root element {0:?}")]
    UnknownRoot(String),
    #[error("xpath error: {0}")]
    XPath(String),
}

struct Queries {
    urls: XPath,
    sitemaps: XPath,
    loc: XPath,
    lastmod: XPath,
    priority: XPath,
}

impl Queries {
    fn new() -> Result<Self, SitemapError> {
        let factory = Factory::new();
        Ok(Self {
            urls: build(&factory, "/*[local-name()='urlset']/*[local-name()='url']")?,
            sitemaps: build(
                &factory,
                "/*[local-name()='sitemapindex']/*[local-name()='sitemap']/*[local-name()='loc']",
            )?,
            loc: build(&factory, "string(*[local-name()='loc'])")?,
            lastmod: build(&factory, "*[local-name()='lastmod']")?,
            priority: build(&factory, "*[local-name()='priority']")?,
        })
    }
}

fn build(factory: &Factory, expr: &str) -> Result<XPath, SitemapError> {
    factory
        .build(expr)
        .map_err(|err| SitemapError::XPath(err.to_string()))?
        .ok_or_else(|| SitemapError::XPath(format!("empty expression {expr:?}")))
}

fn nodes<'d>(xpath: &XPath, context: &Context<'d>, node: Node<'d>) -> Result<Vec<Node<'d>>, SitemapError> {
    match xpath.evaluate(context, node) {
        Ok(Value::Nodeset(nodes)) => Ok(nodes.document_order()),
        Ok(_) => Ok(Vec::new()),
        Err(err) => Err(SitemapError::XPath(err.to_string())),
    }
}

fn optional_text<'d>(
    xpath: &XPath,
    context: &Context<'d>,
    node: Node<'d>,
) -> Result<Option<String>, SitemapError> {
    Ok(nodes(xpath, context, node)?
        .first()
        .map(|child| child.string_value().trim().to_string()))
}

/// Parses a `<urlset>` or `<sitemapindex>` document.
pub fn parse_sitemap(xml: &str) -> Result<ParsedSitemap, SitemapError> {
    let package = parser::parse(xml).map_err(|err| SitemapError::InvalidXml(err.to_string()))?;
    let document = package.as_document();
    let root = document
        .root()
        .children()
        .into_iter()
        .find_map(|child| child.element())
        .ok_or_else(|| SitemapError::UnknownRoot(String::new()))?;

    let queries = Queries::new()?;
    let context = Context::new();
    let doc_root = Node::from(document.root());
    match root.name().local_part() {
        "urlset" => {
            let mut entries = Vec::new();
            for url_node in nodes(&queries.urls, &context, doc_root)? {
                let loc = match queries.loc.evaluate(&context, url_node) {
                    Ok(value) => value.string().trim().to_string(),
                    Err(err) => return Err(SitemapError::XPath(err.to_string())),
                };
                entries.push(SitemapEntry {
                    loc,
                    lastmod: optional_text(&queries.lastmod, &context, url_node)?,
                    priority: optional_text(&queries.priority, &context, url_node)?,
                });
            }
            Ok(ParsedSitemap::Urlset(entries))
        }
        "sitemapindex" => {
            let children = nodes(&queries.sitemaps, &context, doc_root)?
                .into_iter()
                .map(|node| node.string_value().trim().to_string())
                .filter(|loc| !loc.is_empty())
                .collect();
            Ok(ParsedSitemap::Index(children))
        }
        other => Err(SitemapError::UnknownRoot(other.to_string())),
    }
}

/// Problems with one `<url>` entry. An empty result means the entry is valid.
pub fn check_entry(entry: &SitemapEntry, scope: &LinkScope) -> Vec<String> {
    let mut problems = Vec::new();
    if entry.loc.is_empty() {
        problems.push("entry has no <loc>".to_string());
    } else {
        match parse_http_url(&entry.loc) {
            Ok(url) if !scope.is_internal(&url) => {
                problems.push(format!("{} is outside the crawled site", entry.loc))
            }
            Ok(_) => {}
            Err(err) => problems.push(format!("invalid <loc>: {err}")),
        }
    }
    if let Some(lastmod) = &entry.lastmod {
        if !is_valid_lastmod(lastmod) {
            problems.push(format!("invalid lastmod {lastmod:?} for {}", entry.loc));
        }
    }
    if let Some(priority) = &entry.priority {
        match priority.parse::<f64>() {
            Ok(value) if (0.0..=1.0).contains(&value) => {}
            Ok(_) => problems.push(format!("priority {priority} out of range for {}", entry.loc)),
            Err(_) => problems.push(format!("priority {priority:?} is not a number for {}", entry.loc)),
        }
    }
    problems
}

fn is_valid_lastmod(value: &str) -> bool {
    chrono::DateTime::parse_from_rfc3339(value).is_ok()
        || chrono::NaiveDate::parse_from_str(value, "%Y-%m-%d").is_ok()
}

/// Locates and validates the site's sitemap, following an index to its children.
///
/// Sitemaps declared in robots.txt are used first; otherwise `/sitemap.xml` at the
/// seed origin is tried.
pub async fn audit_sitemap(
    fetcher: &dyn Fetcher,
    seed: &Url,
    declared: &[String],
    scope: &LinkScope,
) -> SitemapReport {
    let mut pending: VecDeque<String> = declared.iter().cloned().collect();
    if pending.is_empty() {
        if let Ok(default) = seed.join("/sitemap.xml") {
            pending.push_back(default.to_string());
        }
    }
    let Some(primary) = pending.front().cloned() else {
        return SitemapReport::default();
    };

    let mut report = SitemapReport {
        url: Some(primary.clone()),
        ..SitemapReport::default()
    };
    let mut visited = HashSet::new();
    let mut children_followed = 0;

    while let Some(url) = pending.pop_front() {
        if !visited.insert(url.clone()) {
            continue;
        }
        let is_primary = url == primary;
        let xml = match fetcher.fetch(&url).await {
            Ok(fetched) => fetched.body.unwrap_or_default(),
            Err(err) if is_primary => {
                push_finding(&mut report, &url, Severity::Medium, format!("sitemap not found: {err}"));
                continue;
            }
            Err(err) => {
                push_finding(&mut report, &url, Severity::Low, format!("sitemap unavailable: {err}"));
                continue;
            }
        };
        if is_primary {
            report.found = true;
        }

        match parse_sitemap(&xml) {
            Ok(ParsedSitemap::Index(children)) => {
                if is_primary {
                    report.kind = Some(SitemapKind::Index);
                }
                for child in children {
                    if visited.contains(&child) || pending.contains(&child) {
                        continue;
                    }
                    if children_followed >= MAX_CHILD_SITEMAPS {
                        push_finding(
                            &mut report,
                            &url,
                            Severity::Low,
                            format!("index lists more than {MAX_CHILD_SITEMAPS} child sitemaps; the rest were skipped"),
                        );
                        break;
                    }
                    children_followed += 1;
                    pending.push_back(child);
                }
            }
            Ok(ParsedSitemap::Urlset(entries)) => {
                if is_primary {
                    report.kind = Some(SitemapKind::Urlset);
                }
                report.url_count += entries.len();
                for entry in entries {
                    for problem in check_entry(&entry, scope) {
                        push_finding(&mut report, &url, Severity::Low, problem);
                    }
                    if !entry.loc.is_empty() {
                        report.entries.push(entry.loc);
                    }
                }
            }
            Err(err) => push_finding(&mut report, &url, Severity::Low, err.to_string()),
        }
    }

    check_listed_urls(fetcher, &mut report).await;

    audit_info!(
        "Sitemap audit: found={} urls={} findings={}",
        report.found,
        report.url_count,
        report.findings.len()
    );
    report
}

/// Flags listed URLs that do not answer 200 (or 301).
async fn check_listed_urls(fetcher: &dyn Fetcher, report: &mut SitemapReport) {
    let mut seen = HashSet::new();
    let locs: Vec<String> = report
        .entries
        .iter()
        .filter(|loc| parse_http_url(loc).is_ok() && seen.insert(loc.as_str()))
        .cloned()
        .collect();
    if locs.len() > MAX_CHECKED_LOCS {
        audit_info!(
            "Sitemap lists {} URLs; checking the status of the first {}",
            locs.len(),
            MAX_CHECKED_LOCS
        );
    }

    let mut results: Vec<_> = stream::iter(locs.into_iter().take(MAX_CHECKED_LOCS))
        .map(|loc| async move {
            let status = fetcher.check_status(&loc).await;
            (loc, status)
        })
        .buffer_unordered(LOC_CHECK_CONCURRENCY)
        .collect()
        .await;
    results.sort_by(|a, b| a.0.cmp(&b.0));

    for (loc, status) in results {
        let message = match status {
            Ok(200 | 301) => continue,
            Ok(code) => format!("listed URL returns HTTP {code}"),
            Err(err) => match err.status_code {
                Some(code) => format!("listed URL returns HTTP {code}"),
                None => format!("listed URL is unreachable: {err}"),
            },
        };
        push_finding(report, &loc, Severity::Low, message);
    }
}

fn push_finding(report: &mut SitemapReport, url: &str, severity: Severity, message: String) {
    audit_debug!("Sitemap finding for {}: {}", url, message);
    report.findings.push(SitemapFinding {
        url: url.to_string(),
        severity,
        message,
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scope() -> LinkScope {
        LinkScope::from_seed(&Url::parse("https://example.com/").unwrap()).unwrap()
    }

    #[test]
    fn parses_urlset_with_optional_fields() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
  <url><loc> https://example.com/ </loc><lastmod>2024-01-05</lastmod><priority>0.8</priority></url>
  <url><loc>https://example.com/about</loc></url>
</urlset>"#;
        let parsed = parse_sitemap(xml).unwrap();
        assert_eq!(
            parsed,
            ParsedSitemap::Urlset(vec![
                SitemapEntry {
                    loc: "https://example.com/".into(),
                    lastmod: Some("2024-01-05".into()),
                    priority: Some("0.8".into()),
                },
                SitemapEntry {
                    loc: "https://example.com/about".into(),
                    lastmod: None,
                    priority: None,
                },
            ])
        );
    }

    #[test]
    fn parses_sitemap_index() {
        let xml = r#"<sitemapindex xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
  <sitemap><loc>https://example.com/a.xml</loc></sitemap>
  <sitemap><loc>https://example.com/b.xml</loc></sitemap>
</sitemapindex>"#;
        assert_eq!(
            parse_sitemap(xml).unwrap(),
            ParsedSitemap::Index(vec![
                "https://example.com/a.xml".into(),
                "https://example.com/b.xml".into()
            ])
        );
    }

    #[test]
    fn rejects_broken_xml_and_unknown_roots() {
        assert!(matches!(parse_sitemap("<urlset><url>"), Err(SitemapError::InvalidXml(_))));
        assert_eq!(
            parse_sitemap("<rss></rss>"),
            Err(SitemapError::UnknownRoot("rss".into()))
        );
    }

    #[test]
    fn entry_checks_cover_lastmod_priority_and_scope() {
        let ok = SitemapEntry {
            loc: "https://www.example.com/page".into(),
            lastmod: Some("2024-02-03T10:00:00+00:00".into()),
            priority: Some("1.0".into()),
        };
        assert!(check_entry(&ok, &scope()).is_empty());

        let bad = SitemapEntry {
            loc: "https://elsewhere.org/page".into(),
            lastmod: Some("03/02/2024".into()),
            priority: Some("1.5".into()),
        };
        assert_eq!(check_entry(&bad, &scope()).len(), 3);

        let not_a_number = SitemapEntry {
            loc: "https://example.com/x".into(),
            lastmod: None,
            priority: Some("high".into()),
        };
        assert_eq!(check_entry(&not_a_number, &scope()).len(), 1);
    }
}
