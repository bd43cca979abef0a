use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::sync::Arc;

use audit_core::{
    normalize_url_for_dedupe, AnalysisError, CanonicalIssue, Depth, FetchResult, Heading, ImageInfo, Issue,
    IssueCategory, PageAnalysis, PageInfo, PageLink, SchemaMethod, Severity, StructuredData,
};
use scraper::node::Node;
use scraper::{ElementRef, Html, Selector};
use sha2::{Digest, Sha256};
use url::Url;

use crate::readability::flesch_kincaid_grade;
use crate::robots::RobotsRules;

/// Turns one fetched page into its PageInfo and per-page issues.
pub trait PageAnalyzer: Send + Sync {
    fn analyze(&self, fetched: &FetchResult, depth: Depth) -> Result<PageAnalysis, AnalysisError>;
}

/// SEO, content-structure and accessibility rules over a parsed document.
#[derive(Default)]
pub struct SeoAnalyzer {
    robots: Option<Arc<RobotsRules>>,
}

impl SeoAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pages disallowed by these rules get `robots_txt_allowed = false`.
    pub fn with_robots(robots: Arc<RobotsRules>) -> Self {
        Self {
            robots: Some(robots),
        }
    }
}

impl PageAnalyzer for SeoAnalyzer {
    fn analyze(&self, fetched: &FetchResult, depth: Depth) -> Result<PageAnalysis, AnalysisError> {
        if !fetched.is_html() {
            return Err(AnalysisError::NotHtml(fetched.content_type.clone()));
        }
        let html = fetched
            .body
            .as_deref()
            .filter(|body| !body.trim().is_empty())
            .ok_or(AnalysisError::EmptyDocument)?;

        let doc = Html::parse_document(html);
        let mut rules = RuleSink::new(&fetched.url);

        let title = first_text(&doc, "title");
        if title.is_none() {
            rules.push(IssueCategory::MissingMeta, Severity::High, "page has no title");
        }

        let meta_description = meta_content(&doc, "description");
        if meta_description.is_none() {
            rules.push(
                IssueCategory::MissingMeta,
                Severity::Medium,
                "page has no meta description",
            );
        }

        let heading_hierarchy = headings(&doc);
        let h1_present = heading_hierarchy.iter().any(|h| h.level == 1);
        if !h1_present {
            rules.push(IssueCategory::MissingHeading, Severity::Medium, "page has no h1");
        }
        for pair in heading_hierarchy.windows(2) {
            let (prev, next) = (&pair[0], &pair[1]);
            if next.level > prev.level + 1 {
                rules.push(
                    IssueCategory::HeadingHierarchy,
                    Severity::Low,
                    format!(
                        "heading jumps from h{} to h{} at {:?}",
                        prev.level, next.level, next.text
                    ),
                );
            }
        }

        let images = images(&doc);
        for image in images.iter().filter(|image| !image.has_alt) {
            rules.push(
                IssueCategory::MissingAlt,
                Severity::Low,
                format!("image {:?} has no alt text", image.src),
            );
        }

        let canonical_href = canonical_href(&doc);
        let canonical_url = canonical_href
            .as_deref()
            .map(|href| resolve_canonical(href, &fetched.final_url));
        check_canonical(canonical_url.as_deref(), fetched, &mut rules);
        let canonical_issues =
            canonical_issues(canonical_href.as_deref(), canonical_url.as_deref(), fetched);

        let meta_robots = meta_content(&doc, "robots").map(|content| content.to_ascii_lowercase());
        let indexable = !meta_robots
            .as_deref()
            .is_some_and(|content| content.contains("noindex"));
        if !indexable {
            rules.push(
                IssueCategory::NonIndexable,
                Severity::Low,
                "meta robots excludes the page from indexing",
            );
        }

        let lang = document_lang(&doc);
        if lang.is_none() {
            rules.push(IssueCategory::MissingLang, Severity::Low, "html element has no lang");
        }
        for href in empty_link_hrefs(&doc) {
            rules.push(
                IssueCategory::EmptyLinkText,
                Severity::Low,
                format!("link to {href:?} has no accessible text"),
            );
        }

        let structured_data = structured_data(&doc, &mut rules);

        let robots_txt_allowed = self
            .robots
            .as_ref()
            .map_or(true, |robots| robots.allowed(&fetched.url));

        let main_text = main_text(&doc);
        let page = PageInfo {
            url: fetched.url.clone(),
            final_url: fetched.final_url.clone(),
            depth,
            title_present: title.is_some(),
            title,
            meta_description_present: meta_description.is_some(),
            meta_description,
            h1_present,
            heading_hierarchy,
            images,
            canonical_url,
            canonical_issues,
            links: fetched
                .discovered_links
                .iter()
                .map(|link| PageLink {
                    href: link.url.clone(),
                    is_internal: link.is_internal,
                })
                .collect(),
            lang,
            meta_robots,
            indexable,
            robots_txt_allowed,
            structured_data,
            word_count: word_count(&doc),
            flesch_kincaid_grade: main_text.as_deref().and_then(flesch_kincaid_grade),
            inbound_links: 0,
            outbound_links: 0,
            content_fingerprint: main_text.as_deref().map(content_fingerprint),
        };

        Ok(PageAnalysis {
            page,
            issues: rules.issues,
        })
    }
}

struct RuleSink<'a> {
    url: &'a str,
    issues: Vec<Issue>,
}

impl<'a> RuleSink<'a> {
    fn new(url: &'a str) -> Self {
        Self {
            url,
            issues: Vec::new(),
        }
    }

    fn push(&mut self, category: IssueCategory, severity: Severity, description: impl Into<String>) {
        self.issues
            .push(Issue::new(self.url, category, severity, description));
    }
}

fn select_all<'a>(doc: &'a Html, css: &str) -> Vec<ElementRef<'a>> {
    match Selector::parse(css).ok() {
        Some(selector) => doc.select(&selector).collect(),
        None => Vec::new(),
    }
}

fn collapsed_text(element: ElementRef<'_>) -> String {
    element.text().collect::<Vec<_>>().join(" ").split_whitespace().collect::<Vec<_>>().join(" ")
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn first_text(doc: &Html, css: &str) -> Option<String> {
    select_all(doc, css)
        .into_iter()
        .next()
        .and_then(|el| non_empty(&collapsed_text(el)))
}

fn meta_content(doc: &Html, name: &str) -> Option<String> {
    select_all(doc, "meta[name]")
        .into_iter()
        .find(|el| {
            el.value()
                .attr("name")
                .is_some_and(|n| n.trim().eq_ignore_ascii_case(name))
        })
        .and_then(|el| el.value().attr("content"))
        .and_then(non_empty)
}

fn headings(doc: &Html) -> Vec<Heading> {
    select_all(doc, "h1, h2, h3, h4, h5, h6")
        .into_iter()
        .filter_map(|el| {
            let level = el.value().name().strip_prefix('h')?.parse::<u8>().ok()?;
            Some(Heading {
                level,
                text: collapsed_text(el),
            })
        })
        .collect()
}

fn images(doc: &Html) -> Vec<ImageInfo> {
    select_all(doc, "img")
        .into_iter()
        .map(|el| ImageInfo {
            src: el.value().attr("src").unwrap_or_default().trim().to_string(),
            has_alt: el.value().attr("alt").is_some_and(|alt| !alt.trim().is_empty()),
        })
        .collect()
}

fn canonical_href(doc: &Html) -> Option<String> {
    select_all(doc, "link[rel][href]").into_iter().find_map(|el| {
        let is_canonical = el
            .value()
            .attr("rel")
            .is_some_and(|rel| rel.split_whitespace().any(|r| r.eq_ignore_ascii_case("canonical")));
        is_canonical
            .then(|| el.value().attr("href"))
            .flatten()
            .and_then(non_empty)
    })
}

fn resolve_canonical(href: &str, final_url: &str) -> String {
    Url::parse(final_url)
        .ok()
        .and_then(|base| base.join(href).ok())
        .map(|url| url.to_string())
        .unwrap_or_else(|| href.to_string())
}

/// Sub-reasons for the canonical summary. A relative href is listed on its
/// own; the target comparison only runs for absolute hrefs.
fn canonical_issues(
    href: Option<&str>,
    resolved: Option<&str>,
    fetched: &FetchResult,
) -> Vec<CanonicalIssue> {
    let (Some(href), Some(resolved)) = (href, resolved) else {
        return vec![CanonicalIssue::MissingCanonical];
    };
    if Url::parse(href).is_err() {
        return vec![CanonicalIssue::RelativeUrl];
    }

    let host = |url: &str| {
        Url::parse(url)
            .ok()
            .and_then(|url| url.host_str().map(str::to_ascii_lowercase))
    };
    if host(resolved) != host(&fetched.final_url) {
        return vec![CanonicalIssue::PointsToDifferentDomain];
    }
    let page_keys: BTreeSet<String> = [&fetched.url, &fetched.final_url]
        .into_iter()
        .filter_map(|url| normalize_url_for_dedupe(url).ok())
        .collect();
    match normalize_url_for_dedupe(resolved) {
        Ok(key) if page_keys.contains(&key) => Vec::new(),
        _ => vec![CanonicalIssue::PointsToDifferentUrl],
    }
}

fn check_canonical(canonical: Option<&str>, fetched: &FetchResult, rules: &mut RuleSink<'_>) {
    let Some(canonical) = canonical else {
        rules.push(
            IssueCategory::CanonicalMismatch,
            Severity::High,
            "page has no canonical link",
        );
        return;
    };
    let accepted: BTreeSet<String> = [&fetched.url, &fetched.final_url]
        .into_iter()
        .filter_map(|url| normalize_url_for_dedupe(url).ok())
        .collect();
    let matches = normalize_url_for_dedupe(canonical).is_ok_and(|key| accepted.contains(&key));
    if !matches {
        rules.push(
            IssueCategory::CanonicalMismatch,
            Severity::High,
            format!("canonical {canonical:?} points away from the page"),
        );
    }
}

fn document_lang(doc: &Html) -> Option<String> {
    doc.root_element().value().attr("lang").and_then(non_empty)
}

fn empty_link_hrefs(doc: &Html) -> Vec<String> {
    select_all(doc, "a[href]")
        .into_iter()
        .filter(|el| {
            let has_text = !collapsed_text(*el).is_empty();
            let has_label = ["aria-label", "title"]
                .iter()
                .any(|attr| el.value().attr(attr).is_some_and(|v| !v.trim().is_empty()));
            let has_img_alt = el
                .descendants()
                .filter_map(ElementRef::wrap)
                .any(|child| {
                    child.value().name() == "img"
                        && child.value().attr("alt").is_some_and(|alt| !alt.trim().is_empty())
                });
            !(has_text || has_label || has_img_alt)
        })
        .filter_map(|el| el.value().attr("href").map(|href| href.trim().to_string()))
        .collect()
}

fn structured_data(doc: &Html, rules: &mut RuleSink<'_>) -> StructuredData {
    let scripts = select_all(doc, "script[type]")
        .into_iter()
        .filter(|el| {
            el.value()
                .attr("type")
                .is_some_and(|t| t.trim().eq_ignore_ascii_case("application/ld+json"))
        })
        .collect::<Vec<_>>();

    if !scripts.is_empty() {
        let mut schema_types = Vec::new();
        let mut valid = true;
        for script in scripts {
            let raw = script.text().collect::<String>();
            match serde_json::from_str::<serde_json::Value>(&raw) {
                Ok(value) => collect_json_ld_types(&value, &mut schema_types),
                Err(err) => {
                    valid = false;
                    rules.push(
                        IssueCategory::InvalidStructuredData,
                        Severity::Medium,
                        format!("invalid JSON-LD: {err}"),
                    );
                }
            }
        }
        return StructuredData {
            method: Some(SchemaMethod::JsonLd),
            schema_types,
            valid,
        };
    }

    let microdata: Vec<String> = select_all(doc, "[itemtype]")
        .into_iter()
        .filter_map(|el| el.value().attr("itemtype"))
        .flat_map(str::split_whitespace)
        .filter_map(last_segment)
        .collect();
    if !microdata.is_empty() {
        return StructuredData {
            method: Some(SchemaMethod::Microdata),
            schema_types: microdata,
            valid: true,
        };
    }

    let rdfa = select_all(doc, "[typeof], [vocab]");
    if !rdfa.is_empty() {
        let schema_types = rdfa
            .into_iter()
            .flat_map(|el| match el.value().attr("typeof") {
                Some(types) => types.split_whitespace().filter_map(last_segment).collect(),
                None => el.value().attr("vocab").and_then(last_segment).into_iter().collect::<Vec<_>>(),
            })
            .collect();
        return StructuredData {
            method: Some(SchemaMethod::Rdfa),
            schema_types,
            valid: true,
        };
    }

    StructuredData {
        method: None,
        schema_types: Vec::new(),
        valid: true,
    }
}

fn collect_json_ld_types(value: &serde_json::Value, out: &mut Vec<String>) {
    match value {
        serde_json::Value::Array(items) => {
            for item in items {
                collect_json_ld_types(item, out);
            }
        }
        serde_json::Value::Object(map) => {
            match map.get("@type") {
                Some(serde_json::Value::String(t)) => out.push(t.clone()),
                Some(serde_json::Value::Array(types)) => {
                    out.extend(types.iter().filter_map(|t| t.as_str().map(str::to_string)))
                }
                _ => {}
            }
            if let Some(graph) = map.get("@graph") {
                collect_json_ld_types(graph, out);
            }
        }
        _ => {}
    }
}

fn last_segment(value: &str) -> Option<String> {
    value
        .trim()
        .trim_end_matches('/')
        .rsplit(['/', '#', ':'])
        .next()
        .and_then(non_empty)
}

fn visible_text(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => {
                out.push(' ');
                out.push_str(text);
            }
            Node::Element(el) if matches!(el.name(), "script" | "style" | "noscript" | "template") => {}
            Node::Element(_) => {
                if let Some(child) = ElementRef::wrap(child) {
                    visible_text(child, out);
                }
            }
            _ => {}
        }
    }
}

fn word_count(doc: &Html) -> usize {
    let Some(body) = select_all(doc, "body").into_iter().next() else {
        return 0;
    };
    let mut text = String::new();
    visible_text(body, &mut text);
    text.split_whitespace().count()
}

/// Visible text of the first main content region, whitespace-collapsed.
fn main_text(doc: &Html) -> Option<String> {
    let main = ["main", "article", "div.content", "div#content"]
        .iter()
        .find_map(|css| select_all(doc, css).into_iter().next())?;
    let mut text = String::new();
    visible_text(main, &mut text);
    non_empty(&text.split_whitespace().collect::<Vec<_>>().join(" "))
}

/// Hash of the main content block, used to spot duplicate pages.
fn content_fingerprint(main_text: &str) -> String {
    let digest = Sha256::digest(main_text.as_bytes());
    let mut hex = String::with_capacity(64);
    for byte in digest.iter() {
        let _ = write!(&mut hex, "{byte:02x}");
    }
    hex
}
