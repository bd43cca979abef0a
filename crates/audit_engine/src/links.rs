use std::collections::HashSet;

use audit_core::{DiscoveredLink, LinkScope};
use ego_tree::NodeRef;
use scraper::node::Node;
use scraper::{ElementRef, Html};
use url::Url;

const DEFAULT_MAX_LINKS: usize = 5_000;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedLinks {
    pub links: Vec<DiscoveredLink>,
    /// Hrefs that could not be resolved against the page URL.
    pub invalid: Vec<String>,
}

/// Collects `<a href>` targets of a page, resolved against its final URL.
pub struct LinkExtractor {
    scope: LinkScope,
    max_links: usize,
}

impl LinkExtractor {
    pub fn new(scope: LinkScope) -> Self {
        Self::with_max_links(scope, DEFAULT_MAX_LINKS)
    }

    pub fn with_max_links(scope: LinkScope, max_links: usize) -> Self {
        Self { scope, max_links }
    }

    pub fn extract(&self, html: &str, page_url: &str) -> ExtractedLinks {
        let document = Html::parse_document(html);
        let base = document_base(&document, page_url);
        let mut ctx = ExtractContext {
            base,
            out: ExtractedLinks::default(),
            seen: HashSet::new(),
        };
        for child in document.root_element().children() {
            self.visit_node(child, &mut ctx);
        }
        ctx.out
    }

    fn visit_node(&self, node: NodeRef<'_, Node>, ctx: &mut ExtractContext) {
        let Some(element) = ElementRef::wrap(node) else {
            for child in node.children() {
                self.visit_node(child, ctx);
            }
            return;
        };
        match element.value().name() {
            "a" | "area" => {
                if let Some(href) = element.value().attr("href") {
                    self.handle_href(href, ctx);
                }
                self.visit_children(element, ctx);
            }
            "script" | "style" | "template" | "noscript" => {}
            _ => self.visit_children(element, ctx),
        }
    }

    fn visit_children(&self, element: ElementRef<'_>, ctx: &mut ExtractContext) {
        for child in element.children() {
            self.visit_node(child, ctx);
        }
    }

    fn handle_href(&self, href: &str, ctx: &mut ExtractContext) {
        if ctx.out.links.len() >= self.max_links {
            return;
        }
        match resolve_href(href, ctx.base.as_ref()) {
            Resolved::Skip => {}
            Resolved::Invalid(raw) => ctx.out.invalid.push(raw),
            Resolved::Url(mut url) => {
                url.set_fragment(None);
                let url_str = url.to_string();
                if ctx.seen.insert(url_str.clone()) {
                    ctx.out.links.push(DiscoveredLink {
                        is_internal: self.scope.is_internal(&url),
                        url: url_str,
                    });
                }
            }
        }
    }
}

struct ExtractContext {
    base: Option<Url>,
    out: ExtractedLinks,
    seen: HashSet<String>,
}

enum Resolved {
    Url(Url),
    Invalid(String),
    Skip,
}

fn document_base(document: &Html, page_url: &str) -> Option<Url> {
    let page = Url::parse(page_url).ok()?;
    let declared = document
        .root_element()
        .descendants()
        .filter_map(ElementRef::wrap)
        .find(|el| el.value().name() == "base")
        .and_then(|el| el.value().attr("href"))
        .and_then(|href| page.join(href.trim()).ok());
    Some(declared.unwrap_or(page))
}

fn resolve_href(href: &str, base: Option<&Url>) -> Resolved {
    let trimmed = href.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return Resolved::Skip;
    }
    let lower = trimmed.to_ascii_lowercase();
    if ["mailto:", "tel:", "javascript:", "data:", "sms:"]
        .iter()
        .any(|scheme| lower.starts_with(scheme))
    {
        return Resolved::Skip;
    }
    let resolved = match Url::parse(trimmed) {
        Ok(url) => Some(url),
        Err(url::ParseError::RelativeUrlWithoutBase) => base.and_then(|b| b.join(trimmed).ok()),
        Err(_) => None,
    };
    match resolved {
        Some(url) if matches!(url.scheme(), "http" | "https") && url.host_str().is_some() => {
            Resolved::Url(url)
        }
        Some(_) => Resolved::Skip,
        None => Resolved::Invalid(trimmed.to_string()),
    }
}
