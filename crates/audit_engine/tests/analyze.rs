use std::sync::Arc;

use audit_core::{
    AnalysisError, CanonicalIssue, FetchResult, IssueCategory, PageAnalysis, SchemaMethod,
    Severity,
};
use audit_engine::{PageAnalyzer, RobotsRules, SeoAnalyzer};
use pretty_assertions::assert_eq;

const URL: &str = "https://example.com/page";

fn fetched_html(body: &str) -> FetchResult {
    FetchResult {
        url: URL.to_string(),
        final_url: URL.to_string(),
        status_code: 200,
        redirect_chain: Vec::new(),
        latency_ms: 5,
        content_type: Some("text/html; charset=utf-8".to_string()),
        byte_len: body.len() as u64,
        body: Some(body.to_string()),
        discovered_links: Vec::new(),
        invalid_links: Vec::new(),
    }
}

/// A page that passes every rule; tests override one aspect at a time.
fn clean_page(head_extra: &str, body: &str) -> String {
    format!(
        r#"<!doctype html><html lang="en"><head>
<title>Example page</title>
<meta name="description" content="A page about examples.">
<link rel="canonical" href="https://example.com/page">
{head_extra}
</head><body>{body}</body></html>"#
    )
}

fn analyze(html: &str) -> PageAnalysis {
    SeoAnalyzer::new().analyze(&fetched_html(html), 1).unwrap()
}

fn categories(analysis: &PageAnalysis) -> Vec<(IssueCategory, Severity)> {
    analysis
        .issues
        .iter()
        .map(|issue| (issue.category, issue.severity))
        .collect()
}

#[test]
fn clean_page_has_no_issues() {
    let analysis = analyze(&clean_page("", "<h1>Hello</h1><p>Some words here.</p>"));
    assert!(categories(&analysis).is_empty());
    let page = &analysis.page;
    assert_eq!(page.title.as_deref(), Some("Example page"));
    assert!(page.title_present);
    assert!(page.meta_description_present);
    assert!(page.h1_present);
    assert!(page.indexable);
    assert!(page.robots_txt_allowed);
    assert_eq!(page.lang.as_deref(), Some("en"));
    assert_eq!(page.canonical_url.as_deref(), Some(URL));
    assert_eq!(page.depth, 1);
    assert_eq!(page.word_count, 4);
}

#[test]
fn missing_description_and_alt_scenario() {
    let html = r#"<html lang="en"><head><title>T</title>
<link rel="canonical" href="/page"></head>
<body><h1>Head</h1><img src="/a.png"><img src="/b.png" alt="Bee"></body></html>"#;
    let analysis = analyze(html);

    assert_eq!(
        categories(&analysis),
        vec![
            (IssueCategory::MissingMeta, Severity::Medium),
            (IssueCategory::MissingAlt, Severity::Low),
        ]
    );
    assert!(!analysis.page.meta_description_present);
    assert_eq!(analysis.page.meta_description, None);
    assert_eq!(analysis.page.images.len(), 2);
    assert!(!analysis.page.images[0].has_alt);
    assert!(analysis.page.images[1].has_alt);
}

#[test]
fn missing_title_yields_exactly_one_high_issue() {
    let html = r#"<html lang="en"><head><title>   </title>
<meta name="description" content="d"><link rel="canonical" href="https://example.com/page">
</head><body><h1>x</h1></body></html>"#;
    let analysis = analyze(html);

    let high_meta: Vec<_> = analysis
        .issues
        .iter()
        .filter(|issue| issue.category == IssueCategory::MissingMeta)
        .collect();
    assert_eq!(high_meta.len(), 1);
    assert_eq!(high_meta[0].severity, Severity::High);
    assert_eq!(high_meta[0].url, URL);
    assert!(!analysis.page.title_present);
}

#[test]
fn missing_h1_is_medium() {
    let analysis = analyze(&clean_page("", "<h2>Only a subheading</h2>"));
    assert_eq!(
        categories(&analysis),
        vec![(IssueCategory::MissingHeading, Severity::Medium)]
    );
    assert!(!analysis.page.h1_present);
}

#[test]
fn heading_jumps_are_reported_once_each() {
    let analysis = analyze(&clean_page(
        "",
        "<h1>a</h1><h3>b</h3><h2>c</h2><h4>d</h4><h5>e</h5>",
    ));
    assert_eq!(
        categories(&analysis),
        vec![
            (IssueCategory::HeadingHierarchy, Severity::Low),
            (IssueCategory::HeadingHierarchy, Severity::Low),
        ]
    );
    let levels: Vec<u8> = analysis
        .page
        .heading_hierarchy
        .iter()
        .map(|h| h.level)
        .collect();
    assert_eq!(levels, vec![1, 3, 2, 4, 5]);
}

#[test]
fn canonical_rules() {
    let missing = r#"<html lang="en"><head><title>T</title><meta name="description" content="d">
</head><body><h1>x</h1></body></html>"#;
    assert_eq!(
        categories(&analyze(missing)),
        vec![(IssueCategory::CanonicalMismatch, Severity::High)]
    );

    let elsewhere = clean_page(r#"<link rel="canonical" href="https://example.com/other">"#, "<h1>x</h1>");
    // The first canonical link wins.
    assert!(categories(&analyze(&elsewhere)).is_empty());

    let html = r#"<html lang="en"><head><title>T</title><meta name="description" content="d">
<link rel="canonical" href="https://example.com/other"></head><body><h1>x</h1></body></html>"#;
    assert_eq!(
        categories(&analyze(html)),
        vec![(IssueCategory::CanonicalMismatch, Severity::High)]
    );
}

#[test]
fn canonical_may_name_the_redirect_target() {
    let html = r#"<html lang="en"><head><title>T</title><meta name="description" content="d">
<link rel="canonical" href="https://example.com/new/"></head><body><h1>x</h1></body></html>"#;
    let mut fetched = fetched_html(html);
    fetched.final_url = "https://example.com/new".to_string();
    fetched.redirect_chain = vec![URL.to_string(), fetched.final_url.clone()];

    let analysis = SeoAnalyzer::new().analyze(&fetched, 0).unwrap();
    assert!(analysis.issues.is_empty());
    assert!(analysis.page.canonical_issues.is_empty());
}

#[test]
fn canonical_sub_reasons_are_recorded_per_page() {
    let with_canonical = |href: &str| {
        let html = format!(
            r#"<html lang="en"><head><title>T</title><meta name="description" content="d">
<link rel="canonical" href="{href}"></head><body><h1>x</h1></body></html>"#
        );
        analyze(&html).page.canonical_issues
    };

    assert!(with_canonical("https://example.com/page").is_empty());
    assert_eq!(with_canonical("/page"), vec![CanonicalIssue::RelativeUrl]);
    assert_eq!(with_canonical("other"), vec![CanonicalIssue::RelativeUrl]);
    assert_eq!(
        with_canonical("https://mirror.example.org/page"),
        vec![CanonicalIssue::PointsToDifferentDomain]
    );
    assert_eq!(
        with_canonical("https://example.com/other"),
        vec![CanonicalIssue::PointsToDifferentUrl]
    );

    let missing = r#"<html lang="en"><head><title>T</title></head><body><h1>x</h1></body></html>"#;
    assert_eq!(
        analyze(missing).page.canonical_issues,
        vec![CanonicalIssue::MissingCanonical]
    );
}

#[test]
fn relative_canonical_is_not_an_issue_by_itself() {
    let html = r#"<html lang="en"><head><title>T</title><meta name="description" content="d">
<link rel="canonical" href="/page"></head><body><h1>x</h1></body></html>"#;
    let analysis = analyze(html);
    assert!(analysis.issues.is_empty());
    assert_eq!(analysis.page.canonical_url.as_deref(), Some(URL));
}

#[test]
fn noindex_marks_page_non_indexable() {
    let analysis = analyze(&clean_page(
        r#"<meta name="ROBOTS" content="NoIndex, follow">"#,
        "<h1>x</h1>",
    ));
    assert!(!analysis.page.indexable);
    assert_eq!(analysis.page.meta_robots.as_deref(), Some("noindex, follow"));
    assert_eq!(
        categories(&analysis),
        vec![(IssueCategory::NonIndexable, Severity::Low)]
    );
}

#[test]
fn accessibility_rules() {
    let html = r#"<html><head><title>T</title><meta name="description" content="d">
<link rel="canonical" href="https://example.com/page"></head><body><h1>x</h1>
<a href="/icon"><img src="i.png"></a>
<a href="/labelled" aria-label="Home"></a>
<a href="/pictured"><img src="p.png" alt="Profile"></a>
<a href="/text">Read more</a>
</body></html>"#;
    let analysis = analyze(html);
    assert_eq!(
        categories(&analysis),
        vec![
            (IssueCategory::MissingAlt, Severity::Low),
            (IssueCategory::MissingLang, Severity::Low),
            (IssueCategory::EmptyLinkText, Severity::Low),
        ]
    );
    assert!(analysis.issues[2].description.contains("/icon"));
}

#[test]
fn json_ld_types_are_collected() {
    let analysis = analyze(&clean_page(
        r#"<script type="application/ld+json">{"@context":"https://schema.org","@type":"Organization"}</script>
<script type="application/ld+json">{"@graph":[{"@type":"WebPage"},{"@type":["Article","NewsArticle"]}]}</script>"#,
        "<h1>x</h1>",
    ));
    let data = &analysis.page.structured_data;
    assert_eq!(data.method, Some(SchemaMethod::JsonLd));
    assert_eq!(
        data.schema_types,
        vec!["Organization", "WebPage", "Article", "NewsArticle"]
    );
    assert!(data.valid);
    assert!(analysis.issues.is_empty());
}

#[test]
fn invalid_json_ld_is_reported() {
    let analysis = analyze(&clean_page(
        r#"<script type="application/ld+json">{"@type": "Organization",</script>"#,
        "<h1>x</h1>",
    ));
    assert!(!analysis.page.structured_data.valid);
    assert_eq!(
        categories(&analysis),
        vec![(IssueCategory::InvalidStructuredData, Severity::Medium)]
    );
}

#[test]
fn microdata_and_rdfa_are_detected() {
    let microdata = analyze(&clean_page(
        "",
        r#"<h1>x</h1><div itemscope itemtype="https://schema.org/Product"></div>"#,
    ));
    assert_eq!(microdata.page.structured_data.method, Some(SchemaMethod::Microdata));
    assert_eq!(microdata.page.structured_data.schema_types, vec!["Product"]);

    let rdfa = analyze(&clean_page(
        "",
        r#"<h1>x</h1><div vocab="https://schema.org/" typeof="Person"></div>"#,
    ));
    assert_eq!(rdfa.page.structured_data.method, Some(SchemaMethod::Rdfa));
    assert_eq!(rdfa.page.structured_data.schema_types, vec!["Person"]);

    let none = analyze(&clean_page("", "<h1>x</h1>"));
    assert_eq!(none.page.structured_data.method, None);
    assert!(none.page.structured_data.schema_types.is_empty());
}

#[test]
fn identical_main_content_shares_a_fingerprint() {
    let a = analyze(&clean_page("", "<nav>Menu A</nav><main><h1>Same</h1><p>Body  text</p></main>"));
    let b = analyze(&clean_page("", "<nav>Menu B</nav><main><h1>Same</h1>\n<p>Body text</p></main>"));
    let c = analyze(&clean_page("", "<main><h1>Different</h1></main>"));

    assert!(a.page.content_fingerprint.is_some());
    assert_eq!(a.page.content_fingerprint, b.page.content_fingerprint);
    assert_ne!(a.page.content_fingerprint, c.page.content_fingerprint);
    assert_eq!(analyze(&clean_page("", "<h1>x</h1>")).page.content_fingerprint, None);
}

#[test]
fn reading_grade_comes_from_main_content() {
    let simple = analyze(&clean_page(
        "",
        "<h1>x</h1><main><p>The cat sat. The dog ran. We had fun.</p></main>",
    ));
    let dense = analyze(&clean_page(
        "",
        "<h1>x</h1><article><p>Comprehensive organizational documentation facilitates \
         considerably improved interdepartmental communication.</p></article>",
    ));
    let simple_grade = simple.page.flesch_kincaid_grade.unwrap();
    let dense_grade = dense.page.flesch_kincaid_grade.unwrap();
    assert!(dense_grade > simple_grade, "{dense_grade} vs {simple_grade}");

    let no_main = analyze(&clean_page("", "<h1>x</h1><p>The cat sat.</p>"));
    assert_eq!(no_main.page.flesch_kincaid_grade, None);
}

#[test]
fn word_count_skips_scripts_and_styles() {
    let analysis = analyze(&clean_page(
        "",
        "<h1>One two</h1><script>var ignored = 1;</script><style>p { color: red }</style><p>three four five</p>",
    ));
    assert_eq!(analysis.page.word_count, 5);
}

#[test]
fn robots_disallowed_pages_are_flagged() {
    let rules = RobotsRules::parse("site_audit", "User-agent: *\nDisallow: /page\n");
    let analyzer = SeoAnalyzer::with_robots(Arc::new(rules));
    let analysis = analyzer
        .analyze(&fetched_html(&clean_page("", "<h1>x</h1>")), 0)
        .unwrap();
    assert!(!analysis.page.robots_txt_allowed);
}

#[test]
fn non_html_and_empty_documents_are_rejected() {
    let mut pdf = fetched_html("%PDF-1.4");
    pdf.content_type = Some("application/pdf".to_string());
    assert_eq!(
        SeoAnalyzer::new().analyze(&pdf, 0),
        Err(AnalysisError::NotHtml(Some("application/pdf".to_string())))
    );

    let empty = fetched_html("  \n ");
    assert_eq!(
        SeoAnalyzer::new().analyze(&empty, 0),
        Err(AnalysisError::EmptyDocument)
    );
}
