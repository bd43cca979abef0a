use std::time::Duration;

use audit_core::{LinkScope, Severity, SitemapKind};
use audit_engine::{audit_sitemap, FetchSettings, ReqwestFetcher};
use pretty_assertions::assert_eq;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn listed_urls_are_status_checked() {
    let server = MockServer::start().await;
    let base = server.uri();
    Mock::given(method("GET"))
        .and(path("/sitemap.xml"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            format!(
                r#"<?xml version="1.0" encoding="UTF-8"?>
<urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
  <url><loc>{base}/ok</loc></url>
  <url><loc>{base}/moved</loc></url>
  <url><loc>{base}/gone</loc></url>
  <url><loc>{base}/flaky</loc></url>
  <url><loc>{base}/ok</loc></url>
</urlset>"#
            ),
            "application/xml",
        ))
        .mount(&server)
        .await;
    Mock::given(method("HEAD"))
        .and(path("/ok"))
        .respond_with(ResponseTemplate::new(200))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("HEAD"))
        .and(path("/moved"))
        .respond_with(ResponseTemplate::new(301).insert_header("Location", "/ok"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("HEAD"))
        .and(path("/gone"))
        .respond_with(ResponseTemplate::new(410))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("HEAD"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(502))
        .expect(2)
        .mount(&server)
        .await;

    let seed = Url::parse(&format!("{base}/")).unwrap();
    let scope = LinkScope::from_seed(&seed).unwrap();
    let settings = FetchSettings {
        check_attempts: 2,
        retry_backoff: Duration::from_millis(10),
        ..FetchSettings::default()
    };
    let fetcher = ReqwestFetcher::new(settings, scope.clone()).unwrap();

    let report = audit_sitemap(&fetcher, &seed, &[], &scope).await;

    assert!(report.found);
    assert_eq!(report.kind, Some(SitemapKind::Urlset));
    assert_eq!(report.url_count, 5);
    let findings: Vec<_> = report
        .findings
        .iter()
        .map(|finding| (finding.url.as_str(), finding.severity, finding.message.as_str()))
        .collect();
    let flaky = format!("{base}/flaky");
    let gone = format!("{base}/gone");
    assert_eq!(
        findings,
        vec![
            (flaky.as_str(), Severity::Low, "listed URL returns HTTP 502"),
            (gone.as_str(), Severity::Low, "listed URL returns HTTP 410"),
        ]
    );
}
