use std::time::{Duration, Instant};

use audit_core::{parse_http_url, FetchError, FetchErrorKind, FetchResult, LinkScope};
use audit_logging::{audit_debug, audit_trace};
use futures_util::StreamExt;
use reqwest::header::{CONTENT_TYPE, LOCATION};
use reqwest::{Method, StatusCode};
use url::Url;

use crate::decode::{decode_body, is_textual};
use crate::links::LinkExtractor;

pub const DEFAULT_USER_AGENT: &str = concat!("site_audit/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone)]
pub struct FetchSettings {
    pub connect_timeout: Duration,
    /// Bound on one whole fetch: every redirect hop plus the body.
    pub request_timeout: Duration,
    pub max_redirects: usize,
    pub max_bytes: u64,
    pub user_agent: String,
    /// Attempts per link status check; transient failures are retried.
    pub check_attempts: u32,
    /// Wait before the first retry, doubled for every further one.
    pub retry_backoff: Duration,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            max_redirects: 10,
            max_bytes: 5 * 1024 * 1024,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            check_attempts: 3,
            retry_backoff: Duration::from_millis(500),
        }
    }
}

/// Decides whether a redirect may continue to the given hop.
pub type RedirectGate<'a> = dyn Fn(&str) -> bool + Send + Sync + 'a;

#[async_trait::async_trait]
pub trait Fetcher: Send + Sync {
    /// Retrieves one page, following redirects and extracting links from HTML.
    async fn fetch(&self, url: &str) -> Result<FetchResult, FetchError>;

    /// Like [`Fetcher::fetch`], but stops at the first redirect hop `gate`
    /// refuses. The result then carries the redirect status, the refused hop
    /// as `final_url` and no body.
    async fn fetch_guarded(
        &self,
        url: &str,
        gate: &RedirectGate<'_>,
    ) -> Result<FetchResult, FetchError> {
        let _ = gate;
        self.fetch(url).await
    }

    /// Checks that a URL answers with a non-error status. Returns that status.
    async fn check_status(&self, url: &str) -> Result<u16, FetchError>;
}

/// Where a hand-followed redirect chain ended.
struct Followed {
    response: reqwest::Response,
    chain: Vec<String>,
    /// Hop the gate refused to follow.
    refused: Option<String>,
}

pub struct ReqwestFetcher {
    settings: FetchSettings,
    client: reqwest::Client,
    links: LinkExtractor,
}

impl ReqwestFetcher {
    pub fn new(settings: FetchSettings, scope: LinkScope) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout)
            .timeout(settings.request_timeout)
            .redirect(reqwest::redirect::Policy::none())
            .user_agent(settings.user_agent.clone())
            .build()
            .map_err(|err| FetchError::new(FetchErrorKind::Connection, err.to_string()))?;
        Ok(Self {
            settings,
            client,
            links: LinkExtractor::new(scope),
        })
    }

    pub fn settings(&self) -> &FetchSettings {
        &self.settings
    }

    /// Follows redirects by hand so every hop lands in the chain.
    async fn follow(
        &self,
        method: Method,
        url: &str,
        gate: Option<&RedirectGate<'_>>,
    ) -> Result<Followed, FetchError> {
        let mut current = parse_http_url(url)
            .map_err(|err| FetchError::new(FetchErrorKind::Connection, err.to_string()))?;
        let mut chain = vec![current.to_string()];

        loop {
            let response = self
                .client
                .request(method.clone(), current.clone())
                .send()
                .await
                .map_err(map_reqwest_error)?;

            let status = response.status();
            let location = response
                .headers()
                .get(LOCATION)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string);
            let Some(location) = location.filter(|_| status.is_redirection()) else {
                if chain.len() == 1 {
                    chain.clear();
                }
                return Ok(Followed {
                    response,
                    chain,
                    refused: None,
                });
            };

            let next = resolve_location(&current, &location)?;
            let next_str = next.to_string();
            if chain.contains(&next_str) {
                return Err(FetchError::new(
                    FetchErrorKind::RedirectLoop,
                    format!("{next_str} repeats in redirect chain from {url}"),
                ));
            }
            if gate.is_some_and(|gate| !gate(&next_str)) {
                audit_debug!("Not following redirect {} -> {}", current, next_str);
                chain.push(next_str.clone());
                return Ok(Followed {
                    response,
                    chain,
                    refused: Some(next_str),
                });
            }
            if chain.len() > self.settings.max_redirects {
                return Err(FetchError::new(
                    FetchErrorKind::RedirectLoop,
                    format!("more than {} redirects from {url}", self.settings.max_redirects),
                ));
            }
            audit_trace!("Redirect {} -> {} ({})", current, next_str, status);
            chain.push(next_str);
            current = next;
        }
    }

    async fn fetch_within_deadline(
        &self,
        url: &str,
        gate: Option<&RedirectGate<'_>>,
    ) -> Result<FetchResult, FetchError> {
        let started = Instant::now();
        let Followed {
            response,
            chain: redirect_chain,
            refused,
        } = self.follow(Method::GET, url, gate).await?;
        let latency_ms = elapsed_ms(started);

        let status = response.status();
        if let Some(final_url) = refused {
            return Ok(FetchResult {
                url: url.to_string(),
                final_url,
                status_code: status.as_u16(),
                redirect_chain,
                latency_ms,
                content_type: None,
                byte_len: 0,
                body: None,
                discovered_links: Vec::new(),
                invalid_links: Vec::new(),
            });
        }
        if status.as_u16() >= 400 {
            return Err(FetchError::http(status.as_u16(), status.to_string()));
        }

        let max_bytes = self.settings.max_bytes;
        if let Some(content_len) = response.content_length() {
            if content_len > max_bytes {
                return Err(too_large(max_bytes, content_len));
            }
        }

        let final_url = response.url().to_string();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.to_string());

        let mut bytes = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(map_reqwest_error)?;
            let next_len = bytes.len() as u64 + chunk.len() as u64;
            if next_len > max_bytes {
                return Err(too_large(max_bytes, next_len));
            }
            bytes.extend_from_slice(&chunk);
        }

        let body = is_textual(content_type.as_deref())
            .then(|| decode_body(&bytes, content_type.as_deref()).text);
        let mut fetched = FetchResult {
            url: url.to_string(),
            final_url,
            status_code: status.as_u16(),
            redirect_chain,
            latency_ms,
            content_type,
            byte_len: bytes.len() as u64,
            body,
            discovered_links: Vec::new(),
            invalid_links: Vec::new(),
        };
        if fetched.is_html() {
            if let Some(html) = fetched.body.as_deref() {
                let extracted = self.links.extract(html, &fetched.final_url);
                fetched.discovered_links = extracted.links;
                fetched.invalid_links = extracted.invalid;
            }
        }
        Ok(fetched)
    }

    async fn check_within_deadline(&self, url: &str) -> Result<u16, FetchError> {
        let mut status = self.follow(Method::HEAD, url, None).await?.response.status();
        if matches!(
            status,
            StatusCode::METHOD_NOT_ALLOWED | StatusCode::NOT_IMPLEMENTED
        ) {
            audit_trace!("HEAD not supported by {}, retrying with GET", url);
            status = self.follow(Method::GET, url, None).await?.response.status();
        }
        if status.as_u16() >= 400 {
            return Err(FetchError::http(status.as_u16(), status.to_string()));
        }
        Ok(status.as_u16())
    }

    async fn fetch_logged(
        &self,
        url: &str,
        gate: Option<&RedirectGate<'_>>,
    ) -> Result<FetchResult, FetchError> {
        let result = match tokio::time::timeout(
            self.settings.request_timeout,
            self.fetch_within_deadline(url, gate),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(self.deadline_error(url)),
        };
        match &result {
            Ok(fetched) => audit_debug!(
                "Fetched {} status={} bytes={} links={} in {} ms",
                url,
                fetched.status_code,
                fetched.byte_len,
                fetched.discovered_links.len(),
                fetched.latency_ms
            ),
            Err(err) => audit_debug!("Fetch of {} failed: {}", url, err),
        }
        result
    }

    fn deadline_error(&self, url: &str) -> FetchError {
        FetchError::new(
            FetchErrorKind::Timeout,
            format!(
                "no complete response from {url} within {} ms",
                self.settings.request_timeout.as_millis()
            ),
        )
    }
}

#[async_trait::async_trait]
impl Fetcher for ReqwestFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchResult, FetchError> {
        self.fetch_logged(url, None).await
    }

    async fn fetch_guarded(
        &self,
        url: &str,
        gate: &RedirectGate<'_>,
    ) -> Result<FetchResult, FetchError> {
        self.fetch_logged(url, Some(gate)).await
    }

    /// Retries timeouts, connection failures, 5xx and 429 with doubling backoff.
    async fn check_status(&self, url: &str) -> Result<u16, FetchError> {
        let attempts = self.settings.check_attempts.max(1);
        let mut attempt = 1;
        loop {
            let deadline = self.settings.request_timeout;
            let result = match tokio::time::timeout(deadline, self.check_within_deadline(url)).await {
                Ok(result) => result,
                Err(_) => Err(self.deadline_error(url)),
            };
            match result {
                Err(err) if attempt < attempts && is_transient(&err) => {
                    let backoff = self
                        .settings
                        .retry_backoff
                        .saturating_mul(1 << (attempt - 1).min(16));
                    audit_debug!(
                        "Check of {} failed ({}), attempt {}/{}; retrying in {:?}",
                        url,
                        err,
                        attempt,
                        attempts,
                        backoff
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                result => return result,
            }
        }
    }
}

fn is_transient(err: &FetchError) -> bool {
    match err.kind {
        FetchErrorKind::Timeout | FetchErrorKind::Connection => true,
        FetchErrorKind::HttpError => err
            .status_code
            .is_some_and(|code| code >= 500 || code == 429),
        FetchErrorKind::RedirectLoop | FetchErrorKind::TooLarge => false,
    }
}

fn resolve_location(current: &Url, location: &str) -> Result<Url, FetchError> {
    let next = current.join(location.trim()).map_err(|err| {
        FetchError::new(
            FetchErrorKind::Connection,
            format!("invalid redirect target {location:?}: {err}"),
        )
    })?;
    parse_http_url(next.as_str())
        .map_err(|err| FetchError::new(FetchErrorKind::Connection, err.to_string()))
}

fn too_large(max_bytes: u64, actual: u64) -> FetchError {
    FetchError::new(
        FetchErrorKind::TooLarge,
        format!("response of {actual} bytes exceeds limit of {max_bytes} bytes"),
    )
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

fn map_reqwest_error(err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        return FetchError::new(FetchErrorKind::Timeout, err.to_string());
    }
    if err.is_redirect() {
        return FetchError::new(FetchErrorKind::RedirectLoop, err.to_string());
    }
    FetchError::new(FetchErrorKind::Connection, err.to_string())
}
