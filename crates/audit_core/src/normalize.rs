use url::Url;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidUrl {
    #[error("cannot parse url {url:?}: {reason}")]
    Unparsable { url: String, reason: String },
    #[error("unsupported scheme {scheme:?} in {url:?}")]
    UnsupportedScheme { url: String, scheme: String },
    #[error("url has no host: {0:?}")]
    MissingHost(String),
}

/// Parses an absolute http(s) URL with a host.
pub fn parse_http_url(raw: &str) -> Result<Url, InvalidUrl> {
    let trimmed = raw.trim();
    let parsed = Url::parse(trimmed).map_err(|err| InvalidUrl::Unparsable {
        url: trimmed.to_string(),
        reason: err.to_string(),
    })?;
    match parsed.scheme() {
        "http" | "https" => {}
        other => {
            return Err(InvalidUrl::UnsupportedScheme {
                url: trimmed.to_string(),
                scheme: other.to_string(),
            })
        }
    }
    if parsed.host_str().map_or(true, str::is_empty) {
        return Err(InvalidUrl::MissingHost(trimmed.to_string()));
    }
    Ok(parsed)
}

/// Dedupe key: scheme, lower-cased host, non-default port and path without a
/// trailing slash. Query and fragment do not take part.
pub fn normalize_url_for_dedupe(raw: &str) -> Result<String, InvalidUrl> {
    let parsed = parse_http_url(raw)?;
    let host = parsed
        .host_str()
        .map(str::to_ascii_lowercase)
        .ok_or_else(|| InvalidUrl::MissingHost(raw.trim().to_string()))?;

    let mut key = format!("{}://{}", parsed.scheme(), host);
    if let Some(port) = parsed.port() {
        key.push(':');
        key.push_str(&port.to_string());
    }
    key.push_str(parsed.path().trim_end_matches('/'));
    Ok(key)
}

/// Decides whether a link stays on the crawled site.
///
/// A host is internal when it equals the seed host (minus a leading `www.`)
/// or is a subdomain of it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkScope {
    base_host: String,
}

impl LinkScope {
    pub fn from_seed(seed: &Url) -> Option<Self> {
        let host = seed.host_str()?.to_ascii_lowercase();
        let base_host = host.strip_prefix("www.").unwrap_or(&host).to_string();
        if base_host.is_empty() {
            return None;
        }
        Some(Self { base_host })
    }

    pub fn base_host(&self) -> &str {
        &self.base_host
    }

    pub fn is_internal(&self, url: &Url) -> bool {
        if !matches!(url.scheme(), "http" | "https") {
            return false;
        }
        let Some(host) = url.host_str() else {
            return false;
        };
        let host = host.to_ascii_lowercase();
        host == self.base_host
            || host
                .strip_suffix(self.base_host.as_str())
                .is_some_and(|prefix| prefix.ends_with('.'))
    }
}
