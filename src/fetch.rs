use std::time::Duration;

use anyhow::{bail, Context, Result};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE};
use reqwest::StatusCode;
use tracing::{debug, warn};
use url::Url;

use crate::config::HttpConfig;

/// Shared HTTP client for directory pages: browser-like headers, per-request
/// timeout, retry with exponential backoff on 429/5xx and transport errors.
#[derive(Clone)]
pub struct Fetcher {
    client: reqwest::Client,
    retries: u32,
    delay: Duration,
}

impl Fetcher {
    pub fn new(cfg: &HttpConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.5"));

        let client = reqwest::Client::builder()
            .user_agent(cfg.user_agent.clone())
            .default_headers(headers)
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Fetcher {
            client,
            retries: cfg.retries,
            delay: Duration::from_millis(cfg.delay_ms),
        })
    }

    /// Politeness delay between consecutive requests to one source.
    pub async fn pause(&self) {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
    }

    pub async fn get_html(&self, url: &str) -> Result<String> {
        let mut attempt = 0;
        loop {
            debug!(url, attempt, "Fetching page");
            let retryable = match self.client.get(url).send().await {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        return resp
                            .text()
                            .await
                            .with_context(|| format!("Failed to read body of {}", url));
                    }
                    if !should_retry(status) {
                        bail!("{} returned {}", url, status);
                    }
                    format!("status {}", status)
                }
                Err(e) => e.to_string(),
            };

            if attempt >= self.retries {
                bail!(
                    "Failed to fetch {} after {} attempts: {}",
                    url,
                    attempt + 1,
                    retryable
                );
            }

            let backoff = self.delay.max(Duration::from_millis(50)) * 2u32.pow(attempt);
            warn!(
                "Fetch of {} failed ({}), attempt {}/{}, backing off {:.1}s",
                url,
                retryable,
                attempt + 1,
                self.retries,
                backoff.as_secs_f64()
            );
            tokio::time::sleep(backoff).await;
            attempt += 1;
        }
    }
}

fn should_retry(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// Resolve `href` against the page it was found on. Drops fragments and
/// non-http(s) schemes (mailto:, javascript:, tel:).
pub fn resolve(base: &str, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') {
        return None;
    }
    let mut joined = Url::parse(base).ok()?.join(href).ok()?;
    if !matches!(joined.scheme(), "http" | "https") {
        return None;
    }
    joined.set_fragment(None);
    Some(joined.to_string())
}
