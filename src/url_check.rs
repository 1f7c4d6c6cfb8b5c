use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::StatusCode;
use tracing::{debug, error, info, warn};

use crate::concurrency::{progress_bar, Bounded, TaskError};
use crate::config::{HttpConfig, UrlCheckConfig};
use crate::model::{ChurchRecord, ErrorEntry, ErrorKind};

/// Reachability check for a parish website. Never fails: any transport
/// error or timeout is simply `false`.
pub struct UrlValidator {
    client: reqwest::Client,
}

impl UrlValidator {
    pub fn new(cfg: &UrlCheckConfig, http: &HttpConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(http.user_agent.clone())
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .context("Failed to build URL check client")?;
        Ok(UrlValidator { client })
    }

    /// HEAD first; servers that reject HEAD get a GET.
    pub async fn validate(&self, url: &str) -> bool {
        match self.client.head(url).send().await {
            Ok(resp) if resp.status().is_success() => return true,
            Ok(resp) if !head_unsupported(resp.status()) => {
                debug!(url, status = %resp.status(), "URL check failed");
                return false;
            }
            Ok(_) => {}
            Err(e) => debug!(url, "HEAD failed, retrying with GET: {}", e),
        }
        match self.client.get(url).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                debug!(url, "URL check failed: {}", e);
                false
            }
        }
    }

    /// Check every record that claims a website and set
    /// `website_validated`. Returns the number of reachable sites and any
    /// ledger entries for checks that crashed.
    pub async fn check_records(
        self: Arc<Self>,
        records: &mut [ChurchRecord],
        bounded: Bounded,
    ) -> (usize, Vec<ErrorEntry>) {
        let targets: Vec<(usize, String)> = records
            .iter()
            .enumerate()
            .filter_map(|(i, r)| r.website.clone().map(|w| (i, w)))
            .collect();
        info!(count = targets.len(), "Validating church website URLs");

        let urls: Vec<String> = targets.iter().map(|(_, u)| u.clone()).collect();
        let pb = progress_bar(urls.len());
        let task_pb = pb.clone();
        let results = bounded
            .run(urls, move |url| {
                let validator = Arc::clone(&self);
                let pb = task_pb.clone();
                async move {
                    let ok = validator.validate(&url).await;
                    pb.inc(1);
                    ok
                }
            })
            .await;
        pb.finish_and_clear();

        let mut validated = 0;
        let mut errors = Vec::new();
        for ((idx, url), res) in targets.into_iter().zip(results) {
            let rec = &mut records[idx];
            rec.website_validated = match res {
                Ok(true) => {
                    validated += 1;
                    true
                }
                Ok(false) => {
                    warn!(church = %rec.name, url = %url, "Invalid URL detected");
                    false
                }
                Err(TaskError::Panicked(msg)) => {
                    error!(church = %rec.name, url = %url, "URL validation crashed: {}", msg);
                    let mut entry = ErrorEntry::new(ErrorKind::UrlValidation, msg)
                        .for_jurisdiction(&rec.jurisdiction);
                    entry.url = Some(url);
                    errors.push(entry);
                    false
                }
                Err(TaskError::Skipped) => false,
            };
        }
        info!(validated, "URL validation complete");
        (validated, errors)
    }
}

fn head_unsupported(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::METHOD_NOT_ALLOWED | StatusCode::FORBIDDEN | StatusCode::NOT_IMPLEMENTED
    )
}
