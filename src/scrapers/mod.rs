pub mod antiochian;
pub mod goarch;
pub mod oca;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info, warn};

use crate::config::RunOptions;
use crate::error::ScrapeError;
use crate::fetch::Fetcher;
use crate::model::{ChurchRecord, SCRAPER_VERSION};

pub use antiochian::AntiochianScraper;
pub use goarch::GoarchScraper;
pub use oca::OcaScraper;

/// Canonical jurisdiction names, as stamped on records and recognised by
/// the cleaner and validator.
pub mod jurisdictions {
    pub const OCA: &str = "Orthodox Church in America (OCA)";
    pub const GOARCH: &str = "Greek Orthodox Archdiocese of America (GOARCH)";
    pub const ANTIOCHIAN: &str = "Antiochian Orthodox Christian Archdiocese";
    pub const ROCOR: &str = "Russian Orthodox Church Outside Russia (ROCOR)";
    pub const SERBIAN: &str = "Serbian Orthodox Church";
    pub const ROMANIAN: &str = "Romanian Orthodox Episcopate of America";
    pub const BULGARIAN: &str = "Bulgarian Orthodox Church";
}

/// One jurisdiction's directory. Implementations return partial results
/// when some pages fail and only return `Err` when nothing could be fetched.
#[async_trait]
pub trait Scraper: Send + Sync {
    fn jurisdiction(&self) -> &str;

    async fn scrape(&self) -> Result<Vec<ChurchRecord>, ScrapeError>;
}

pub fn default_scrapers(opts: &RunOptions, fetcher: &Fetcher) -> Vec<Arc<dyn Scraper>> {
    let max_pages = opts.scrapers.max_detail_pages;
    vec![
        Arc::new(OcaScraper::new(fetcher.clone(), oca::BASE_URL, max_pages)),
        Arc::new(GoarchScraper::new(fetcher.clone(), goarch::BASE_URL, max_pages)),
        Arc::new(AntiochianScraper::new(fetcher.clone(), antiochian::BASE_URL, max_pages)),
    ]
}

/// Page-by-page accumulator shared by the scrapers: politeness delay between
/// requests, per-page failures logged and remembered, standardisation on finish.
pub(crate) struct Crawl<'a> {
    fetcher: &'a Fetcher,
    jurisdiction: &'static str,
    records: Vec<ChurchRecord>,
    requests: usize,
    pages_ok: usize,
    first_error: Option<ScrapeError>,
}

impl<'a> Crawl<'a> {
    pub fn new(fetcher: &'a Fetcher, jurisdiction: &'static str) -> Self {
        Crawl {
            fetcher,
            jurisdiction,
            records: Vec::new(),
            requests: 0,
            pages_ok: 0,
            first_error: None,
        }
    }

    /// Fetch one page. `None` when it failed; the failure is logged and kept.
    pub async fn fetch(&mut self, url: &str) -> Option<String> {
        if self.requests > 0 {
            self.fetcher.pause().await;
        }
        self.requests += 1;
        match self.fetcher.get_html(url).await {
            Ok(html) => {
                self.pages_ok += 1;
                Some(html)
            }
            Err(e) => {
                warn!(jurisdiction = self.jurisdiction, url, "Page fetch failed: {:#}", e);
                self.first_error.get_or_insert(ScrapeError::Fetch {
                    url: url.to_string(),
                    source: e,
                });
                None
            }
        }
    }

    pub fn add(&mut self, url: &str, records: Vec<ChurchRecord>) {
        debug!(jurisdiction = self.jurisdiction, url, count = records.len(), "Extracted page");
        self.records.extend(records);
    }

    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    pub fn finish(self) -> Result<Vec<ChurchRecord>, ScrapeError> {
        if self.pages_ok == 0 {
            if let Some(err) = self.first_error {
                return Err(err);
            }
        }
        info!(
            jurisdiction = self.jurisdiction,
            pages = self.pages_ok,
            failed = self.requests - self.pages_ok,
            count = self.records.len(),
            "Scrape finished"
        );
        let jurisdiction = self.jurisdiction;
        Ok(self
            .records
            .into_iter()
            .map(|r| standardize(r, jurisdiction))
            .collect())
    }
}

/// Stamp provenance onto a freshly extracted record.
pub fn standardize(mut rec: ChurchRecord, jurisdiction: &str) -> ChurchRecord {
    if rec.jurisdiction.trim().is_empty() {
        rec.jurisdiction = jurisdiction.to_string();
    }
    rec.scraper_version = Some(SCRAPER_VERSION.to_string());
    rec.data_quality_score = rec.compute_quality_score();
    rec.last_updated = Some(Utc::now());
    rec
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::config::HttpConfig;
    use crate::fetch::Fetcher;

    pub fn fixture(name: &str) -> String {
        std::fs::read_to_string(format!("tests/fixtures/{}.html", name)).unwrap()
    }

    pub fn fetcher() -> Fetcher {
        Fetcher::new(&HttpConfig {
            retries: 0,
            delay_ms: 0,
            timeout_secs: 5,
            ..HttpConfig::default()
        })
        .unwrap()
    }
}
