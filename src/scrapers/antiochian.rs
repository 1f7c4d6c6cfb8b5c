use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use tracing::{info, warn};

use super::{jurisdictions, Crawl, Scraper};
use crate::error::ScrapeError;
use crate::fetch::Fetcher;
use crate::model::ChurchRecord;
use crate::parser::fields::{FieldChains, Pattern, Strategy};
use crate::parser::{self, ListingProfile};
use crate::sitemap;

pub const BASE_URL: &str = "https://www.antiochian.org";

const LISTING_PATHS: &[&str] = &["/directory/parishes", "/parishes"];

static PARISH_PAGE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)/(?:parish|parishes|church)/[^/?#]+/?$").unwrap());

const CHAINS: FieldChains = FieldChains {
    name: &[
        Strategy::Text(".parish-name, .church-name"),
        Strategy::Text("h1, h2"),
        Strategy::FirstLine,
    ],
    clergy: &[
        Strategy::Text(".pastor, .clergy, .priest"),
        Strategy::Pattern(Pattern::Clergy),
    ],
    parish_priest: &[Strategy::Text(".pastor, .priest")],
    services: &[
        Strategy::Text(".services, .service-schedule, .schedule"),
        Strategy::Pattern(Pattern::Services),
    ],
    feast_day: &[
        Strategy::Text(".feast-day"),
        Strategy::Pattern(Pattern::FeastDay),
    ],
    ..FieldChains::GENERIC
};

const DETAIL: ListingProfile = ListingProfile {
    containers: &[".parish-detail", ".church-details", "article", "main"],
    chains: CHAINS,
};

const LISTING: ListingProfile = ListingProfile {
    containers: &[".parish-listing", ".parish", ".views-row"],
    chains: CHAINS,
};

/// Antiochian Archdiocese: one detail page per parish, discovered through
/// the XML sitemap. Falls back to the listing pages when the sitemap yields
/// nothing.
pub struct AntiochianScraper {
    fetcher: Fetcher,
    base_url: String,
    max_pages: usize,
}

impl AntiochianScraper {
    pub fn new(fetcher: Fetcher, base_url: &str, max_pages: usize) -> Self {
        AntiochianScraper {
            fetcher,
            base_url: base_url.trim_end_matches('/').to_string(),
            max_pages,
        }
    }
}

#[async_trait]
impl Scraper for AntiochianScraper {
    fn jurisdiction(&self) -> &str {
        jurisdictions::ANTIOCHIAN
    }

    async fn scrape(&self) -> Result<Vec<ChurchRecord>, ScrapeError> {
        let mut crawl = Crawl::new(&self.fetcher, jurisdictions::ANTIOCHIAN);

        let sitemap_url = format!("{}/sitemap.xml", self.base_url);
        let mut pages = match sitemap::discover(&self.fetcher, &sitemap_url, &PARISH_PAGE).await {
            Ok(pages) => pages,
            Err(e) => {
                warn!(url = %sitemap_url, "Sitemap discovery failed: {:#}", e);
                Vec::new()
            }
        };
        if pages.len() > self.max_pages {
            info!(found = pages.len(), cap = self.max_pages, "Capping parish detail pages");
            pages.truncate(self.max_pages);
        }

        for url in &pages {
            if let Some(html) = crawl.fetch(url).await {
                let record = parser::extract_detail(&html, url, &DETAIL);
                crawl.add(url, record.into_iter().collect());
            }
        }

        if crawl.record_count() == 0 {
            for path in LISTING_PATHS {
                let url = format!("{}{}", self.base_url, path);
                if let Some(html) = crawl.fetch(&url).await {
                    let listing = parser::extract_listing(&html, &url, &LISTING);
                    crawl.add(&url, listing.records);
                }
            }
        }

        crawl.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scrapers::test_support::{fetcher, fixture};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn scrapes_detail_pages_from_sitemap() {
        let server = MockServer::start().await;
        let base = server.uri();
        Mock::given(method("GET"))
            .and(path("/sitemap.xml"))
            .respond_with(ResponseTemplate::new(200).set_body_string(format!(
                "<urlset>\
                 <url><loc>{base}/parish/st-george-cathedral</loc></url>\
                 <url><loc>{base}/parish/st-michael</loc></url>\
                 <url><loc>{base}/news/2024/lenten-retreat</loc></url>\
                 </urlset>"
            )))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/parish/st-george-cathedral"))
            .respond_with(ResponseTemplate::new(200).set_body_string(fixture("antiochian_parish")))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/parish/st-michael"))
            .respond_with(ResponseTemplate::new(200).set_body_string(fixture("antiochian_parish")))
            .mount(&server)
            .await;

        // Capped to one detail page.
        let scraper = AntiochianScraper::new(fetcher(), &base, 1);
        let records = scraper.scrape().await.unwrap();
        assert_eq!(records.len(), 1);

        let george = &records[0];
        assert_eq!(george.name, "St. George Cathedral");
        assert_eq!(george.jurisdiction, jurisdictions::ANTIOCHIAN);
        assert_eq!(george.parish_priest.as_deref(), Some("Fr. Michael Nasser"));
        assert_eq!(george.contact_phone.as_deref(), Some("(412) 555-0188"));
        assert_eq!(george.establishment_year, Some(1910));
        assert_eq!(george.languages.as_deref(), Some("English, Arabic"));
        assert_eq!(george.instagram_url.as_deref(), Some("https://instagram.com/stgeorgepgh"));
        assert_eq!(
            george.source_url,
            Some(format!("{base}/parish/st-george-cathedral"))
        );
    }

    #[tokio::test]
    async fn listing_pages_when_sitemap_is_missing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/parishes"))
            .respond_with(ResponseTemplate::new(200).set_body_string(fixture("plain_text")))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let scraper = AntiochianScraper::new(fetcher(), &server.uri(), 10);
        let records = scraper.scrape().await.unwrap();
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.jurisdiction == jurisdictions::ANTIOCHIAN));
    }
}
