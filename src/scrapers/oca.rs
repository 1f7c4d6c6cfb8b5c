use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use tracing::info;

use super::{jurisdictions, Crawl, Scraper};
use crate::error::ScrapeError;
use crate::fetch::Fetcher;
use crate::model::ChurchRecord;
use crate::parser::fields::{FieldChains, Pattern, Strategy};
use crate::parser::{self, ListingProfile};

pub const BASE_URL: &str = "https://www.oca.org";

const DIRECTORY_PATHS: &[&str] = &["/parishes/search", "/parishes/directory"];

static REGIONAL_LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)/(?:dioceses?|states?|parishes)/[^?#]+").unwrap());

const CHAINS: FieldChains = FieldChains {
    name: &[
        Strategy::Text(".parish-name, .church-name"),
        Strategy::Text("h3, h4, .title, .name"),
        Strategy::Text("strong, b, a"),
        Strategy::FirstLine,
    ],
    address: &[
        Strategy::Text(".street-address, .parish-address"),
        Strategy::Pattern(Pattern::Street),
        Strategy::Text(".address, .location"),
    ],
    city: &[
        Strategy::Text(".city, .parish-city, .locality"),
        Strategy::OwnAttr("data-city"),
        Strategy::Pattern(Pattern::City),
    ],
    state: &[
        Strategy::Text(".state, .parish-state, .region"),
        Strategy::OwnAttr("data-state"),
        Strategy::Pattern(Pattern::State),
    ],
    clergy: &[
        Strategy::Text(".clergy, .pastor, .priest, .rector, .contact-person"),
        Strategy::Pattern(Pattern::Clergy),
    ],
    email: &[
        Strategy::Mailto,
        Strategy::Text(".email, .contact-email"),
        Strategy::Pattern(Pattern::Email),
    ],
    services: &[
        Strategy::Text(".service-times, .schedule"),
        Strategy::Pattern(Pattern::Services),
    ],
    ..FieldChains::GENERIC
};

const DIRECTORY: ListingProfile = ListingProfile {
    containers: &[
        ".parish-listing .parish-item",
        ".parish-search-results .parish",
        ".parish-directory .parish",
        ".parish-list .parish",
        ".church-listing .church",
    ],
    chains: CHAINS,
};

const REGIONAL: ListingProfile = ListingProfile {
    containers: &[".parish", ".church", ".listing"],
    chains: CHAINS,
};

/// Orthodox Church in America: the parish search pages, then every
/// diocese/state directory linked from the home page.
pub struct OcaScraper {
    fetcher: Fetcher,
    base_url: String,
    max_pages: usize,
}

impl OcaScraper {
    pub fn new(fetcher: Fetcher, base_url: &str, max_pages: usize) -> Self {
        OcaScraper {
            fetcher,
            base_url: base_url.trim_end_matches('/').to_string(),
            max_pages,
        }
    }

    fn directory_urls(&self) -> Vec<String> {
        DIRECTORY_PATHS
            .iter()
            .map(|p| format!("{}{}", self.base_url, p))
            .collect()
    }

    async fn regional_urls(&self, crawl: &mut Crawl<'_>) -> Vec<String> {
        let Some(home) = crawl.fetch(&format!("{}/", self.base_url)).await else {
            return Vec::new();
        };
        let primary = self.directory_urls();
        let mut urls: Vec<String> = parser::find_links(&home, &self.base_url, &REGIONAL_LINK)
            .into_iter()
            .filter(|u| u.starts_with(&self.base_url) && !primary.contains(u))
            .collect();
        urls.truncate(self.max_pages);
        urls
    }
}

#[async_trait]
impl Scraper for OcaScraper {
    fn jurisdiction(&self) -> &str {
        jurisdictions::OCA
    }

    async fn scrape(&self) -> Result<Vec<ChurchRecord>, ScrapeError> {
        let mut crawl = Crawl::new(&self.fetcher, jurisdictions::OCA);

        for url in self.directory_urls() {
            if let Some(html) = crawl.fetch(&url).await {
                let listing = parser::extract_listing(&html, &url, &DIRECTORY);
                crawl.add(&url, listing.records);
            }
        }
        let primary = crawl.record_count();

        let regional = self.regional_urls(&mut crawl).await;
        info!(pages = regional.len(), "OCA regional directories");
        for url in regional {
            if let Some(html) = crawl.fetch(&url).await {
                let listing = parser::extract_listing(&html, &url, &REGIONAL);
                crawl.add(&url, listing.records);
            }
        }
        info!(
            primary,
            secondary = crawl.record_count() - primary,
            "OCA extraction complete"
        );

        crawl.finish()
    }
}
