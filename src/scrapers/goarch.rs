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

pub const BASE_URL: &str = "https://www.goarch.org";

const LOCATOR_PATH: &str = "/chapel/locator";
const DIRECTORY_PATHS: &[&str] = &["/parishes", "/directory"];
const KNOWN_METROPOLISES: &[&str] = &[
    "boston",
    "chicago",
    "denver",
    "detroit",
    "new-jersey",
    "pittsburgh",
    "san-francisco",
    "atlanta",
];

static METROPOLIS_LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)/metropolis(?:es)?/([a-z-]+)").unwrap());

const CHAINS: FieldChains = FieldChains {
    name: &[
        Strategy::Text(".parish-name, .church-name, .name, .title"),
        Strategy::Text("h2, h3, h4, .listing-title"),
        Strategy::Text("strong, b, a"),
        Strategy::FirstLine,
    ],
    address: &[
        Strategy::Text(".street-address, .location-address"),
        Strategy::Pattern(Pattern::Street),
        Strategy::Text(".address, .parish-address"),
    ],
    city: &[
        Strategy::Text(".city, .locality, .parish-city"),
        Strategy::OwnAttr("data-city"),
        Strategy::Pattern(Pattern::City),
    ],
    state: &[
        Strategy::Text(".state, .region, .parish-state"),
        Strategy::OwnAttr("data-state"),
        Strategy::Pattern(Pattern::State),
    ],
    zip_code: &[
        Strategy::Text(".zip, .postal-code, .zip-code"),
        Strategy::OwnAttr("data-zip"),
        Strategy::Pattern(Pattern::Zip),
    ],
    website: &[
        Strategy::Attr(".website a, .parish-website a, a.external-link", "href"),
        Strategy::ExternalLink,
    ],
    clergy: &[
        Strategy::Text(".clergy, .priest, .pastor, .contact-clergy, .parish-priest"),
        Strategy::Pattern(Pattern::Clergy),
    ],
    parish_priest: &[Strategy::Text(".parish-priest, .priest")],
    phone: &[
        Strategy::Tel,
        Strategy::Text(".phone, .telephone, .contact-phone, .parish-phone"),
        Strategy::Pattern(Pattern::Phone),
    ],
    email: &[
        Strategy::Mailto,
        Strategy::Text(".email, .contact-email, .parish-email"),
        Strategy::Pattern(Pattern::Email),
    ],
    diocese: &[
        Strategy::Text(".metropolis, .diocese"),
        Strategy::OwnAttr("data-metropolis"),
        Strategy::Pattern(Pattern::Diocese),
    ],
    ..FieldChains::GENERIC
};

const LOCATOR: ListingProfile = ListingProfile {
    containers: &[
        ".parish-item",
        ".church-item",
        ".locator-result",
        ".parish-listing .parish",
        ".church-listing .church",
        ".listing-item",
    ],
    chains: CHAINS,
};

const METROPOLIS: ListingProfile = ListingProfile {
    containers: &[".parish", ".church", ".parish-listing"],
    chains: CHAINS,
};

const DIRECTORY: ListingProfile = ListingProfile {
    containers: &[".parish-directory .parish", ".church-directory .church", ".listing .item"],
    chains: CHAINS,
};

/// Greek Orthodox Archdiocese: the parish locator, every metropolis page,
/// then the static directory pages.
pub struct GoarchScraper {
    fetcher: Fetcher,
    base_url: String,
    max_pages: usize,
}

impl GoarchScraper {
    pub fn new(fetcher: Fetcher, base_url: &str, max_pages: usize) -> Self {
        GoarchScraper {
            fetcher,
            base_url: base_url.trim_end_matches('/').to_string(),
            max_pages,
        }
    }

    /// Metropolis pages linked from the index, or the known list when the
    /// index is unreachable or links none.
    async fn metropolis_urls(&self, crawl: &mut Crawl<'_>) -> Vec<String> {
        let index = format!("{}/metropolises", self.base_url);
        let mut urls: Vec<String> = match crawl.fetch(&index).await {
            Some(html) => parser::find_links(&html, &index, &METROPOLIS_LINK)
                .into_iter()
                .filter(|u| u.starts_with(&self.base_url) && *u != index)
                .collect(),
            None => Vec::new(),
        };
        if urls.is_empty() {
            warn!("No metropolis links discovered, using the known metropolis list");
            urls = KNOWN_METROPOLISES
                .iter()
                .flat_map(|m| {
                    [
                        format!("{}/metropolis/{}", self.base_url, m),
                        format!("{}/metropolis/{}/parishes", self.base_url, m),
                    ]
                })
                .collect();
        }
        urls.truncate(self.max_pages);
        urls
    }
}

/// "Metropolis of New Jersey" from `/metropolis/new-jersey/parishes`.
fn metropolis_name(url: &str) -> Option<String> {
    let slug = METROPOLIS_LINK.captures(url)?.get(1)?.as_str();
    let words: Vec<String> = slug
        .split('-')
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect();
    (!words.is_empty()).then(|| format!("Metropolis of {}", words.join(" ")))
}

#[async_trait]
impl Scraper for GoarchScraper {
    fn jurisdiction(&self) -> &str {
        jurisdictions::GOARCH
    }

    async fn scrape(&self) -> Result<Vec<ChurchRecord>, ScrapeError> {
        let mut crawl = Crawl::new(&self.fetcher, jurisdictions::GOARCH);

        let locator = format!("{}{}", self.base_url, LOCATOR_PATH);
        if let Some(html) = crawl.fetch(&locator).await {
            let listing = parser::extract_listing(&html, &locator, &LOCATOR);
            info!(count = listing.records.len(), layer = ?listing.layer, "GOARCH locator parsed");
            crawl.add(&locator, listing.records);
        }

        for url in self.metropolis_urls(&mut crawl).await {
            if let Some(html) = crawl.fetch(&url).await {
                let metropolis = metropolis_name(&url);
                let mut records = parser::extract_listing(&html, &url, &METROPOLIS).records;
                for rec in &mut records {
                    if rec.diocese.is_none() {
                        rec.diocese = metropolis.clone();
                    }
                }
                crawl.add(&url, records);
            }
        }

        for path in DIRECTORY_PATHS {
            let url = format!("{}{}", self.base_url, path);
            if let Some(html) = crawl.fetch(&url).await {
                let listing = parser::extract_listing(&html, &url, &DIRECTORY);
                crawl.add(&url, listing.records);
            }
        }

        crawl.finish()
    }
}
