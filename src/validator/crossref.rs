use anyhow::{bail, Result};
use async_trait::async_trait;
use tokio::sync::OnceCell;
use tracing::{info, warn};

use crate::dedup::normalize_name;
use crate::fetch::Fetcher;
use crate::model::ChurchRecord;

/// External directory lookup used as one validation layer. `Err` means the
/// source could not be consulted and the layer is skipped for the record.
#[async_trait]
pub trait CrossReference: Send + Sync {
    async fn is_listed(&self, record: &ChurchRecord) -> Result<bool>;
}

/// Loads a fixed set of directory pages once per run and looks for the
/// normalized parish name in their text.
pub struct DirectoryCrossReference {
    fetcher: Fetcher,
    urls: Vec<String>,
    corpus: OnceCell<Option<String>>,
}

impl DirectoryCrossReference {
    pub fn new(fetcher: Fetcher, urls: Vec<String>) -> Self {
        DirectoryCrossReference {
            fetcher,
            urls,
            corpus: OnceCell::new(),
        }
    }

    async fn load(&self) -> Option<String> {
        let mut corpus = String::new();
        for url in &self.urls {
            match self.fetcher.get_html(url).await {
                Ok(html) => {
                    corpus.push_str(&page_text(&html));
                    corpus.push(' ');
                }
                Err(e) => warn!(url = %url, "Cross-reference page unavailable: {:#}", e),
            }
        }
        if corpus.is_empty() {
            return None;
        }
        info!(pages = self.urls.len(), "Cross-reference corpus loaded");
        Some(normalize_name(&corpus))
    }
}

#[async_trait]
impl CrossReference for DirectoryCrossReference {
    async fn is_listed(&self, record: &ChurchRecord) -> Result<bool> {
        let corpus = self.corpus.get_or_init(|| self.load()).await;
        let Some(corpus) = corpus else {
            bail!("no cross-reference directory could be loaded");
        };
        let needle = normalize_name(&record.name);
        if needle.is_empty() {
            return Ok(false);
        }
        Ok(corpus.contains(&needle))
    }
}

fn page_text(html: &str) -> String {
    let doc = scraper::Html::parse_document(html);
    doc.root_element().text().collect::<Vec<_>>().join(" ")
}
