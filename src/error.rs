use std::path::PathBuf;

use thiserror::Error;

use crate::db::StoreError;

/// Failure inside one source scraper. Recorded in the error ledger against
/// the jurisdiction; never aborts the run.
#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("failed to fetch {url}: {source}")]
    Fetch {
        url: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("{0}")]
    Other(String),
}

/// Errors that end a run before any records are collected.
#[derive(Debug, Error)]
pub enum FatalError {
    #[error("cannot create output directory {path}: {source}")]
    OutputDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot initialise store: {0}")]
    StoreInit(#[source] StoreError),
    #[error("cannot start scraping session: {0}")]
    Session(#[source] StoreError),
}
