pub mod cleaner;
pub mod concurrency;
pub mod config;
pub mod db;
pub mod dedup;
pub mod error;
pub mod export;
pub mod fetch;
pub mod model;
pub mod parser;
pub mod pipeline;
pub mod scrapers;
pub mod sitemap;
pub mod url_check;
pub mod validator;

pub use config::RunOptions;
pub use model::{ChurchRecord, ErrorEntry, RunStats};
pub use pipeline::{DirectoryBuilder, RunFailure, RunOutcome};
