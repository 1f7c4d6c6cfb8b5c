use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::concurrency::Batching;
use crate::dedup::NameMetric;

const DEFAULT_CONFIG_FILE: &str = "churchdir.toml";
const ENV_PREFIX: &str = "CHURCHDIR";

/// Run configuration. Every field has a default, so an empty config file,
/// no file at all, or a partial set of environment variables all work.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunOptions {
    pub output_dir: PathBuf,
    pub log_level: String,
    pub log_file: Option<PathBuf>,
    pub max_concurrent_scrapers: usize,
    pub validate_urls: bool,
    pub enable_duplicate_detection: bool,
    pub save_to_database: bool,
    pub batching: Batching,
    pub database: DatabaseConfig,
    pub http: HttpConfig,
    pub url_check: UrlCheckConfig,
    pub validation: ValidationConfig,
    pub dedup: DedupConfig,
    pub scrapers: ScraperConfig,
}

impl Default for RunOptions {
    fn default() -> Self {
        RunOptions {
            output_dir: PathBuf::from("data/churches"),
            log_level: "info".into(),
            log_file: None,
            max_concurrent_scrapers: 3,
            validate_urls: true,
            enable_duplicate_detection: true,
            save_to_database: true,
            batching: Batching::Waves,
            database: DatabaseConfig::default(),
            http: HttpConfig::default(),
            url_check: UrlCheckConfig::default(),
            validation: ValidationConfig::default(),
            dedup: DedupConfig::default(),
            scrapers: ScraperConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        DatabaseConfig {
            path: PathBuf::from("data/churches.sqlite"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub user_agent: String,
    pub timeout_secs: u64,
    pub retries: u32,
    /// Pause between consecutive directory requests to the same source.
    pub delay_ms: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        HttpConfig {
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                         (KHTML, like Gecko) Chrome/124.0 Safari/537.36"
                .into(),
            timeout_secs: 30,
            retries: 3,
            delay_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UrlCheckConfig {
    pub concurrency: usize,
    pub timeout_secs: u64,
}

impl Default for UrlCheckConfig {
    fn default() -> Self {
        UrlCheckConfig {
            concurrency: 10,
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    pub threshold: u8,
    pub concurrency: usize,
    pub analyze_websites: bool,
    pub website_timeout_secs: u64,
    /// Directory pages used as an external cross-reference. Empty disables the check.
    pub cross_reference_urls: Vec<String>,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        ValidationConfig {
            threshold: 60,
            concurrency: 5,
            analyze_websites: true,
            website_timeout_secs: 10,
            cross_reference_urls: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DedupConfig {
    pub metric: NameMetric,
    pub name_threshold: f64,
    pub address_threshold: f64,
    pub match_contacts: bool,
}

impl Default for DedupConfig {
    fn default() -> Self {
        DedupConfig {
            metric: NameMetric::Levenshtein,
            name_threshold: 0.8,
            address_threshold: 0.7,
            match_contacts: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScraperConfig {
    pub max_detail_pages: usize,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        ScraperConfig {
            max_detail_pages: 200,
        }
    }
}

impl RunOptions {
    /// Defaults, then `churchdir.toml` (or `path`), then `CHURCHDIR_*` env vars.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(p) => File::from(p.to_path_buf()).required(true),
            None => File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };
        let settings = Config::builder()
            .add_source(file)
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to read configuration")?;
        let opts: RunOptions = settings
            .try_deserialize()
            .context("Invalid configuration")?;
        Ok(opts.normalized())
    }

    /// Clamp values that would stall or disable the pipeline.
    pub fn normalized(mut self) -> Self {
        self.max_concurrent_scrapers = self.max_concurrent_scrapers.max(1);
        self.url_check.concurrency = self.url_check.concurrency.max(1);
        self.validation.concurrency = self.validation.concurrency.max(1);
        self.validation.threshold = self.validation.threshold.min(100);
        self.dedup.name_threshold = self.dedup.name_threshold.clamp(0.0, 1.0);
        self.dedup.address_threshold = self.dedup.address_threshold.clamp(0.0, 1.0);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_documented_values() {
        let o = RunOptions::default();
        assert_eq!(o.max_concurrent_scrapers, 3);
        assert!(o.validate_urls && o.enable_duplicate_detection && o.save_to_database);
        assert_eq!(o.url_check.concurrency, 10);
        assert_eq!(o.validation.threshold, 60);
        assert_eq!(o.batching, Batching::Waves);
    }

    #[test]
    fn file_overrides_defaults() {
        let mut f = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            f,
            "max_concurrent_scrapers = 0\nvalidate_urls = false\n[validation]\nthreshold = 75\n[dedup]\nmetric = \"jaro_winkler\""
        )
        .unwrap();
        let o = RunOptions::load(Some(f.path())).unwrap();
        assert_eq!(o.max_concurrent_scrapers, 1);
        assert!(!o.validate_urls);
        assert_eq!(o.validation.threshold, 75);
        assert_eq!(o.validation.concurrency, 5);
        assert_eq!(o.dedup.metric, NameMetric::JaroWinkler);
    }
}
