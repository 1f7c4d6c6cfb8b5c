use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::cleaner::DataCleaner;
use crate::concurrency::{Bounded, TaskError};
use crate::config::RunOptions;
use crate::db::{SqliteStore, Store};
use crate::dedup::{merge_group, DuplicateDetector, SimilarityPolicy};
use crate::error::FatalError;
use crate::export::{self, Exports};
use crate::fetch::Fetcher;
use crate::model::{ChurchRecord, ErrorEntry, ErrorKind, RunStats};
use crate::scrapers::{self, Scraper};
use crate::url_check::UrlValidator;
use crate::validator::crossref::{CrossReference, DirectoryCrossReference};
use crate::validator::report::{generate_report, ValidationReport};
use crate::validator::IntelligentValidator;

/// Result of one run. Always produced, on the fatal path too.
#[derive(Debug)]
pub struct RunOutcome {
    pub success: bool,
    pub churches: Vec<ChurchRecord>,
    pub statistics: RunStats,
    pub errors: Vec<ErrorEntry>,
    pub session_id: Option<i64>,
    pub report: ValidationReport,
}

/// A run that ended on a fatal error. Carries the partial outcome so the
/// caller can still present statistics and the error ledger.
#[derive(Debug, Error)]
#[error("{kind}")]
pub struct RunFailure {
    #[source]
    pub kind: FatalError,
    pub outcome: RunOutcome,
}

/// Owns one directory build: scrapers, the persistence gateway and the
/// optional validation collaborators.
pub struct DirectoryBuilder {
    options: RunOptions,
    scrapers: Vec<Arc<dyn Scraper>>,
    store: Option<Box<dyn Store>>,
    cross_reference: Option<Arc<dyn CrossReference>>,
    similarity: Option<Box<dyn SimilarityPolicy>>,
}

impl DirectoryBuilder {
    /// Builder with the shipped jurisdiction scrapers and, when configured,
    /// the directory cross-reference.
    pub fn new(options: RunOptions) -> anyhow::Result<Self> {
        let options = options.normalized();
        let fetcher = Fetcher::new(&options.http)?;
        let scrapers = scrapers::default_scrapers(&options, &fetcher);
        let cross_reference: Option<Arc<dyn CrossReference>> =
            if options.validation.cross_reference_urls.is_empty() {
                None
            } else {
                Some(Arc::new(DirectoryCrossReference::new(
                    fetcher,
                    options.validation.cross_reference_urls.clone(),
                )))
            };
        Ok(DirectoryBuilder {
            options,
            scrapers,
            store: None,
            cross_reference,
            similarity: None,
        })
    }

    pub fn with_scrapers(mut self, scrapers: Vec<Arc<dyn Scraper>>) -> Self {
        self.scrapers = scrapers;
        self
    }

    /// Use this store instead of opening the configured SQLite database.
    pub fn with_store(mut self, store: Box<dyn Store>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_cross_reference(mut self, xref: Arc<dyn CrossReference>) -> Self {
        self.cross_reference = Some(xref);
        self
    }

    pub fn with_similarity_policy(mut self, policy: Box<dyn SimilarityPolicy>) -> Self {
        self.similarity = Some(policy);
        self
    }

    pub fn options(&self) -> &RunOptions {
        &self.options
    }

    pub async fn run_autonomous_scraping(&mut self) -> Result<RunOutcome, RunFailure> {
        let opts = self.options.clone();
        let mut stats = RunStats {
            scrape_start_time: Some(Utc::now()),
            ..RunStats::default()
        };
        let mut errors = Vec::new();
        info!(
            scrapers = self.scrapers.len(),
            limit = opts.max_concurrent_scrapers,
            batching = ?opts.batching,
            "Starting directory build"
        );

        let session_id = match self.open_session(&opts) {
            Ok(id) => id,
            Err(kind) => return Err(self.abort(kind, None, stats, errors)),
        };
        if let Err(source) = fs::create_dir_all(&opts.output_dir) {
            let kind = FatalError::OutputDir {
                path: opts.output_dir.clone(),
                source,
            };
            return Err(self.abort(kind, session_id, stats, errors));
        }

        // Scrape
        let scraped = scrape_all(
            &self.scrapers,
            Bounded::new(opts.max_concurrent_scrapers, opts.batching),
        )
        .await;
        stats.records_scraped = scraped.records.len();
        errors.extend(scraped.errors);

        // Clean
        let cleaned = DataCleaner::default().clean(scraped.records);
        stats.records_dropped = cleaned.dropped;
        let mut churches = cleaned.records;

        // Validate
        let validator = match IntelligentValidator::new(&opts.validation, &opts.http) {
            Ok(validator) => {
                let validator = Arc::new(match &self.cross_reference {
                    Some(xref) => validator.with_cross_reference(Arc::clone(xref)),
                    None => validator,
                });
                let bounded = Bounded::new(opts.validation.concurrency, opts.batching).halting();
                errors.extend(Arc::clone(&validator).validate(&mut churches, bounded).await);
                Some(validator)
            }
            Err(e) => {
                error!("Intelligent validation unavailable: {:#}", e);
                errors.push(ErrorEntry::new(ErrorKind::IntelligentValidation, format!("{:#}", e)));
                None
            }
        };

        // URL check
        if opts.validate_urls {
            match UrlValidator::new(&opts.url_check, &opts.http) {
                Ok(checker) => {
                    let bounded = Bounded::new(opts.url_check.concurrency, opts.batching).halting();
                    let (validated, url_errors) =
                        Arc::new(checker).check_records(&mut churches, bounded).await;
                    stats.validated_urls = validated;
                    errors.extend(url_errors);
                }
                Err(e) => {
                    error!("URL validation unavailable: {:#}", e);
                    errors.push(ErrorEntry::new(ErrorKind::UrlValidation, format!("{:#}", e)));
                }
            }
        }

        // Deduplicate
        if opts.enable_duplicate_detection {
            let detector = match self.similarity.take() {
                Some(policy) => DuplicateDetector::with_policy(policy),
                None => DuplicateDetector::new(&opts.dedup),
            };
            let deduped = remove_duplicates(&detector, churches);
            churches = deduped.kept;
            stats.duplicates_found = deduped.removed;

            // Survivors that absorbed fields are scored again.
            if let (Some(validator), false) = (&validator, deduped.merged.is_empty()) {
                let mut merged: Vec<ChurchRecord> =
                    deduped.merged.iter().map(|&i| churches[i].clone()).collect();
                let bounded = Bounded::new(opts.validation.concurrency, opts.batching).halting();
                errors.extend(Arc::clone(validator).validate(&mut merged, bounded).await);
                for (i, rec) in deduped.merged.into_iter().zip(merged) {
                    churches[i] = rec;
                }
            }
        }

        stats.total_churches = churches.len();
        stats.jurisdiction_counts = jurisdiction_counts(&churches);

        // Persist
        if let (Some(store), true) = (self.store.as_mut(), session_id.is_some()) {
            match store.save_churches(&churches) {
                Ok(outcome) => stats.database = Some(outcome),
                Err(e) => {
                    error!("Failed to save churches: {}", e);
                    errors.push(ErrorEntry::new(ErrorKind::DatabaseSave, e.to_string()));
                }
            }
        }

        let report = generate_report(&churches);
        stats.validation_results = Some(report.summary.clone());
        stats.scrape_end_time = Some(Utc::now());

        // Export
        Exports {
            churches: &churches,
            statistics: &stats,
            report: &report,
        }
        .write_all(&opts.output_dir, &mut errors);

        if let (Some(store), Some(id)) = (self.store.as_mut(), session_id) {
            if let Err(e) = store.end_session(id, &stats, &errors) {
                error!(session_id = id, "Failed to close scraping session: {}", e);
                errors.push(ErrorEntry::new(ErrorKind::Session, e.to_string()));
            }
            if let Err(e) = store.close() {
                warn!("Failed to close store: {}", e);
            }
        }

        // Ledger last, so session failures are exported too.
        export::write_errors(&opts.output_dir, &mut errors);

        info!(
            churches = stats.total_churches,
            duplicates = stats.duplicates_found,
            validated_urls = stats.validated_urls,
            errors = errors.len(),
            secs = stats.duration_secs().unwrap_or_default(),
            "Directory build complete"
        );

        Ok(RunOutcome {
            success: true,
            churches,
            statistics: stats,
            errors,
            session_id,
            report,
        })
    }

    fn open_session(&mut self, opts: &RunOptions) -> Result<Option<i64>, FatalError> {
        if !opts.save_to_database {
            return Ok(None);
        }
        let store = match &mut self.store {
            Some(store) => store,
            empty => {
                let opened =
                    SqliteStore::open(&opts.database.path).map_err(FatalError::StoreInit)?;
                empty.insert(Box::new(opened))
            }
        };
        store.initialize().map_err(FatalError::StoreInit)?;
        let id = store.start_session(opts).map_err(FatalError::Session)?;
        Ok(Some(id))
    }

    /// Fatal path: mark the session failed, close the store, hand back the
    /// partial outcome.
    fn abort(
        &mut self,
        kind: FatalError,
        session_id: Option<i64>,
        mut stats: RunStats,
        errors: Vec<ErrorEntry>,
    ) -> RunFailure {
        error!("Directory build failed: {}", kind);
        if let Some(store) = self.store.as_mut() {
            if let Some(id) = session_id {
                if let Err(e) = store.fail_session(id, &kind.to_string()) {
                    warn!(session_id = id, "Could not mark session failed: {}", e);
                }
            }
            if let Err(e) = store.close() {
                warn!("Failed to close store: {}", e);
            }
        }
        stats.scrape_end_time = Some(Utc::now());
        RunFailure {
            kind,
            outcome: RunOutcome {
                success: false,
                churches: Vec::new(),
                statistics: stats,
                errors,
                session_id,
                report: ValidationReport::default(),
            },
        }
    }
}

pub struct Scraped {
    pub records: Vec<ChurchRecord>,
    pub errors: Vec<ErrorEntry>,
}

/// Run every scraper under `bounded`. A failing or panicking scraper
/// contributes no records and one ledger entry.
pub async fn scrape_all(scrapers: &[Arc<dyn Scraper>], bounded: Bounded) -> Scraped {
    let results = bounded
        .run(scrapers.to_vec(), |scraper: Arc<dyn Scraper>| async move {
            scraper.scrape().await
        })
        .await;

    let mut records = Vec::new();
    let mut errors = Vec::new();
    for (scraper, res) in scrapers.iter().zip(results) {
        let jurisdiction = scraper.jurisdiction();
        let message = match res {
            Ok(Ok(found)) => {
                info!(jurisdiction, count = found.len(), "Scraper finished");
                records.extend(found.into_iter().map(|mut r| {
                    if r.jurisdiction.trim().is_empty() {
                        r.jurisdiction = jurisdiction.to_string();
                    }
                    r
                }));
                continue;
            }
            Ok(Err(e)) => e.to_string(),
            Err(TaskError::Panicked(msg)) => format!("scraper panicked: {}", msg),
            Err(TaskError::Skipped) => "scraper skipped".to_string(),
        };
        error!(jurisdiction, "Scraper failed: {}", message);
        errors.push(ErrorEntry::new(ErrorKind::Scrape, message).for_jurisdiction(jurisdiction));
    }
    Scraped { records, errors }
}

pub struct Deduplicated {
    /// Remaining records, in input order.
    pub kept: Vec<ChurchRecord>,
    pub removed: usize,
    /// Indices into `kept` of survivors that absorbed fields from their group.
    pub merged: Vec<usize>,
}

/// Keep one survivor per duplicate group, filled from its group.
pub fn remove_duplicates(
    detector: &DuplicateDetector,
    mut records: Vec<ChurchRecord>,
) -> Deduplicated {
    let groups = detector.find_duplicates(&records);
    let mut removed = HashSet::new();
    let mut absorbed = HashSet::new();
    for group in &groups {
        if merge_group(&mut records, group) {
            absorbed.insert(group.survivor);
        }
        removed.extend(group.removed());
    }

    let mut kept = Vec::with_capacity(records.len() - removed.len());
    let mut merged = Vec::new();
    for (i, rec) in records.into_iter().enumerate() {
        if removed.contains(&i) {
            continue;
        }
        if absorbed.contains(&i) {
            merged.push(kept.len());
        }
        kept.push(rec);
    }

    let potential = detector.potential_duplicates(&kept);
    if !potential.is_empty() {
        info!(pairs = potential.len(), "Potential duplicates for manual review");
        for p in potential.iter().take(10) {
            debug!(
                first = %kept[p.first].name,
                second = %kept[p.second].name,
                similarity = p.similarity,
                "Potential duplicate"
            );
        }
    }
    Deduplicated {
        kept,
        removed: removed.len(),
        merged,
    }
}

fn jurisdiction_counts(records: &[ChurchRecord]) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for r in records {
        *counts.entry(r.jurisdiction.clone()).or_default() += 1;
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::concurrency::Batching;
    use crate::config::ValidationConfig;
    use crate::db::{SaveOutcome, StoreError};
    use crate::error::ScrapeError;
    use crate::export;
    use crate::scrapers::jurisdictions;
    use crate::validator::rules::flags;
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::time::Instant;

    #[derive(Default)]
    struct Probe {
        active: AtomicUsize,
        peak: AtomicUsize,
        starts: Mutex<Vec<Instant>>,
    }

    enum Behavior {
        Return(Vec<ChurchRecord>),
        Fail,
        Panic,
    }

    struct FakeScraper {
        jurisdiction: &'static str,
        behavior: Behavior,
        delay: Duration,
        probe: Arc<Probe>,
    }

    impl FakeScraper {
        fn returning(jurisdiction: &'static str, records: Vec<ChurchRecord>) -> Arc<dyn Scraper> {
            Arc::new(FakeScraper {
                jurisdiction,
                behavior: Behavior::Return(records),
                delay: Duration::ZERO,
                probe: Arc::default(),
            })
        }

        fn with(jurisdiction: &'static str, behavior: Behavior) -> Arc<dyn Scraper> {
            Arc::new(FakeScraper {
                jurisdiction,
                behavior,
                delay: Duration::ZERO,
                probe: Arc::default(),
            })
        }

        fn slow(probe: &Arc<Probe>, ms: u64) -> Arc<dyn Scraper> {
            Arc::new(FakeScraper {
                jurisdiction: jurisdictions::OCA,
                behavior: Behavior::Return(Vec::new()),
                delay: Duration::from_millis(ms),
                probe: Arc::clone(probe),
            })
        }
    }

    #[async_trait]
    impl Scraper for FakeScraper {
        fn jurisdiction(&self) -> &str {
            self.jurisdiction
        }

        async fn scrape(&self) -> Result<Vec<ChurchRecord>, ScrapeError> {
            let now = self.probe.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.probe.peak.fetch_max(now, Ordering::SeqCst);
            self.probe.starts.lock().unwrap().push(Instant::now());
            tokio::time::sleep(self.delay).await;
            self.probe.active.fetch_sub(1, Ordering::SeqCst);
            match &self.behavior {
                Behavior::Return(records) => Ok(records.clone()),
                Behavior::Fail => Err(ScrapeError::Other("directory offline".into())),
                Behavior::Panic => panic!("selector blew up"),
            }
        }
    }

    #[derive(Default)]
    struct MemoryState {
        saved: Vec<ChurchRecord>,
        statuses: Vec<String>,
        failure: Option<String>,
        closed: bool,
    }

    #[derive(Clone, Default)]
    struct MemoryStore {
        state: Arc<Mutex<MemoryState>>,
        refuse_sessions: bool,
        refuse_writes: bool,
    }

    impl Store for MemoryStore {
        fn initialize(&mut self) -> Result<(), StoreError> {
            Ok(())
        }

        fn start_session(&mut self, _: &RunOptions) -> Result<i64, StoreError> {
            if self.refuse_sessions {
                return Err(StoreError::Closed);
            }
            self.state.lock().unwrap().statuses.push("running".into());
            Ok(7)
        }

        fn save_churches(&mut self, records: &[ChurchRecord]) -> Result<SaveOutcome, StoreError> {
            if self.refuse_writes {
                return Err(StoreError::Closed);
            }
            self.state.lock().unwrap().saved = records.to_vec();
            Ok(SaveOutcome {
                inserted_count: records.len(),
                updated_count: 0,
            })
        }

        fn end_session(&mut self, _: i64, _: &RunStats, _: &[ErrorEntry]) -> Result<(), StoreError> {
            if self.refuse_writes {
                return Err(StoreError::UnknownSession(7));
            }
            self.state.lock().unwrap().statuses.push("completed".into());
            Ok(())
        }

        fn fail_session(&mut self, _: i64, message: &str) -> Result<(), StoreError> {
            let mut state = self.state.lock().unwrap();
            state.statuses.push("failed".into());
            state.failure = Some(message.to_string());
            Ok(())
        }

        fn close(&mut self) -> Result<(), StoreError> {
            self.state.lock().unwrap().closed = true;
            Ok(())
        }
    }

    fn options(dir: &Path) -> RunOptions {
        RunOptions {
            output_dir: dir.to_path_buf(),
            validate_urls: false,
            save_to_database: false,
            validation: ValidationConfig {
                analyze_websites: false,
                ..ValidationConfig::default()
            },
            ..RunOptions::default()
        }
    }

    fn builder(opts: RunOptions, scrapers: Vec<Arc<dyn Scraper>>) -> DirectoryBuilder {
        DirectoryBuilder::new(opts).unwrap().with_scrapers(scrapers)
    }

    fn church(name: &str, city: &str) -> ChurchRecord {
        let mut r = ChurchRecord::new(name, "");
        r.city = Some(city.into());
        r
    }

    #[tokio::test]
    async fn single_record_from_three_sources() {
        let dir = tempfile::tempdir().unwrap();
        let outcome = builder(
            options(dir.path()),
            vec![
                FakeScraper::returning(jurisdictions::OCA, vec![]),
                FakeScraper::returning(jurisdictions::GOARCH, vec![church("Holy Trinity", "Chicago")]),
                FakeScraper::returning(jurisdictions::ANTIOCHIAN, vec![]),
            ],
        )
        .run_autonomous_scraping()
        .await
        .unwrap();

        assert!(outcome.success);
        assert_eq!(outcome.churches.len(), 1);
        assert_eq!(outcome.statistics.total_churches, 1);
        assert_eq!(outcome.churches[0].jurisdiction, jurisdictions::GOARCH);
        assert_eq!(outcome.statistics.jurisdiction_counts[jurisdictions::GOARCH], 1);

        for file in [
            export::CHURCHES_JSON,
            export::STATISTICS_JSON,
            export::ERRORS_JSON,
            export::CHURCHES_CSV,
            export::VALIDATION_REPORT_JSON,
        ] {
            assert!(dir.path().join(file).exists(), "{file} missing");
        }
    }

    #[tokio::test]
    async fn duplicates_keep_the_complete_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryStore::default();
        let mut with_email = church("St. Nicholas", "Chicago");
        with_email.contact_email = Some("office@stnicholas.org".into());

        let outcome = builder(
            RunOptions {
                save_to_database: true,
                ..options(dir.path())
            },
            vec![
                FakeScraper::returning(jurisdictions::OCA, vec![church("St. Nicholas", "Chicago")]),
                FakeScraper::returning(jurisdictions::OCA, vec![with_email]),
            ],
        )
        .with_store(Box::new(store.clone()))
        .run_autonomous_scraping()
        .await
        .unwrap();

        assert_eq!(outcome.statistics.duplicates_found, 1);
        assert_eq!(outcome.churches.len(), 1);
        assert_eq!(outcome.statistics.total_churches, 1);
        assert_eq!(outcome.session_id, Some(7));

        let state = store.state.lock().unwrap();
        assert_eq!(state.saved.len(), 1);
        assert_eq!(state.saved[0].contact_email.as_deref(), Some("office@stnicholas.org"));
        assert_eq!(state.statuses, vec!["running", "completed"]);
        assert!(state.closed);
    }

    #[tokio::test]
    async fn nameless_records_are_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let outcome = builder(
            options(dir.path()),
            vec![FakeScraper::returning(
                jurisdictions::OCA,
                vec![church("", "Chicago"), church("Holy Protection", "Chicago")],
            )],
        )
        .run_autonomous_scraping()
        .await
        .unwrap();

        assert_eq!(outcome.statistics.records_scraped, 2);
        assert_eq!(outcome.statistics.records_dropped, 1);
        assert_eq!(outcome.statistics.total_churches, 1);
        let exported: Vec<ChurchRecord> = serde_json::from_str(
            &fs::read_to_string(dir.path().join(export::CHURCHES_JSON)).unwrap(),
        )
        .unwrap();
        assert_eq!(exported.len(), 1);
        assert!(exported.iter().all(|r| !r.name.is_empty()));
    }

    #[tokio::test]
    async fn unreachable_website_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut rec = church("Saint Mary", "Chicago");
        rec.website = Some("http://127.0.0.1:1/".into());

        let outcome = builder(
            RunOptions {
                validate_urls: true,
                ..options(dir.path())
            },
            vec![FakeScraper::returning(jurisdictions::OCA, vec![rec])],
        )
        .run_autonomous_scraping()
        .await
        .unwrap();

        assert!(outcome.success);
        assert!(!outcome.churches[0].website_validated);
        assert_eq!(outcome.statistics.validated_urls, 0);
        assert!(outcome.errors.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn five_scrapers_two_at_a_time_run_in_three_waves() {
        let dir = tempfile::tempdir().unwrap();
        let probe = Arc::new(Probe::default());
        let origin = Instant::now();
        let scrapers = (0..5).map(|_| FakeScraper::slow(&probe, 100)).collect();

        builder(
            RunOptions {
                max_concurrent_scrapers: 2,
                enable_duplicate_detection: false,
                ..options(dir.path())
            },
            scrapers,
        )
        .run_autonomous_scraping()
        .await
        .unwrap();

        let mut waves: Vec<u128> = probe
            .starts
            .lock()
            .unwrap()
            .iter()
            .map(|s| ((*s - origin).as_millis() + 50) / 100)
            .collect();
        waves.sort();
        waves.dedup();
        assert_eq!(waves.len(), 3);
        assert_eq!(probe.peak.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn scraper_bound_holds_in_pool_mode() {
        let probe = Arc::new(Probe::default());
        let scrapers: Vec<Arc<dyn Scraper>> =
            (0..8).map(|i| FakeScraper::slow(&probe, 20 + i * 15)).collect();
        let scraped = scrape_all(&scrapers, Bounded::new(3, Batching::Pool)).await;
        assert!(scraped.errors.is_empty());
        assert_eq!(probe.peak.load(Ordering::SeqCst), 3);
        assert_eq!(probe.starts.lock().unwrap().len(), 8);
    }

    #[tokio::test]
    async fn failing_scrapers_do_not_stop_the_run() {
        let dir = tempfile::tempdir().unwrap();
        let outcome = builder(
            options(dir.path()),
            vec![
                FakeScraper::with(jurisdictions::OCA, Behavior::Fail),
                FakeScraper::returning(jurisdictions::GOARCH, vec![church("Saint Demetrios", "Chicago")]),
                FakeScraper::with(jurisdictions::ANTIOCHIAN, Behavior::Panic),
            ],
        )
        .run_autonomous_scraping()
        .await
        .unwrap();

        assert!(outcome.success);
        assert_eq!(outcome.churches.len(), 1);
        assert_eq!(outcome.errors.len(), 2);
        assert!(outcome.errors.iter().all(|e| e.kind == ErrorKind::Scrape));
        assert_eq!(outcome.errors[0].jurisdiction.as_deref(), Some(jurisdictions::OCA));
        assert!(outcome.errors[1].error.contains("selector blew up"));

        let ledger: serde_json::Value = serde_json::from_str(
            &fs::read_to_string(dir.path().join(export::ERRORS_JSON)).unwrap(),
        )
        .unwrap();
        assert_eq!(ledger.as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn suspicious_record_is_not_validated() {
        let dir = tempfile::tempdir().unwrap();
        let rec = ChurchRecord {
            name: "Test Church".into(),
            state: Some("XX".into()),
            zip_code: Some("invalid".into()),
            contact_email: Some("invalid-email".into()),
            establishment_year: Some(1650),
            ..ChurchRecord::default()
        };
        let outcome = builder(
            options(dir.path()),
            vec![FakeScraper::returning(jurisdictions::OCA, vec![rec])],
        )
        .run_autonomous_scraping()
        .await
        .unwrap();

        let r = &outcome.churches[0];
        for flag in ["invalid_state", "invalid_zip", "invalid_email", "invalid_year"] {
            assert!(r.validation_flags.iter().any(|f| f == flag), "missing {flag}");
        }
        assert!(r.validation_score < 60);
        assert!(!r.is_validated);
        assert_eq!(outcome.report.summary.valid, 0);
    }

    #[tokio::test]
    async fn store_failures_are_exported_but_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryStore {
            refuse_writes: true,
            ..MemoryStore::default()
        };

        let outcome = builder(
            RunOptions {
                save_to_database: true,
                ..options(dir.path())
            },
            vec![FakeScraper::returning(jurisdictions::OCA, vec![church("Holy Trinity", "Chicago")])],
        )
        .with_store(Box::new(store.clone()))
        .run_autonomous_scraping()
        .await
        .unwrap();

        assert!(outcome.success);
        assert_eq!(outcome.churches.len(), 1);
        assert_eq!(outcome.statistics.database, None);
        let kinds: Vec<ErrorKind> = outcome.errors.iter().map(|e| e.kind).collect();
        assert_eq!(kinds, vec![ErrorKind::DatabaseSave, ErrorKind::Session]);

        for file in [
            export::CHURCHES_JSON,
            export::STATISTICS_JSON,
            export::CHURCHES_CSV,
            export::VALIDATION_REPORT_JSON,
        ] {
            assert!(dir.path().join(file).exists(), "{file} missing");
        }
        let ledger: Vec<serde_json::Value> = serde_json::from_str(
            &fs::read_to_string(dir.path().join(export::ERRORS_JSON)).unwrap(),
        )
        .unwrap();
        assert_eq!(ledger.len(), outcome.errors.len());
        let types: Vec<&str> = ledger.iter().map(|e| e["type"].as_str().unwrap()).collect();
        assert_eq!(types, ["database_save", "session"]);
        assert!(store.state.lock().unwrap().closed);
    }

    #[tokio::test]
    async fn merged_survivor_is_scored_again() {
        let dir = tempfile::tempdir().unwrap();
        let mut located = church("Saint Nicholas", "Chicago");
        located.address = Some("2701 W Chicago Ave".into());
        located.state = Some("IL".into());
        located.zip_code = Some("60622".into());
        let mut reachable = church("Saint Nicholas", "Chicago");
        reachable.contact_phone = Some("(773) 278-3636".into());
        reachable.contact_email = Some("office@stnicholas.org".into());

        let outcome = builder(
            options(dir.path()),
            vec![FakeScraper::returning(jurisdictions::OCA, vec![located, reachable])],
        )
        .run_autonomous_scraping()
        .await
        .unwrap();

        assert_eq!(outcome.statistics.duplicates_found, 1);
        let exported: Vec<ChurchRecord> = serde_json::from_str(
            &fs::read_to_string(dir.path().join(export::CHURCHES_JSON)).unwrap(),
        )
        .unwrap();
        assert_eq!(exported.len(), 1);

        let r = &exported[0];
        assert_eq!(r.zip_code.as_deref(), Some("60622"));
        assert_eq!(r.contact_phone.as_deref(), Some("(773) 278-3636"));
        assert!(
            !r.validation_flags.iter().any(|f| f == flags::NO_CONTACT_METHODS),
            "{:?}",
            r.validation_flags
        );
        assert_eq!(r.is_validated, r.validation_score >= 60);
    }

    #[tokio::test]
    async fn output_dir_failure_marks_session_failed() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        fs::write(&blocker, "x").unwrap();
        let store = MemoryStore::default();

        let failure = builder(
            RunOptions {
                save_to_database: true,
                ..options(&blocker.join("out"))
            },
            vec![FakeScraper::returning(jurisdictions::OCA, vec![])],
        )
        .with_store(Box::new(store.clone()))
        .run_autonomous_scraping()
        .await
        .unwrap_err();

        assert!(matches!(failure.kind, FatalError::OutputDir { .. }));
        assert!(!failure.outcome.success);
        assert_eq!(failure.outcome.session_id, Some(7));
        let state = store.state.lock().unwrap();
        assert_eq!(state.statuses, vec!["running", "failed"]);
        assert!(state.failure.as_deref().unwrap().contains("output directory"));
        assert!(state.closed);
    }

    #[tokio::test]
    async fn session_start_failure_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryStore {
            refuse_sessions: true,
            ..MemoryStore::default()
        };
        let failure = builder(
            RunOptions {
                save_to_database: true,
                ..options(dir.path())
            },
            vec![],
        )
        .with_store(Box::new(store.clone()))
        .run_autonomous_scraping()
        .await
        .unwrap_err();

        assert!(matches!(failure.kind, FatalError::Session(_)));
        assert_eq!(failure.outcome.session_id, None);
        assert!(store.state.lock().unwrap().closed);
    }

    #[tokio::test]
    async fn sqlite_store_records_the_session() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("db").join("churches.sqlite");
        let mut opts = RunOptions {
            save_to_database: true,
            ..options(&dir.path().join("out"))
        };
        opts.database.path = db_path.clone();

        let outcome = builder(
            opts,
            vec![FakeScraper::returning(jurisdictions::OCA, vec![church("Holy Trinity", "Chicago")])],
        )
        .run_autonomous_scraping()
        .await
        .unwrap();
        assert_eq!(
            outcome.statistics.database,
            Some(SaveOutcome { inserted_count: 1, updated_count: 0 })
        );

        let store = SqliteStore::open(&db_path).unwrap();
        let sessions = store.recent_sessions(5).unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].status, "completed");
        assert_eq!(store.stats().unwrap().churches, 1);
    }
}
