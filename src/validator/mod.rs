pub mod crossref;
pub mod report;
pub mod rules;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{Datelike, Utc};
use tracing::{debug, error, info, warn};
use url::Url;

use crate::concurrency::{progress_bar, Bounded, TaskError};
use crate::config::{HttpConfig, ValidationConfig};
use crate::model::{ChurchRecord, ErrorEntry, ErrorKind};
use crossref::CrossReference;
use rules::flags;

const PENALTY_PER_FLAG: u32 = 5;

/// Outcome of assessing one record.
#[derive(Debug, Clone, PartialEq)]
pub struct Assessment {
    pub score: u8,
    pub flags: Vec<String>,
}

#[derive(Default)]
struct Scorecard {
    points: u32,
    flags: Vec<String>,
}

impl Scorecard {
    fn add(&mut self, points: u32) {
        self.points += points;
    }

    fn flag(&mut self, flag: &str) {
        if !self.flags.iter().any(|f| f == flag) {
            self.flags.push(flag.to_string());
        }
    }

    fn finish(self) -> Assessment {
        let penalty = PENALTY_PER_FLAG * self.flags.len() as u32;
        let score = self.points.min(100).saturating_sub(penalty);
        Assessment {
            score: score as u8,
            flags: self.flags,
        }
    }
}

/// Multi-layer record scoring: required fields, formats, website content,
/// optional cross-reference, consistency and authenticity.
pub struct IntelligentValidator {
    client: reqwest::Client,
    threshold: u8,
    analyze_websites: bool,
    cross_reference: Option<Arc<dyn CrossReference>>,
    current_year: i32,
}

impl IntelligentValidator {
    pub fn new(cfg: &ValidationConfig, http: &HttpConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(http.user_agent.clone())
            .timeout(Duration::from_secs(cfg.website_timeout_secs))
            .build()
            .context("Failed to build website analysis client")?;
        Ok(IntelligentValidator {
            client,
            threshold: cfg.threshold,
            analyze_websites: cfg.analyze_websites,
            cross_reference: None,
            current_year: Utc::now().year(),
        })
    }

    pub fn with_cross_reference(mut self, xref: Arc<dyn CrossReference>) -> Self {
        self.cross_reference = Some(xref);
        self
    }

    pub async fn assess(&self, rec: &ChurchRecord) -> Assessment {
        let mut card = Scorecard::default();
        self.check_required(rec, &mut card);
        self.check_formats(rec, &mut card);
        if self.analyze_websites {
            self.check_website(rec, &mut card).await;
        }
        self.check_cross_reference(rec, &mut card).await;
        check_consistency(rec, &mut card);
        card.finish()
    }

    fn check_required(&self, rec: &ChurchRecord, card: &mut Scorecard) {
        if rec.name.trim().is_empty() {
            card.flag(flags::MISSING_NAME);
        } else {
            card.add(20);
        }
        if rec.jurisdiction.trim().is_empty() {
            card.flag(flags::MISSING_JURISDICTION);
        } else {
            card.add(20);
        }

        let location = [&rec.city, &rec.state, &rec.address]
            .iter()
            .filter(|f| f.as_deref().is_some_and(|s| !s.trim().is_empty()))
            .count();
        if location == 0 {
            card.flag(flags::MISSING_LOCATION);
        }
        card.add(5 * location as u32);
    }

    fn check_formats(&self, rec: &ChurchRecord, card: &mut Scorecard) {
        let checks: [(Option<&str>, fn(&str) -> bool, u32, &str); 4] = [
            (rec.contact_email.as_deref(), rules::valid_email, 10, flags::INVALID_EMAIL),
            (rec.contact_phone.as_deref(), rules::valid_phone, 10, flags::INVALID_PHONE),
            (rec.zip_code.as_deref(), rules::valid_zip, 5, flags::INVALID_ZIP),
            (rec.state.as_deref(), rules::valid_state, 5, flags::INVALID_STATE),
        ];
        for (value, valid, points, flag) in checks {
            match value {
                Some(v) if valid(v) => card.add(points),
                Some(_) => card.flag(flag),
                None => {}
            }
        }

        if let Some(year) = rec.establishment_year {
            if (rules::MIN_YEAR..=self.current_year).contains(&year) {
                card.add(5);
            } else {
                card.flag(flags::INVALID_YEAR);
            }
        }
    }

    async fn check_website(&self, rec: &ChurchRecord, card: &mut Scorecard) {
        let Some(website) = rec.website.as_deref() else {
            return;
        };
        let Ok(url) = Url::parse(website) else {
            return;
        };
        if url.host_str().is_some_and(rules::valid_tld) {
            card.add(5);
        }

        // Unreachable sites only cost confidence, never a flag.
        let body = match self.client.get(url.as_str()).send().await {
            Ok(resp) if resp.status() == reqwest::StatusCode::OK => resp.text().await.ok(),
            Ok(resp) => {
                debug!(url = %url, status = %resp.status(), "Website analysis skipped");
                None
            }
            Err(e) => {
                debug!(url = %url, "Website analysis skipped: {}", e);
                None
            }
        };
        let Some(body) = body else {
            return;
        };
        card.add(15);

        match rules::keyword_hits(&visible_text(&body)) {
            0 => card.flag(flags::WEBSITE_LACKS_KEYWORDS),
            1..=2 => card.add(5),
            _ => card.add(10),
        }
    }

    async fn check_cross_reference(&self, rec: &ChurchRecord, card: &mut Scorecard) {
        let Some(xref) = &self.cross_reference else {
            return;
        };
        match xref.is_listed(rec).await {
            Ok(true) => card.add(15),
            Ok(false) => card.flag(flags::NO_EXTERNAL_REFERENCES),
            Err(e) => debug!(name = %rec.name, "Cross-reference skipped: {:#}", e),
        }
    }

    /// Assess every record under `bounded` and write the results back in
    /// place. A panicking assessment is logged, stops the phase, and the
    /// remaining records keep their current score.
    pub async fn validate(
        self: Arc<Self>,
        records: &mut [ChurchRecord],
        bounded: Bounded,
    ) -> Vec<ErrorEntry> {
        let threshold = self.threshold;
        info!(count = records.len(), "Validating church records");

        let pb = progress_bar(records.len());
        let task_pb = pb.clone();
        let results = bounded
            .run(records.to_vec(), move |rec| {
                let validator = Arc::clone(&self);
                let pb = task_pb.clone();
                async move {
                    let assessment = validator.assess(&rec).await;
                    pb.inc(1);
                    assessment
                }
            })
            .await;
        pb.finish_and_clear();

        let now = Utc::now();
        let mut errors = Vec::new();
        let mut skipped = 0;
        for (rec, res) in records.iter_mut().zip(results) {
            match res {
                Ok(a) => {
                    rec.validation_score = a.score;
                    rec.validation_flags = a.flags;
                    rec.validation_date = Some(now);
                }
                Err(TaskError::Panicked(msg)) => {
                    error!(name = %rec.name, "Intelligent validation failed: {}", msg);
                    let mut entry = ErrorEntry::new(ErrorKind::IntelligentValidation, msg)
                        .for_jurisdiction(&rec.jurisdiction);
                    entry.url = rec.source_url.clone();
                    errors.push(entry);
                }
                Err(TaskError::Skipped) => skipped += 1,
            }
            rec.is_validated = rec.validation_score >= threshold;
        }
        if skipped > 0 {
            warn!(skipped, "Validation phase stopped early");
        }

        let valid = records.iter().filter(|r| r.is_validated).count();
        info!(valid, total = records.len(), "Validation complete");
        errors
    }
}

fn check_consistency(rec: &ChurchRecord, card: &mut Scorecard) {
    if let (Some(zip), Some(state)) = (rec.zip_code.as_deref(), rec.state.as_deref()) {
        if rules::valid_zip(zip) && rules::valid_state(state) {
            if let Some(expected) = rules::state_for_zip(zip) {
                if expected != state {
                    card.flag(flags::ZIP_STATE_MISMATCH);
                }
            }
        }
    }

    if rules::known_jurisdiction(&rec.jurisdiction) {
        card.add(20);
    } else {
        card.flag(flags::UNCLEAR_JURISDICTION);
    }

    let name = rec.name.to_lowercase();
    if rules::NAME_TERMS.iter().any(|t| name.contains(t)) {
        card.add(10);
    }

    if rules::is_suspicious(&rec.searchable_text()) {
        card.flag(flags::SUSPICIOUS_CONTENT);
    }

    let contacts = [&rec.website, &rec.contact_email, &rec.contact_phone]
        .iter()
        .filter(|c| c.is_some())
        .count();
    match contacts {
        0 => card.flag(flags::NO_CONTACT_METHODS),
        2.. => card.add(5),
        _ => {}
    }
}

fn visible_text(html: &str) -> String {
    let doc = scraper::Html::parse_document(html);
    doc.root_element()
        .text()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}
