use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db::SaveOutcome;
use crate::validator::report::ValidationSummary;

pub const SCRAPER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Canonical parish record. Every scraper produces these, every later
/// phase mutates fields in place, and only the pipeline adds or removes
/// records from the working set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChurchRecord {
    pub name: String,
    pub jurisdiction: String,

    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip_code: Option<String>,

    pub website: Option<String>,
    pub website_validated: bool,
    pub contact_email: Option<String>,
    pub contact_phone: Option<String>,

    pub parish_priest: Option<String>,
    pub dean: Option<String>,
    pub clergy_contact: Option<String>,

    pub establishment_year: Option<i32>,
    pub patron_saint: Option<String>,
    pub feast_day: Option<String>,
    pub diocese: Option<String>,
    pub deanery: Option<String>,
    pub parish_size: Option<String>,
    pub languages: Option<String>,
    pub services_schedule: Option<String>,

    pub facebook_url: Option<String>,
    pub instagram_url: Option<String>,
    pub youtube_url: Option<String>,

    pub data_quality_score: u8,
    pub source_url: Option<String>,
    pub scraper_version: Option<String>,

    pub validation_score: u8,
    pub is_validated: bool,
    pub validation_flags: Vec<String>,
    pub validation_date: Option<DateTime<Utc>>,
    pub last_updated: Option<DateTime<Utc>>,
}

impl ChurchRecord {
    pub fn new(name: impl Into<String>, jurisdiction: impl Into<String>) -> Self {
        ChurchRecord {
            name: name.into(),
            jurisdiction: jurisdiction.into(),
            ..Default::default()
        }
    }

    /// Optional text fields in declaration order, paired with their column name.
    pub fn optional_fields(&self) -> [(&'static str, Option<&str>); 22] {
        [
            ("address", self.address.as_deref()),
            ("city", self.city.as_deref()),
            ("state", self.state.as_deref()),
            ("zip_code", self.zip_code.as_deref()),
            ("website", self.website.as_deref()),
            ("contact_email", self.contact_email.as_deref()),
            ("contact_phone", self.contact_phone.as_deref()),
            ("parish_priest", self.parish_priest.as_deref()),
            ("dean", self.dean.as_deref()),
            ("clergy_contact", self.clergy_contact.as_deref()),
            ("patron_saint", self.patron_saint.as_deref()),
            ("feast_day", self.feast_day.as_deref()),
            ("diocese", self.diocese.as_deref()),
            ("deanery", self.deanery.as_deref()),
            ("parish_size", self.parish_size.as_deref()),
            ("languages", self.languages.as_deref()),
            ("services_schedule", self.services_schedule.as_deref()),
            ("facebook_url", self.facebook_url.as_deref()),
            ("instagram_url", self.instagram_url.as_deref()),
            ("youtube_url", self.youtube_url.as_deref()),
            ("source_url", self.source_url.as_deref()),
            ("scraper_version", self.scraper_version.as_deref()),
        ]
    }

    /// Number of populated fields, used to pick the survivor of a duplicate group.
    pub fn populated_field_count(&self) -> usize {
        let required = [&self.name, &self.jurisdiction]
            .iter()
            .filter(|s| !s.trim().is_empty())
            .count();
        let optional = self
            .optional_fields()
            .iter()
            .filter(|(_, v)| v.is_some_and(|s| !s.trim().is_empty()))
            .count();
        required + optional + usize::from(self.establishment_year.is_some())
    }

    /// Weighted presence score of the fields a directory reader cares about most.
    pub fn compute_quality_score(&self) -> u8 {
        let present = |v: Option<&str>| v.is_some_and(|s| !s.trim().is_empty());
        let weights: [(bool, u32); 10] = [
            (!self.name.trim().is_empty(), 20),
            (!self.jurisdiction.trim().is_empty(), 20),
            (present(self.address.as_deref()), 15),
            (present(self.website.as_deref()), 10),
            (present(self.contact_email.as_deref()), 10),
            (present(self.contact_phone.as_deref()), 10),
            (present(self.clergy_contact.as_deref()), 5),
            (self.establishment_year.is_some(), 5),
            (present(self.services_schedule.as_deref()), 3),
            (present(self.languages.as_deref()), 2),
        ];
        let score: u32 = weights.iter().filter(|(hit, _)| *hit).map(|(_, w)| w).sum();
        score.min(100) as u8
    }

    /// All free-text content of the record, lower-cased, for pattern scans.
    pub fn searchable_text(&self) -> String {
        let mut parts = vec![self.name.as_str(), self.jurisdiction.as_str()];
        parts.extend(self.optional_fields().iter().filter_map(|(_, v)| *v));
        parts.join(" ").to_lowercase()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Scrape,
    IntelligentValidation,
    UrlValidation,
    DatabaseSave,
    Session,
    Export,
}

/// One entry of the run's error ledger, exported verbatim to `errors.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEntry {
    #[serde(rename = "type")]
    pub kind: ErrorKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jurisdiction: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub error: String,
    pub timestamp: DateTime<Utc>,
}

impl ErrorEntry {
    pub fn new(kind: ErrorKind, error: impl Into<String>) -> Self {
        ErrorEntry {
            kind,
            jurisdiction: None,
            url: None,
            error: error.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn for_jurisdiction(mut self, jurisdiction: &str) -> Self {
        self.jurisdiction = Some(jurisdiction.to_string());
        self
    }
}

/// Aggregated run statistics. Each phase returns its own piece; the
/// pipeline assembles them once at the end of the run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunStats {
    pub total_churches: usize,
    pub records_scraped: usize,
    pub records_dropped: usize,
    pub validated_urls: usize,
    pub duplicates_found: usize,
    pub jurisdiction_counts: BTreeMap<String, usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation_results: Option<ValidationSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<SaveOutcome>,
    pub scrape_start_time: Option<DateTime<Utc>>,
    pub scrape_end_time: Option<DateTime<Utc>>,
}

impl RunStats {
    pub fn duration_secs(&self) -> Option<f64> {
        let (start, end) = (self.scrape_start_time?, self.scrape_end_time?);
        Some((end - start).num_milliseconds() as f64 / 1000.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quality_score_weights_presence() {
        let mut r = ChurchRecord::new("Holy Trinity", "OCA");
        assert_eq!(r.compute_quality_score(), 40);
        r.address = Some("1121 N Leavitt St".into());
        r.contact_phone = Some("(773) 486-6064".into());
        assert_eq!(r.compute_quality_score(), 65);
        r.address = Some("   ".into());
        assert_eq!(r.compute_quality_score(), 50);
    }

    #[test]
    fn populated_fields_ignore_blank_values() {
        let mut r = ChurchRecord::new("Saint Nicholas", "OCA");
        r.city = Some("Chicago".into());
        r.state = Some(String::new());
        r.establishment_year = Some(1892);
        assert_eq!(r.populated_field_count(), 4);
    }

    #[test]
    fn error_entry_serializes_type_tag() {
        let e = ErrorEntry::new(ErrorKind::Scrape, "boom").for_jurisdiction("OCA");
        let v = serde_json::to_value(&e).unwrap();
        assert_eq!(v["type"], "scrape");
        assert_eq!(v["jurisdiction"], "OCA");
        assert!(v.get("url").is_none());
    }
}
