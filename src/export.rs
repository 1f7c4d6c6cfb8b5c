use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{error, info};

use crate::model::{ChurchRecord, ErrorEntry, ErrorKind, RunStats};
use crate::validator::report::ValidationReport;

pub const CHURCHES_JSON: &str = "churches.json";
pub const STATISTICS_JSON: &str = "statistics.json";
pub const ERRORS_JSON: &str = "errors.json";
pub const CHURCHES_CSV: &str = "churches.csv";
pub const VALIDATION_REPORT_JSON: &str = "validation-report.json";

pub const CSV_COLUMNS: [&str; 30] = [
    "name",
    "jurisdiction",
    "website",
    "website_validated",
    "contact_email",
    "contact_phone",
    "address",
    "city",
    "state",
    "zip_code",
    "parish_priest",
    "clergy_contact",
    "dean",
    "establishment_year",
    "patron_saint",
    "feast_day",
    "diocese",
    "deanery",
    "parish_size",
    "services_schedule",
    "languages",
    "facebook_url",
    "instagram_url",
    "youtube_url",
    "data_quality_score",
    "source_url",
    "scraper_version",
    "is_validated",
    "validation_score",
    "validation_date",
];

fn csv_row(r: &ChurchRecord) -> [String; 30] {
    let opt = |v: &Option<String>| v.clone().unwrap_or_default();
    [
        r.name.clone(),
        r.jurisdiction.clone(),
        opt(&r.website),
        r.website_validated.to_string(),
        opt(&r.contact_email),
        opt(&r.contact_phone),
        opt(&r.address),
        opt(&r.city),
        opt(&r.state),
        opt(&r.zip_code),
        opt(&r.parish_priest),
        opt(&r.clergy_contact),
        opt(&r.dean),
        r.establishment_year.map(|y| y.to_string()).unwrap_or_default(),
        opt(&r.patron_saint),
        opt(&r.feast_day),
        opt(&r.diocese),
        opt(&r.deanery),
        opt(&r.parish_size),
        opt(&r.services_schedule),
        opt(&r.languages),
        opt(&r.facebook_url),
        opt(&r.instagram_url),
        opt(&r.youtube_url),
        r.data_quality_score.to_string(),
        opt(&r.source_url),
        opt(&r.scraper_version),
        r.is_validated.to_string(),
        r.validation_score.to_string(),
        r.validation_date.map(|d| d.to_rfc3339()).unwrap_or_default(),
    ]
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let body = serde_json::to_string_pretty(value)
        .with_context(|| format!("Failed to serialize {}", path.display()))?;
    fs::write(path, body).with_context(|| format!("Failed to write {}", path.display()))
}

pub fn write_csv(path: &Path, churches: &[ChurchRecord]) -> Result<()> {
    let mut w = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    w.write_record(CSV_COLUMNS)?;
    for r in churches {
        w.write_record(csv_row(r))?;
    }
    w.flush()
        .with_context(|| format!("Failed to flush {}", path.display()))?;
    Ok(())
}

/// Run artifacts for one output directory.
pub struct Exports<'a> {
    pub churches: &'a [ChurchRecord],
    pub statistics: &'a RunStats,
    pub report: &'a ValidationReport,
}

impl Exports<'_> {
    /// Write every artifact except the error ledger. A failed file is
    /// recorded in `errors` and the rest are still attempted. Returns the
    /// files written.
    pub fn write_all(&self, dir: &Path, errors: &mut Vec<ErrorEntry>) -> Vec<PathBuf> {
        let mut written = Vec::new();
        let attempts: [(&str, Box<dyn Fn(&Path) -> Result<()> + '_>); 4] = [
            (CHURCHES_JSON, Box::new(|p| write_json(p, self.churches))),
            (STATISTICS_JSON, Box::new(|p| write_json(p, self.statistics))),
            (CHURCHES_CSV, Box::new(|p| write_csv(p, self.churches))),
            (VALIDATION_REPORT_JSON, Box::new(|p| write_json(p, self.report))),
        ];
        for (name, write) in attempts {
            let path = dir.join(name);
            match write(&path) {
                Ok(()) => written.push(path),
                Err(e) => {
                    error!(file = name, "Export failed: {:#}", e);
                    errors.push(ErrorEntry::new(ErrorKind::Export, format!("{:#}", e)));
                }
            }
        }

        info!(
            dir = %dir.display(),
            files = written.len(),
            churches = self.churches.len(),
            "Exports written"
        );
        written
    }
}

/// Write `errors.json`. Call it after every other step that can append to
/// the ledger; a failure here is appended but cannot be exported.
pub fn write_errors(dir: &Path, errors: &mut Vec<ErrorEntry>) -> Option<PathBuf> {
    let path = dir.join(ERRORS_JSON);
    match write_json(&path, errors.as_slice()) {
        Ok(()) => Some(path),
        Err(e) => {
            error!(file = ERRORS_JSON, "Export failed: {:#}", e);
            errors.push(ErrorEntry::new(ErrorKind::Export, format!("{:#}", e)));
            None
        }
    }
}
