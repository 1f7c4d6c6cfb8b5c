use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use regex::Regex;
use tracing::{debug, info};

use crate::model::ChurchRecord;
use crate::parser::squash;
use crate::scrapers::jurisdictions;

static NAME_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(?:the\s+)?orthodox\s+church\s+(?:of\s+)?").unwrap());
static NAME_SUFFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\s+(?:(?:greek|russian|antiochian|serbian|romanian|bulgarian)\s+)?(?:orthodox\s+)?(?:church|parish|cathedral|chapel|mission)$")
        .unwrap()
});
static SAINTS_ABBR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\bSts\.?\s+").unwrap());
static SAINT_ABBR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\bSt\.?\s+").unwrap());
static STREET_TYPES: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    [
        ("Street", "St"),
        ("Avenue", "Ave"),
        ("Boulevard", "Blvd"),
        ("Drive", "Dr"),
        ("Road", "Rd"),
        ("Lane", "Ln"),
        ("Court", "Ct"),
        ("Place", "Pl"),
        ("Circle", "Cir"),
        ("Parkway", "Pkwy"),
        ("Highway", "Hwy"),
    ]
    .into_iter()
    .map(|(full, abbr)| (Regex::new(&format!(r"(?i)\b{}\b", full)).unwrap(), abbr))
    .collect()
});
static CLERGY_TITLES: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    [(r"\bFr\.\s*", "Father "), (r"\bRev\.\s*", "Reverend "), (r"\bDr\.\s*", "Doctor ")]
        .into_iter()
        .map(|(re, full)| (Regex::new(re).unwrap(), full))
        .collect()
});
static EMAIL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}").unwrap());
static ZIP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{5})(?:[-\s]?(\d{4}))?\b").unwrap());
static WEBSITE_SHAPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^https?://[^\s/]+\.[^\s]+$").unwrap());

const SMALL_WORDS: &[&str] = &["of", "the", "and", "in", "on", "at", "to", "for", "with"];

const STATES: &[(&str, &str)] = &[
    ("alabama", "AL"), ("alaska", "AK"), ("arizona", "AZ"), ("arkansas", "AR"),
    ("california", "CA"), ("colorado", "CO"), ("connecticut", "CT"), ("delaware", "DE"),
    ("district of columbia", "DC"), ("florida", "FL"), ("georgia", "GA"), ("hawaii", "HI"),
    ("idaho", "ID"), ("illinois", "IL"), ("indiana", "IN"), ("iowa", "IA"), ("kansas", "KS"),
    ("kentucky", "KY"), ("louisiana", "LA"), ("maine", "ME"), ("maryland", "MD"),
    ("massachusetts", "MA"), ("michigan", "MI"), ("minnesota", "MN"), ("mississippi", "MS"),
    ("missouri", "MO"), ("montana", "MT"), ("nebraska", "NE"), ("nevada", "NV"),
    ("new hampshire", "NH"), ("new jersey", "NJ"), ("new mexico", "NM"), ("new york", "NY"),
    ("north carolina", "NC"), ("north dakota", "ND"), ("ohio", "OH"), ("oklahoma", "OK"),
    ("oregon", "OR"), ("pennsylvania", "PA"), ("rhode island", "RI"), ("south carolina", "SC"),
    ("south dakota", "SD"), ("tennessee", "TN"), ("texas", "TX"), ("utah", "UT"),
    ("vermont", "VT"), ("virginia", "VA"), ("washington", "WA"), ("west virginia", "WV"),
    ("wisconsin", "WI"), ("wyoming", "WY"),
];

const JURISDICTION_ALIASES: &[(&str, &str)] = &[
    ("oca", jurisdictions::OCA),
    ("orthodox church in america", jurisdictions::OCA),
    ("goarch", jurisdictions::GOARCH),
    ("greek orthodox archdiocese", jurisdictions::GOARCH),
    ("greek orthodox archdiocese of america", jurisdictions::GOARCH),
    ("antiochian", jurisdictions::ANTIOCHIAN),
    ("antiochian orthodox", jurisdictions::ANTIOCHIAN),
    ("rocor", jurisdictions::ROCOR),
    ("russian orthodox church outside russia", jurisdictions::ROCOR),
    ("serbian orthodox", jurisdictions::SERBIAN),
    ("romanian orthodox", jurisdictions::ROMANIAN),
    ("bulgarian orthodox", jurisdictions::BULGARIAN),
];

#[derive(Debug)]
pub struct Cleaned {
    pub records: Vec<ChurchRecord>,
    /// Records removed because no name survived cleaning.
    pub dropped: usize,
}

/// Normalises raw records into the canonical shape. Values that cannot be
/// recognised (a ZIP of "n/a", a malformed e-mail) are kept trimmed so the
/// validator can flag them; only blank values become `None`.
#[derive(Debug, Clone)]
pub struct DataCleaner {
    now: DateTime<Utc>,
}

impl Default for DataCleaner {
    fn default() -> Self {
        Self::at(Utc::now())
    }
}

impl DataCleaner {
    /// Cleaner with a fixed clock for `last_updated`.
    pub fn at(now: DateTime<Utc>) -> Self {
        DataCleaner { now }
    }

    pub fn clean(&self, records: Vec<ChurchRecord>) -> Cleaned {
        let total = records.len();
        let records: Vec<ChurchRecord> = records
            .into_par_iter()
            .filter_map(|r| self.clean_one(r))
            .collect();
        let dropped = total - records.len();
        info!(kept = records.len(), dropped, "Cleaned records");
        Cleaned { records, dropped }
    }

    /// `None` when the record has no name left after cleaning.
    pub fn clean_one(&self, rec: ChurchRecord) -> Option<ChurchRecord> {
        let name = clean_name(&rec.name);
        if name.is_empty() {
            debug!(source = ?rec.source_url, "Dropping record without a name");
            return None;
        }

        let cleaned = ChurchRecord {
            name,
            jurisdiction: clean_jurisdiction(&rec.jurisdiction),
            address: text(rec.address).map(|a| clean_address(&a)),
            city: text(rec.city).map(|c| title_case(&c)),
            state: text(rec.state).map(|s| clean_state(&s)),
            zip_code: text(rec.zip_code).map(|z| clean_zip(&z)),
            website: text(rec.website).map(|w| clean_website(&w)),
            website_validated: rec.website_validated,
            contact_email: text(rec.contact_email).map(|e| clean_email(&e)),
            contact_phone: text(rec.contact_phone).map(|p| clean_phone(&p)),
            parish_priest: text(rec.parish_priest).map(|c| clean_clergy(&c)),
            dean: text(rec.dean).map(|c| clean_clergy(&c)),
            clergy_contact: text(rec.clergy_contact).map(|c| clean_clergy(&c)),
            patron_saint: text(rec.patron_saint).map(|s| expand_saints(&s)),
            feast_day: text(rec.feast_day),
            diocese: text(rec.diocese),
            deanery: text(rec.deanery),
            parish_size: text(rec.parish_size),
            languages: text(rec.languages),
            services_schedule: text(rec.services_schedule),
            facebook_url: text(rec.facebook_url).map(|u| with_scheme(&u)),
            instagram_url: text(rec.instagram_url).map(|u| with_scheme(&u)),
            youtube_url: text(rec.youtube_url).map(|u| with_scheme(&u)),
            source_url: text(rec.source_url).map(|u| with_scheme(&u)),
            scraper_version: text(rec.scraper_version),
            last_updated: rec.last_updated.or(Some(self.now)),
            ..rec
        };
        Some(ChurchRecord {
            data_quality_score: cleaned.compute_quality_score(),
            ..cleaned
        })
    }
}

/// Whitespace-collapsed value, `None` when blank.
fn text(value: Option<String>) -> Option<String> {
    value.map(|v| squash(&v)).filter(|v| !v.is_empty())
}

pub fn clean_name(raw: &str) -> String {
    let mut name = squash(raw);
    loop {
        let stripped = NAME_PREFIX.replace(&name, "");
        let stripped = NAME_SUFFIX.replace(&stripped, "").trim().to_string();
        if stripped.is_empty() || stripped == name {
            break;
        }
        name = stripped;
    }
    title_case(&expand_saints(&name))
}

fn expand_saints(s: &str) -> String {
    let s = SAINTS_ABBR.replace_all(s, "Saints ");
    SAINT_ABBR.replace_all(&s, "Saint ").trim().to_string()
}

fn clean_jurisdiction(raw: &str) -> String {
    let j = squash(raw);
    let key = j.to_lowercase();
    JURISDICTION_ALIASES
        .iter()
        .find(|(alias, _)| *alias == key)
        .map(|(_, canonical)| canonical.to_string())
        .unwrap_or(j)
}

fn clean_address(raw: &str) -> String {
    let mut a = raw.to_string();
    for (re, abbr) in STREET_TYPES.iter() {
        a = re.replace_all(&a, *abbr).into_owned();
    }
    title_case(&a)
}

fn clean_state(raw: &str) -> String {
    if raw.len() == 2 {
        return raw.to_uppercase();
    }
    let key = raw.to_lowercase();
    STATES
        .iter()
        .find(|(name, _)| *name == key)
        .map(|(_, code)| code.to_string())
        .unwrap_or_else(|| raw.to_string())
}

fn clean_zip(raw: &str) -> String {
    match ZIP.captures(raw) {
        Some(c) => match c.get(2) {
            Some(plus4) => format!("{}-{}", &c[1], plus4.as_str()),
            None => c[1].to_string(),
        },
        None => raw.to_string(),
    }
}

fn clean_email(raw: &str) -> String {
    EMAIL
        .find(raw)
        .map(|m| m.as_str().to_lowercase())
        .unwrap_or_else(|| raw.to_string())
}

pub fn clean_phone(raw: &str) -> String {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    let digits = match digits.len() {
        11 if digits.starts_with('1') => &digits[1..],
        10 => &digits[..],
        _ => return raw.to_string(),
    };
    format!("({}) {}-{}", &digits[..3], &digits[3..6], &digits[6..])
}

fn clean_website(raw: &str) -> String {
    let url = with_scheme(raw);
    let url = url.trim_end_matches('/');
    if WEBSITE_SHAPE.is_match(url) {
        url.to_string()
    } else {
        raw.to_string()
    }
}

fn with_scheme(raw: &str) -> String {
    let lower = raw.to_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") {
        raw.to_string()
    } else {
        format!("https://{}", raw)
    }
}

fn clean_clergy(raw: &str) -> String {
    let mut c = raw.to_string();
    for (re, full) in CLERGY_TITLES.iter() {
        c = re.replace_all(&c, *full).into_owned();
    }
    title_case(c.trim())
}

/// Title-case words written in a single case; mixed-case words ("McAllen")
/// and short all-caps words ("OCA", "NE") are left alone.
pub fn title_case(s: &str) -> String {
    s.split(' ')
        .enumerate()
        .map(|(i, word)| {
            let lower = word.to_lowercase();
            if i > 0 && SMALL_WORDS.contains(&lower.as_str()) {
                return lower;
            }
            let letters: Vec<char> = word.chars().filter(|c| c.is_alphabetic()).collect();
            let all_lower = letters.iter().all(|c| c.is_lowercase());
            let all_upper = letters.len() > 3 && letters.iter().all(|c| c.is_uppercase());
            if !(all_lower || all_upper) {
                return word.to_string();
            }
            let mut chars = lower.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => lower,
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
