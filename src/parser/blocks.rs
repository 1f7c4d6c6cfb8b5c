use std::sync::LazyLock;

use regex::Regex;

use crate::model::ChurchRecord;

static STREET_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b\d{1,6}\s+[A-Za-z0-9.' ]+?\b(?:Street|St|Avenue|Ave|Road|Rd|Drive|Dr|Boulevard|Blvd|Lane|Ln|Way|Court|Ct|Place|Pl|Highway|Hwy|Parkway|Pkwy|Circle|Cir|Terrace)\b\.?",
    )
    .unwrap()
});
static LOCALITY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([A-Za-z][A-Za-z .'-]*[A-Za-z.]),\s*([A-Z]{2})\b(?:\s+(\d{5}(?:-\d{4})?))?").unwrap()
});
static ZIP_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b\d{5}(?:-\d{4})?\b").unwrap());
static PHONE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\(?\b\d{3}\)?[-.\s]?\d{3}[-.\s]?\d{4}\b").unwrap());
static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}").unwrap());
static URL_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"https?://[^\s"'<>)]+"#).unwrap());
static CLERGY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b(?:Very Rev\.|Rev\.|Reverend|Father|Fr\.|Protopresbyter|Archpriest|Archimandrite|Priest|Pastor|Deacon|Dn\.)\s+[A-Z][A-Za-z.'-]*(?:\s+[A-Z][A-Za-z.'-]*){0,3}",
    )
    .unwrap()
});
static YEAR_AFTER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:established|founded|built|est\.)\D{0,20}\b(1[6-9]\d{2}|20\d{2})\b").unwrap()
});
static YEAR_BEFORE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(1[6-9]\d{2}|20\d{2})\b\D{0,20}\b(?:established|founded)\b").unwrap()
});
static BARE_YEAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(?:1[6-9]\d{2}|20\d{2})\b").unwrap());
static DIOCESE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b((?:arch)?diocese of [^,\n.;]+|(?:eastern|western|midwest|southern) diocese)").unwrap()
});
static METROPOLIS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(metropolis of [^,\n.;]+)").unwrap());
static DEANERY_LABEL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bdeanery:\s*([^,\n.]+)").unwrap());
static DEANERY_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b([A-Z][A-Za-z]+(?: [A-Z][A-Za-z]+)*) Deanery\b").unwrap());
static SERVICE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(liturgy|vespers|matins|orthros|vigil|services?)\b").unwrap());
static TIME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b\d{1,2}(?::\d{2})?\s*(?:am|pm|a\.m\.|p\.m\.)|\b\d{1,2}:\d{2}\b").unwrap());
static SAINT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(Saints|Sts\.?|Saint|St\.?)\s+([A-Z][A-Za-z'-]+(?:\s+(?:and|&)\s+[A-Z][A-Za-z'-]+)?)").unwrap()
});
static SIZE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(\d{1,5})\s+(?:families|members|parishioners|stewards)\b").unwrap());
static FEAST_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bfeast(?:\s+day)?:\s*([^\n;]+)").unwrap());

const LANGUAGES: &[&str] = &[
    "English",
    "Greek",
    "Russian",
    "Church Slavonic",
    "Serbian",
    "Romanian",
    "Bulgarian",
    "Arabic",
    "Ukrainian",
    "Georgian",
    "Spanish",
];

const CHURCH_KEYWORDS: &[&str] = &[
    "orthodox", "church", "parish", "cathedral", "chapel", "mission", "monastery", "saint", "st.",
    "holy",
];

/// One classified line of a listing's plain text.
#[derive(Debug, Clone, PartialEq)]
pub enum Block {
    Street(String),
    Locality {
        city: String,
        state: String,
        zip: Option<String>,
    },
    Phone(String),
    Email(String),
    Link(String),
    Clergy(String),
    Text(String),
    Empty,
}

impl Block {
    /// Lines that carry a directory field, as opposed to free text.
    fn is_field(&self) -> bool {
        !matches!(self, Block::Text(_) | Block::Empty)
    }
}

pub fn classify_lines(text: &str) -> Vec<Block> {
    text.lines().map(|l| classify_line(l.trim())).collect()
}

fn classify_line(line: &str) -> Block {
    if line.is_empty() {
        return Block::Empty;
    }
    if let Some(e) = email(line) {
        if line.len() <= e.len() + 12 {
            return Block::Email(e);
        }
    }
    // A street line keeps its full text; "123 Main St, Springfield, IL 62701"
    // carries the locality too and the entry re-scans it.
    if street(line).is_some() {
        return Block::Street(line.to_string());
    }
    if let Some((city, state, zip)) = locality(line) {
        return Block::Locality { city, state, zip };
    }
    if let Some(p) = phone(line) {
        if line.chars().filter(|c| c.is_alphabetic()).count() <= 12 {
            return Block::Phone(p);
        }
    }
    if let Some(u) = url(line) {
        if line.len() <= u.len() + 12 {
            return Block::Link(u);
        }
    }
    if let Some(c) = clergy(line) {
        return Block::Clergy(c);
    }
    Block::Text(line.to_string())
}

/// Split classified lines into entries at blank lines. A chunk of plain
/// text is held back as a heading and prepended to the next chunk when
/// that chunk has field lines but no name of its own.
pub fn group_entries(blocks: &[Block]) -> Vec<Vec<Block>> {
    let mut entries = Vec::new();
    let mut heading: Option<&[Block]> = None;
    for chunk in blocks.split(|b| *b == Block::Empty) {
        if chunk.is_empty() {
            continue;
        }
        if !chunk.iter().any(Block::is_field) {
            heading = Some(chunk);
            continue;
        }
        let named = chunk.iter().any(|b| matches!(b, Block::Text(_)));
        let mut entry = Vec::with_capacity(chunk.len() + 1);
        if let (false, Some(h)) = (named, heading.take()) {
            entry.extend_from_slice(h);
        }
        entry.extend_from_slice(chunk);
        heading = None;
        entries.push(entry);
    }
    entries
}

/// Build a record from one entry. The first free-text line is the name;
/// entries with no address or contact line are not directory listings.
pub fn entry_record(entry: &[Block]) -> Option<ChurchRecord> {
    if !entry.iter().any(Block::is_field) {
        return None;
    }
    let name = entry.iter().find_map(|b| match b {
        Block::Text(t) if t.len() > 2 && t.len() < 200 => Some(t.clone()),
        _ => None,
    })?;

    let mut rec = ChurchRecord {
        name,
        ..Default::default()
    };
    for block in entry {
        match block {
            Block::Street(line) => {
                if rec.address.is_none() {
                    rec.address = street(line);
                }
            }
            Block::Locality { city, state, zip } => {
                rec.city.get_or_insert_with(|| city.clone());
                rec.state.get_or_insert_with(|| state.clone());
                if let Some(z) = zip {
                    rec.zip_code.get_or_insert_with(|| z.clone());
                }
            }
            Block::Phone(p) => {
                rec.contact_phone.get_or_insert_with(|| p.clone());
            }
            Block::Email(e) => {
                rec.contact_email.get_or_insert_with(|| e.clone());
            }
            Block::Link(u) => {
                rec.website.get_or_insert_with(|| u.clone());
            }
            Block::Clergy(c) => {
                rec.clergy_contact.get_or_insert_with(|| c.clone());
            }
            Block::Text(_) | Block::Empty => {}
        }
    }
    // A street line may also carry "City, ST 12345".
    if rec.city.is_none() {
        let joined = entry_text(entry);
        if let Some((city, state, zip)) = locality(&joined) {
            rec.city = Some(city);
            rec.state = Some(state);
            rec.zip_code = rec.zip_code.or(zip);
        }
    }
    Some(rec)
}

fn entry_text(entry: &[Block]) -> String {
    entry
        .iter()
        .map(|b| match b {
            Block::Street(s) | Block::Phone(s) | Block::Email(s) | Block::Link(s) => s.clone(),
            Block::Clergy(s) | Block::Text(s) => s.clone(),
            Block::Locality { city, state, zip } => {
                format!("{}, {} {}", city, state, zip.as_deref().unwrap_or(""))
            }
            Block::Empty => String::new(),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Field patterns over free text ──
//
// Each returns the first hit, searched line by line so that a match never
// spans two visual lines of the listing.

pub fn street(text: &str) -> Option<String> {
    text.lines()
        .find_map(|l| STREET_RE.find(l))
        .map(|m| m.as_str().trim().to_string())
}

/// `(city, state, zip)` from a "City, ST 12345" line.
pub fn locality(text: &str) -> Option<(String, String, Option<String>)> {
    text.lines().find_map(|l| {
        LOCALITY_RE.captures_iter(l).find_map(|caps| {
            let city = caps[1].trim();
            if city.is_empty() || STREET_RE.is_match(city) {
                return None;
            }
            Some((
                city.to_string(),
                caps[2].to_string(),
                caps.get(3).map(|m| m.as_str().to_string()),
            ))
        })
    })
}

pub fn city(text: &str) -> Option<String> {
    locality(text).map(|(c, _, _)| c)
}

pub fn state(text: &str) -> Option<String> {
    locality(text).map(|(_, s, _)| s)
}

/// ZIP from the locality line first; a bare five-digit number elsewhere is
/// only trusted when it is not part of a street line.
pub fn zip(text: &str) -> Option<String> {
    if let Some((_, _, Some(z))) = locality(text) {
        return Some(z);
    }
    text.lines()
        .filter(|l| !STREET_RE.is_match(l) && !PHONE_RE.is_match(l))
        .find_map(|l| ZIP_RE.find(l))
        .map(|m| m.as_str().to_string())
}

pub fn phone(text: &str) -> Option<String> {
    PHONE_RE.find(text).map(|m| m.as_str().to_string())
}

pub fn email(text: &str) -> Option<String> {
    EMAIL_RE.find(text).map(|m| m.as_str().to_string())
}

pub fn url(text: &str) -> Option<String> {
    URL_RE
        .find(text)
        .map(|m| m.as_str().trim_end_matches(['.', ',', ';']).to_string())
}

pub fn clergy(text: &str) -> Option<String> {
    text.lines()
        .find_map(|l| CLERGY_RE.find(l))
        .map(|m| m.as_str().trim().to_string())
}

pub fn year(text: &str) -> Option<String> {
    YEAR_AFTER_RE
        .captures(text)
        .or_else(|| YEAR_BEFORE_RE.captures(text))
        .map(|c| c[1].to_string())
}

/// Year as a number from either a labelled sentence or a bare year.
pub fn year_value(text: &str) -> Option<i32> {
    year(text)
        .or_else(|| BARE_YEAR_RE.find(text).map(|m| m.as_str().to_string()))
        .and_then(|y| y.parse().ok())
}

pub fn diocese(text: &str) -> Option<String> {
    DIOCESE_RE
        .captures(text)
        .or_else(|| METROPOLIS_RE.captures(text))
        .map(|c| c[1].trim().to_string())
}

pub fn deanery(text: &str) -> Option<String> {
    if let Some(c) = DEANERY_LABEL_RE.captures(text) {
        return Some(c[1].trim().to_string());
    }
    DEANERY_NAME_RE
        .captures(text)
        .map(|c| format!("{} Deanery", &c[1]))
}

/// Lines that name a service and give a time.
pub fn services(text: &str) -> Option<String> {
    let lines: Vec<&str> = text
        .lines()
        .map(str::trim)
        .filter(|l| SERVICE_RE.is_match(l) && TIME_RE.is_match(l))
        .collect();
    if lines.is_empty() {
        None
    } else {
        Some(lines.join("; "))
    }
}

/// Languages named on lines that talk about language or services, so a
/// jurisdiction title like "Greek Orthodox" does not count.
pub fn languages(text: &str) -> Option<String> {
    let context: String = text
        .lines()
        .filter(|l| {
            let lower = l.to_lowercase();
            lower.contains("language") || SERVICE_RE.is_match(l)
        })
        .collect::<Vec<_>>()
        .join(" ");
    let mut found: Vec<&str> = Vec::new();
    for lang in LANGUAGES {
        if context.contains(lang) && !found.iter().any(|f| f.contains(lang)) {
            found.push(lang);
        }
    }
    if found.is_empty() {
        None
    } else {
        Some(found.join(", "))
    }
}

pub fn parish_size(text: &str) -> Option<String> {
    SIZE_RE.captures(text).map(|c| c[0].to_string())
}

pub fn feast_day(text: &str) -> Option<String> {
    FEAST_RE.captures(text).map(|c| c[1].trim().to_string())
}

/// Patron saint implied by a parish name ("St. Nicholas Church" → "Saint Nicholas").
pub fn patron_saint(name: &str) -> Option<String> {
    let caps = SAINT_RE.captures(name)?;
    let plural = caps[1].starts_with("Saints") || caps[1].starts_with("Sts");
    let title = if plural { "Saints" } else { "Saint" };
    Some(format!("{} {}", title, &caps[2]))
}

pub fn looks_like_church(text: &str) -> bool {
    let lower = text.to_lowercase();
    CHURCH_KEYWORDS.iter().any(|k| lower.contains(k))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_listing_lines() {
        let blocks = classify_lines(
            "Holy Trinity Cathedral\n1121 N Leavitt St\nChicago, IL 60622\n(773) 486-6064\ninfo@holytrinitycathedral.net\n\nnext",
        );
        assert_eq!(blocks[0], Block::Text("Holy Trinity Cathedral".into()));
        assert_eq!(blocks[1], Block::Street("1121 N Leavitt St".into()));
        assert_eq!(
            blocks[2],
            Block::Locality {
                city: "Chicago".into(),
                state: "IL".into(),
                zip: Some("60622".into())
            }
        );
        assert_eq!(blocks[3], Block::Phone("(773) 486-6064".into()));
        assert_eq!(blocks[4], Block::Email("info@holytrinitycathedral.net".into()));
        assert_eq!(blocks[5], Block::Empty);
    }

    #[test]
    fn entry_needs_a_field_line() {
        let blocks = classify_lines("About our parishes\nWe are a family of communities");
        assert!(entry_record(&blocks).is_none());
        assert!(group_entries(&blocks).is_empty());
    }

    #[test]
    fn heading_chunk_names_the_following_fields() {
        let blocks = classify_lines(
            "Find a parish\n\nSt. Mary Church\n\n10 Elm St\nDayton, OH 45402\n\nHoly Cross Mission\n22 Pine Rd\nAkron, OH 44301",
        );
        let entries = group_entries(&blocks);
        assert_eq!(entries.len(), 2);
        assert_eq!(entry_record(&entries[0]).unwrap().name, "St. Mary Church");
        assert_eq!(entry_record(&entries[1]).unwrap().name, "Holy Cross Mission");
    }

    #[test]
    fn single_line_address_fills_locality() {
        let blocks = classify_lines("St. George Church\n555 Oak Ave, Springfield, IL 62701\nFr. John Smith");
        let rec = entry_record(&blocks).unwrap();
        assert_eq!(rec.name, "St. George Church");
        assert_eq!(rec.address.as_deref(), Some("555 Oak Ave"));
        assert_eq!(rec.city.as_deref(), Some("Springfield"));
        assert_eq!(rec.state.as_deref(), Some("IL"));
        assert_eq!(rec.zip_code.as_deref(), Some("62701"));
        assert_eq!(rec.clergy_contact.as_deref(), Some("Fr. John Smith"));
    }

    #[test]
    fn zip_ignores_street_numbers() {
        assert_eq!(zip("12345 Main Street\nno zip here"), None);
        assert_eq!(zip("Boston, MA 02115").as_deref(), Some("02115"));
    }

    #[test]
    fn text_patterns() {
        assert_eq!(year("Founded in 1892 by immigrants").as_deref(), Some("1892"));
        assert_eq!(year("Zip 60622"), None);
        assert_eq!(year_value("Est. 1905"), Some(1905));
        assert_eq!(year_value("1892"), Some(1892));
        assert_eq!(
            diocese("Parish of the Diocese of the Midwest, Chicago Deanery").as_deref(),
            Some("Diocese of the Midwest")
        );
        assert_eq!(deanery("Chicago Deanery").as_deref(), Some("Chicago Deanery"));
        assert_eq!(deanery("Deanery: Ohio River").as_deref(), Some("Ohio River"));
        assert_eq!(
            services("Divine Liturgy Sunday 9:30 AM\nParking in rear").as_deref(),
            Some("Divine Liturgy Sunday 9:30 AM")
        );
        assert_eq!(
            languages("Greek Orthodox Metropolis\nLiturgy in English and Church Slavonic").as_deref(),
            Some("English, Church Slavonic")
        );
        assert_eq!(patron_saint("St. Nicholas Church").as_deref(), Some("Saint Nicholas"));
        assert_eq!(
            patron_saint("Sts. Peter and Paul").as_deref(),
            Some("Saints Peter and Paul")
        );
        assert_eq!(parish_size("About 120 families").as_deref(), Some("120 families"));
    }
}
