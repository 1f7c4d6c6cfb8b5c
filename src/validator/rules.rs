use std::sync::LazyLock;

use regex::Regex;

use crate::scrapers::jurisdictions;

pub static EMAIL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").unwrap());
pub static ZIP: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d{5}(?:-\d{4})?$").unwrap());
pub static SUSPICIOUS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"\b(?:test|demo|example|sample)\b",
        r"\blorem ipsum",
        r"\bplaceholder",
        r"\b(?:todo|fixme|temp)\b",
    ]
    .into_iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

/// Oldest plausible founding year for a US parish.
pub const MIN_YEAR: i32 = 1700;

/// Words whose presence on a parish website marks it as in-domain.
pub const DOMAIN_KEYWORDS: &[&str] = &[
    "orthodox", "cathedral", "church", "parish", "monastery", "liturgy", "vespers", "matins",
    "father", "priest",
];

/// Terms in a parish name that count towards authenticity.
pub const NAME_TERMS: &[&str] = &["orthodox", "cathedral", "monastery", "church", "saint", "holy"];

/// Substrings identifying a recognised jurisdiction.
pub const KNOWN_JURISDICTIONS: &[&str] = &[
    jurisdictions::OCA,
    jurisdictions::GOARCH,
    jurisdictions::ANTIOCHIAN,
    jurisdictions::ROCOR,
    jurisdictions::SERBIAN,
    jurisdictions::ROMANIAN,
    jurisdictions::BULGARIAN,
    "Orthodox Church in America",
    "Greek Orthodox Archdiocese",
    "Antiochian Orthodox",
    "Serbian Orthodox",
    "Romanian Orthodox",
    "Bulgarian Orthodox",
    "ROCOR",
    "OCA",
    "GOARCH",
];

pub const VALID_TLDS: &[&str] = &["org", "com", "net", "church", "us", "info", "edu"];

pub const US_STATES: &[&str] = &[
    "AL", "AK", "AZ", "AR", "CA", "CO", "CT", "DE", "DC", "FL", "GA", "HI", "ID", "IL", "IN",
    "IA", "KS", "KY", "LA", "ME", "MD", "MA", "MI", "MN", "MS", "MO", "MT", "NE", "NV", "NH",
    "NJ", "NM", "NY", "NC", "ND", "OH", "OK", "OR", "PA", "RI", "SC", "SD", "TN", "TX", "UT",
    "VT", "VA", "WA", "WV", "WI", "WY", "PR",
];

/// First-three-digit ZIP ranges per state. Prefixes not listed are not judged.
const ZIP_PREFIXES: &[(u16, u16, &str)] = &[
    (5, 5, "NY"), (6, 9, "PR"), (10, 27, "MA"), (28, 29, "RI"), (30, 38, "NH"),
    (39, 49, "ME"), (50, 54, "VT"), (55, 55, "MA"), (56, 59, "VT"), (60, 69, "CT"),
    (70, 89, "NJ"), (100, 149, "NY"), (150, 196, "PA"), (197, 199, "DE"), (200, 205, "DC"),
    (206, 219, "MD"), (220, 246, "VA"), (247, 268, "WV"), (270, 289, "NC"), (290, 299, "SC"),
    (300, 319, "GA"), (320, 349, "FL"), (350, 369, "AL"), (370, 385, "TN"), (386, 397, "MS"),
    (398, 399, "GA"), (400, 427, "KY"), (430, 459, "OH"), (460, 479, "IN"), (480, 499, "MI"),
    (500, 528, "IA"), (530, 549, "WI"), (550, 567, "MN"), (569, 569, "DC"), (570, 577, "SD"),
    (580, 588, "ND"), (590, 599, "MT"), (600, 629, "IL"), (630, 658, "MO"), (660, 679, "KS"),
    (680, 693, "NE"), (700, 714, "LA"), (716, 729, "AR"), (730, 749, "OK"), (750, 799, "TX"),
    (800, 816, "CO"), (820, 831, "WY"), (832, 838, "ID"), (840, 847, "UT"), (850, 865, "AZ"),
    (870, 884, "NM"), (885, 885, "TX"), (889, 898, "NV"), (900, 961, "CA"), (967, 968, "HI"),
    (970, 979, "OR"), (980, 994, "WA"), (995, 999, "AK"),
];

pub mod flags {
    pub const MISSING_NAME: &str = "missing_name";
    pub const MISSING_JURISDICTION: &str = "missing_jurisdiction";
    pub const MISSING_LOCATION: &str = "missing_location";
    pub const INVALID_EMAIL: &str = "invalid_email";
    pub const INVALID_PHONE: &str = "invalid_phone";
    pub const INVALID_ZIP: &str = "invalid_zip";
    pub const INVALID_YEAR: &str = "invalid_year";
    pub const INVALID_STATE: &str = "invalid_state";
    pub const ZIP_STATE_MISMATCH: &str = "zip_state_mismatch";
    pub const WEBSITE_LACKS_KEYWORDS: &str = "website_lacks_domain_keywords";
    pub const NO_EXTERNAL_REFERENCES: &str = "no_external_references";
    pub const UNCLEAR_JURISDICTION: &str = "unclear_jurisdiction";
    pub const SUSPICIOUS_CONTENT: &str = "suspicious_content";
    pub const NO_CONTACT_METHODS: &str = "no_contact_methods";
}

pub fn valid_email(email: &str) -> bool {
    EMAIL.is_match(email)
}

/// Ten digits, or eleven with a leading country code 1.
pub fn valid_phone(phone: &str) -> bool {
    let digits: Vec<char> = phone.chars().filter(char::is_ascii_digit).collect();
    digits.len() == 10 || (digits.len() == 11 && digits[0] == '1')
}

pub fn valid_zip(zip: &str) -> bool {
    ZIP.is_match(zip)
}

pub fn valid_state(state: &str) -> bool {
    US_STATES.contains(&state)
}

pub fn state_for_zip(zip: &str) -> Option<&'static str> {
    let prefix: u16 = zip.get(..3)?.parse().ok()?;
    ZIP_PREFIXES
        .iter()
        .find(|(lo, hi, _)| (*lo..=*hi).contains(&prefix))
        .map(|(_, _, state)| *state)
}

pub fn known_jurisdiction(jurisdiction: &str) -> bool {
    KNOWN_JURISDICTIONS.iter().any(|j| jurisdiction.contains(j))
}

pub fn valid_tld(host: &str) -> bool {
    host.rsplit('.')
        .next()
        .is_some_and(|tld| VALID_TLDS.contains(&tld.to_lowercase().as_str()))
}

pub fn is_suspicious(text: &str) -> bool {
    SUSPICIOUS.iter().any(|re| re.is_match(text))
}

pub fn keyword_hits(text: &str) -> usize {
    DOMAIN_KEYWORDS.iter().filter(|k| text.contains(*k)).count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats() {
        assert!(valid_email("office@stnicholas.org"));
        assert!(!valid_email("invalid-email"));
        assert!(valid_phone("(773) 486-6064"));
        assert!(valid_phone("1-773-486-6064"));
        assert!(!valid_phone("486-6064"));
        assert!(valid_zip("60622") && valid_zip("60622-1234"));
        assert!(!valid_zip("invalid") && !valid_zip("6062"));
        assert!(valid_state("IL") && !valid_state("XX"));
    }

    #[test]
    fn zip_prefix_table() {
        assert_eq!(state_for_zip("60622"), Some("IL"));
        assert_eq!(state_for_zip("02115"), Some("MA"));
        assert_eq!(state_for_zip("15213"), Some("PA"));
        assert_eq!(state_for_zip("94539"), Some("CA"));
        assert_eq!(state_for_zip("00100"), None);
    }

    #[test]
    fn text_checks() {
        assert!(known_jurisdiction("Orthodox Church in America (OCA)"));
        assert!(!known_jurisdiction("Church of Somewhere"));
        assert!(valid_tld("stnicholas.org") && !valid_tld("stnicholas.xyz"));
        assert!(is_suspicious("test church"));
        assert!(!is_suspicious("holy protection"));
        assert_eq!(keyword_hits("the orthodox parish liturgy schedule"), 3);
    }
}
