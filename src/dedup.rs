use std::cmp::Ordering;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::DedupConfig;
use crate::model::ChurchRecord;

static NOISE_WORDS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:orthodox|church|parish|cathedral|chapel|mission|saint|saints|st|holy)\b")
        .unwrap()
});
static STREET_TYPES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:street|st|avenue|ave|road|rd|drive|dr|boulevard|blvd|lane|ln)\b").unwrap()
});
static NON_WORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^\w\s]").unwrap());
static SPACES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Pairs above this weighted similarity but below the name threshold are
/// reported for manual review.
pub const POTENTIAL_FLOOR: f64 = 0.6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NameMetric {
    Levenshtein,
    JaroWinkler,
}

impl NameMetric {
    pub fn similarity(self, a: &str, b: &str) -> f64 {
        if a.is_empty() || b.is_empty() {
            return 0.0;
        }
        if a == b {
            return 1.0;
        }
        match self {
            NameMetric::Levenshtein => strsim::normalized_levenshtein(a, b),
            NameMetric::JaroWinkler => strsim::jaro_winkler(a, b),
        }
    }
}

/// Lower-cased name with punctuation and generic church words removed.
pub fn normalize_name(name: &str) -> String {
    let lower = name.to_lowercase();
    let text = NON_WORD.replace_all(&lower, " ");
    let text = NOISE_WORDS.replace_all(&text, " ");
    SPACES.replace_all(&text, " ").trim().to_string()
}

pub fn normalize_address(address: &str) -> String {
    let lower = address.to_lowercase();
    let text = STREET_TYPES.replace_all(&lower, " ");
    let text = NON_WORD.replace_all(&text, " ");
    SPACES.replace_all(&text, " ").trim().to_string()
}

fn normalize_url(url: &str) -> String {
    let lower = url.trim().to_lowercase();
    let bare = lower
        .trim_start_matches("https://")
        .trim_start_matches("http://")
        .trim_start_matches("www.");
    bare.trim_end_matches('/').to_string()
}

fn phone_digits(phone: &str) -> String {
    let digits: String = phone.chars().filter(char::is_ascii_digit).collect();
    match digits.strip_prefix('1') {
        Some(rest) if digits.len() == 11 => rest.to_string(),
        _ => digits,
    }
}

fn norm_field(v: &Option<String>) -> Option<String> {
    v.as_deref()
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
}

/// Decides whether two records describe the same parish.
pub trait SimilarityPolicy: Send + Sync {
    fn is_duplicate(&self, a: &ChurchRecord, b: &ChurchRecord) -> bool;

    /// Weighted 0..=1 similarity, used for the manual-review report.
    fn similarity(&self, a: &ChurchRecord, b: &ChurchRecord) -> f64;

    fn threshold(&self) -> f64;
}

#[derive(Debug, Clone)]
pub struct NameLocationPolicy {
    pub metric: NameMetric,
    pub name_threshold: f64,
    pub address_threshold: f64,
    pub match_contacts: bool,
}

impl NameLocationPolicy {
    pub fn from_config(cfg: &DedupConfig) -> Self {
        NameLocationPolicy {
            metric: cfg.metric,
            name_threshold: cfg.name_threshold,
            address_threshold: cfg.address_threshold,
            match_contacts: cfg.match_contacts,
        }
    }

    fn name_similarity(&self, a: &ChurchRecord, b: &ChurchRecord) -> f64 {
        self.metric
            .similarity(&normalize_name(&a.name), &normalize_name(&b.name))
    }

    fn address_similarity(&self, a: &ChurchRecord, b: &ChurchRecord) -> Option<f64> {
        let (x, y) = (a.address.as_deref()?, b.address.as_deref()?);
        Some(
            self.metric
                .similarity(&normalize_address(x), &normalize_address(y)),
        )
    }

    fn same_identifier(&self, a: &ChurchRecord, b: &ChurchRecord) -> bool {
        let same = |x: Option<String>, y: Option<String>| matches!((x, y), (Some(x), Some(y)) if x == y);
        same(
            a.website.as_deref().map(normalize_url).filter(|s| !s.is_empty()),
            b.website.as_deref().map(normalize_url).filter(|s| !s.is_empty()),
        ) || same(
            a.contact_phone.as_deref().map(phone_digits).filter(|s| !s.is_empty()),
            b.contact_phone.as_deref().map(phone_digits).filter(|s| !s.is_empty()),
        ) || same(norm_field(&a.contact_email), norm_field(&b.contact_email))
    }
}

/// ZIPs decide when both records have one; otherwise the cities must
/// match, and the states too when both are known.
fn same_location(a: &ChurchRecord, b: &ChurchRecord) -> bool {
    if let (Some(x), Some(y)) = (norm_field(&a.zip_code), norm_field(&b.zip_code)) {
        return x == y;
    }
    match (norm_field(&a.city), norm_field(&b.city)) {
        (Some(x), Some(y)) if x == y => match (norm_field(&a.state), norm_field(&b.state)) {
            (Some(s), Some(t)) => s == t,
            _ => true,
        },
        _ => false,
    }
}

fn same_city(a: &ChurchRecord, b: &ChurchRecord) -> bool {
    matches!((norm_field(&a.city), norm_field(&b.city)), (Some(x), Some(y)) if x == y)
}

impl SimilarityPolicy for NameLocationPolicy {
    fn is_duplicate(&self, a: &ChurchRecord, b: &ChurchRecord) -> bool {
        if self.name_similarity(a, b) >= self.name_threshold && same_location(a, b) {
            return true;
        }
        if !self.match_contacts {
            return false;
        }
        if self.same_identifier(a, b) {
            return true;
        }
        self.address_similarity(a, b)
            .is_some_and(|s| s > self.address_threshold && same_city(a, b))
    }

    fn similarity(&self, a: &ChurchRecord, b: &ChurchRecord) -> f64 {
        let mut weighted = 40.0 * self.name_similarity(a, b);
        let mut total = 40.0;
        if let (Some(x), Some(y)) = (norm_field(&a.city), norm_field(&b.city)) {
            weighted += 20.0 * self.metric.similarity(&x, &y);
            total += 20.0;
        }
        if let Some(s) = self.address_similarity(a, b) {
            weighted += 20.0 * s;
            total += 20.0;
        }
        if let (Some(x), Some(y)) = (&a.contact_phone, &b.contact_phone) {
            if phone_digits(x) == phone_digits(y) {
                weighted += 10.0;
            }
            total += 10.0;
        }
        weighted / total
    }

    fn threshold(&self) -> f64 {
        self.name_threshold
    }
}

/// Indices into the working set judged to be one parish, with the chosen
/// survivor (always one of `members`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateGroup {
    pub members: Vec<usize>,
    pub survivor: usize,
}

impl DuplicateGroup {
    pub fn removed(&self) -> impl Iterator<Item = usize> + '_ {
        self.members.iter().copied().filter(move |&i| i != self.survivor)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PotentialDuplicate {
    pub first: usize,
    pub second: usize,
    pub similarity: f64,
}

pub struct DuplicateDetector {
    policy: Box<dyn SimilarityPolicy>,
}

impl DuplicateDetector {
    pub fn new(cfg: &DedupConfig) -> Self {
        DuplicateDetector {
            policy: Box::new(NameLocationPolicy::from_config(cfg)),
        }
    }

    pub fn with_policy(policy: Box<dyn SimilarityPolicy>) -> Self {
        DuplicateDetector { policy }
    }

    /// Greedy grouping: each unassigned record collects every later
    /// unassigned record the policy matches against it.
    pub fn find_duplicates(&self, records: &[ChurchRecord]) -> Vec<DuplicateGroup> {
        let mut assigned = vec![false; records.len()];
        let mut groups = Vec::new();

        for i in 0..records.len() {
            if assigned[i] {
                continue;
            }
            assigned[i] = true;
            let mut members = vec![i];
            for j in (i + 1)..records.len() {
                if !assigned[j] && self.policy.is_duplicate(&records[i], &records[j]) {
                    assigned[j] = true;
                    members.push(j);
                }
            }
            if members.len() < 2 {
                continue;
            }
            if let Some(survivor) = select_best(records, &members) {
                debug!(
                    size = members.len(),
                    survivor = %records[survivor].name,
                    "Duplicate group"
                );
                groups.push(DuplicateGroup { members, survivor });
            }
        }

        info!(
            groups = groups.len(),
            duplicates = groups.iter().map(|g| g.members.len() - 1).sum::<usize>(),
            "Duplicate detection completed"
        );
        groups
    }

    /// Lower-confidence pairs for manual review, most similar first.
    pub fn potential_duplicates(&self, records: &[ChurchRecord]) -> Vec<PotentialDuplicate> {
        let ceiling = self.policy.threshold();
        let mut pairs = Vec::new();
        for i in 0..records.len() {
            for j in (i + 1)..records.len() {
                let similarity = self.policy.similarity(&records[i], &records[j]);
                if similarity > POTENTIAL_FLOOR && similarity <= ceiling {
                    pairs.push(PotentialDuplicate {
                        first: i,
                        second: j,
                        similarity,
                    });
                }
            }
        }
        pairs.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(Ordering::Equal)
        });
        pairs
    }
}

/// Most populated fields wins, then the higher validation score, then the
/// lexically smallest source URL.
pub fn select_best(records: &[ChurchRecord], members: &[usize]) -> Option<usize> {
    let source_key = |r: &ChurchRecord| match r.source_url.as_deref() {
        Some(s) => (false, s.to_string()),
        None => (true, String::new()),
    };
    members.iter().copied().min_by(|&a, &b| {
        let (ra, rb) = (&records[a], &records[b]);
        rb.populated_field_count()
            .cmp(&ra.populated_field_count())
            .then(rb.validation_score.cmp(&ra.validation_score))
            .then_with(|| source_key(ra).cmp(&source_key(rb)))
            .then(a.cmp(&b))
    })
}

macro_rules! fill_missing {
    ($dst:expr, $src:expr, $($field:ident),+ $(,)?) => {
        $(
            if $dst.$field.is_none() && $src.$field.is_some() {
                $dst.$field = $src.$field.clone();
            }
        )+
    };
}

/// Fill the survivor's empty fields from the other members, in member order.
/// Returns whether anything was filled, in which case the survivor's
/// validation result is stale.
pub fn merge_group(records: &mut [ChurchRecord], group: &DuplicateGroup) -> bool {
    let mut survivor = records[group.survivor].clone();
    let before = survivor.populated_field_count();
    for other in group.removed().map(|i| &records[i]) {
        if survivor.website.is_none() && other.website.is_some() {
            survivor.website_validated = other.website_validated;
        }
        fill_missing!(
            survivor, other, address, city, state, zip_code, website, contact_email,
            contact_phone, parish_priest, dean, clergy_contact, establishment_year,
            patron_saint, feast_day, diocese, deanery, parish_size, languages,
            services_schedule, facebook_url, instagram_url, youtube_url,
        );
    }
    let absorbed = survivor.populated_field_count() > before;
    survivor.data_quality_score = survivor.compute_quality_score();
    records[group.survivor] = survivor;
    absorbed
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(name: &str, city: &str) -> ChurchRecord {
        let mut r = ChurchRecord::new(name, "Orthodox Church in America (OCA)");
        r.city = Some(city.to_string());
        r
    }

    fn detector() -> DuplicateDetector {
        DuplicateDetector::new(&DedupConfig::default())
    }

    #[test]
    fn normalizes_names_and_addresses() {
        assert_eq!(normalize_name("St. Nicholas Orthodox Church"), "nicholas");
        assert_eq!(normalize_name("Holy Trinity Cathedral"), "trinity");
        assert_eq!(normalize_address("1121 N. Leavitt Street"), "1121 n leavitt");
        assert_eq!(normalize_url("https://www.StNicholas.org/"), "stnicholas.org");
        assert_eq!(phone_digits("1-773-486-6064"), "7734866064");
    }

    #[test]
    fn same_name_same_city_groups_and_keeps_the_fuller_record() {
        let sparse = rec("St. Nicholas", "Chicago");
        let mut full = rec("St. Nicholas", "Chicago");
        full.contact_email = Some("office@stnicholas.org".into());
        let other = rec("St. Nicholas", "Joliet");
        let records = vec![sparse, other, full];

        let groups = detector().find_duplicates(&records);
        assert_eq!(groups, vec![DuplicateGroup { members: vec![0, 2], survivor: 2 }]);
    }

    #[test]
    fn states_must_agree_when_both_known() {
        let mut a = rec("Saint George", "Springfield");
        a.state = Some("IL".into());
        let mut b = rec("Saint George", "Springfield");
        b.state = Some("MA".into());
        assert!(detector().find_duplicates(&[a, b]).is_empty());
    }

    #[test]
    fn shared_phone_groups_different_names() {
        let mut a = rec("Holy Protection", "Chicago");
        a.contact_phone = Some("(773) 486-6064".into());
        let mut b = rec("Pokrova Parish", "Chicago");
        b.contact_phone = Some("773.486.6064".into());
        assert_eq!(detector().find_duplicates(&[a.clone(), b.clone()]).len(), 1);

        let strict = DuplicateDetector::new(&DedupConfig {
            match_contacts: false,
            ..DedupConfig::default()
        });
        assert!(strict.find_duplicates(&[a, b]).is_empty());
    }

    #[test]
    fn ties_break_on_score_then_source_url() {
        let mut a = rec("Saint Mary", "Chicago");
        a.source_url = Some("https://b.example/list".into());
        let mut b = a.clone();
        b.source_url = Some("https://a.example/list".into());
        let mut c = a.clone();
        c.validation_score = 80;
        c.source_url = Some("https://z.example/list".into());

        let records = vec![a.clone(), b.clone(), c];
        assert_eq!(select_best(&records, &[0, 1, 2]), Some(2));
        assert_eq!(select_best(&[a, b], &[0, 1]), Some(1));
        assert_eq!(select_best(&records, &[]), None);
    }

    #[test]
    fn jaro_winkler_metric_is_selectable() {
        let cfg = DedupConfig {
            metric: NameMetric::JaroWinkler,
            ..DedupConfig::default()
        };
        let records = vec![rec("Saint Spyridon", "Chicago"), rec("Saint Spiridon", "Chicago")];
        assert_eq!(DuplicateDetector::new(&cfg).find_duplicates(&records).len(), 1);
    }

    #[test]
    fn merge_fills_survivor_gaps() {
        let mut a = rec("Saint Nicholas", "Chicago");
        a.contact_email = Some("office@stnicholas.org".into());
        a.address = Some("2701 W Chicago Ave".into());
        let mut b = rec("Saint Nicholas", "Chicago");
        b.contact_phone = Some("(773) 278-3636".into());
        let mut records = vec![a, b];

        let group = DuplicateGroup { members: vec![0, 1], survivor: 0 };
        assert!(merge_group(&mut records, &group));
        assert!(!merge_group(&mut records, &group));
        assert_eq!(records[0].contact_phone.as_deref(), Some("(773) 278-3636"));
        assert_eq!(records[0].contact_email.as_deref(), Some("office@stnicholas.org"));
        assert_eq!(records[0].data_quality_score, records[0].compute_quality_score());
    }

    #[test]
    fn potential_duplicates_sit_below_the_threshold() {
        let mut a = rec("Saint Demetrios", "Chicago");
        a.address = Some("2727 W Winona St".into());
        let mut b = rec("Saint Dimitri", "Chicago");
        b.address = Some("2727 W Winona St".into());
        b.city = Some("Chicago".into());
        let records = vec![a, b, rec("Holy Transfiguration", "Denver")];

        let pairs = detector().potential_duplicates(&records);
        assert!(pairs.iter().all(|p| p.similarity > POTENTIAL_FLOOR && p.similarity <= 0.8));
        assert!(pairs.iter().any(|p| (p.first, p.second) == (0, 1)));
    }
}
