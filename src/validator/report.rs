use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::model::ChurchRecord;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationSummary {
    pub total: usize,
    pub valid: usize,
    pub flagged: usize,
    /// Percentage of validated records, one decimal.
    pub validation_rate: f64,
    pub average_score: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreDistribution {
    pub excellent: usize,
    pub good: usize,
    pub fair: usize,
    pub poor: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlagCount {
    pub flag: String,
    pub count: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub summary: ValidationSummary,
    pub score_distribution: ScoreDistribution,
    pub common_flags: Vec<FlagCount>,
    pub recommendations: Vec<String>,
}

const TOP_FLAGS: usize = 10;

pub fn summarize(records: &[ChurchRecord]) -> ValidationSummary {
    let total = records.len();
    let valid = records.iter().filter(|r| r.is_validated).count();
    let flagged = records.iter().filter(|r| !r.validation_flags.is_empty()).count();
    let score_sum: u64 = records.iter().map(|r| u64::from(r.validation_score)).sum();
    let (validation_rate, average_score) = if total == 0 {
        (0.0, 0.0)
    } else {
        (
            round1(valid as f64 * 100.0 / total as f64),
            round1(score_sum as f64 / total as f64),
        )
    };
    ValidationSummary {
        total,
        valid,
        flagged,
        validation_rate,
        average_score,
    }
}

pub fn generate_report(records: &[ChurchRecord]) -> ValidationReport {
    let summary = summarize(records);

    let mut dist = ScoreDistribution::default();
    for r in records {
        match r.validation_score {
            90.. => dist.excellent += 1,
            75..=89 => dist.good += 1,
            60..=74 => dist.fair += 1,
            _ => dist.poor += 1,
        }
    }

    let mut counts: HashMap<&str, usize> = HashMap::new();
    for flag in records.iter().flat_map(|r| &r.validation_flags) {
        *counts.entry(flag.as_str()).or_default() += 1;
    }
    let mut common_flags: Vec<FlagCount> = counts
        .into_iter()
        .map(|(flag, count)| FlagCount {
            flag: flag.to_string(),
            count,
        })
        .collect();
    // Ties ordered by name so the report is stable across runs.
    common_flags.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.flag.cmp(&b.flag)));
    common_flags.truncate(TOP_FLAGS);

    let mut recommendations = Vec::new();
    let invalid = summary.total - summary.valid;
    if invalid > 0 {
        recommendations.push(format!("Review {} invalid church records", invalid));
    }
    let no_website = records.iter().filter(|r| r.website.is_none()).count();
    if no_website > 0 {
        recommendations.push(format!(
            "{} churches missing websites - consider manual research",
            no_website
        ));
    }
    if dist.poor > 0 {
        recommendations.push(format!(
            "{} churches have low validation scores - requires attention",
            dist.poor
        ));
    }

    ValidationReport {
        summary,
        score_distribution: dist,
        common_flags,
        recommendations,
    }
}

fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scored(score: u8, validated: bool, flags: &[&str]) -> ChurchRecord {
        let mut r = ChurchRecord::new("Holy Trinity", "OCA");
        r.validation_score = score;
        r.is_validated = validated;
        r.validation_flags = flags.iter().map(|f| f.to_string()).collect();
        r
    }

    #[test]
    fn buckets_and_flag_ranking() {
        let mut records = vec![
            scored(95, true, &[]),
            scored(80, true, &["invalid_phone"]),
            scored(60, true, &["invalid_phone", "invalid_zip"]),
            scored(5, false, &["invalid_zip", "invalid_phone", "invalid_email"]),
        ];
        records[0].website = Some("https://holytrinity.org".into());

        let report = generate_report(&records);
        assert_eq!(
            report.score_distribution,
            ScoreDistribution { excellent: 1, good: 1, fair: 1, poor: 1 }
        );
        assert_eq!(report.summary.total, 4);
        assert_eq!(report.summary.valid, 3);
        assert_eq!(report.summary.flagged, 3);
        assert_eq!(report.summary.validation_rate, 75.0);
        assert_eq!(report.summary.average_score, 60.0);
        assert_eq!(report.common_flags[0], FlagCount { flag: "invalid_phone".into(), count: 3 });
        assert_eq!(report.common_flags[1].flag, "invalid_zip");
        assert_eq!(
            report.recommendations,
            vec![
                "Review 1 invalid church records",
                "3 churches missing websites - consider manual research",
                "1 churches have low validation scores - requires attention",
            ]
        );
    }

    #[test]
    fn empty_input() {
        let report = generate_report(&[]);
        assert_eq!(report.summary, ValidationSummary::default());
        assert!(report.common_flags.is_empty());
        assert!(report.recommendations.is_empty());
    }
}
