use std::collections::BTreeMap;
use std::fmt::Write;

use chrono::NaiveDate;

use crate::insights::make_insight;
use crate::models::{DailyRollup, FeatureRecord, Severity};

/// Strongest features of a day, ranked by z-score. With
/// `prefer_positive_slope`, rising series rank ahead of falling ones.
pub fn top_features<'a>(
    features: &'a [FeatureRecord],
    severities: &[Severity],
    min_latest: f64,
    prefer_positive_slope: bool,
    limit: usize,
) -> Vec<&'a FeatureRecord> {
    let mut ranked: Vec<&FeatureRecord> = features
        .iter()
        .filter(|f| severities.contains(&f.severity) && f.latest >= min_latest)
        .collect();
    ranked.sort_by(|a, b| {
        let slope_rank = if prefer_positive_slope {
            (b.slope_7d > 0.0).cmp(&(a.slope_7d > 0.0))
        } else {
            std::cmp::Ordering::Equal
        };
        slope_rank.then_with(|| b.z_score.total_cmp(&a.z_score))
    });
    ranked.truncate(limit);
    ranked
}

pub fn severity_counts(features: &[FeatureRecord]) -> BTreeMap<Severity, usize> {
    let mut counts: BTreeMap<Severity, usize> = Severity::ALL.iter().map(|s| (*s, 0)).collect();
    for feature in features {
        *counts.entry(feature.severity).or_insert(0) += 1;
    }
    counts
}

pub fn build_detection_summary(
    as_of_date: NaiveDate,
    features: &[FeatureRecord],
    limit: usize,
) -> String {
    let counts = severity_counts(features);
    let top = top_features(
        features,
        &[Severity::Emerging, Severity::Watch, Severity::Rising],
        2.0,
        true,
        limit,
    );

    let mut output = String::new();
    let _ = writeln!(output, "# Search Trend Summary ({as_of_date})");
    let _ = writeln!(
        output,
        "- BREAKOUT {} / RISING {} / WATCH {} / EMERGING {}",
        counts[&Severity::Breakout],
        counts[&Severity::Rising],
        counts[&Severity::Watch],
        counts[&Severity::Emerging]
    );
    let _ = writeln!(output, "- Total signals: {}", features.len());
    let _ = writeln!(output);
    let _ = writeln!(output, "## Top Candidates");

    if top.is_empty() {
        let _ = writeln!(output, "No candidates cleared the filters today.");
    } else {
        for feature in top {
            let card = make_insight(&feature.term);
            let _ = writeln!(
                output,
                "- {} | {} | {} (WoW {:+.0}%, z {:.2}, slope {:.2}, latest {:.0})",
                feature.severity,
                feature.geo,
                feature.term,
                feature.wow_change * 100.0,
                feature.z_score,
                feature.slope_7d,
                feature.latest
            );
            let _ = writeln!(output, "  - Expectation: {}", card.expectation);
        }
    }

    output
}

pub fn build_rollup_report(rollup: &DailyRollup) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Daily Trend Rollup ({})", rollup.report_date);
    let _ = writeln!(
        output,
        "Aggregated from {} snapshots (support >= {})",
        rollup.snapshot_count, rollup.min_support
    );
    let _ = writeln!(output);

    if rollup.top.is_empty() {
        let _ = writeln!(output, "No signals to roll up for this day.");
        return output;
    }

    for entry in rollup.top.iter() {
        let card = make_insight(&entry.term);
        let _ = writeln!(
            output,
            "- {} | {} | {} (max z {:.2}, median WoW {:+.0}%, support {})",
            entry.severity_day,
            entry.geo,
            entry.term,
            entry.max_z,
            entry.median_wow * 100.0,
            entry.support
        );
        let _ = writeln!(output, "  - Expectation: {}", card.expectation);
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Evidence, RollupEntry};

    fn feature(term: &str, severity: Severity, z: f64, slope: f64, latest: f64) -> FeatureRecord {
        FeatureRecord {
            term: term.to_string(),
            geo: "US".to_string(),
            as_of_date: NaiveDate::from_ymd_opt(2026, 3, 20).unwrap(),
            wow_change: 0.3,
            z_score: z,
            slope_7d: slope,
            latest,
            intent_flag: false,
            severity,
            evidence: Evidence {
                last7_avg: 0.0,
                prev7_avg: 0.0,
                mu: 0.0,
                sigma: 0.0,
                last3_avg: 0.0,
                prev14_avg: 0.0,
                spike_3v14: 0.0,
                dod_delta: 0.0,
                accel: 0.0,
                nonzero_streak: 0,
                revived: false,
            },
        }
    }

    #[test]
    fn positive_slopes_rank_first() {
        let features = vec![
            feature("falling", Severity::Watch, 3.0, -1.0, 10.0),
            feature("rising", Severity::Watch, 1.8, 0.5, 10.0),
            feature("tiny", Severity::Rising, 4.0, 1.0, 1.0),
            feature("breakout", Severity::Breakout, 5.0, 1.0, 10.0),
        ];
        let top = top_features(
            &features,
            &[Severity::Watch, Severity::Rising],
            2.0,
            true,
            5,
        );
        let terms: Vec<&str> = top.iter().map(|f| f.term.as_str()).collect();
        assert_eq!(terms, vec!["rising", "falling"]);

        let by_z = top_features(&features, &[Severity::Watch], 2.0, false, 5);
        assert_eq!(by_z[0].term, "falling");
    }

    #[test]
    fn counts_cover_every_tier() {
        let features = vec![
            feature("a", Severity::Watch, 1.0, 1.0, 10.0),
            feature("b", Severity::Watch, 1.0, 1.0, 10.0),
            feature("c", Severity::Breakout, 1.0, 1.0, 10.0),
        ];
        let counts = severity_counts(&features);
        assert_eq!(counts[&Severity::Watch], 2);
        assert_eq!(counts[&Severity::Breakout], 1);
        assert_eq!(counts[&Severity::Emerging], 0);
    }

    #[test]
    fn summary_lists_counts_and_candidates() {
        let features = vec![feature("cica toner", Severity::Rising, 2.2, 1.0, 30.0)];
        let as_of = NaiveDate::from_ymd_opt(2026, 3, 20).unwrap();
        let summary = build_detection_summary(as_of, &features, 5);
        assert!(summary.contains("BREAKOUT 0 / RISING 1 / WATCH 0 / EMERGING 0"));
        assert!(summary.contains("RISING | US | cica toner (WoW +30%"));
        assert!(summary.contains("Expectation: Stronger skin barrier"));
    }

    #[test]
    fn rollup_report_handles_empty_day() {
        let rollup = DailyRollup {
            report_date: NaiveDate::from_ymd_opt(2026, 3, 20).unwrap(),
            min_support: 2,
            snapshot_count: 0,
            top: Vec::new(),
        };
        assert!(build_rollup_report(&rollup).contains("No signals to roll up"));
    }

    #[test]
    fn rollup_report_lists_entries() {
        let rollup = DailyRollup {
            report_date: NaiveDate::from_ymd_opt(2026, 3, 20).unwrap(),
            min_support: 2,
            snapshot_count: 4,
            top: vec![RollupEntry {
                term: "spf stick".to_string(),
                geo: "JP".to_string(),
                support: 3,
                max_z: 2.75,
                median_wow: 0.42,
                median_slope: 1.1,
                max_latest: 60.0,
                breakout_hits: 1,
                rising_hits: 0,
                severity_day: Severity::Breakout,
            }],
        };
        let report = build_rollup_report(&rollup);
        assert!(report.contains("Aggregated from 4 snapshots (support >= 2)"));
        assert!(report
            .contains("BREAKOUT | JP | spf stick (max z 2.75, median WoW +42%, support 3)"));
    }
}
