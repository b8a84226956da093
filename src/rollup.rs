//! End-of-day aggregation of intraday snapshots.

use std::collections::BTreeMap;
use std::ops::Range;

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, TimeZone, Timelike, Utc};

use crate::config::RollupConfig;
use crate::models::{DailyRollup, RollupEntry, Severity, Snapshot, SnapshotRow};

/// UTC half-open interval covering `date` in the reporting timezone.
pub fn day_bounds(date: NaiveDate, offset: FixedOffset) -> Option<Range<DateTime<Utc>>> {
    let start = offset
        .from_local_datetime(&date.and_hms_opt(0, 0, 0)?)
        .single()?
        .with_timezone(&Utc);
    Some(start..start + Duration::days(1))
}

/// Start of the hour containing `now`; snapshots are keyed by it.
///
/// Reporting offsets are whole hours, so the UTC hour and the local hour agree.
pub fn snapshot_hour(now: DateTime<Utc>) -> DateTime<Utc> {
    now.with_minute(0)
        .and_then(|t| t.with_second(0))
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(now)
}

/// Median with linear interpolation between the two middle values.
pub fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let pos = (sorted.len() - 1) as f64 * 0.5;
    let lower = pos.floor() as usize;
    let upper = pos.ceil() as usize;
    sorted[lower] + (sorted[upper] - sorted[lower]) * (pos - lower as f64)
}

#[derive(Default)]
struct GroupAcc {
    support: usize,
    max_z: f64,
    max_latest: f64,
    wows: Vec<f64>,
    slopes: Vec<f64>,
    breakout_hits: usize,
    rising_hits: usize,
}

impl GroupAcc {
    fn add(&mut self, row: &SnapshotRow) {
        if self.support == 0 {
            self.max_z = row.z_score;
            self.max_latest = row.latest;
        } else {
            self.max_z = self.max_z.max(row.z_score);
            self.max_latest = self.max_latest.max(row.latest);
        }
        self.support += 1;
        self.wows.push(row.wow_change);
        self.slopes.push(row.slope_7d);
        match row.severity {
            Severity::Breakout => self.breakout_hits += 1,
            Severity::Rising => self.rising_hits += 1,
            _ => {}
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RollupAggregator {
    config: RollupConfig,
}

impl RollupAggregator {
    pub fn new(config: RollupConfig) -> Self {
        Self { config }
    }

    fn day_severity(&self, breakout_hits: usize, rising_hits: usize) -> Severity {
        if breakout_hits >= self.config.breakout_hits {
            Severity::Breakout
        } else if rising_hits >= self.config.rising_hits {
            Severity::Rising
        } else {
            Severity::Watch
        }
    }

    /// Aggregate the snapshots taken on `report_date` (reporting timezone
    /// `offset`) into one entry per (term, geo). Snapshots outside the day are
    /// ignored.
    pub fn aggregate(
        &self,
        report_date: NaiveDate,
        offset: FixedOffset,
        snapshots: &[Snapshot],
    ) -> DailyRollup {
        let bounds = day_bounds(report_date, offset);
        let in_day: Vec<&Snapshot> = snapshots
            .iter()
            .filter(|s| bounds.as_ref().is_some_and(|b| b.contains(&s.snapshot_at)))
            .collect();

        let mut groups: BTreeMap<(String, String), GroupAcc> = BTreeMap::new();
        for snapshot in in_day.iter() {
            for row in snapshot.rows.iter() {
                groups
                    .entry((row.term.clone(), row.geo.clone()))
                    .or_default()
                    .add(row);
            }
        }

        let mut top: Vec<RollupEntry> = groups
            .into_iter()
            .filter(|(_, acc)| acc.support >= self.config.min_support)
            .map(|((term, geo), acc)| RollupEntry {
                term,
                geo,
                support: acc.support,
                max_z: acc.max_z,
                median_wow: median(&acc.wows),
                median_slope: median(&acc.slopes),
                max_latest: acc.max_latest,
                breakout_hits: acc.breakout_hits,
                rising_hits: acc.rising_hits,
                severity_day: self.day_severity(acc.breakout_hits, acc.rising_hits),
            })
            .collect();

        top.sort_by(|a, b| {
            b.severity_day
                .cmp(&a.severity_day)
                .then_with(|| b.max_z.total_cmp(&a.max_z))
        });
        top.truncate(self.config.limit);

        DailyRollup {
            report_date,
            min_support: self.config.min_support,
            snapshot_count: in_day.len(),
            top,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn kst() -> FixedOffset {
        FixedOffset::east_opt(9 * 3600).unwrap()
    }

    fn report_date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 20).unwrap()
    }

    fn row(term: &str, geo: &str, z: f64, wow: f64, severity: Severity) -> SnapshotRow {
        SnapshotRow {
            term: term.to_string(),
            geo: geo.to_string(),
            wow_change: wow,
            z_score: z,
            slope_7d: wow * 10.0,
            latest: z * 10.0,
            severity,
        }
    }

    /// Snapshot at `hour` KST on the report date.
    fn snapshot(hour: u32, rows: Vec<SnapshotRow>) -> Snapshot {
        let local = report_date().and_hms_opt(hour, 0, 0).unwrap();
        Snapshot {
            id: Uuid::new_v4(),
            snapshot_at: kst().from_local_datetime(&local).unwrap().with_timezone(&Utc),
            rows,
        }
    }

    fn aggregator() -> RollupAggregator {
        RollupAggregator::new(RollupConfig::default())
    }

    #[test]
    fn day_bounds_follow_reporting_offset() {
        let bounds = day_bounds(report_date(), kst()).unwrap();
        assert_eq!(bounds.start, Utc.with_ymd_and_hms(2026, 3, 19, 15, 0, 0).unwrap());
        assert_eq!(bounds.end, Utc.with_ymd_and_hms(2026, 3, 20, 15, 0, 0).unwrap());
    }

    #[test]
    fn snapshot_hour_truncates() {
        let now =
            Utc.with_ymd_and_hms(2026, 3, 20, 4, 37, 12).unwrap() + Duration::milliseconds(250);
        assert_eq!(snapshot_hour(now), Utc.with_ymd_and_hms(2026, 3, 20, 4, 0, 0).unwrap());
    }

    #[test]
    fn median_interpolates_even_counts() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), 2.0);
        assert_eq!(median(&[4.0, 1.0, 2.0, 3.0]), 2.5);
        assert_eq!(median(&[7.0]), 7.0);
        assert_eq!(median(&[]), 0.0);
    }

    #[test]
    fn single_snapshot_groups_are_dropped() {
        let snapshots = vec![
            snapshot(9, vec![row("retinol", "US", 2.0, 0.3, Severity::Rising)]),
            snapshot(10, vec![row("cica", "US", 1.0, 0.1, Severity::Watch)]),
            snapshot(11, vec![row("cica", "US", 1.5, 0.2, Severity::Watch)]),
        ];
        let rollup = aggregator().aggregate(report_date(), kst(), &snapshots);

        assert_eq!(rollup.snapshot_count, 3);
        assert_eq!(rollup.top.len(), 1);
        let entry = &rollup.top[0];
        assert_eq!(entry.term, "cica");
        assert_eq!(entry.support, 2);
        assert_eq!(entry.max_z, 1.5);
        assert!((entry.median_wow - 0.15).abs() < 1e-12);
        assert_eq!(entry.severity_day, Severity::Watch);
    }

    #[test]
    fn day_severity_uses_hit_counts() {
        let snapshots = vec![
            snapshot(
                9,
                vec![
                    row("spf stick", "US", 3.0, 0.5, Severity::Breakout),
                    row("pdrn", "KR", 2.2, 0.3, Severity::Rising),
                    row("azelaic", "US", 4.0, 0.3, Severity::Rising),
                ],
            ),
            snapshot(
                10,
                vec![
                    row("spf stick", "US", 1.0, 0.2, Severity::Watch),
                    row("pdrn", "KR", 2.4, 0.3, Severity::Rising),
                    row("azelaic", "US", 4.5, 0.3, Severity::Watch),
                ],
            ),
        ];
        let rollup = aggregator().aggregate(report_date(), kst(), &snapshots);

        let by_term: Vec<(&str, Severity)> = rollup
            .top
            .iter()
            .map(|e| (e.term.as_str(), e.severity_day))
            .collect();
        assert_eq!(
            by_term,
            vec![
                ("spf stick", Severity::Breakout),
                ("pdrn", Severity::Rising),
                ("azelaic", Severity::Watch),
            ]
        );
        assert_eq!(rollup.top[1].rising_hits, 2);
        assert_eq!(rollup.top[2].max_z, 4.5);
    }

    #[test]
    fn orders_by_max_z_within_tier_and_truncates() {
        let snapshots = vec![
            snapshot(
                9,
                vec![
                    row("a", "US", 1.0, 0.1, Severity::Watch),
                    row("b", "US", 3.0, 0.1, Severity::Watch),
                    row("c", "US", 2.0, 0.1, Severity::Watch),
                ],
            ),
            snapshot(
                10,
                vec![
                    row("a", "US", 1.0, 0.1, Severity::Watch),
                    row("b", "US", 3.0, 0.1, Severity::Watch),
                    row("c", "US", 2.0, 0.1, Severity::Watch),
                ],
            ),
        ];
        let config = RollupConfig {
            limit: 2,
            ..RollupConfig::default()
        };
        let rollup = RollupAggregator::new(config).aggregate(report_date(), kst(), &snapshots);
        let terms: Vec<&str> = rollup.top.iter().map(|e| e.term.as_str()).collect();
        assert_eq!(terms, vec!["b", "c"]);
    }

    #[test]
    fn snapshots_outside_the_day_are_ignored() {
        let mut late = snapshot(23, vec![row("retinol", "US", 2.0, 0.3, Severity::Breakout)]);
        late.snapshot_at = late.snapshot_at + Duration::hours(1);
        let snapshots = vec![
            snapshot(9, vec![row("retinol", "US", 2.0, 0.3, Severity::Watch)]),
            late,
        ];
        let rollup = aggregator().aggregate(report_date(), kst(), &snapshots);
        assert_eq!(rollup.snapshot_count, 1);
        assert!(rollup.top.is_empty());
    }
}
