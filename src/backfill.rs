//! Historical replay of the detector over stored series.
//!
//! Every stored day is treated as "today" in turn, so thresholds can be
//! checked against what they would have flagged.

use std::io;

use chrono::NaiveDate;
use serde::Serialize;
use tracing::debug;

use crate::detector::SignalDetector;
use crate::error::RadarResult;
use crate::models::{SeriesMap, Severity, TimeSeriesPoint};
use crate::normalize;

/// One replayed signal, flattened for CSV export.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BackfillEvent {
    pub as_of_date: NaiveDate,
    pub term: String,
    pub geo: String,
    pub severity: Severity,
    pub wow_change: f64,
    pub z_score: f64,
    pub slope_7d: f64,
    pub latest: f64,
    pub last7_avg: f64,
    pub prev7_avg: f64,
    pub mu: f64,
    pub sigma: f64,
}

/// Replay one series: classify each prefix ending on or after `report_start`
/// and keep the signals whose tier is in `severities`. Earlier points still
/// feed the baseline.
pub fn replay_series(
    detector: &SignalDetector,
    term: &str,
    geo: &str,
    points: &[TimeSeriesPoint],
    report_start: NaiveDate,
    severities: &[Severity],
) -> Vec<BackfillEvent> {
    let cleaned = normalize::normalize(points);
    let values: Vec<f64> = cleaned.iter().map(|p| p.value).collect();
    let first = detector.config().min_points.saturating_sub(1);

    let mut events = Vec::new();
    for (end, point) in cleaned.iter().enumerate().skip(first) {
        if point.date < report_start {
            continue;
        }
        let Some(signal) = detector.detect_values(&values[..=end], term, geo) else {
            continue;
        };
        if !severities.contains(&signal.severity) {
            continue;
        }
        events.push(BackfillEvent {
            as_of_date: point.date,
            term: signal.term,
            geo: signal.geo,
            severity: signal.severity,
            wow_change: signal.wow_change,
            z_score: signal.z_score,
            slope_7d: signal.slope_7d,
            latest: signal.latest,
            last7_avg: signal.evidence.last7_avg,
            prev7_avg: signal.evidence.prev7_avg,
            mu: signal.evidence.mu,
            sigma: signal.evidence.sigma,
        });
    }
    events
}

/// Replay every series, newest day first, then strongest.
pub fn backfill_events(
    detector: &SignalDetector,
    series: &SeriesMap,
    report_start: NaiveDate,
    severities: &[Severity],
) -> Vec<BackfillEvent> {
    let mut events: Vec<BackfillEvent> = series
        .iter()
        .flat_map(|((term, geo), points)| {
            replay_series(detector, term, geo, points, report_start, severities)
        })
        .collect();

    events.sort_by(|a, b| {
        b.as_of_date
            .cmp(&a.as_of_date)
            .then_with(|| b.severity.cmp(&a.severity))
            .then_with(|| b.z_score.total_cmp(&a.z_score))
            .then_with(|| b.wow_change.total_cmp(&a.wow_change))
    });

    debug!(
        series = series.len(),
        events = events.len(),
        %report_start,
        "backfill replay complete"
    );
    events
}

/// Write `events` as CSV with a header row.
pub fn write_csv<W: io::Write>(events: &[BackfillEvent], writer: W) -> RadarResult<()> {
    let mut writer = csv::Writer::from_writer(writer);
    for event in events {
        writer.serialize(event)?;
    }
    writer.flush()?;
    Ok(())
}
