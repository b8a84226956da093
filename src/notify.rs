//! Notification planning: quality gate, then cooldown, then payload.
//!
//! Nothing here performs I/O; the caller delivers payloads and persists the
//! alert records.

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use serde::Serialize;
use tracing::{debug, info};

use crate::config::{NotifyConfig, QualityConfig};
use crate::cooldown::{AlertHistory, CooldownTracker};
use crate::error::RadarResult;
use crate::insights::{make_insight, InsightCard};
use crate::models::{AlertRecord, Evidence, FeatureRecord, Severity};
use crate::quality;

/// Outbound notification body.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertPayload {
    pub severity: Severity,
    /// Severity before the quality gate.
    pub detected_severity: Severity,
    pub term: String,
    pub geo: String,
    pub as_of_date: NaiveDate,
    pub wow_change: f64,
    pub z_score: f64,
    pub slope_7d: f64,
    pub latest: f64,
    pub evidence: Evidence,
    pub insight: InsightCard,
    pub fired_at: DateTime<Utc>,
}

impl AlertPayload {
    /// One-line header, e.g. `BREAKOUT | best toner (US)`.
    pub fn headline(&self) -> String {
        format!("{} | {} ({})", self.severity, self.term, self.geo)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlannedAlert {
    pub payload: AlertPayload,
    pub record: AlertRecord,
}

/// Render payloads as JSON lines, in plan order. Rendering happens before the
/// alert records are committed; the lines are written only after.
pub fn outbox_lines(planned: &[PlannedAlert]) -> RadarResult<Vec<String>> {
    planned
        .iter()
        .map(|alert| Ok(serde_json::to_string(&alert.payload)?))
        .collect()
}

#[derive(Debug, Clone)]
pub struct NotificationPlanner {
    notify: NotifyConfig,
    quality: QualityConfig,
    offset: FixedOffset,
}

impl NotificationPlanner {
    pub fn new(notify: NotifyConfig, quality: QualityConfig, offset: FixedOffset) -> Self {
        Self {
            notify,
            quality,
            offset,
        }
    }

    /// Candidates with a notified severity and enough volume, strongest first.
    pub fn select_candidates<'a>(&self, features: &'a [FeatureRecord]) -> Vec<&'a FeatureRecord> {
        let mut candidates: Vec<&FeatureRecord> = features
            .iter()
            .filter(|f| self.notify.severities.contains(&f.severity))
            .filter(|f| f.latest >= self.notify.min_latest)
            .collect();
        candidates.sort_by(|a, b| {
            b.severity
                .cmp(&a.severity)
                .then_with(|| b.z_score.total_cmp(&a.z_score))
        });
        candidates.truncate(self.notify.limit);
        candidates
    }

    /// Approve notifications for `features`, appending a record to the
    /// tracker's history for each one.
    pub fn plan<H: AlertHistory>(
        &self,
        features: &[FeatureRecord],
        tracker: &mut CooldownTracker<H>,
        now: DateTime<Utc>,
    ) -> Vec<PlannedAlert> {
        let candidates = self.select_candidates(features);
        let mut planned = Vec::new();

        for feature in candidates {
            let severity = if feature.severity == Severity::Breakout {
                let had_recent = quality::had_recent_rising_or_breakout(
                    tracker.history(),
                    &feature.term,
                    &feature.geo,
                    feature.as_of_date,
                    self.quality.lookback_days,
                    self.offset,
                );
                quality::demote(feature.severity, had_recent)
            } else {
                feature.severity
            };

            if severity != feature.severity {
                debug!(term = %feature.term, geo = %feature.geo, "breakout demoted to rising");
            }

            if !tracker.evaluate(&feature.term, &feature.geo, severity, now) {
                continue;
            }

            let record = tracker.record(&feature.term, &feature.geo, severity, now);
            planned.push(PlannedAlert {
                payload: AlertPayload {
                    severity,
                    detected_severity: feature.severity,
                    term: feature.term.clone(),
                    geo: feature.geo.clone(),
                    as_of_date: feature.as_of_date,
                    wow_change: feature.wow_change,
                    z_score: feature.z_score,
                    slope_7d: feature.slope_7d,
                    latest: feature.latest,
                    evidence: feature.evidence.clone(),
                    insight: make_insight(&feature.term),
                    fired_at: now,
                },
                record,
            });
        }

        info!(
            candidates = features.len(),
            approved = planned.len(),
            "notification plan ready"
        );
        planned
    }
}
