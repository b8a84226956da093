//! Alert deduplication by per-tier cooldown windows.

use std::ops::Range;

use chrono::{DateTime, Duration, Utc};
use tracing::debug;
use uuid::Uuid;

use crate::config::CooldownConfig;
use crate::models::{AlertRecord, Severity};

/// Append-only alert log.
///
/// Cooldown and quality decisions read from here; callers sharing one backing
/// store across jobs must serialize read-then-append per (term, geo, severity).
pub trait AlertHistory {
    /// Records for (term, geo) with `fired_at` inside `window`, any severity.
    fn query_recent(
        &self,
        term: &str,
        geo: &str,
        window: Range<DateTime<Utc>>,
    ) -> Vec<AlertRecord>;

    fn append(&mut self, record: AlertRecord);
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryAlertHistory {
    records: Vec<AlertRecord>,
}

impl InMemoryAlertHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(records: Vec<AlertRecord>) -> Self {
        Self { records }
    }

    pub fn records(&self) -> &[AlertRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl AlertHistory for InMemoryAlertHistory {
    fn query_recent(
        &self,
        term: &str,
        geo: &str,
        window: Range<DateTime<Utc>>,
    ) -> Vec<AlertRecord> {
        self.records
            .iter()
            .filter(|r| r.term == term && r.geo == geo && window.contains(&r.fired_at))
            .cloned()
            .collect()
    }

    fn append(&mut self, record: AlertRecord) {
        self.records.push(record);
    }
}

/// Decides whether a qualifying signal may produce a new notification.
pub struct CooldownTracker<H: AlertHistory> {
    config: CooldownConfig,
    history: H,
}

impl<H: AlertHistory> CooldownTracker<H> {
    pub fn new(config: CooldownConfig, history: H) -> Self {
        Self { config, history }
    }

    pub fn cooldown_for(&self, severity: Severity) -> Duration {
        self.config.window_for(severity)
    }

    /// False if the same (term, geo, severity) fired less than `cooldown` before `now`.
    pub fn should_fire(
        &self,
        term: &str,
        geo: &str,
        severity: Severity,
        cooldown: Duration,
        now: DateTime<Utc>,
    ) -> bool {
        let since = now
            .checked_sub_signed(cooldown)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let blocking = self
            .history
            .query_recent(term, geo, since..DateTime::<Utc>::MAX_UTC)
            .into_iter()
            .filter(|r| r.severity == severity)
            .max_by_key(|r| r.fired_at)
            .filter(|r| now.signed_duration_since(r.fired_at) < cooldown);

        match blocking {
            Some(last) => {
                debug!(
                    term,
                    geo,
                    severity = %severity,
                    fired_at = %last.fired_at,
                    "alert suppressed by cooldown"
                );
                false
            }
            None => true,
        }
    }

    /// `should_fire` with the configured window for `severity`.
    pub fn evaluate(&self, term: &str, geo: &str, severity: Severity, now: DateTime<Utc>) -> bool {
        self.should_fire(term, geo, severity, self.cooldown_for(severity), now)
    }

    /// Append a new alert fired at `now`.
    pub fn record(
        &mut self,
        term: &str,
        geo: &str,
        severity: Severity,
        now: DateTime<Utc>,
    ) -> AlertRecord {
        let record = AlertRecord {
            id: Uuid::new_v4(),
            term: term.to_string(),
            geo: geo.to_string(),
            severity,
            fired_at: now,
            cooldown_until: now
                .checked_add_signed(self.cooldown_for(severity))
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
        };
        self.history.append(record.clone());
        record
    }

    pub fn history(&self) -> &H {
        &self.history
    }

    pub fn into_history(self) -> H {
        self.history
    }
}
