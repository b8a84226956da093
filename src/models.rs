use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::RadarError;

/// One daily observation of a search-interest index.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeSeriesPoint {
    pub date: NaiveDate,
    /// Missing observations are carried as NaN and dropped by the normalizer.
    pub value: f64,
}

impl TimeSeriesPoint {
    pub fn new(date: NaiveDate, value: f64) -> Self {
        Self { date, value }
    }
}

/// Signal tiers in increasing order of urgency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Emerging,
    Watch,
    Rising,
    Breakout,
}

impl Severity {
    pub const ALL: [Severity; 4] = [
        Severity::Emerging,
        Severity::Watch,
        Severity::Rising,
        Severity::Breakout,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Emerging => "EMERGING",
            Severity::Watch => "WATCH",
            Severity::Rising => "RISING",
            Severity::Breakout => "BREAKOUT",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = RadarError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "EMERGING" => Ok(Severity::Emerging),
            "WATCH" => Ok(Severity::Watch),
            "RISING" => Ok(Severity::Rising),
            "BREAKOUT" => Ok(Severity::Breakout),
            other => Err(RadarError::UnknownSeverity(other.to_string())),
        }
    }
}

/// Diagnostic sub-metrics kept alongside a signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    pub last7_avg: f64,
    pub prev7_avg: f64,
    pub mu: f64,
    pub sigma: f64,
    pub last3_avg: f64,
    #[serde(rename = "prev14_avg_excl_last3")]
    pub prev14_avg: f64,
    pub spike_3v14: f64,
    pub dod_delta: f64,
    #[serde(rename = "accel_2d")]
    pub accel: f64,
    #[serde(rename = "nonzero_streak_14d")]
    pub nonzero_streak: usize,
    #[serde(rename = "revived_0_to_nonzero")]
    pub revived: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub term: String,
    pub geo: String,
    pub wow_change: f64,
    pub z_score: f64,
    pub slope_7d: f64,
    pub latest: f64,
    pub intent_flag: bool,
    pub severity: Severity,
    pub evidence: Evidence,
}

/// Daily points per (term, geo).
pub type SeriesMap = BTreeMap<(String, String), Vec<TimeSeriesPoint>>;

/// Persisted detector output, unique on (term, geo, as_of_date).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRecord {
    pub term: String,
    pub geo: String,
    pub as_of_date: NaiveDate,
    pub wow_change: f64,
    pub z_score: f64,
    pub slope_7d: f64,
    pub latest: f64,
    pub intent_flag: bool,
    pub severity: Severity,
    pub evidence: Evidence,
}

impl FeatureRecord {
    pub fn from_signal(signal: Signal, as_of_date: NaiveDate) -> Self {
        Self {
            term: signal.term,
            geo: signal.geo,
            as_of_date,
            wow_change: signal.wow_change,
            z_score: signal.z_score,
            slope_7d: signal.slope_7d,
            latest: signal.latest,
            intent_flag: signal.intent_flag,
            severity: signal.severity,
            evidence: signal.evidence,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRecord {
    pub id: Uuid,
    pub term: String,
    pub geo: String,
    pub severity: Severity,
    pub fired_at: DateTime<Utc>,
    pub cooldown_until: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotRow {
    pub term: String,
    pub geo: String,
    pub wow_change: f64,
    pub z_score: f64,
    pub slope_7d: f64,
    pub latest: f64,
    pub severity: Severity,
}

impl From<&FeatureRecord> for SnapshotRow {
    fn from(feature: &FeatureRecord) -> Self {
        Self {
            term: feature.term.clone(),
            geo: feature.geo.clone(),
            wow_change: feature.wow_change,
            z_score: feature.z_score,
            slope_7d: feature.slope_7d,
            latest: feature.latest,
            severity: feature.severity,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub id: Uuid,
    pub snapshot_at: DateTime<Utc>,
    pub rows: Vec<SnapshotRow>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollupEntry {
    pub term: String,
    pub geo: String,
    pub support: usize,
    pub max_z: f64,
    pub median_wow: f64,
    pub median_slope: f64,
    pub max_latest: f64,
    pub breakout_hits: usize,
    pub rising_hits: usize,
    pub severity_day: Severity,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyRollup {
    pub report_date: NaiveDate,
    pub min_support: usize,
    pub snapshot_count: usize,
    pub top: Vec<RollupEntry>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_order_follows_urgency() {
        assert!(Severity::Emerging < Severity::Watch);
        assert!(Severity::Watch < Severity::Rising);
        assert!(Severity::Rising < Severity::Breakout);
        assert_eq!(Severity::ALL.iter().max(), Some(&Severity::Breakout));
    }

    #[test]
    fn severity_parses_stored_names() {
        for severity in Severity::ALL {
            assert_eq!(severity.as_str().parse::<Severity>().unwrap(), severity);
        }
        assert_eq!("rising".parse::<Severity>().unwrap(), Severity::Rising);
        assert!("HOT".parse::<Severity>().is_err());
    }

    #[test]
    fn evidence_serializes_with_stable_keys() {
        let evidence = Evidence {
            last7_avg: 1.0,
            prev7_avg: 0.5,
            mu: 0.7,
            sigma: 0.2,
            last3_avg: 1.5,
            prev14_avg: 0.4,
            spike_3v14: 2.75,
            dod_delta: 1.0,
            accel: 0.5,
            nonzero_streak: 3,
            revived: false,
        };
        let value = serde_json::to_value(&evidence).unwrap();
        assert_eq!(value["prev14_avg_excl_last3"], 0.4);
        assert_eq!(value["accel_2d"], 0.5);
        assert_eq!(value["nonzero_streak_14d"], 3);
        assert_eq!(value["revived_0_to_nonzero"], false);
        assert_eq!(serde_json::to_value(Severity::Breakout).unwrap(), "BREAKOUT");
    }

    #[test]
    fn feature_record_keeps_every_signal_field() {
        let evidence = Evidence {
            last7_avg: 40.0,
            prev7_avg: 20.0,
            mu: 18.0,
            sigma: 6.0,
            last3_avg: 45.0,
            prev14_avg: 19.0,
            spike_3v14: 1.37,
            dod_delta: 2.0,
            accel: 1.0,
            nonzero_streak: 14,
            revived: false,
        };
        let signal = Signal {
            term: "best sun stick".to_string(),
            geo: "JP".to_string(),
            wow_change: 1.0,
            z_score: 3.1,
            slope_7d: 2.5,
            latest: 48.0,
            intent_flag: true,
            severity: Severity::Breakout,
            evidence: evidence.clone(),
        };
        let as_of = NaiveDate::from_ymd_opt(2026, 3, 20).unwrap();
        let record = FeatureRecord::from_signal(signal, as_of);

        assert_eq!(record.as_of_date, as_of);
        assert!(record.intent_flag);
        assert_eq!(record.severity, Severity::Breakout);
        assert_eq!(record.z_score, 3.1);
        assert_eq!(record.evidence, evidence);
    }
}
