//! Search-interest signal detection.
//!
//! Classifies daily (term, geo) series into EMERGING / WATCH / RISING /
//! BREAKOUT tiers, gates alerts through a breakout quality check and per-tier
//! cooldowns, and rolls intraday snapshots up into a daily view.

pub mod backfill;
pub mod config;
pub mod cooldown;
pub mod detector;
pub mod error;
pub mod insights;
pub mod logging;
pub mod models;
pub mod normalize;
pub mod notify;
pub mod quality;
pub mod report;
pub mod rollup;

pub use backfill::BackfillEvent;
pub use config::{
    AppConfig, CooldownConfig, DetectorConfig, NotifyConfig, QualityConfig, RollupConfig,
};
pub use cooldown::{AlertHistory, CooldownTracker, InMemoryAlertHistory};
pub use detector::{SeriesFeatures, SignalDetector};
pub use error::{RadarError, RadarResult};
pub use models::{
    AlertRecord, DailyRollup, Evidence, FeatureRecord, RollupEntry, SeriesMap, Severity, Signal,
    Snapshot, SnapshotRow, TimeSeriesPoint,
};
pub use notify::{AlertPayload, NotificationPlanner, PlannedAlert};
pub use rollup::RollupAggregator;
