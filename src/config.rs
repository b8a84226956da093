//! Application and engine configuration.

use std::path::Path;

use chrono::{Duration, FixedOffset};
use serde::{Deserialize, Serialize};

use crate::error::{RadarError, RadarResult};
use crate::models::Severity;

/// One year.
const MAX_COOLDOWN_HOURS: i64 = 24 * 366;
/// Ten years.
const MAX_LOOKBACK_DAYS: i64 = 3660;

/// z-score / week-over-week gate for one tier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TierThresholds {
    pub min_z: f64,
    pub min_wow: f64,
}

/// Revival / short-burst gate for the EMERGING tier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EmergingThresholds {
    /// `latest` or `last3_avg` must reach this level.
    #[serde(default = "default_emerging_min_level")]
    pub min_level: f64,
    /// Trailing non-zero days needed when the series was not just revived.
    #[serde(default = "default_emerging_min_streak")]
    pub min_streak: usize,
    /// `spike_3v14` must exceed this...
    #[serde(default = "default_emerging_spike_ratio")]
    pub spike_ratio: f64,
    /// ...or `last3_avg` must reach `burst_level` from a baseline at most `quiet_baseline`.
    #[serde(default = "default_emerging_burst_level")]
    pub burst_level: f64,
    #[serde(default = "default_emerging_quiet_baseline")]
    pub quiet_baseline: f64,
}

fn default_emerging_min_level() -> f64 {
    5.0
}

fn default_emerging_min_streak() -> usize {
    2
}

fn default_emerging_spike_ratio() -> f64 {
    0.80
}

fn default_emerging_burst_level() -> f64 {
    10.0
}

fn default_emerging_quiet_baseline() -> f64 {
    5.0
}

impl Default for EmergingThresholds {
    fn default() -> Self {
        Self {
            min_level: default_emerging_min_level(),
            min_streak: default_emerging_min_streak(),
            spike_ratio: default_emerging_spike_ratio(),
            burst_level: default_emerging_burst_level(),
            quiet_baseline: default_emerging_quiet_baseline(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectorConfig {
    /// Valid points required after cleaning.
    #[serde(default = "default_min_points")]
    pub min_points: usize,
    /// Trailing points used for the z-score baseline.
    #[serde(default = "default_baseline_window")]
    pub baseline_window: usize,
    /// Values at or above this count as "non-zero" for streak/revival.
    #[serde(default = "default_nonzero_threshold")]
    pub nonzero_threshold: f64,
    /// Signals with both `latest` and `last3_avg` under this are discarded.
    #[serde(default = "default_suppress_below")]
    pub suppress_below: f64,
    #[serde(default = "default_breakout")]
    pub breakout: TierThresholds,
    #[serde(default = "default_rising")]
    pub rising: TierThresholds,
    /// WATCH fires on either condition, not both.
    #[serde(default = "default_watch")]
    pub watch: TierThresholds,
    #[serde(default)]
    pub emerging: EmergingThresholds,
    /// Substrings marking high commercial intent, matched case-insensitively.
    #[serde(default = "default_intent_patterns")]
    pub intent_patterns: Vec<String>,
}

fn default_min_points() -> usize {
    21
}

fn default_baseline_window() -> usize {
    56
}

fn default_nonzero_threshold() -> f64 {
    1.0
}

fn default_suppress_below() -> f64 {
    2.0
}

fn default_breakout() -> TierThresholds {
    TierThresholds {
        min_z: 2.5,
        min_wow: 0.35,
    }
}

fn default_rising() -> TierThresholds {
    TierThresholds {
        min_z: 2.0,
        min_wow: 0.25,
    }
}

fn default_watch() -> TierThresholds {
    TierThresholds {
        min_z: 1.5,
        min_wow: 0.25,
    }
}

fn default_intent_patterns() -> Vec<String> {
    [
        "best",
        "routine",
        "where to buy",
        "near me",
        "in korea",
        "korean",
        "k beauty",
        "k-beauty",
    ]
    .iter()
    .map(|p| p.to_string())
    .collect()
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            min_points: default_min_points(),
            baseline_window: default_baseline_window(),
            nonzero_threshold: default_nonzero_threshold(),
            suppress_below: default_suppress_below(),
            breakout: default_breakout(),
            rising: default_rising(),
            watch: default_watch(),
            emerging: EmergingThresholds::default(),
            intent_patterns: default_intent_patterns(),
        }
    }
}

impl DetectorConfig {
    /// Validate threshold ordering and window sizes.
    pub fn validate(&self) -> RadarResult<()> {
        // last7/prev7 and last3/prev14 windows need at least 17 points
        if self.min_points < 17 {
            return Err(RadarError::Config(format!(
                "detector.min_points ({}) must be at least 17",
                self.min_points
            )));
        }
        if self.baseline_window < 7 {
            return Err(RadarError::Config(format!(
                "detector.baseline_window ({}) must be at least 7",
                self.baseline_window
            )));
        }
        if self.breakout.min_z < self.rising.min_z || self.breakout.min_wow < self.rising.min_wow {
            return Err(RadarError::Config(
                "detector.breakout thresholds must not be below detector.rising".to_string(),
            ));
        }
        if self.emerging.min_streak == 0 {
            return Err(RadarError::Config(
                "detector.emerging.min_streak must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn is_intent_term(&self, term: &str) -> bool {
        let lowered = term.to_lowercase();
        self.intent_patterns
            .iter()
            .any(|pattern| lowered.contains(&pattern.to_lowercase()))
    }
}

/// Per-tier cooldown windows in hours.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CooldownConfig {
    #[serde(default = "default_breakout_hours")]
    pub breakout_hours: i64,
    #[serde(default = "default_rising_hours")]
    pub rising_hours: i64,
    #[serde(default = "default_short_hours")]
    pub emerging_hours: i64,
    #[serde(default = "default_short_hours")]
    pub watch_hours: i64,
}

fn default_breakout_hours() -> i64 {
    72
}

fn default_rising_hours() -> i64 {
    12
}

fn default_short_hours() -> i64 {
    6
}

impl Default for CooldownConfig {
    fn default() -> Self {
        Self {
            breakout_hours: default_breakout_hours(),
            rising_hours: default_rising_hours(),
            emerging_hours: default_short_hours(),
            watch_hours: default_short_hours(),
        }
    }
}

impl CooldownConfig {
    pub fn hours_for(&self, severity: Severity) -> i64 {
        match severity {
            Severity::Breakout => self.breakout_hours,
            Severity::Rising => self.rising_hours,
            Severity::Emerging => self.emerging_hours,
            Severity::Watch => self.watch_hours,
        }
    }

    pub fn window_for(&self, severity: Severity) -> Duration {
        Duration::try_hours(self.hours_for(severity).max(0)).unwrap_or(Duration::MAX)
    }

    pub fn validate(&self) -> RadarResult<()> {
        for severity in Severity::ALL {
            let hours = self.hours_for(severity);
            if !(0..=MAX_COOLDOWN_HOURS).contains(&hours) {
                return Err(RadarError::Config(format!(
                    "cooldown for {severity} ({hours}h) must be within 0..={MAX_COOLDOWN_HOURS}"
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityConfig {
    /// Days of history searched for a prior RISING/BREAKOUT alert.
    #[serde(default = "default_quality_lookback_days")]
    pub lookback_days: i64,
}

fn default_quality_lookback_days() -> i64 {
    14
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            lookback_days: default_quality_lookback_days(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollupConfig {
    #[serde(default = "default_min_support")]
    pub min_support: usize,
    /// BREAKOUT rows needed for a BREAKOUT day.
    #[serde(default = "default_breakout_hits")]
    pub breakout_hits: usize,
    /// RISING rows needed for a RISING day.
    #[serde(default = "default_rising_hits")]
    pub rising_hits: usize,
    #[serde(default = "default_rollup_limit")]
    pub limit: usize,
}

fn default_min_support() -> usize {
    2
}

fn default_breakout_hits() -> usize {
    1
}

fn default_rising_hits() -> usize {
    2
}

fn default_rollup_limit() -> usize {
    10
}

impl Default for RollupConfig {
    fn default() -> Self {
        Self {
            min_support: default_min_support(),
            breakout_hits: default_breakout_hits(),
            rising_hits: default_rising_hits(),
            limit: default_rollup_limit(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotifyConfig {
    /// WATCH only appears in summaries by default.
    #[serde(default = "default_notify_severities")]
    pub severities: Vec<Severity>,
    #[serde(default = "default_notify_limit")]
    pub limit: usize,
    #[serde(default = "default_min_latest")]
    pub min_latest: f64,
}

fn default_notify_severities() -> Vec<Severity> {
    vec![Severity::Breakout, Severity::Rising, Severity::Emerging]
}

fn default_notify_limit() -> usize {
    20
}

fn default_min_latest() -> f64 {
    2.0
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            severities: default_notify_severities(),
            limit: default_notify_limit(),
            min_latest: default_min_latest(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Reporting timezone as a whole-hour UTC offset.
    #[serde(default = "default_reporting_utc_offset_hours")]
    pub reporting_utc_offset_hours: i32,
    /// Days of stored series loaded per detection run.
    #[serde(default = "default_series_lookback_days")]
    pub series_lookback_days: i64,
    #[serde(default)]
    pub detector: DetectorConfig,
    #[serde(default)]
    pub cooldown: CooldownConfig,
    #[serde(default)]
    pub quality: QualityConfig,
    #[serde(default)]
    pub rollup: RollupConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
}

fn default_reporting_utc_offset_hours() -> i32 {
    9
}

fn default_series_lookback_days() -> i64 {
    90
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            reporting_utc_offset_hours: default_reporting_utc_offset_hours(),
            series_lookback_days: default_series_lookback_days(),
            detector: DetectorConfig::default(),
            cooldown: CooldownConfig::default(),
            quality: QualityConfig::default(),
            rollup: RollupConfig::default(),
            notify: NotifyConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load from `path` if it exists, otherwise fall back to defaults.
    pub fn load(path: &str) -> RadarResult<Self> {
        if Path::new(path).exists() {
            Self::from_file(path)
        } else {
            tracing::warn!(path = %path, "Config file not found, using defaults");
            Ok(Self::default())
        }
    }

    pub fn from_file(path: &str) -> RadarResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| RadarError::Config(format!("Failed to read config: {e}")))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> RadarResult<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| RadarError::Config(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> RadarResult<()> {
        self.detector.validate()?;
        if self.reporting_offset().is_none() {
            return Err(RadarError::Config(format!(
                "reporting_utc_offset_hours ({}) is out of range",
                self.reporting_utc_offset_hours
            )));
        }
        self.cooldown.validate()?;
        if !(1..=MAX_LOOKBACK_DAYS).contains(&self.quality.lookback_days) {
            return Err(RadarError::Config(format!(
                "quality.lookback_days ({}) must be within 1..={MAX_LOOKBACK_DAYS}",
                self.quality.lookback_days
            )));
        }
        if self.series_lookback_days > MAX_LOOKBACK_DAYS {
            return Err(RadarError::Config(format!(
                "series_lookback_days ({}) must not exceed {MAX_LOOKBACK_DAYS}",
                self.series_lookback_days
            )));
        }
        if self.series_lookback_days < self.detector.min_points as i64 {
            return Err(RadarError::Config(format!(
                "series_lookback_days ({}) is shorter than detector.min_points ({})",
                self.series_lookback_days, self.detector.min_points
            )));
        }
        if self.rollup.min_support == 0 {
            return Err(RadarError::Config(
                "rollup.min_support must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn reporting_offset(&self) -> Option<FixedOffset> {
        FixedOffset::east_opt(self.reporting_utc_offset_hours.checked_mul(3600)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_thresholds() {
        let config = AppConfig::default();
        assert_eq!(config.detector.min_points, 21);
        assert_eq!(config.detector.baseline_window, 56);
        assert_eq!(config.detector.breakout.min_z, 2.5);
        assert_eq!(config.detector.rising.min_wow, 0.25);
        assert_eq!(config.cooldown.hours_for(Severity::Breakout), 72);
        assert_eq!(config.cooldown.hours_for(Severity::Rising), 12);
        assert_eq!(config.cooldown.hours_for(Severity::Emerging), 6);
        assert_eq!(config.cooldown.hours_for(Severity::Watch), 6);
        assert_eq!(config.rollup.min_support, 2);
        assert_eq!(config.quality.lookback_days, 14);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_toml_keeps_other_defaults() {
        let config = AppConfig::from_toml(
            r#"
            reporting_utc_offset_hours = 0

            [detector.breakout]
            min_z = 3.0
            min_wow = 0.5

            [cooldown]
            rising_hours = 24

            [notify]
            severities = ["BREAKOUT"]
            "#,
        )
        .unwrap();

        assert_eq!(config.reporting_utc_offset_hours, 0);
        assert_eq!(config.detector.breakout.min_z, 3.0);
        assert_eq!(config.detector.rising.min_z, 2.0);
        assert_eq!(config.cooldown.rising_hours, 24);
        assert_eq!(config.cooldown.breakout_hours, 72);
        assert_eq!(config.notify.severities, vec![Severity::Breakout]);
        assert_eq!(config.notify.limit, 20);
    }

    #[test]
    fn rejects_breakout_below_rising() {
        let err = AppConfig::from_toml(
            r#"
            [detector.breakout]
            min_z = 1.0
            min_wow = 0.35
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, RadarError::Config(_)));
    }

    #[test]
    fn rejects_out_of_range_offset() {
        let config = AppConfig {
            reporting_utc_offset_hours: 30,
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_out_of_range_cooldown() {
        let err = AppConfig::from_toml("[cooldown]\nbreakout_hours = 9223372036854775807")
            .unwrap_err();
        assert!(matches!(err, RadarError::Config(_)));

        let err = AppConfig::from_toml("[cooldown]\nwatch_hours = -1").unwrap_err();
        assert!(matches!(err, RadarError::Config(_)));

        let config = AppConfig::from_toml("[cooldown]\nemerging_hours = 0").unwrap();
        assert_eq!(config.cooldown.window_for(Severity::Emerging), Duration::zero());
    }

    #[test]
    fn rejects_out_of_range_lookbacks() {
        for toml in [
            "[quality]\nlookback_days = 9223372036854775807",
            "[quality]\nlookback_days = -3",
            "[quality]\nlookback_days = 0",
            "series_lookback_days = 9223372036854775807",
        ] {
            let err = AppConfig::from_toml(toml).unwrap_err();
            assert!(matches!(err, RadarError::Config(_)), "{toml} was accepted");
        }
    }

    #[test]
    fn window_saturates_instead_of_overflowing() {
        let config = CooldownConfig {
            breakout_hours: i64::MAX,
            ..CooldownConfig::default()
        };
        assert_eq!(config.window_for(Severity::Breakout), Duration::MAX);
        assert!(config.validate().is_err());
    }

    #[test]
    fn intent_match_is_case_insensitive() {
        let config = DetectorConfig::default();
        assert!(config.is_intent_term("Best Sunscreen"));
        assert!(config.is_intent_term("K-Beauty toner"));
        assert!(!config.is_intent_term("snail mucin"));
    }

    #[test]
    fn configured_patterns_ignore_case() {
        let config = AppConfig::from_toml(
            r#"
            [detector]
            intent_patterns = ["Where To Buy", "OLIVE YOUNG"]
            "#,
        )
        .unwrap();
        assert!(config.detector.is_intent_term("cica cream where to buy"));
        assert!(config.detector.is_intent_term("Olive Young sunscreen"));
        assert!(!config.detector.is_intent_term("best toner"));
    }
}
