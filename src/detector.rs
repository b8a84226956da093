//! Per-series signal detection.
//!
//! Computes week-over-week change, a z-score against a trailing baseline, a
//! 7-point slope and short-burst features, then runs the severity cascade.

use tracing::debug;

use crate::config::DetectorConfig;
use crate::models::{Evidence, Severity, Signal, TimeSeriesPoint};
use crate::normalize;

const WEEK: usize = 7;
const SHORT_WINDOW: usize = 3;
const PRIOR_WINDOW: usize = 14;
const STREAK_WINDOW: usize = 14;
const EPSILON: f64 = 1e-9;

/// Metrics computed for one cleaned series.
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesFeatures {
    pub wow_change: f64,
    pub z_score: f64,
    pub slope_7d: f64,
    pub latest: f64,
    pub intent_flag: bool,
    pub evidence: Evidence,
}

/// How a matching rule interacts with a tier set by an earlier rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Precedence {
    /// Sets the tier; later rules may replace it.
    Tentative,
    /// Replaces any earlier tier and ends the cascade.
    Override,
    /// Applies only if no tier is set yet, and ends the cascade.
    Fallback,
}

struct SeverityRule {
    name: &'static str,
    precedence: Precedence,
    check: fn(&SeriesFeatures, &DetectorConfig) -> Option<Severity>,
}

/// Evaluated top to bottom.
const RULES: [SeverityRule; 4] = [
    SeverityRule {
        name: "emerging",
        precedence: Precedence::Tentative,
        check: emerging_rule,
    },
    SeverityRule {
        name: "breakout",
        precedence: Precedence::Override,
        check: breakout_rule,
    },
    SeverityRule {
        name: "rising",
        precedence: Precedence::Override,
        check: rising_rule,
    },
    SeverityRule {
        name: "watch",
        precedence: Precedence::Fallback,
        check: watch_rule,
    },
];

fn emerging_rule(f: &SeriesFeatures, config: &DetectorConfig) -> Option<Severity> {
    let t = &config.emerging;
    let e = &f.evidence;

    let level_ok = f.latest >= t.min_level || e.last3_avg >= t.min_level;
    let alive = e.revived || e.nonzero_streak >= t.min_streak;
    let burst = e.spike_3v14 > t.spike_ratio
        || (e.last3_avg >= t.burst_level && e.prev14_avg <= t.quiet_baseline);
    let climbing = e.dod_delta > 0.0 || e.accel > 0.0;

    (level_ok && alive && burst && climbing).then_some(Severity::Emerging)
}

fn breakout_rule(f: &SeriesFeatures, config: &DetectorConfig) -> Option<Severity> {
    let t = &config.breakout;
    if f.z_score > t.min_z && f.wow_change > t.min_wow && f.slope_7d > 0.0 {
        // without commercial intent the breakout gate still counts as RISING
        Some(if f.intent_flag {
            Severity::Breakout
        } else {
            Severity::Rising
        })
    } else {
        None
    }
}

fn rising_rule(f: &SeriesFeatures, config: &DetectorConfig) -> Option<Severity> {
    let t = &config.rising;
    (f.z_score > t.min_z && f.wow_change > t.min_wow && f.slope_7d > 0.0)
        .then_some(Severity::Rising)
}

fn watch_rule(f: &SeriesFeatures, config: &DetectorConfig) -> Option<Severity> {
    let t = &config.watch;
    (f.z_score > t.min_z || f.wow_change > t.min_wow).then_some(Severity::Watch)
}

#[derive(Debug, Clone, Default)]
pub struct SignalDetector {
    config: DetectorConfig,
}

impl SignalDetector {
    pub fn new(config: DetectorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Clean `points` and classify the series. `None` covers both too little
    /// data and no qualifying tier.
    pub fn detect(&self, points: &[TimeSeriesPoint], term: &str, geo: &str) -> Option<Signal> {
        let values = normalize::values(points);
        self.detect_values(&values, term, geo)
    }

    /// Classify an already cleaned series, most recent value last.
    pub fn detect_values(&self, values: &[f64], term: &str, geo: &str) -> Option<Signal> {
        let features = self.compute_features(values, term)?;
        let severity = self.classify(&features)?;

        debug!(
            term,
            geo,
            severity = %severity,
            z_score = features.z_score,
            wow_change = features.wow_change,
            slope_7d = features.slope_7d,
            "signal classified"
        );

        Some(Signal {
            term: term.to_string(),
            geo: geo.to_string(),
            wow_change: features.wow_change,
            z_score: features.z_score,
            slope_7d: features.slope_7d,
            latest: features.latest,
            intent_flag: features.intent_flag,
            severity,
            evidence: features.evidence,
        })
    }

    /// Returns `None` when fewer than `min_points` values are present.
    pub fn compute_features(&self, values: &[f64], term: &str) -> Option<SeriesFeatures> {
        let n = values.len();
        if n < self.config.min_points || n < WEEK {
            return None;
        }

        let last7 = mean(&values[n - WEEK..]);
        let prev7 = if n >= 2 * WEEK {
            mean(&values[n - 2 * WEEK..n - WEEK])
        } else {
            mean(&values[..n - WEEK])
        };
        let wow_change = safe_pct(last7, prev7);

        let window = &values[n.saturating_sub(self.config.baseline_window)..];
        let mu = mean(window);
        let sigma = population_std(window, mu);
        let z_score = (last7 - mu) / if sigma > EPSILON { sigma } else { 1.0 };

        let slope_7d = ols_slope(&values[n - WEEK..]);
        let latest = values[n - 1];
        let intent_flag = self.config.is_intent_term(term);

        let last3_avg = if n >= SHORT_WINDOW {
            mean(&values[n - SHORT_WINDOW..])
        } else {
            latest
        };
        let prior_window = if n >= SHORT_WINDOW + PRIOR_WINDOW {
            &values[n - SHORT_WINDOW - PRIOR_WINDOW..n - SHORT_WINDOW]
        } else {
            &values[..n.saturating_sub(SHORT_WINDOW)]
        };
        let prev14_avg = if prior_window.is_empty() {
            0.0
        } else {
            mean(prior_window)
        };
        let spike_3v14 = safe_pct(last3_avg, prev14_avg);

        let dod_delta = if n >= 2 {
            values[n - 1] - values[n - 2]
        } else {
            0.0
        };
        let prior_delta = if n >= 3 {
            values[n - 2] - values[n - 3]
        } else {
            0.0
        };
        let accel = dod_delta - prior_delta;

        let threshold = self.config.nonzero_threshold;
        let nonzero_streak = values[n.saturating_sub(STREAK_WINDOW)..]
            .iter()
            .rev()
            .take_while(|v| **v >= threshold)
            .count();
        let prev_latest = if n >= 2 { values[n - 2] } else { 0.0 };
        let revived = prev_latest < threshold && latest >= threshold;

        Some(SeriesFeatures {
            wow_change,
            z_score,
            slope_7d,
            latest,
            intent_flag,
            evidence: Evidence {
                last7_avg: last7,
                prev7_avg: prev7,
                mu,
                sigma,
                last3_avg,
                prev14_avg,
                spike_3v14,
                dod_delta,
                accel,
                nonzero_streak,
                revived,
            },
        })
    }

    /// Run the severity cascade, then the near-zero suppression gate.
    pub fn classify(&self, features: &SeriesFeatures) -> Option<Severity> {
        let mut severity: Option<Severity> = None;

        for rule in RULES.iter() {
            let Some(tier) = (rule.check)(features, &self.config) else {
                continue;
            };
            debug!(rule = rule.name, tier = %tier, "severity rule matched");
            match rule.precedence {
                Precedence::Tentative => severity = Some(tier),
                Precedence::Override => {
                    severity = Some(tier);
                    break;
                }
                Precedence::Fallback => {
                    severity = severity.or(Some(tier));
                    break;
                }
            }
        }

        let severity = severity?;
        let floor = self.config.suppress_below;
        if features.latest < floor && features.evidence.last3_avg < floor {
            return None;
        }
        Some(severity)
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Standard deviation with ddof = 0.
fn population_std(values: &[f64], mu: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let variance = values.iter().map(|v| (v - mu).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

/// Relative change of `a` against `b`, with near-zero `b` treated as 1.0.
fn safe_pct(a: f64, b: f64) -> f64 {
    let denom = if b.abs() > EPSILON { b } else { 1.0 };
    (a - b) / denom
}

/// Least-squares slope of `values` against their index positions.
fn ols_slope(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return 0.0;
    }
    let x_mean = (n - 1) as f64 / 2.0;
    let y_mean = mean(values);
    let (sxy, sxx) = values
        .iter()
        .enumerate()
        .fold((0.0, 0.0), |(sxy, sxx), (i, y)| {
            let dx = i as f64 - x_mean;
            (sxy + dx * (y - y_mean), sxx + dx * dx)
        });
    sxy / sxx
}
