//! Breakout quality gate.

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, TimeZone, Utc};

use crate::cooldown::AlertHistory;
use crate::models::Severity;

/// Demote BREAKOUT to RISING unless the pair already reached RISING or
/// BREAKOUT recently. Other tiers pass through.
pub fn demote(severity: Severity, had_recent_rising_or_breakout: bool) -> Severity {
    match severity {
        Severity::Breakout if !had_recent_rising_or_breakout => Severity::Rising,
        other => other,
    }
}

/// Whether (term, geo) has a RISING or BREAKOUT alert in the `lookback_days`
/// before `as_of_date`. Day boundaries are midnight at `offset`.
pub fn had_recent_rising_or_breakout<H: AlertHistory>(
    history: &H,
    term: &str,
    geo: &str,
    as_of_date: NaiveDate,
    lookback_days: i64,
    offset: FixedOffset,
) -> bool {
    let Some(end) = as_of_date
        .and_hms_opt(0, 0, 0)
        .and_then(|midnight| offset.from_local_datetime(&midnight).single())
    else {
        return false;
    };
    let end = end.with_timezone(&Utc);
    let start = Duration::try_days(lookback_days.max(0))
        .and_then(|lookback| end.checked_sub_signed(lookback))
        .unwrap_or(DateTime::<Utc>::MIN_UTC);

    history
        .query_recent(term, geo, start..end)
        .iter()
        .any(|record| record.severity >= Severity::Rising)
}
