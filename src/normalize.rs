use crate::models::TimeSeriesPoint;

/// Clean a raw series: drop non-finite values, order by date, and keep the
/// last value seen for any repeated date.
pub fn normalize(points: &[TimeSeriesPoint]) -> Vec<TimeSeriesPoint> {
    let mut cleaned: Vec<TimeSeriesPoint> = points
        .iter()
        .filter(|point| point.value.is_finite())
        .copied()
        .collect();

    // stable, so later duplicates stay after earlier ones
    cleaned.sort_by_key(|point| point.date);

    let mut deduped: Vec<TimeSeriesPoint> = Vec::with_capacity(cleaned.len());
    for point in cleaned {
        match deduped.last_mut() {
            Some(last) if last.date == point.date => *last = point,
            _ => deduped.push(point),
        }
    }
    deduped
}

/// Values of a cleaned series, most recent last.
pub fn values(points: &[TimeSeriesPoint]) -> Vec<f64> {
    normalize(points).iter().map(|point| point.value).collect()
}
