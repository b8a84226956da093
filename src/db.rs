use std::ops::Range;

use anyhow::Context;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::types::Json;
use sqlx::{PgConnection, PgPool, Row};
use uuid::Uuid;

use trend_radar::{
    AlertRecord, DailyRollup, Evidence, FeatureRecord, SeriesMap, Severity, Snapshot,
    SnapshotRow, TimeSeriesPoint,
};

/// Advisory lock key serializing cooldown read-then-append across jobs.
const ALERT_LOCK_KEY: i64 = 0x7472_656e_6473;

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

pub async fn import_csv(pool: &PgPool, csv_path: &std::path::Path) -> anyhow::Result<usize> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        term: String,
        geo: String,
        date: NaiveDate,
        value: Option<f64>,
        source: Option<String>,
    }

    let mut reader = csv::Reader::from_path(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    let mut upserted = 0usize;

    for result in reader.deserialize::<CsvRow>() {
        let row = result?;
        let Some(value) = row.value.filter(|v| v.is_finite()) else {
            continue;
        };

        let result = sqlx::query(
            r#"
            INSERT INTO trend_radar.trend_series (term, geo, date, value, source)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (term, geo, date) DO UPDATE
            SET value = EXCLUDED.value, collected_at = NOW()
            "#,
        )
        .bind(&row.term)
        .bind(&row.geo)
        .bind(row.date)
        .bind(value)
        .bind(row.source.as_deref().unwrap_or("google_trends"))
        .execute(pool)
        .await?;

        if result.rows_affected() > 0 {
            upserted += 1;
        }
    }

    Ok(upserted)
}

/// Stored series with `since <= date <= until`, grouped by (term, geo).
pub async fn fetch_series(
    pool: &PgPool,
    since: NaiveDate,
    until: NaiveDate,
) -> anyhow::Result<SeriesMap> {
    let rows = sqlx::query(
        "SELECT term, geo, date, value \
         FROM trend_radar.trend_series \
         WHERE date >= $1 AND date <= $2 \
         ORDER BY term, geo, date",
    )
    .bind(since)
    .bind(until)
    .fetch_all(pool)
    .await?;

    let mut series = SeriesMap::new();
    for row in rows {
        series
            .entry((row.get("term"), row.get("geo")))
            .or_default()
            .push(TimeSeriesPoint::new(row.get("date"), row.get("value")));
    }
    Ok(series)
}

pub async fn upsert_feature(pool: &PgPool, feature: &FeatureRecord) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO trend_radar.trend_features
        (term, geo, as_of_date, wow_change, z_score, slope_7d, latest, intent_flag,
         severity, evidence)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        ON CONFLICT (term, geo, as_of_date) DO UPDATE
        SET wow_change = EXCLUDED.wow_change,
            z_score = EXCLUDED.z_score,
            slope_7d = EXCLUDED.slope_7d,
            latest = EXCLUDED.latest,
            intent_flag = EXCLUDED.intent_flag,
            severity = EXCLUDED.severity,
            evidence = EXCLUDED.evidence,
            computed_at = NOW()
        "#,
    )
    .bind(&feature.term)
    .bind(&feature.geo)
    .bind(feature.as_of_date)
    .bind(feature.wow_change)
    .bind(feature.z_score)
    .bind(feature.slope_7d)
    .bind(feature.latest)
    .bind(feature.intent_flag)
    .bind(feature.severity.as_str())
    .bind(Json(&feature.evidence))
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn fetch_features(
    pool: &PgPool,
    as_of_date: NaiveDate,
) -> anyhow::Result<Vec<FeatureRecord>> {
    let rows = sqlx::query(
        "SELECT term, geo, as_of_date, wow_change, z_score, slope_7d, latest, intent_flag, \
         severity, evidence \
         FROM trend_radar.trend_features \
         WHERE as_of_date = $1 \
         ORDER BY z_score DESC",
    )
    .bind(as_of_date)
    .fetch_all(pool)
    .await?;

    let mut features = Vec::with_capacity(rows.len());
    for row in rows {
        let severity: String = row.get("severity");
        let evidence: Json<Evidence> = row.get("evidence");
        features.push(FeatureRecord {
            term: row.get("term"),
            geo: row.get("geo"),
            as_of_date: row.get("as_of_date"),
            wow_change: row.get("wow_change"),
            z_score: row.get("z_score"),
            slope_7d: row.get("slope_7d"),
            latest: row.get("latest"),
            intent_flag: row.get("intent_flag"),
            severity: severity.parse()?,
            evidence: evidence.0,
        });
    }
    Ok(features)
}

/// Holds until the surrounding transaction ends.
pub async fn lock_alerts(conn: &mut PgConnection) -> anyhow::Result<()> {
    sqlx::query("SELECT pg_advisory_xact_lock($1)")
        .bind(ALERT_LOCK_KEY)
        .execute(conn)
        .await
        .context("failed to take alert lock")?;
    Ok(())
}

pub async fn fetch_alerts_since(
    conn: &mut PgConnection,
    since: DateTime<Utc>,
) -> anyhow::Result<Vec<AlertRecord>> {
    let rows = sqlx::query(
        "SELECT id, term, geo, severity, fired_at, cooldown_until \
         FROM trend_radar.alerts \
         WHERE fired_at >= $1 \
         ORDER BY fired_at",
    )
    .bind(since)
    .fetch_all(conn)
    .await?;

    let mut alerts = Vec::with_capacity(rows.len());
    for row in rows {
        let severity: String = row.get("severity");
        alerts.push(AlertRecord {
            id: row.get("id"),
            term: row.get("term"),
            geo: row.get("geo"),
            severity: severity.parse()?,
            fired_at: row.get("fired_at"),
            cooldown_until: row.get("cooldown_until"),
        });
    }
    Ok(alerts)
}

pub async fn insert_alert(conn: &mut PgConnection, alert: &AlertRecord) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO trend_radar.alerts (id, term, geo, severity, fired_at, cooldown_until)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(alert.id)
    .bind(&alert.term)
    .bind(&alert.geo)
    .bind(alert.severity.as_str())
    .bind(alert.fired_at)
    .bind(alert.cooldown_until)
    .execute(conn)
    .await?;
    Ok(())
}

/// Store one snapshot; re-running within the same hour replaces its rows.
pub async fn upsert_snapshot(
    pool: &PgPool,
    snapshot_at: DateTime<Utc>,
    rows: &[SnapshotRow],
) -> anyhow::Result<Uuid> {
    let mut tx = pool.begin().await?;

    let snapshot_id: Uuid = sqlx::query(
        r#"
        INSERT INTO trend_radar.snapshots (id, snapshot_at, row_count)
        VALUES ($1, $2, $3)
        ON CONFLICT (snapshot_at) DO UPDATE
        SET row_count = EXCLUDED.row_count
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(snapshot_at)
    .bind(rows.len() as i32)
    .fetch_one(&mut *tx)
    .await?
    .get("id");

    sqlx::query("DELETE FROM trend_radar.snapshot_features WHERE snapshot_id = $1")
        .bind(snapshot_id)
        .execute(&mut *tx)
        .await?;

    for row in rows {
        sqlx::query(
            r#"
            INSERT INTO trend_radar.snapshot_features
            (snapshot_id, term, geo, wow_change, z_score, slope_7d, latest, severity)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(snapshot_id)
        .bind(&row.term)
        .bind(&row.geo)
        .bind(row.wow_change)
        .bind(row.z_score)
        .bind(row.slope_7d)
        .bind(row.latest)
        .bind(row.severity.as_str())
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(snapshot_id)
}

pub async fn fetch_snapshots(
    pool: &PgPool,
    window: Range<DateTime<Utc>>,
) -> anyhow::Result<Vec<Snapshot>> {
    let rows = sqlx::query(
        "SELECT s.id, s.snapshot_at, f.term, f.geo, f.wow_change, f.z_score, \
         f.slope_7d, f.latest, f.severity \
         FROM trend_radar.snapshots s \
         LEFT JOIN trend_radar.snapshot_features f ON f.snapshot_id = s.id \
         WHERE s.snapshot_at >= $1 AND s.snapshot_at < $2 \
         ORDER BY s.snapshot_at, s.id",
    )
    .bind(window.start)
    .bind(window.end)
    .fetch_all(pool)
    .await?;

    let mut snapshots: Vec<Snapshot> = Vec::new();
    for row in rows {
        let id: Uuid = row.get("id");
        if snapshots.last().map(|s| s.id) != Some(id) {
            snapshots.push(Snapshot {
                id,
                snapshot_at: row.get("snapshot_at"),
                rows: Vec::new(),
            });
        }

        // Empty snapshots come back as a single row of NULL feature columns.
        let term: Option<String> = row.get("term");
        let Some(term) = term else {
            continue;
        };
        let severity: String = row.get("severity");
        let feature_row = SnapshotRow {
            term,
            geo: row.get("geo"),
            wow_change: row.get("wow_change"),
            z_score: row.get("z_score"),
            slope_7d: row.get("slope_7d"),
            latest: row.get("latest"),
            severity: severity.parse::<Severity>()?,
        };
        if let Some(snapshot) = snapshots.last_mut() {
            snapshot.rows.push(feature_row);
        }
    }
    Ok(snapshots)
}

pub async fn upsert_daily_rollup(pool: &PgPool, rollup: &DailyRollup) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO trend_radar.daily_rollups (report_date, payload)
        VALUES ($1, $2)
        ON CONFLICT (report_date) DO UPDATE
        SET payload = EXCLUDED.payload, updated_at = NOW()
        "#,
    )
    .bind(rollup.report_date)
    .bind(Json(rollup))
    .execute(pool)
    .await?;
    Ok(())
}
