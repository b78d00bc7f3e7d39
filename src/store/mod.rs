//! Relational Argo stores backed by SQLite
//!
//! Two stores of identical schema exist side by side: the stable "dev"
//! snapshot and the growing "live" store. Each allocates global profile
//! IDs from its own half-open range so the two ID spaces never collide.
//! This module provides:
//! - Transactional profile upserts keyed by the natural key
//! - A guarded read-only query surface with a row cap and timeout
//! - Spatial helpers (radius, bounding box, trajectories)
//! - Automation run bookkeeping

mod guard;
mod schema;
mod spatial;

pub use guard::*;
pub use schema::*;
pub use spatial::*;

use crate::error::{Error, Result};
use crate::parse::{ParsedLevel, ParsedProfile};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::{Column, FromRow, Row, TypeInfo};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

/// Which of the two parallel stores a handle points at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    Dev,
    Live,
}

impl std::fmt::Display for StoreKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreKind::Dev => write!(f, "dev"),
            StoreKind::Live => write!(f, "live"),
        }
    }
}

impl FromStr for StoreKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "dev" => Ok(StoreKind::Dev),
            "live" => Ok(StoreKind::Live),
            _ => Err(Error::Config(format!("Unknown store: {}", s))),
        }
    }
}

/// Half-open `[start, end)` allocation range for global profile IDs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdRange {
    pub start: i64,
    pub end: i64,
}

impl IdRange {
    pub fn new(start: i64, end: i64) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, id: i64) -> bool {
        id >= self.start && id < self.end
    }
}

impl From<[i64; 2]> for IdRange {
    fn from(range: [i64; 2]) -> Self {
        Self::new(range[0], range[1])
    }
}

/// A stored profile row
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Profile {
    pub global_profile_id: i64,
    pub float_id: String,
    pub cycle_number: Option<i64>,
    pub datetime: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub min_pressure: Option<f64>,
    pub max_pressure: Option<f64>,
    pub measurement_count: i64,
    pub project_name: Option<String>,
    pub institution: Option<String>,
    pub data_mode: Option<String>,
    pub source_file_fingerprint: String,
    pub created_at: String,
}

/// A stored measurement row
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Measurement {
    pub global_profile_id: i64,
    pub level: i64,
    pub pressure: Option<f64>,
    pub temperature: Option<f64>,
    pub salinity: Option<f64>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub datetime: Option<String>,
}

/// Outcome of a natural-key upsert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// Fresh insert with the allocated global profile ID
    Inserted(i64),
    /// Natural-key collision; the existing ID is returned
    Skipped(i64),
}

impl UpsertOutcome {
    pub fn id(&self) -> i64 {
        match self {
            UpsertOutcome::Inserted(id) | UpsertOutcome::Skipped(id) => *id,
        }
    }
}

/// Parameter binding for guarded queries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SqlValue {
    Int(i64),
    Float(f64),
    Text(String),
}

/// Canonicalized result rows from a guarded query
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryRows {
    pub columns: Vec<String>,
    pub rows: Vec<serde_json::Value>,
}

impl QueryRows {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Ingestion run status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Started,
    Completed,
    Error,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunStatus::Started => write!(f, "started"),
            RunStatus::Completed => write!(f, "completed"),
            RunStatus::Error => write!(f, "error"),
        }
    }
}

/// An automation run record
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct AutomationRun {
    pub id: String,
    pub run_timestamp: String,
    pub status: String,
    pub files_discovered: i64,
    pub files_downloaded: i64,
    pub profiles_added: i64,
    pub measurements_added: i64,
    pub duration_seconds: Option<f64>,
    pub error_message: Option<String>,
}

/// Handle to one relational store
#[derive(Clone)]
pub struct ArgoDb {
    pool: SqlitePool,
    kind: StoreKind,
    id_range: IdRange,
}

impl ArgoDb {
    /// Open (or create) a store at the given path
    pub async fn connect(path: &Path, kind: StoreKind, id_range: IdRange) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .foreign_keys(true);

        debug!("Connecting to {} store at {:?}", kind, path);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let db = Self {
            pool,
            kind,
            id_range,
        };
        db.init_schema().await?;
        Ok(db)
    }

    /// In-memory store, used by tests
    pub async fn connect_memory(kind: StoreKind, id_range: IdRange) -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(Error::Database)?
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        let db = Self {
            pool,
            kind,
            id_range,
        };
        db.init_schema().await?;
        Ok(db)
    }

    pub fn kind(&self) -> StoreKind {
        self.kind
    }

    pub fn id_range(&self) -> IdRange {
        self.id_range
    }

    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Initialize the store schema
    pub async fn init_schema(&self) -> Result<()> {
        sqlx::query(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    /// Insert a parsed profile and its measurements in one transaction.
    ///
    /// The natural key `(float_id, cycle_number, source_file_fingerprint)`
    /// decides idempotence: a collision is a silent no-op returning the
    /// existing ID. A fresh insert allocates the next global profile ID
    /// from this store's range.
    pub async fn upsert_profile(
        &self,
        profile: &ParsedProfile,
        levels: &[ParsedLevel],
        fingerprint: &str,
    ) -> Result<UpsertOutcome> {
        let mut tx = self.pool.begin().await?;

        // NULL-aware natural-key probe; UNIQUE treats NULLs as distinct
        let existing: Option<(i64,)> = sqlx::query_as(
            "SELECT global_profile_id FROM argo_profiles \
             WHERE float_id = ? AND cycle_number IS ? AND source_file_fingerprint = ?",
        )
        .bind(&profile.float_id)
        .bind(profile.cycle_number)
        .bind(fingerprint)
        .fetch_optional(&mut *tx)
        .await?;

        if let Some((id,)) = existing {
            debug!(
                float_id = %profile.float_id,
                cycle = ?profile.cycle_number,
                "duplicate profile skipped"
            );
            return Ok(UpsertOutcome::Skipped(id));
        }

        let (max_id,): (Option<i64>,) =
            sqlx::query_as("SELECT MAX(global_profile_id) FROM argo_profiles")
                .fetch_one(&mut *tx)
                .await?;
        let next_id = max_id
            .map(|m| m + 1)
            .unwrap_or(self.id_range.start)
            .max(self.id_range.start);
        if !self.id_range.contains(next_id) {
            return Err(Error::IdRangeExhausted(self.kind.to_string()));
        }

        let datetime = profile.datetime.map(|dt| dt.to_rfc3339());
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            r#"
            INSERT INTO argo_profiles (
                global_profile_id, float_id, cycle_number, datetime,
                latitude, longitude, min_pressure, max_pressure,
                measurement_count, project_name, institution, data_mode,
                source_file_fingerprint, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(next_id)
        .bind(&profile.float_id)
        .bind(profile.cycle_number)
        .bind(&datetime)
        .bind(profile.latitude)
        .bind(profile.longitude)
        .bind(profile.min_pressure)
        .bind(profile.max_pressure)
        .bind(levels.len() as i64)
        .bind(&profile.project_name)
        .bind(&profile.institution)
        .bind(&profile.data_mode)
        .bind(fingerprint)
        .bind(&now)
        .execute(&mut *tx)
        .await?;

        for level in levels {
            sqlx::query(
                r#"
                INSERT INTO argo_measurements (
                    global_profile_id, level, pressure, temperature, salinity,
                    latitude, longitude, datetime
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(next_id)
            .bind(level.level)
            .bind(level.pressure)
            .bind(level.temperature)
            .bind(level.salinity)
            .bind(profile.latitude)
            .bind(profile.longitude)
            .bind(&datetime)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(UpsertOutcome::Inserted(next_id))
    }

    /// Run a validated SELECT with a row cap and wall-clock timeout.
    /// Rows come back canonicalized: statement column order, JSON numbers
    /// for INTEGER/REAL, strings for TEXT, explicit nulls.
    pub async fn query(
        &self,
        sql: &str,
        bindings: &[SqlValue],
        row_cap: usize,
        timeout: Duration,
    ) -> Result<QueryRows> {
        validate_select(sql)?;

        let mut query = sqlx::query(sql);
        for value in bindings {
            query = match value {
                SqlValue::Int(v) => query.bind(v),
                SqlValue::Float(v) => query.bind(v),
                SqlValue::Text(v) => query.bind(v),
            };
        }

        let rows = tokio::time::timeout(timeout, query.fetch_all(&self.pool))
            .await
            .map_err(|_| Error::QueryTimeout(timeout.as_secs()))??;

        let mut out = QueryRows::default();
        for (i, row) in rows.iter().enumerate() {
            if i >= row_cap {
                return Err(Error::QueryValidation(format!(
                    "result exceeds row cap of {}",
                    row_cap
                )));
            }

            if out.columns.is_empty() {
                out.columns = row.columns().iter().map(|c| c.name().to_string()).collect();
            }

            let mut object = serde_json::Map::new();
            for (ci, column) in row.columns().iter().enumerate() {
                object.insert(column.name().to_string(), decode_value(row, ci)?);
            }
            out.rows.push(serde_json::Value::Object(object));
        }

        if out.columns.is_empty() {
            out.columns = column_names_from_select(sql);
        }

        Ok(out)
    }

    pub async fn get_profile(&self, id: i64) -> Result<Option<Profile>> {
        let profile =
            sqlx::query_as::<_, Profile>("SELECT * FROM argo_profiles WHERE global_profile_id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(profile)
    }

    /// Latest profile for a float by datetime
    pub async fn latest_profile_for_float(&self, float_id: &str) -> Result<Option<Profile>> {
        let profile = sqlx::query_as::<_, Profile>(
            "SELECT * FROM argo_profiles WHERE float_id = ? \
             ORDER BY datetime DESC LIMIT 1",
        )
        .bind(float_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(profile)
    }

    /// Measurements of one profile ordered by pressure, with an optional
    /// pressure window
    pub async fn measurements_for_profile(
        &self,
        id: i64,
        min_pressure: Option<f64>,
        max_pressure: Option<f64>,
    ) -> Result<Vec<Measurement>> {
        let measurements = sqlx::query_as::<_, Measurement>(
            "SELECT * FROM argo_measurements WHERE global_profile_id = ? \
             AND (? IS NULL OR pressure >= ?) AND (? IS NULL OR pressure <= ?) \
             ORDER BY pressure ASC",
        )
        .bind(id)
        .bind(min_pressure)
        .bind(min_pressure)
        .bind(max_pressure)
        .bind(max_pressure)
        .fetch_all(&self.pool)
        .await?;
        Ok(measurements)
    }

    pub async fn profile_count(&self) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM argo_profiles")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    pub async fn measurement_count(&self) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM argo_measurements")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// All global profile IDs in this store, for vector reconciliation
    pub async fn all_profile_ids(&self) -> Result<Vec<i64>> {
        let ids: Vec<i64> = sqlx::query_scalar("SELECT global_profile_id FROM argo_profiles")
            .fetch_all(&self.pool)
            .await?;
        Ok(ids)
    }

    /// Profiles inserted from a given source file fingerprint
    pub async fn profiles_for_fingerprint(&self, fingerprint: &str) -> Result<Vec<Profile>> {
        let profiles = sqlx::query_as::<_, Profile>(
            "SELECT * FROM argo_profiles WHERE source_file_fingerprint = ?",
        )
        .bind(fingerprint)
        .fetch_all(&self.pool)
        .await?;
        Ok(profiles)
    }

    // ===== Automation run bookkeeping =====

    /// Open a run in status `started`
    pub async fn open_run(&self) -> Result<AutomationRun> {
        let run = AutomationRun {
            id: Uuid::new_v4().to_string(),
            run_timestamp: Utc::now().to_rfc3339(),
            status: RunStatus::Started.to_string(),
            files_discovered: 0,
            files_downloaded: 0,
            profiles_added: 0,
            measurements_added: 0,
            duration_seconds: None,
            error_message: None,
        };

        sqlx::query(
            r#"
            INSERT INTO automation_log (
                id, run_timestamp, status, files_discovered, files_downloaded,
                profiles_added, measurements_added
            ) VALUES (?, ?, ?, 0, 0, 0, 0)
            "#,
        )
        .bind(&run.id)
        .bind(&run.run_timestamp)
        .bind(&run.status)
        .execute(&self.pool)
        .await?;

        info!(run_id = %run.id, store = %self.kind, "opened automation run");
        Ok(run)
    }

    /// Update counters on an open run
    pub async fn update_run(&self, run: &AutomationRun) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE automation_log SET
                status = ?, files_discovered = ?, files_downloaded = ?,
                profiles_added = ?, measurements_added = ?,
                duration_seconds = ?, error_message = ?
            WHERE id = ?
            "#,
        )
        .bind(&run.status)
        .bind(run.files_discovered)
        .bind(run.files_downloaded)
        .bind(run.profiles_added)
        .bind(run.measurements_added)
        .bind(run.duration_seconds)
        .bind(&run.error_message)
        .bind(&run.id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Most recent automation runs, newest first
    pub async fn recent_runs(&self, limit: i64) -> Result<Vec<AutomationRun>> {
        let runs = sqlx::query_as::<_, AutomationRun>(
            "SELECT * FROM automation_log ORDER BY run_timestamp DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(runs)
    }
}

/// Decode a dynamically-typed SQLite value into canonical JSON
fn decode_value(row: &sqlx::sqlite::SqliteRow, index: usize) -> Result<serde_json::Value> {
    use sqlx::ValueRef;

    let raw = row.try_get_raw(index)?;
    if raw.is_null() {
        return Ok(serde_json::Value::Null);
    }

    let type_name = raw.type_info().name().to_string();
    let value = match type_name.as_str() {
        "INTEGER" => serde_json::Value::from(row.try_get::<i64, _>(index)?),
        "REAL" => serde_json::Value::from(row.try_get::<f64, _>(index)?),
        "TEXT" => serde_json::Value::from(row.try_get::<String, _>(index)?),
        // BLOB columns never appear on the whitelisted surface
        _ => serde_json::Value::Null,
    };
    Ok(value)
}

/// Best-effort column names for empty result sets, so cached payloads
/// keep a stable header
fn column_names_from_select(sql: &str) -> Vec<String> {
    let lower = sql.to_lowercase();
    let Some(start) = lower.find("select") else {
        return Vec::new();
    };
    let Some(end) = lower.find(" from ") else {
        return Vec::new();
    };
    let select_list = &sql[start + "select".len()..end];

    split_top_level_commas(select_list)
        .into_iter()
        .map(|item| {
            let item = item.trim();
            let lower_item = item.to_lowercase();
            if let Some(pos) = lower_item.rfind(" as ") {
                item[pos + 4..].trim().to_string()
            } else {
                item.rsplit('.').next().unwrap_or(item).trim().to_string()
            }
        })
        .collect()
}

fn split_top_level_commas(s: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    for (i, c) in s.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(&s[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&s[start..]);
    parts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::{ParsedLevel, ParsedProfile};
    use chrono::TimeZone;

    fn parsed_profile(float_id: &str, cycle: i64, lat: f64, lon: f64) -> ParsedProfile {
        ParsedProfile {
            float_id: float_id.to_string(),
            cycle_number: Some(cycle),
            datetime: chrono::Utc.with_ymd_and_hms(2025, 1, 10, 6, 0, 0).single(),
            latitude: Some(lat),
            longitude: Some(lon),
            ..Default::default()
        }
    }

    fn levels(n: usize) -> Vec<ParsedLevel> {
        (0..n)
            .map(|i| ParsedLevel {
                level: i as i64,
                pressure: Some(10.0 * (i as f64 + 1.0)),
                temperature: Some(25.0 - i as f64),
                salinity: Some(35.0 + 0.01 * i as f64),
            })
            .collect()
    }

    async fn dev_db() -> ArgoDb {
        ArgoDb::connect_memory(StoreKind::Dev, IdRange::new(1, 1_000))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_upsert_allocates_from_range() {
        let db = dev_db().await;
        let outcome = db
            .upsert_profile(&parsed_profile("1902482", 1, 15.0, 70.0), &levels(3), "fp-a")
            .await
            .unwrap();
        assert_eq!(outcome, UpsertOutcome::Inserted(1));

        let outcome = db
            .upsert_profile(&parsed_profile("1902482", 2, 15.1, 70.1), &levels(2), "fp-a")
            .await
            .unwrap();
        assert_eq!(outcome, UpsertOutcome::Inserted(2));
    }

    #[tokio::test]
    async fn test_upsert_is_idempotent_on_natural_key() {
        let db = dev_db().await;
        let profile = parsed_profile("1902482", 7, 15.0, 70.0);

        let first = db.upsert_profile(&profile, &levels(4), "fp-a").await.unwrap();
        let second = db.upsert_profile(&profile, &levels(4), "fp-a").await.unwrap();

        assert_eq!(first, UpsertOutcome::Inserted(1));
        assert_eq!(second, UpsertOutcome::Skipped(1));
        assert_eq!(db.profile_count().await.unwrap(), 1);
        assert_eq!(db.measurement_count().await.unwrap(), 4);
    }

    #[tokio::test]
    async fn test_measurement_count_coherence() {
        let db = dev_db().await;
        let id = db
            .upsert_profile(&parsed_profile("5906527", 3, 10.0, 65.0), &levels(5), "fp-b")
            .await
            .unwrap()
            .id();

        let profile = db.get_profile(id).await.unwrap().unwrap();
        assert_eq!(profile.measurement_count, 5);

        let measurements = db.measurements_for_profile(id, None, None).await.unwrap();
        assert_eq!(measurements.len(), 5);
        let mut seen: Vec<i64> = measurements.iter().map(|m| m.level).collect();
        seen.sort_unstable();
        assert_eq!(seen, vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_id_ranges_are_disjoint() {
        let dev = ArgoDb::connect_memory(StoreKind::Dev, IdRange::new(1, 100))
            .await
            .unwrap();
        let live = ArgoDb::connect_memory(StoreKind::Live, IdRange::new(100, 200))
            .await
            .unwrap();

        let profile = parsed_profile("1902482", 1, 15.0, 70.0);
        let dev_id = dev.upsert_profile(&profile, &levels(1), "fp").await.unwrap().id();
        let live_id = live.upsert_profile(&profile, &levels(1), "fp").await.unwrap().id();

        assert!(dev.id_range().contains(dev_id));
        assert!(live.id_range().contains(live_id));
        assert_ne!(dev_id, live_id);
    }

    #[tokio::test]
    async fn test_id_range_exhaustion_errors() {
        let db = ArgoDb::connect_memory(StoreKind::Dev, IdRange::new(1, 2))
            .await
            .unwrap();

        db.upsert_profile(&parsed_profile("1902482", 1, 0.0, 0.0), &[], "fp")
            .await
            .unwrap();
        let err = db
            .upsert_profile(&parsed_profile("1902482", 2, 0.0, 0.0), &[], "fp")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::IdRangeExhausted(_)));
    }

    #[tokio::test]
    async fn test_guarded_query_rejects_and_caps() {
        let db = dev_db().await;
        db.upsert_profile(&parsed_profile("1902482", 1, 15.0, 70.0), &levels(3), "fp")
            .await
            .unwrap();

        let err = db
            .query(
                "DELETE FROM argo_profiles",
                &[],
                100,
                Duration::from_secs(5),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::QueryValidation(_)));

        let err = db
            .query(
                "SELECT level FROM argo_measurements",
                &[],
                2,
                Duration::from_secs(5),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::QueryValidation(_)));
    }

    #[tokio::test]
    async fn test_guarded_query_returns_canonical_rows() {
        let db = dev_db().await;
        db.upsert_profile(&parsed_profile("1902482", 1, 15.0, 70.0), &levels(2), "fp")
            .await
            .unwrap();

        let rows = db
            .query(
                "SELECT float_id, latitude FROM argo_profiles WHERE float_id = ?",
                &[SqlValue::Text("1902482".to_string())],
                100,
                Duration::from_secs(5),
            )
            .await
            .unwrap();

        assert_eq!(rows.columns, vec!["float_id", "latitude"]);
        assert_eq!(rows.rows.len(), 1);
        assert_eq!(rows.rows[0]["float_id"], "1902482");
        assert_eq!(rows.rows[0]["latitude"], 15.0);
    }

    #[tokio::test]
    async fn test_depth_window_on_measurements() {
        let db = dev_db().await;
        let id = db
            .upsert_profile(&parsed_profile("1902482", 1, 15.0, 70.0), &levels(5), "fp")
            .await
            .unwrap()
            .id();

        let windowed = db
            .measurements_for_profile(id, Some(15.0), Some(35.0))
            .await
            .unwrap();
        assert_eq!(windowed.len(), 2);
        assert!(windowed
            .iter()
            .all(|m| m.pressure.unwrap() >= 15.0 && m.pressure.unwrap() <= 35.0));
    }

    #[tokio::test]
    async fn test_automation_run_lifecycle() {
        let db = dev_db().await;
        let mut run = db.open_run().await.unwrap();

        run.files_discovered = 4;
        run.files_downloaded = 3;
        run.profiles_added = 12;
        run.measurements_added = 900;
        run.status = RunStatus::Completed.to_string();
        run.duration_seconds = Some(8.25);
        db.update_run(&run).await.unwrap();

        let runs = db.recent_runs(10).await.unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].status, "completed");
        assert_eq!(runs[0].files_downloaded, 3);
        assert_eq!(runs[0].profiles_added, 12);
    }

    #[test]
    fn test_column_names_from_select() {
        assert_eq!(
            column_names_from_select("SELECT p.float_id, AVG(m.temperature) AS avg_temperature FROM argo_profiles p"),
            vec!["float_id", "avg_temperature"]
        );
    }
}
