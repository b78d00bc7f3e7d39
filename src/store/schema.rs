//! SQLite schema definition
//!
//! The dev and live stores instantiate the same schema in separate
//! database files; their global_profile_id spaces are kept disjoint by
//! the allocation ranges enforced in the insert path.

/// SQL schema for an Argo store
pub const SCHEMA_SQL: &str = r#"
-- Profiles: one vertical cast per row
CREATE TABLE IF NOT EXISTS argo_profiles (
    global_profile_id INTEGER PRIMARY KEY,
    float_id TEXT NOT NULL,
    cycle_number INTEGER,
    datetime TEXT,
    latitude REAL,
    longitude REAL,
    min_pressure REAL,
    max_pressure REAL,
    measurement_count INTEGER NOT NULL DEFAULT 0,
    project_name TEXT,
    institution TEXT,
    data_mode TEXT,
    source_file_fingerprint TEXT NOT NULL,
    created_at TEXT NOT NULL,
    UNIQUE(float_id, cycle_number, source_file_fingerprint)
);

-- Measurements: one depth-level sample per row, dense levels from 0
CREATE TABLE IF NOT EXISTS argo_measurements (
    global_profile_id INTEGER NOT NULL
        REFERENCES argo_profiles(global_profile_id) ON DELETE CASCADE,
    level INTEGER NOT NULL,
    pressure REAL,
    temperature REAL,
    salinity REAL,
    latitude REAL,
    longitude REAL,
    datetime TEXT,
    PRIMARY KEY (global_profile_id, level)
);

-- Automation log: one row per ingestion tick
CREATE TABLE IF NOT EXISTS automation_log (
    id TEXT PRIMARY KEY,
    run_timestamp TEXT NOT NULL,
    status TEXT NOT NULL,
    files_discovered INTEGER NOT NULL DEFAULT 0,
    files_downloaded INTEGER NOT NULL DEFAULT 0,
    profiles_added INTEGER NOT NULL DEFAULT 0,
    measurements_added INTEGER NOT NULL DEFAULT 0,
    duration_seconds REAL,
    error_message TEXT
);

-- Indexes for spatial, temporal, and float lookups
CREATE INDEX IF NOT EXISTS idx_profiles_float ON argo_profiles(float_id);
CREATE INDEX IF NOT EXISTS idx_profiles_position ON argo_profiles(latitude, longitude);
CREATE INDEX IF NOT EXISTS idx_profiles_datetime ON argo_profiles(datetime);
CREATE INDEX IF NOT EXISTS idx_meas_profile ON argo_measurements(global_profile_id);
CREATE INDEX IF NOT EXISTS idx_runs_timestamp ON automation_log(run_timestamp);
"#;
