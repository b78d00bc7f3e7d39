//! Argo profile file parsing
//!
//! This module handles:
//! - Decoding netCDF classic bytes (`cdf`)
//! - Extracting per-profile metadata and level measurements
//! - Fill-sentinel and bounds handling with parse diagnostics
//!
//! The parser never touches a database and assigns only per-file-local
//! identity; global profile IDs are allocated by the store on insert.
//! Content problems (bad coordinates, unparseable dates, fill values)
//! degrade to missing values and diagnostics. Only structural problems
//! with the file itself are errors.

mod cdf;

#[cfg(test)]
pub(crate) mod testutil;

pub use cdf::*;

use crate::error::Result;
use chrono::{DateTime, Datelike, Duration, TimeZone, Utc};
use std::path::Path;
use tracing::debug;

/// Fill sentinel used by PRES/TEMP/PSAL/LATITUDE/LONGITUDE when the file
/// does not declare its own `_FillValue`
pub const DEFAULT_FILL: f64 = 99999.0;

/// Fill sentinel for JULD
pub const JULD_FILL: f64 = 999999.0;

/// One vertical cast extracted from a file, before store-side ID assignment
#[derive(Debug, Clone, Default)]
pub struct ParsedProfile {
    /// 0-based index of the profile within its file
    pub local_index: usize,
    pub float_id: String,
    pub cycle_number: Option<i64>,
    pub datetime: Option<DateTime<Utc>>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub min_pressure: Option<f64>,
    pub max_pressure: Option<f64>,
    pub project_name: Option<String>,
    pub institution: Option<String>,
    pub data_mode: Option<String>,
}

/// One depth-level sample of a profile
#[derive(Debug, Clone, Default)]
pub struct ParsedLevel {
    /// Dense 0-based index in file order over kept levels
    pub level: i64,
    pub pressure: Option<f64>,
    pub temperature: Option<f64>,
    pub salinity: Option<f64>,
}

/// Per-file parse diagnostics
#[derive(Debug, Clone, Default)]
pub struct ParseDiagnostics {
    pub profiles_seen: usize,
    pub invalid_positions: usize,
    pub invalid_datetimes: usize,
    pub dropped_levels: usize,
    pub notes: Vec<String>,
}

/// Parse result: profiles with their ordered measurements
#[derive(Debug, Default)]
pub struct ParsedFile {
    pub profiles: Vec<(ParsedProfile, Vec<ParsedLevel>)>,
    pub diagnostics: ParseDiagnostics,
}

/// Parse one Argo profile file from disk
pub fn parse_profile_file(path: &Path) -> Result<ParsedFile> {
    let file = CdfFile::open(path)?;
    extract(&file)
}

/// Parse one Argo profile file from bytes
pub fn parse_profile_bytes(bytes: Vec<u8>) -> Result<ParsedFile> {
    let file = CdfFile::parse(bytes)?;
    extract(&file)
}

fn extract(file: &CdfFile) -> Result<ParsedFile> {
    let mut out = ParsedFile::default();

    let n_prof = dim_len_by_name(file, "N_PROF");
    let n_levels = dim_len_by_name(file, "N_LEVELS");

    if n_prof == 0 || n_levels == 0 {
        out.diagnostics
            .notes
            .push("file has no N_PROF/N_LEVELS data".to_string());
        return Ok(out);
    }

    out.diagnostics.profiles_seen = n_prof;

    let platform = CharGrid::load(file, "PLATFORM_NUMBER", n_prof);
    let project = CharGrid::load(file, "PROJECT_NAME", n_prof);
    let data_mode = CharGrid::load(file, "DATA_MODE", n_prof);
    let cycles = IntSeries::load(file, "CYCLE_NUMBER");
    let juld = FloatGrid::load(file, "JULD", n_prof, 1, JULD_FILL);
    let lat = FloatGrid::load(file, "LATITUDE", n_prof, 1, DEFAULT_FILL);
    let lon = FloatGrid::load(file, "LONGITUDE", n_prof, 1, DEFAULT_FILL);
    let pres = FloatGrid::load(file, "PRES", n_prof, n_levels, DEFAULT_FILL);
    let temp = FloatGrid::load(file, "TEMP", n_prof, n_levels, DEFAULT_FILL);
    let psal = FloatGrid::load(file, "PSAL", n_prof, n_levels, DEFAULT_FILL);

    let institution_attr = file
        .attr("institution")
        .and_then(|a| a.values.as_text())
        .filter(|s| !s.is_empty());
    let project_attr = file
        .attr("project_name")
        .and_then(|a| a.values.as_text())
        .filter(|s| !s.is_empty());

    for idx in 0..n_prof {
        let mut profile = ParsedProfile {
            local_index: idx,
            float_id: platform
                .as_ref()
                .map(|g| clean_float_id(&g.row(idx)))
                .unwrap_or_else(|| "unknown".to_string()),
            cycle_number: cycles.as_ref().and_then(|c| c.get(idx)),
            project_name: project
                .as_ref()
                .map(|g| g.row(idx))
                .filter(|s| !s.is_empty())
                .or_else(|| project_attr.clone()),
            institution: institution_attr.clone(),
            data_mode: data_mode
                .as_ref()
                .map(|g| g.row(idx))
                .filter(|s| !s.is_empty()),
            ..Default::default()
        };

        match juld.as_ref().and_then(|g| g.get(idx, 0)) {
            Some(days) => match juld_to_datetime(days) {
                Some(dt) => profile.datetime = Some(dt),
                None => {
                    out.diagnostics.invalid_datetimes += 1;
                }
            },
            None => {
                out.diagnostics.invalid_datetimes += 1;
            }
        }

        let lat_val = lat.as_ref().and_then(|g| g.get(idx, 0));
        let lon_val = lon.as_ref().and_then(|g| g.get(idx, 0));
        match (lat_val, lon_val) {
            (Some(la), Some(lo)) if (-90.0..=90.0).contains(&la) && (-180.0..=180.0).contains(&lo) => {
                profile.latitude = Some(la);
                profile.longitude = Some(lo);
            }
            (Some(_), Some(_)) => {
                // Out-of-bounds position is treated as missing, the
                // profile is still emitted.
                out.diagnostics.invalid_positions += 1;
            }
            _ => {
                out.diagnostics.invalid_positions += 1;
            }
        }

        let mut levels = Vec::new();
        for lvl in 0..n_levels {
            let p = pres.as_ref().and_then(|g| g.get(idx, lvl));
            let t = temp.as_ref().and_then(|g| g.get(idx, lvl));
            let s = psal.as_ref().and_then(|g| g.get(idx, lvl));

            if p.is_none() && t.is_none() && s.is_none() {
                out.diagnostics.dropped_levels += 1;
                continue;
            }

            levels.push(ParsedLevel {
                level: levels.len() as i64,
                pressure: p,
                temperature: t,
                salinity: s,
            });
        }

        let pressures: Vec<f64> = levels.iter().filter_map(|l| l.pressure).collect();
        profile.min_pressure = pressures.iter().cloned().reduce(f64::min);
        profile.max_pressure = pressures.iter().cloned().reduce(f64::max);

        out.profiles.push((profile, levels));
    }

    debug!(
        profiles = out.profiles.len(),
        dropped_levels = out.diagnostics.dropped_levels,
        "extracted profile file"
    );

    Ok(out)
}

fn dim_len_by_name(file: &CdfFile, name: &str) -> usize {
    file.dims
        .iter()
        .position(|d| d.name == name)
        .map(|id| file.dim_len(id))
        .unwrap_or(0)
}

/// Convert JULD (days since 1950-01-01T00:00:00Z) to a UTC instant,
/// rejecting values outside the plausible Argo era
fn juld_to_datetime(days: f64) -> Option<DateTime<Utc>> {
    if !days.is_finite() {
        return None;
    }
    let epoch = Utc.with_ymd_and_hms(1950, 1, 1, 0, 0, 0).single()?;
    let millis = (days * 86_400_000.0).round();
    if !millis.is_finite() || millis.abs() > i64::MAX as f64 {
        return None;
    }
    let dt = epoch + Duration::milliseconds(millis as i64);
    if dt.year() < 1990 || dt.year() > 2035 {
        return None;
    }
    Some(dt)
}

/// Keep only digits; Argo platform numbers are numeric WMO identifiers
fn clean_float_id(raw: &str) -> String {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() >= 4 {
        digits
    } else {
        "unknown".to_string()
    }
}

/// Char variable with one row per profile
struct CharGrid {
    chars: Vec<u8>,
    row_len: usize,
}

impl CharGrid {
    fn load(file: &CdfFile, name: &str, n_prof: usize) -> Option<Self> {
        let var = file.var(name)?;
        let values = file.read(var).ok()?;
        let chars = match values {
            CdfValues::Chars(c) => c,
            _ => return None,
        };
        if n_prof == 0 || chars.len() < n_prof {
            return None;
        }
        Some(Self {
            row_len: chars.len() / n_prof,
            chars,
        })
    }

    fn row(&self, idx: usize) -> String {
        let start = idx * self.row_len;
        let end = (start + self.row_len).min(self.chars.len());
        String::from_utf8_lossy(&self.chars[start..end])
            .trim_matches(['\0', ' '])
            .to_string()
    }
}

/// Integer variable with one value per profile
struct IntSeries {
    values: Vec<i64>,
}

impl IntSeries {
    fn load(file: &CdfFile, name: &str) -> Option<Self> {
        let var = file.var(name)?;
        let values = match file.read(var).ok()? {
            CdfValues::Ints(v) => v.into_iter().map(|x| x as i64).collect(),
            CdfValues::Shorts(v) => v.into_iter().map(|x| x as i64).collect(),
            _ => return None,
        };
        Some(Self { values })
    }

    fn get(&self, idx: usize) -> Option<i64> {
        self.values
            .get(idx)
            .copied()
            .filter(|&v| (0..99_999).contains(&v))
    }
}

/// Numeric variable widened to f64, masked by its fill sentinel
struct FloatGrid {
    values: Vec<f64>,
    cols: usize,
    fill: f64,
}

impl FloatGrid {
    fn load(file: &CdfFile, name: &str, rows: usize, cols: usize, default_fill: f64) -> Option<Self> {
        let var = file.var(name)?;
        let fill = var.fill_value().unwrap_or(default_fill);
        let values: Vec<f64> = match file.read(var).ok()? {
            CdfValues::Floats(v) => v.into_iter().map(|x| x as f64).collect(),
            CdfValues::Doubles(v) => v,
            _ => return None,
        };
        if values.len() < rows * cols {
            return None;
        }
        Some(Self { values, cols, fill })
    }

    fn get(&self, row: usize, col: usize) -> Option<f64> {
        let v = *self.values.get(row * self.cols + col)?;
        if !v.is_finite() || v == self.fill {
            None
        } else {
            Some(v)
        }
    }
}
