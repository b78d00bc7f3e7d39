//! Read-only SQL guard
//!
//! Every statement executed through [`super::ArgoDb::query`] must pass
//! this validator: a single SELECT, no string literals (user input is
//! carried exclusively as parameter bindings), no write keywords, and
//! every identifier drawn from the whitelisted tables, columns, and
//! synthesizer output names.

use crate::error::{Error, Result};
use std::collections::HashSet;
use std::sync::OnceLock;

/// Tables the read surface may reference
const TABLES: &[&str] = &["argo_profiles", "argo_measurements"];

/// Columns of the whitelisted tables
const COLUMNS: &[&str] = &[
    "global_profile_id",
    "float_id",
    "cycle_number",
    "datetime",
    "latitude",
    "longitude",
    "min_pressure",
    "max_pressure",
    "measurement_count",
    "project_name",
    "institution",
    "data_mode",
    "source_file_fingerprint",
    "created_at",
    "level",
    "pressure",
    "temperature",
    "salinity",
];

/// Aliases and output names the SQL synthesizer emits
const OUTPUT_NAMES: &[&str] = &[
    "p",
    "m",
    "depth_bin",
    "avg_temperature",
    "min_temperature",
    "max_temperature",
    "avg_salinity",
    "min_salinity",
    "max_salinity",
    "avg_pressure",
];

/// SQL keywords and functions allowed in synthesized statements
const KEYWORDS: &[&str] = &[
    "select", "distinct", "from", "where", "and", "or", "not", "join", "inner", "on", "as", "in",
    "is", "null", "between", "group", "by", "order", "asc", "desc", "limit", "avg", "min", "max",
    "count", "cast", "integer", "like", "coalesce", "having",
];

/// Keywords that are always rejected, checked by word boundary for a
/// clear error before the whitelist pass
const BANNED: &[&str] = &[
    "insert", "update", "delete", "drop", "alter", "create", "replace", "attach", "detach",
    "pragma", "vacuum", "truncate",
];

fn allowed_tokens() -> &'static HashSet<&'static str> {
    static TOKENS: OnceLock<HashSet<&'static str>> = OnceLock::new();
    TOKENS.get_or_init(|| {
        TABLES
            .iter()
            .chain(COLUMNS)
            .chain(OUTPUT_NAMES)
            .chain(KEYWORDS)
            .copied()
            .collect()
    })
}

/// Validate a statement for execution against the read surface
pub fn validate_select(sql: &str) -> Result<()> {
    let trimmed = sql.trim();

    if !trimmed.to_lowercase().starts_with("select") {
        return Err(Error::QueryValidation(
            "only SELECT statements are allowed".to_string(),
        ));
    }

    if trimmed.contains(';') {
        return Err(Error::QueryValidation(
            "multiple statements are not allowed".to_string(),
        ));
    }

    // String literals never appear in synthesized SQL; user input is
    // bound as parameters.
    if trimmed.contains('\'') || trimmed.contains('"') {
        return Err(Error::QueryValidation(
            "string literals are not allowed; use parameter bindings".to_string(),
        ));
    }

    let lower = trimmed.to_lowercase();
    for token in tokenize(&lower) {
        if BANNED.contains(&token) {
            return Err(Error::QueryValidation(format!(
                "statement contains banned keyword '{}'",
                token
            )));
        }
        if token.chars().all(|c| c.is_ascii_digit()) {
            continue;
        }
        if !allowed_tokens().contains(token) {
            return Err(Error::QueryValidation(format!(
                "identifier '{}' is not whitelisted",
                token
            )));
        }
    }

    Ok(())
}

fn tokenize(sql: &str) -> impl Iterator<Item = &str> {
    sql.split(|c: char| !c.is_ascii_alphanumeric() && c != '_')
        .filter(|t| !t.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_synthesized_shapes() {
        validate_select(
            "SELECT p.float_id, m.pressure, m.temperature \
             FROM argo_profiles p JOIN argo_measurements m \
             ON m.global_profile_id = p.global_profile_id \
             WHERE p.latitude BETWEEN ? AND ? LIMIT ?",
        )
        .unwrap();

        validate_select(
            "SELECT CAST(m.pressure / ? AS INTEGER) * ? AS depth_bin, \
             AVG(m.temperature) AS avg_temperature, COUNT(*) AS measurement_count \
             FROM argo_measurements m GROUP BY depth_bin ORDER BY depth_bin",
        )
        .unwrap();
    }

    #[test]
    fn test_rejects_non_select() {
        assert!(validate_select("DELETE FROM argo_profiles").is_err());
        assert!(validate_select("  UPDATE argo_profiles SET float_id = ?").is_err());
    }

    #[test]
    fn test_rejects_multiple_statements() {
        assert!(
            validate_select("SELECT float_id FROM argo_profiles; DROP TABLE argo_profiles").is_err()
        );
    }

    #[test]
    fn test_rejects_string_literals() {
        assert!(validate_select("SELECT float_id FROM argo_profiles WHERE float_id = '19'").is_err());
    }

    #[test]
    fn test_rejects_unknown_identifiers() {
        assert!(validate_select("SELECT password FROM users").is_err());
        assert!(validate_select("SELECT float_id FROM argo_profiles, sqlite_master").is_err());
    }

    #[test]
    fn test_rejects_banned_keyword_inside_select() {
        let err = validate_select("SELECT float_id FROM argo_profiles WHERE drop = ?").unwrap_err();
        assert!(matches!(err, Error::QueryValidation(_)));
    }
}
