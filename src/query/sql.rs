//! SQL synthesis from intent and entities
//!
//! Statements come only from the fixed templates below; every
//! user-derived value travels as a parameter binding, so the SQL text
//! never contains a substring of the query. Analytical queries
//! aggregate per depth bin with no LIMIT; point lookups return raw rows
//! under a safety LIMIT. The output is validated against the store's
//! identifier whitelist before it is returned.

use super::intent::{ClassifiedQuery, EntityBag, Intent, Parameter};
use crate::config::QueryConfig;
use crate::error::Result;
use crate::regions;
use crate::store::{validate_select, SqlValue};

/// Shape of a synthesized statement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanShape {
    /// Depth-binned aggregation, no LIMIT
    Aggregated,
    /// Raw joined rows under a safety LIMIT
    Raw,
}

/// A parameterized statement ready for the guarded executor
#[derive(Debug, Clone)]
pub struct SqlPlan {
    pub sql: String,
    pub bindings: Vec<SqlValue>,
    pub shape: PlanShape,
    /// Parameters aggregated by the plan, in column order
    pub parameters: Vec<Parameter>,
}

/// Synthesize the statement for a classified query. `candidate_ids`
/// carries the vector-recall set for hybrid refinement.
pub fn synthesize(
    classified: &ClassifiedQuery,
    config: &QueryConfig,
    candidate_ids: Option<&[i64]>,
) -> Result<SqlPlan> {
    let entities = &classified.entities;
    let aggregated = is_analytical(classified.intent, entities);

    let plan = if aggregated {
        aggregated_plan(entities, config, candidate_ids)
    } else {
        raw_plan(entities, config, candidate_ids)
    };

    validate_select(&plan.sql)?;
    Ok(plan)
}

/// Analytical queries aggregate; explicit raw requests and float
/// lookups do not
fn is_analytical(intent: Intent, entities: &EntityBag) -> bool {
    if entities.raw_rows {
        return false;
    }
    matches!(
        intent,
        Intent::Spatial | Intent::Temporal | Intent::ParameterProfile | Intent::Hybrid
    ) && !entities.parameters.is_empty()
}

fn aggregated_plan(
    entities: &EntityBag,
    config: &QueryConfig,
    candidate_ids: Option<&[i64]>,
) -> SqlPlan {
    let parameters = if entities.parameters.is_empty() {
        vec![Parameter::Temperature]
    } else {
        entities.parameters.clone()
    };

    let mut select = vec!["CAST(m.pressure / ? AS INTEGER) * ? AS depth_bin".to_string()];
    let mut bindings: Vec<SqlValue> = vec![
        SqlValue::Float(config.depth_bin_meters),
        SqlValue::Float(config.depth_bin_meters),
    ];

    for parameter in &parameters {
        let column = parameter.column();
        select.push(format!("AVG(m.{c}) AS avg_{c}", c = column));
        select.push(format!("MIN(m.{c}) AS min_{c}", c = column));
        select.push(format!("MAX(m.{c}) AS max_{c}", c = column));
    }
    select.push("COUNT(m.level) AS measurement_count".to_string());

    let (depth_min, depth_max) = entities
        .depth_bounds
        .unwrap_or((0.0, config.depth_bin_max_meters));

    let mut wheres = vec![
        "m.pressure IS NOT NULL".to_string(),
        "m.pressure >= ?".to_string(),
        "m.pressure < ?".to_string(),
    ];
    bindings.push(SqlValue::Float(depth_min));
    bindings.push(SqlValue::Float(depth_max));

    // Bins without a value for the leading parameter carry no signal
    wheres.push(format!("m.{} IS NOT NULL", parameters[0].column()));

    push_common_filters(entities, candidate_ids, &mut wheres, &mut bindings);

    let sql = format!(
        "SELECT {} FROM argo_measurements m \
         JOIN argo_profiles p ON p.global_profile_id = m.global_profile_id \
         WHERE {} GROUP BY depth_bin ORDER BY depth_bin",
        select.join(", "),
        wheres.join(" AND ")
    );

    SqlPlan {
        sql,
        bindings,
        shape: PlanShape::Aggregated,
        parameters,
    }
}

fn raw_plan(
    entities: &EntityBag,
    config: &QueryConfig,
    candidate_ids: Option<&[i64]>,
) -> SqlPlan {
    let mut wheres: Vec<String> = Vec::new();
    let mut bindings: Vec<SqlValue> = Vec::new();

    if !entities.float_ids.is_empty() {
        let placeholders = entities
            .float_ids
            .iter()
            .map(|_| "?")
            .collect::<Vec<_>>()
            .join(", ");
        wheres.push(format!("p.float_id IN ({})", placeholders));
        for id in &entities.float_ids {
            bindings.push(SqlValue::Text(id.clone()));
        }
    }

    if let Some((min, max)) = entities.depth_bounds {
        wheres.push("m.pressure >= ?".to_string());
        wheres.push("m.pressure <= ?".to_string());
        bindings.push(SqlValue::Float(min));
        bindings.push(SqlValue::Float(max));
    }

    push_common_filters(entities, candidate_ids, &mut wheres, &mut bindings);

    let where_clause = if wheres.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", wheres.join(" AND "))
    };

    let sql = format!(
        "SELECT p.global_profile_id, p.float_id, p.cycle_number, p.latitude, p.longitude, \
         p.datetime, m.level, m.pressure, m.temperature, m.salinity \
         FROM argo_profiles p \
         JOIN argo_measurements m ON m.global_profile_id = p.global_profile_id\
         {} ORDER BY p.datetime DESC, p.global_profile_id, m.level LIMIT ?",
        where_clause
    );
    bindings.push(SqlValue::Int(config.raw_row_limit as i64));

    SqlPlan {
        sql,
        bindings,
        shape: PlanShape::Raw,
        parameters: entities.parameters.clone(),
    }
}

/// Spatial, temporal, institution, and hybrid-candidate predicates
/// shared by both shapes
fn push_common_filters(
    entities: &EntityBag,
    candidate_ids: Option<&[i64]>,
    wheres: &mut Vec<String>,
    bindings: &mut Vec<SqlValue>,
) {
    if let Some(region) = entities
        .regions
        .first()
        .and_then(|name| regions::region_by_name(name))
    {
        wheres.push("p.latitude BETWEEN ? AND ?".to_string());
        wheres.push("p.longitude BETWEEN ? AND ?".to_string());
        bindings.push(SqlValue::Float(region.bbox.lat_min));
        bindings.push(SqlValue::Float(region.bbox.lat_max));
        bindings.push(SqlValue::Float(region.bbox.lon_min));
        bindings.push(SqlValue::Float(region.bbox.lon_max));
    }

    if let Some((start, end)) = &entities.time_range {
        wheres.push("p.datetime >= ?".to_string());
        wheres.push("p.datetime < ?".to_string());
        bindings.push(SqlValue::Text(start.clone()));
        bindings.push(SqlValue::Text(end.clone()));
    }

    if let Some(institution) = entities.institutions.first() {
        wheres.push("p.institution LIKE ?".to_string());
        bindings.push(SqlValue::Text(format!("%{}%", institution)));
    }

    if let Some(ids) = candidate_ids {
        if !ids.is_empty() {
            let placeholders = ids.iter().map(|_| "?").collect::<Vec<_>>().join(", ");
            wheres.push(format!("p.global_profile_id IN ({})", placeholders));
            for id in ids {
                bindings.push(SqlValue::Int(*id));
            }
        }
    }
}
