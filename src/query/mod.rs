//! Natural-language query routing
//!
//! The read path: classify the query (`intent`), synthesize SQL
//! (`sql`), execute against the relational stores and/or the vector
//! index with result caching (`exec`, `cache`), and phrase a short
//! narrative over the rows (`answer`).

pub mod answer;
pub mod cache;
pub mod exec;
pub mod intent;
pub mod sql;

pub use cache::{query_fingerprint, QueryCache};
pub use exec::QueryEngine;
pub use intent::{classify, ClassifiedQuery, EntityBag, Intent, Parameter};
pub use sql::{synthesize, PlanShape, SqlPlan};

use serde::{Deserialize, Serialize};

/// Structured rows attached to a chat answer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableData {
    pub columns: Vec<String>,
    pub rows: Vec<serde_json::Value>,
    pub total_rows: usize,
}

/// One plottable point
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapPoint {
    pub lat: f64,
    pub lng: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub salinity: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub float_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub datetime: Option<String>,
}

/// Map payload attached when results carry positions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapData {
    pub points: Vec<MapPoint>,
    pub parameter: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
}

/// The chat endpoint's answer envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub status: String,
    pub message: String,
    pub query_type: String,
    pub has_data: bool,
    pub show_map: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table_data: Option<TableData>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub map_data: Option<MapData>,
}
