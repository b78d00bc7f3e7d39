//! Natural-language query intent classification
//!
//! A pure function from query text to an intent tag plus an entity bag.
//! Classification is deterministic and echoes the raw query back for
//! downstream logging and fingerprinting.

use crate::regions;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Closed set of query intents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    /// Explain a concept; no data needed
    Informational,
    /// Identify a specific float by ID
    FloatLookup,
    /// Filter by named region or coordinates
    Spatial,
    /// Filter by time window
    Temporal,
    /// Parameter statistics over depth
    ParameterProfile,
    /// Free-text similarity
    Semantic,
    /// Vector recall refined by SQL
    Hybrid,
}

impl std::fmt::Display for Intent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Intent::Informational => "informational",
            Intent::FloatLookup => "float_lookup",
            Intent::Spatial => "spatial",
            Intent::Temporal => "temporal",
            Intent::ParameterProfile => "parameter_profile",
            Intent::Semantic => "semantic",
            Intent::Hybrid => "hybrid",
        };
        write!(f, "{}", s)
    }
}

/// Measured parameters a query can ask about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Parameter {
    Temperature,
    Salinity,
    Pressure,
}

impl Parameter {
    pub fn column(&self) -> &'static str {
        match self {
            Parameter::Temperature => "temperature",
            Parameter::Salinity => "salinity",
            Parameter::Pressure => "pressure",
        }
    }
}

/// Entities extracted from the query text
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityBag {
    pub float_ids: Vec<String>,
    /// Canonical gazetteer names, most specific first
    pub regions: Vec<String>,
    pub parameters: Vec<Parameter>,
    /// Pressure window in decibars
    pub depth_bounds: Option<(f64, f64)>,
    /// Half-open RFC 3339 window
    pub time_range: Option<(String, String)>,
    pub year: Option<i32>,
    pub season: Option<String>,
    pub institutions: Vec<String>,
    /// "latest"/"recent" style phrasing; routes to the live store
    pub recent: bool,
    /// Explicit request for raw rows instead of aggregation
    pub raw_rows: bool,
}

impl EntityBag {
    pub fn has_spatial(&self) -> bool {
        !self.regions.is_empty()
    }

    pub fn has_temporal(&self) -> bool {
        self.time_range.is_some() || self.year.is_some() || self.season.is_some() || self.recent
    }
}

/// Classification result; `raw` is the query exactly as received
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifiedQuery {
    pub raw: String,
    pub intent: Intent,
    pub entities: EntityBag,
}

const INFORMATIONAL_PATTERNS: &[&str] = &[
    "what is argo",
    "what are argo",
    "what is an argo",
    "tell me about argo",
    "explain argo",
    "describe argo",
    "how does argo work",
    "how do argo floats work",
    "information about argo",
    "what is a thermocline",
    "what is salinity",
    "what data do you have",
    "what can you do",
    "what are your capabilities",
];

const SEMANTIC_KEYWORDS: &[&str] = &[
    "similar",
    "pattern",
    "patterns",
    "anomal",
    "compare",
    "comparison",
    "trend",
    "trends",
    "unusual",
    "interesting",
    "characteristics",
];

fn float_id_regexes() -> &'static (Regex, Regex) {
    static RE: OnceLock<(Regex, Regex)> = OnceLock::new();
    RE.get_or_init(|| {
        (
            Regex::new(r"(?i)\bfloat\s+(\d{5,8})\b").expect("static regex"),
            Regex::new(r"\b(\d{7})\b").expect("static regex"),
        )
    })
}

fn year_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b(19\d{2}|20\d{2})\b").expect("static regex"))
}

fn depth_regexes() -> &'static (Regex, Regex) {
    static RE: OnceLock<(Regex, Regex)> = OnceLock::new();
    RE.get_or_init(|| {
        (
            Regex::new(r"(?i)\bbetween\s+(\d+(?:\.\d+)?)\s+and\s+(\d+(?:\.\d+)?)\s*(?:m|meters?|dbar)\b")
                .expect("static regex"),
            Regex::new(r"(?i)\bat\s+(\d+(?:\.\d+)?)\s*(?:m|meters?|dbar)\b").expect("static regex"),
        )
    })
}

/// Classify a natural-language query
pub fn classify(query: &str) -> ClassifiedQuery {
    let lower = query.to_lowercase();

    if INFORMATIONAL_PATTERNS.iter().any(|p| lower.contains(p)) {
        return ClassifiedQuery {
            raw: query.to_string(),
            intent: Intent::Informational,
            entities: EntityBag::default(),
        };
    }

    let mut entities = EntityBag {
        float_ids: extract_float_ids(query),
        regions: extract_regions(&lower),
        parameters: extract_parameters(&lower),
        depth_bounds: extract_depth_bounds(&lower),
        institutions: extract_institutions(&lower),
        recent: ["latest", "recent", "current", "right now"]
            .iter()
            .any(|k| lower.contains(k)),
        raw_rows: lower.contains("raw") || lower.contains(" rows"),
        ..Default::default()
    };

    entities.year = year_regex()
        .captures(&lower)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok());
    entities.season = extract_season(&lower);
    entities.time_range = build_time_range(&lower, entities.year, entities.season.as_deref());

    let semantic = SEMANTIC_KEYWORDS.iter().any(|k| lower.contains(k));

    let intent = if !entities.float_ids.is_empty() {
        Intent::FloatLookup
    } else if semantic && (entities.has_spatial() || entities.has_temporal()) {
        Intent::Hybrid
    } else if semantic {
        Intent::Semantic
    } else if entities.has_spatial() {
        Intent::Spatial
    } else if entities.has_temporal() {
        Intent::Temporal
    } else if !entities.parameters.is_empty() {
        Intent::ParameterProfile
    } else {
        Intent::Informational
    };

    ClassifiedQuery {
        raw: query.to_string(),
        intent,
        entities,
    }
}

fn extract_float_ids(query: &str) -> Vec<String> {
    let (explicit, bare) = float_id_regexes();

    let mut ids: Vec<String> = explicit
        .captures_iter(query)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .collect();

    // A bare 7-digit number reads as a WMO float ID unless it parses as
    // something else above (years never have 7 digits).
    for c in bare.captures_iter(query) {
        let id = c[1].to_string();
        if !ids.contains(&id) {
            ids.push(id);
        }
    }

    ids
}

fn extract_regions(lower: &str) -> Vec<String> {
    regions::REGIONS
        .iter()
        .filter(|r| r.matches(lower))
        .map(|r| r.name.to_string())
        .collect()
}

fn extract_parameters(lower: &str) -> Vec<Parameter> {
    let mut params = Vec::new();
    if ["temperature", "temp ", "thermal", "warm", "heat"]
        .iter()
        .any(|k| lower.contains(k))
    {
        params.push(Parameter::Temperature);
    }
    if ["salinity", "salt", "saline", "psu"].iter().any(|k| lower.contains(k)) {
        params.push(Parameter::Salinity);
    }
    if lower.contains("pressure") {
        params.push(Parameter::Pressure);
    }
    params
}

fn extract_depth_bounds(lower: &str) -> Option<(f64, f64)> {
    let (between, at) = depth_regexes();

    if let Some(c) = between.captures(lower) {
        let a: f64 = c[1].parse().ok()?;
        let b: f64 = c[2].parse().ok()?;
        return Some((a.min(b), a.max(b)));
    }

    if let Some(c) = at.captures(lower) {
        let d: f64 = c[1].parse().ok()?;
        return Some(((d - 25.0).max(0.0), d + 25.0));
    }

    if lower.contains("surface") {
        return Some((0.0, 50.0));
    }

    None
}

fn extract_season(lower: &str) -> Option<String> {
    for season in ["winter", "spring", "summer", "autumn", "fall"] {
        if lower.contains(season) {
            let canonical = if season == "fall" { "autumn" } else { season };
            return Some(canonical.to_string());
        }
    }
    None
}

fn extract_institutions(lower: &str) -> Vec<String> {
    let known: &[(&str, &[&str])] = &[
        ("INCOIS", &["incois", "indian national centre"]),
        ("CSIRO", &["csiro", "commonwealth scientific"]),
        ("IFREMER", &["ifremer", "french research"]),
        ("CORIOLIS", &["coriolis"]),
        ("AOML", &["aoml"]),
    ];

    known
        .iter()
        .filter(|(_, keys)| keys.iter().any(|k| lower.contains(k)))
        .map(|(name, _)| name.to_string())
        .collect()
}

/// Derive an absolute half-open time window when the text pins one down
fn build_time_range(lower: &str, year: Option<i32>, season: Option<&str>) -> Option<(String, String)> {
    let months: &[(&str, u32)] = &[
        ("january", 1),
        ("february", 2),
        ("march", 3),
        ("april", 4),
        ("may", 5),
        ("june", 6),
        ("july", 7),
        ("august", 8),
        ("september", 9),
        ("october", 10),
        ("november", 11),
        ("december", 12),
    ];

    let year = year?;

    if let Some(&(_, month)) = months.iter().find(|(name, _)| lower.contains(name)) {
        let (next_year, next_month) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
        return Some((
            format!("{:04}-{:02}-01T00:00:00+00:00", year, month),
            format!("{:04}-{:02}-01T00:00:00+00:00", next_year, next_month),
        ));
    }

    if let Some(season) = season {
        return regions::season_bounds(season, year);
    }

    Some((
        format!("{:04}-01-01T00:00:00+00:00", year),
        format!("{:04}-01-01T00:00:00+00:00", year + 1),
    ))
}
