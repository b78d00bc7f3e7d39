//! Float position and profile endpoints

use super::{ApiError, AppState};
use crate::error::Error;
use crate::store::{BoundingBox, Measurement, Profile};
use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

const DEFAULT_RADIUS_LIMIT: usize = 100;
const DEFAULT_TRAJECTORY_LIMIT: usize = 50;

#[derive(Debug, Deserialize)]
pub struct RadiusParams {
    pub lat: f64,
    pub lon: f64,
    pub radius: f64,
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct LimitParams {
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct DepthWindowParams {
    pub min_depth: Option<f64>,
    pub max_depth: Option<f64>,
}

/// Summary row for list endpoints
#[derive(Debug, Serialize)]
pub struct FloatSummary {
    pub float_id: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub datetime: Option<String>,
    pub cycle_number: Option<i64>,
    pub measurement_count: i64,
    pub global_profile_id: i64,
}

impl From<Profile> for FloatSummary {
    fn from(p: Profile) -> Self {
        Self {
            float_id: p.float_id,
            latitude: p.latitude,
            longitude: p.longitude,
            datetime: p.datetime,
            cycle_number: p.cycle_number,
            measurement_count: p.measurement_count,
            global_profile_id: p.global_profile_id,
        }
    }
}

fn validate_center(lat: f64, lon: f64, radius: f64) -> Result<(), ApiError> {
    if !(-90.0..=90.0).contains(&lat) {
        return Err(ApiError::Invalid(format!(
            "lat must be within [-90, 90], got {}",
            lat
        )));
    }
    if !(-180.0..=180.0).contains(&lon) {
        return Err(ApiError::Invalid(format!(
            "lon must be within [-180, 180], got {}",
            lon
        )));
    }
    if !radius.is_finite() || radius <= 0.0 {
        return Err(ApiError::Invalid(format!(
            "radius must be positive, got {}",
            radius
        )));
    }
    Ok(())
}

/// GET /floats/radius — latest position per float within radius km
pub async fn floats_radius(
    State(state): State<Arc<AppState>>,
    Query(params): Query<RadiusParams>,
) -> Result<Json<serde_json::Value>, ApiError> {
    validate_center(params.lat, params.lon, params.radius)?;
    let limit = params.limit.unwrap_or(DEFAULT_RADIUS_LIMIT);

    let floats = state
        .engine
        .dev_store()
        .floats_within_radius(params.lat, params.lon, params.radius, limit)
        .await?;

    Ok(Json(json!({
        "status": "success",
        "count": floats.len(),
        "floats": floats,
    })))
}

/// GET /floats/indian-ocean — hard-coded Indian Ocean bounding box
pub async fn floats_indian_ocean(
    State(state): State<Arc<AppState>>,
    Query(params): Query<LimitParams>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let limit = params.limit.unwrap_or(DEFAULT_RADIUS_LIMIT);

    let profiles = state
        .engine
        .dev_store()
        .profiles_in_bbox(BoundingBox::INDIAN_OCEAN, limit)
        .await?;
    let floats: Vec<FloatSummary> = profiles.into_iter().map(FloatSummary::from).collect();

    Ok(Json(json!({
        "status": "success",
        "count": floats.len(),
        "floats": floats,
    })))
}

/// GET /floats/all — every float in the dev snapshot
pub async fn floats_all(
    State(state): State<Arc<AppState>>,
    Query(params): Query<LimitParams>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let limit = params.limit.unwrap_or(DEFAULT_RADIUS_LIMIT);

    let profiles = state.engine.dev_store().latest_positions(limit).await?;
    let floats: Vec<FloatSummary> = profiles.into_iter().map(FloatSummary::from).collect();

    Ok(Json(json!({
        "status": "success",
        "count": floats.len(),
        "floats": floats,
    })))
}

/// GET /floats/trajectories/radius — flat trajectory point array; the
/// client groups by floatId, each group chronologically ordered
pub async fn trajectories_radius(
    State(state): State<Arc<AppState>>,
    Query(params): Query<RadiusParams>,
) -> Result<Json<serde_json::Value>, ApiError> {
    validate_center(params.lat, params.lon, params.radius)?;
    let limit = params.limit.unwrap_or(DEFAULT_TRAJECTORY_LIMIT);

    let trajectories = state
        .engine
        .dev_store()
        .trajectories_within_radius(params.lat, params.lon, params.radius, limit)
        .await?;

    Ok(Json(json!({
        "status": "success",
        "count": trajectories.len(),
        "trajectories": trajectories,
    })))
}

/// Float detail: latest profile plus depth-windowed measurements
#[derive(Debug, Serialize)]
pub struct FloatDetail {
    pub status: String,
    pub profile: FloatSummary,
    pub measurements: Vec<Measurement>,
}

/// GET /floats/{float_id}
pub async fn float_detail(
    State(state): State<Arc<AppState>>,
    Path(float_id): Path<String>,
    Query(window): Query<DepthWindowParams>,
) -> Result<Json<FloatDetail>, ApiError> {
    let store = state.engine.dev_store();

    let profile = store
        .latest_profile_for_float(&float_id)
        .await?
        .ok_or(Error::FloatNotFound(float_id))?;

    let measurements = store
        .measurements_for_profile(
            profile.global_profile_id,
            window.min_depth,
            window.max_depth,
        )
        .await?;

    Ok(Json(FloatDetail {
        status: "success".to_string(),
        profile: FloatSummary::from(profile),
        measurements,
    }))
}
