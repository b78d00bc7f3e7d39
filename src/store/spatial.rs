//! Spatial queries over the profiles table
//!
//! Radius filtering runs in two stages: a bounding-box prefilter pushed
//! into SQL, then an exact great-circle distance check with Haversine.

use super::{ArgoDb, Profile};
use crate::error::Result;
use serde::{Deserialize, Serialize};

/// Mean Earth radius in kilometers
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Great-circle distance between two points, in kilometers
pub fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let (lat1, lon1, lat2, lon2) = (
        lat1.to_radians(),
        lon1.to_radians(),
        lat2.to_radians(),
        lon2.to_radians(),
    );

    let dlat = lat2 - lat1;
    let dlon = lon2 - lon1;
    let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);

    2.0 * a.sqrt().min(1.0).asin() * EARTH_RADIUS_KM
}

/// A float's latest position relative to a query center
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FloatPosition {
    pub float_id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub distance_km: f64,
    pub datetime: Option<String>,
    pub cycle_number: Option<i64>,
    pub measurement_count: i64,
    pub global_profile_id: i64,
}

/// One position along a float's drift track. Clients group the flat
/// array by `floatId`; within a float, points are chronological.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrajectoryPoint {
    #[serde(rename = "profileId")]
    pub profile_id: i64,
    pub lat: f64,
    pub lon: f64,
    #[serde(rename = "floatId")]
    pub float_id: String,
    #[serde(rename = "cycleNumber")]
    pub cycle_number: Option<i64>,
    pub datetime: Option<String>,
}

/// Inclusive coordinate bounds
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub lat_min: f64,
    pub lat_max: f64,
    pub lon_min: f64,
    pub lon_max: f64,
}

impl BoundingBox {
    /// Indian Ocean bounds used by the hard-coded map endpoint
    pub const INDIAN_OCEAN: BoundingBox = BoundingBox {
        lat_min: -40.0,
        lat_max: 30.0,
        lon_min: 20.0,
        lon_max: 120.0,
    };

    /// Box that encloses a radius around a center. One degree of
    /// latitude is ~111 km; longitude shrinks with cos(latitude).
    pub fn around(lat: f64, lon: f64, radius_km: f64) -> Self {
        let lat_delta = radius_km / 111.0;
        let lon_delta = radius_km / (111.0 * lat.to_radians().cos().abs().max(1e-6));

        BoundingBox {
            lat_min: (lat - lat_delta).max(-90.0),
            lat_max: (lat + lat_delta).min(90.0),
            lon_min: (lon - lon_delta).max(-180.0),
            lon_max: (lon + lon_delta).min(180.0),
        }
    }
}

/// Latest positioned profile per float, newest first
const LATEST_PER_FLOAT_SQL: &str = r#"
    SELECT p.* FROM argo_profiles p
    JOIN (
        SELECT float_id, MAX(datetime) AS max_datetime
        FROM argo_profiles
        WHERE latitude IS NOT NULL AND longitude IS NOT NULL
        GROUP BY float_id
    ) latest
    ON latest.float_id = p.float_id AND latest.max_datetime = p.datetime
    WHERE p.latitude IS NOT NULL AND p.longitude IS NOT NULL
"#;

impl ArgoDb {
    /// Latest position per float across the whole store
    pub async fn latest_positions(&self, limit: usize) -> Result<Vec<Profile>> {
        let sql = format!(
            "{} GROUP BY p.float_id ORDER BY p.datetime DESC LIMIT ?",
            LATEST_PER_FLOAT_SQL
        );
        let profiles = sqlx::query_as::<_, Profile>(&sql)
            .bind(limit as i64)
            .fetch_all(self.pool())
            .await?;
        Ok(profiles)
    }

    /// Latest position per float inside a bounding box, newest first
    pub async fn profiles_in_bbox(&self, bbox: BoundingBox, limit: usize) -> Result<Vec<Profile>> {
        let sql = format!(
            "{} AND p.latitude BETWEEN ? AND ? AND p.longitude BETWEEN ? AND ? \
             GROUP BY p.float_id ORDER BY p.datetime DESC LIMIT ?",
            LATEST_PER_FLOAT_SQL
        );
        let profiles = sqlx::query_as::<_, Profile>(&sql)
            .bind(bbox.lat_min)
            .bind(bbox.lat_max)
            .bind(bbox.lon_min)
            .bind(bbox.lon_max)
            .bind(limit as i64)
            .fetch_all(self.pool())
            .await?;
        Ok(profiles)
    }

    /// Floats whose latest position lies within `radius_km` of a center,
    /// ordered by distance
    pub async fn floats_within_radius(
        &self,
        lat: f64,
        lon: f64,
        radius_km: f64,
        limit: usize,
    ) -> Result<Vec<FloatPosition>> {
        let bbox = BoundingBox::around(lat, lon, radius_km);
        let sql = format!(
            "{} AND p.latitude BETWEEN ? AND ? AND p.longitude BETWEEN ? AND ? \
             GROUP BY p.float_id",
            LATEST_PER_FLOAT_SQL
        );
        let candidates = sqlx::query_as::<_, Profile>(&sql)
            .bind(bbox.lat_min)
            .bind(bbox.lat_max)
            .bind(bbox.lon_min)
            .bind(bbox.lon_max)
            .fetch_all(self.pool())
            .await?;

        let mut hits: Vec<FloatPosition> = candidates
            .into_iter()
            .filter_map(|p| {
                let (p_lat, p_lon) = (p.latitude?, p.longitude?);
                let distance = haversine_km(lat, lon, p_lat, p_lon);
                if distance <= radius_km {
                    Some(FloatPosition {
                        float_id: p.float_id,
                        latitude: p_lat,
                        longitude: p_lon,
                        distance_km: (distance * 100.0).round() / 100.0,
                        datetime: p.datetime,
                        cycle_number: p.cycle_number,
                        measurement_count: p.measurement_count,
                        global_profile_id: p.global_profile_id,
                    })
                } else {
                    None
                }
            })
            .collect();

        hits.sort_by(|a, b| {
            a.distance_km
                .partial_cmp(&b.distance_km)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(limit);
        Ok(hits)
    }

    /// Full drift history for every float whose latest position is within
    /// the radius. Points are ordered by float, then chronologically.
    pub async fn trajectories_within_radius(
        &self,
        lat: f64,
        lon: f64,
        radius_km: f64,
        limit: usize,
    ) -> Result<Vec<TrajectoryPoint>> {
        let in_radius = self.floats_within_radius(lat, lon, radius_km, limit).await?;
        if in_radius.is_empty() {
            return Ok(Vec::new());
        }

        let float_ids: Vec<String> = in_radius.into_iter().map(|f| f.float_id).collect();
        let placeholders = float_ids.iter().map(|_| "?").collect::<Vec<_>>().join(",");
        let sql = format!(
            "SELECT global_profile_id, latitude, longitude, float_id, cycle_number, datetime \
             FROM argo_profiles \
             WHERE float_id IN ({}) AND latitude IS NOT NULL AND longitude IS NOT NULL \
             ORDER BY float_id, datetime",
            placeholders
        );

        let mut query = sqlx::query_as::<_, (i64, f64, f64, String, Option<i64>, Option<String>)>(&sql);
        for id in &float_ids {
            query = query.bind(id);
        }
        let rows = query.fetch_all(self.pool()).await?;

        Ok(rows
            .into_iter()
            .map(
                |(profile_id, p_lat, p_lon, float_id, cycle_number, datetime)| TrajectoryPoint {
                    profile_id,
                    lat: p_lat,
                    lon: p_lon,
                    float_id,
                    cycle_number,
                    datetime,
                },
            )
            .collect())
    }
}
