//! Payload schema for Qdrant points
//!
//! One point per profile row. The point ID is the numeric global
//! profile ID, so the vector ID space inherits the disjointness of the
//! dev/live relational ranges; the payload carries the filterable
//! metadata and the store tag the hybrid route needs.

use crate::parse::ParsedProfile;
use crate::regions;
use crate::store::StoreKind;
use chrono::Datelike;
use qdrant_client::qdrant::{PointStruct, Value as QdrantValue};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Width of the coarse coordinate buckets in degrees
pub const COORD_BUCKET_DEGREES: f64 = 5.0;

/// A point ready to be upserted to Qdrant
#[derive(Debug, Clone)]
pub struct ProfilePoint {
    pub id: i64,
    pub vector: Vec<f32>,
    pub payload: ProfilePayload,
}

impl ProfilePoint {
    /// Convert to qdrant-client PointStruct
    pub fn to_point_struct(self) -> PointStruct {
        let payload_map = self.payload.to_qdrant_payload();
        PointStruct::new(self.id as u64, self.vector, payload_map)
    }
}

/// Payload stored with each profile in Qdrant
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProfilePayload {
    /// Global profile ID in string form
    pub global_profile_id: String,

    /// Which relational store holds the profile row
    pub store: String,

    pub float_id: String,

    pub region: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub institution: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub year: Option<i64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub month: Option<i64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub season: Option<String>,

    /// Coordinates floored to 5-degree buckets
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lat_bucket: Option<i64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub lon_bucket: Option<i64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub depth_band: Option<String>,

    /// The embedding input document, kept for inspection and display
    pub document: String,
}

impl ProfilePayload {
    /// Build the payload for a freshly inserted profile
    pub fn from_profile(
        profile: &ParsedProfile,
        store: StoreKind,
        global_profile_id: i64,
        document: String,
    ) -> Self {
        let region = match (profile.latitude, profile.longitude) {
            (Some(lat), Some(lon)) => regions::classify(lat, lon).to_string(),
            _ => "unknown region".to_string(),
        };

        Self {
            global_profile_id: global_profile_id.to_string(),
            store: store.to_string(),
            float_id: profile.float_id.clone(),
            region,
            institution: profile.institution.clone(),
            year: profile.datetime.map(|dt| dt.year() as i64),
            month: profile.datetime.map(|dt| dt.month() as i64),
            season: profile
                .datetime
                .and_then(|dt| regions::season_for_month(dt.month()))
                .map(|s| s.to_string()),
            lat_bucket: profile.latitude.map(bucket),
            lon_bucket: profile.longitude.map(bucket),
            depth_band: profile
                .max_pressure
                .map(|p| regions::depth_band(p).to_string()),
            document,
        }
    }

    /// Convert to Qdrant payload format
    pub fn to_qdrant_payload(self) -> HashMap<String, QdrantValue> {
        let mut map = HashMap::new();

        map.insert(
            "global_profile_id".to_string(),
            string_to_qdrant(&self.global_profile_id),
        );
        map.insert("store".to_string(), string_to_qdrant(&self.store));
        map.insert("float_id".to_string(), string_to_qdrant(&self.float_id));
        map.insert("region".to_string(), string_to_qdrant(&self.region));
        map.insert("document".to_string(), string_to_qdrant(&self.document));

        if let Some(ref institution) = self.institution {
            map.insert("institution".to_string(), string_to_qdrant(institution));
        }
        if let Some(year) = self.year {
            map.insert("year".to_string(), int_to_qdrant(year));
        }
        if let Some(month) = self.month {
            map.insert("month".to_string(), int_to_qdrant(month));
        }
        if let Some(ref season) = self.season {
            map.insert("season".to_string(), string_to_qdrant(season));
        }
        if let Some(lat_bucket) = self.lat_bucket {
            map.insert("lat_bucket".to_string(), int_to_qdrant(lat_bucket));
        }
        if let Some(lon_bucket) = self.lon_bucket {
            map.insert("lon_bucket".to_string(), int_to_qdrant(lon_bucket));
        }
        if let Some(ref depth_band) = self.depth_band {
            map.insert("depth_band".to_string(), string_to_qdrant(depth_band));
        }

        map
    }
}

/// Floor a coordinate to its bucket edge
pub fn bucket(coord: f64) -> i64 {
    (coord / COORD_BUCKET_DEGREES).floor() as i64 * COORD_BUCKET_DEGREES as i64
}

fn string_to_qdrant(s: &str) -> QdrantValue {
    QdrantValue {
        kind: Some(qdrant_client::qdrant::value::Kind::StringValue(s.to_string())),
    }
}

fn int_to_qdrant(i: i64) -> QdrantValue {
    QdrantValue {
        kind: Some(qdrant_client::qdrant::value::Kind::IntegerValue(i)),
    }
}

impl From<Map<String, Value>> for ProfilePayload {
    fn from(map: Map<String, Value>) -> Self {
        serde_json::from_value(Value::Object(map)).unwrap_or_default()
    }
}
