//! Qdrant vector index for profile embeddings
//!
//! This module wraps the Qdrant client and provides:
//! - Collection management
//! - Point upsert/delete operations keyed by global profile ID
//! - Top-k similarity search with metadata filters

mod payload;

pub use payload::*;

use crate::config::Config;
use crate::error::{Error, Result};
use qdrant_client::qdrant::{
    Condition, CreateCollectionBuilder, DeletePointsBuilder, Distance, Filter, PointId,
    PointStruct, ScalarQuantizationBuilder, ScrollPointsBuilder, SearchPointsBuilder,
    UpsertPointsBuilder, VectorParamsBuilder,
};
use qdrant_client::Qdrant;
use serde_json::Value;
use tracing::{debug, info};

/// Information about the profile collection
#[derive(Debug, Clone)]
pub struct CollectionInfo {
    pub points_count: u64,
    pub indexed_vectors_count: u64,
    pub status: String,
}

/// A similarity hit
#[derive(Debug, Clone)]
pub struct ProfileHit {
    pub profile_id: i64,
    pub score: f32,
    pub payload: ProfilePayload,
}

/// Structured metadata filters for similarity search
#[derive(Debug, Clone, Default)]
pub struct ProfileFilter {
    pub store: Option<String>,
    pub float_id: Option<String>,
    pub region: Option<String>,
    pub institution: Option<String>,
    pub year: Option<i64>,
    pub season: Option<String>,
    pub depth_band: Option<String>,
}

impl ProfileFilter {
    fn to_qdrant_filter(&self) -> Option<Filter> {
        let mut must: Vec<Condition> = Vec::new();

        if let Some(ref store) = self.store {
            must.push(Condition::matches("store", store.clone()));
        }
        if let Some(ref float_id) = self.float_id {
            must.push(Condition::matches("float_id", float_id.clone()));
        }
        if let Some(ref region) = self.region {
            must.push(Condition::matches("region", region.clone()));
        }
        if let Some(ref institution) = self.institution {
            must.push(Condition::matches("institution", institution.clone()));
        }
        if let Some(year) = self.year {
            must.push(Condition::matches("year", year));
        }
        if let Some(ref season) = self.season {
            must.push(Condition::matches("season", season.clone()));
        }
        if let Some(ref depth_band) = self.depth_band {
            must.push(Condition::matches("depth_band", depth_band.clone()));
        }

        if must.is_empty() {
            return None;
        }

        Some(Filter {
            must,
            should: vec![],
            must_not: vec![],
            min_should: None,
        })
    }
}

/// Profile vector index handle
pub struct ProfileIndex {
    client: Qdrant,
    collection: String,
    dimension: usize,
}

impl ProfileIndex {
    /// Connect using config
    pub async fn connect(config: &Config) -> Result<Self> {
        Self::new(
            &config.qdrant_url,
            &config.collection_name,
            config.embedding.dimension,
            config.qdrant_api_key(),
        )
        .await
    }

    /// Create a new index connection directly
    pub async fn new(
        url: &str,
        collection: &str,
        dimension: usize,
        api_key: Option<String>,
    ) -> Result<Self> {
        debug!("Connecting to Qdrant at {}", url);

        let mut builder = Qdrant::from_url(url)
            .skip_compatibility_check()
            .timeout(std::time::Duration::from_secs(30));
        if let Some(key) = api_key {
            builder = builder.api_key(key);
        }
        let client = builder.build().map_err(|e| Error::Qdrant(e.to_string()))?;

        Ok(Self {
            client,
            collection: collection.to_string(),
            dimension,
        })
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Ensure the collection exists with correct configuration
    pub async fn ensure_collection(&self) -> Result<()> {
        if self.client.collection_exists(&self.collection).await? {
            debug!("Collection {} already exists", self.collection);
            return Ok(());
        }

        info!(
            "Creating collection {} with dimension {}",
            self.collection, self.dimension
        );

        let vectors_config = VectorParamsBuilder::new(self.dimension as u64, Distance::Cosine);

        self.client
            .create_collection(
                CreateCollectionBuilder::new(&self.collection)
                    .vectors_config(vectors_config)
                    .quantization_config(ScalarQuantizationBuilder::default()),
            )
            .await?;

        Ok(())
    }

    pub async fn collection_exists(&self) -> Result<bool> {
        let exists = self.client.collection_exists(&self.collection).await?;
        Ok(exists)
    }

    /// Reset the collection (delete and recreate)
    pub async fn reset_collection(&self) -> Result<()> {
        if self.client.collection_exists(&self.collection).await? {
            info!("Deleting existing collection {}", self.collection);
            self.client.delete_collection(&self.collection).await?;
        }
        self.ensure_collection().await
    }

    /// Get collection info (point count, etc)
    pub async fn get_collection_info(&self) -> Result<Option<CollectionInfo>> {
        if !self.client.collection_exists(&self.collection).await? {
            return Ok(None);
        }

        let info = self.client.collection_info(&self.collection).await?;
        if let Some(result) = info.result {
            Ok(Some(CollectionInfo {
                points_count: result.points_count.unwrap_or(0),
                indexed_vectors_count: result.indexed_vectors_count.unwrap_or(0),
                status: format!("{:?}", result.status()),
            }))
        } else {
            Ok(None)
        }
    }

    /// Upsert profile points (converts to PointStruct internally)
    pub async fn upsert_points(&self, points: Vec<ProfilePoint>) -> Result<()> {
        if points.is_empty() {
            return Ok(());
        }

        if let Some(mismatch) = points.iter().find(|p| p.vector.len() != self.dimension) {
            return Err(Error::Qdrant(format!(
                "Vector dimension mismatch for collection '{}': expected {}, got {}",
                self.collection,
                self.dimension,
                mismatch.vector.len()
            )));
        }

        debug!(
            "Upserting {} points to collection {}",
            points.len(),
            self.collection
        );

        let point_structs: Vec<PointStruct> =
            points.into_iter().map(|p| p.to_point_struct()).collect();

        self.client
            .upsert_points(UpsertPointsBuilder::new(&self.collection, point_structs))
            .await?;

        Ok(())
    }

    /// Delete points by global profile ID
    pub async fn delete_points(&self, profile_ids: &[i64]) -> Result<()> {
        if profile_ids.is_empty() {
            return Ok(());
        }

        debug!(
            "Deleting {} points from collection {}",
            profile_ids.len(),
            self.collection
        );

        let ids: Vec<PointId> = profile_ids.iter().map(|&id| PointId::from(id as u64)).collect();

        self.client
            .delete_points(DeletePointsBuilder::new(&self.collection).points(ids))
            .await?;

        Ok(())
    }

    /// Top-k similarity search with optional metadata filters
    pub async fn search(
        &self,
        query_vector: Vec<f32>,
        k: usize,
        filter: Option<ProfileFilter>,
    ) -> Result<Vec<ProfileHit>> {
        debug!(
            "Searching collection {} with limit {}",
            self.collection, k
        );

        let mut search_builder =
            SearchPointsBuilder::new(&self.collection, query_vector, k as u64).with_payload(true);

        if let Some(f) = filter {
            if let Some(qdrant_filter) = f.to_qdrant_filter() {
                search_builder = search_builder.filter(qdrant_filter);
            }
        }

        let response = self.client.search_points(search_builder).await?;

        let hits: Vec<ProfileHit> = response
            .result
            .into_iter()
            .filter_map(|p| {
                let payload: ProfilePayload = p
                    .payload
                    .into_iter()
                    .map(|(k, v)| (k, json_from_qdrant_value(v)))
                    .collect::<serde_json::Map<String, Value>>()
                    .into();

                let profile_id = point_id_to_i64(p.id)?;
                Some(ProfileHit {
                    profile_id,
                    score: p.score,
                    payload,
                })
            })
            .collect();

        Ok(hits)
    }

    /// List all point IDs (for orphan repair) by scrolling the collection
    pub async fn list_all_point_ids(&self) -> Result<Vec<i64>> {
        let mut all_ids = Vec::new();
        let mut offset: Option<PointId> = None;
        let batch_size = 1000u32;

        loop {
            let mut scroll_builder = ScrollPointsBuilder::new(&self.collection)
                .limit(batch_size)
                .with_payload(false)
                .with_vectors(false);

            if let Some(ref o) = offset {
                scroll_builder = scroll_builder.offset(o.clone());
            }

            let response = self.client.scroll(scroll_builder).await?;

            let points = response.result;
            if points.is_empty() {
                break;
            }

            for point in &points {
                if let Some(id) = point.id.clone().and_then(|id| point_id_to_i64(Some(id))) {
                    all_ids.push(id);
                }
            }

            offset = response.next_page_offset;
            if offset.is_none() {
                break;
            }
        }

        Ok(all_ids)
    }
}

/// Convert PointId to a global profile ID
fn point_id_to_i64(id: Option<PointId>) -> Option<i64> {
    match id {
        Some(PointId {
            point_id_options: Some(qdrant_client::qdrant::point_id::PointIdOptions::Num(num)),
        }) => Some(num as i64),
        Some(PointId {
            point_id_options: Some(qdrant_client::qdrant::point_id::PointIdOptions::Uuid(uuid)),
        }) => uuid.parse().ok(),
        _ => None,
    }
}

/// Convert Qdrant value to serde_json Value
fn json_from_qdrant_value(v: qdrant_client::qdrant::Value) -> Value {
    use qdrant_client::qdrant::value::Kind;

    match v.kind {
        Some(Kind::NullValue(_)) => Value::Null,
        Some(Kind::BoolValue(b)) => Value::Bool(b),
        Some(Kind::IntegerValue(i)) => Value::Number(i.into()),
        Some(Kind::DoubleValue(d)) => serde_json::Number::from_f64(d)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        Some(Kind::StringValue(s)) => Value::String(s),
        Some(Kind::ListValue(list)) => Value::Array(
            list.values.into_iter().map(json_from_qdrant_value).collect(),
        ),
        Some(Kind::StructValue(s)) => Value::Object(
            s.fields
                .into_iter()
                .map(|(k, v)| (k, json_from_qdrant_value(v)))
                .collect(),
        ),
        None => Value::Null,
    }
}
