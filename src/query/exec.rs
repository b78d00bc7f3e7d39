//! Query routing and retrieval execution
//!
//! One engine instance serves all query tasks. Per query: classify,
//! consult the result cache, route by intent (SQL, vector, or vector
//! recall refined by SQL), and phrase the answer. Embedding or narrator
//! faults degrade the answer instead of failing the request.

use super::answer;
use super::cache::{query_fingerprint, QueryCache};
use super::intent::{classify, ClassifiedQuery, EntityBag, Intent};
use super::sql::{synthesize, PlanShape, SqlPlan};
use super::{ChatResponse, MapData, MapPoint, TableData};
use crate::config::Config;
use crate::embed::Embedder;
use crate::error::{Error, Result};
use crate::narrate::Narrator;
use crate::store::{ArgoDb, QueryRows, StoreKind};
use crate::vector::{ProfileFilter, ProfileHit, ProfileIndex};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Maximum points shipped in a map payload
const MAP_POINT_CAP: usize = 100;

/// The read-path engine: classifier, synthesizer, executor, cache
pub struct QueryEngine {
    config: Config,
    dev: ArgoDb,
    live: ArgoDb,
    vector: ProfileIndex,
    embedder: Arc<dyn Embedder>,
    narrator: Option<Arc<dyn Narrator>>,
    cache: QueryCache,
}

impl QueryEngine {
    pub fn new(
        config: Config,
        dev: ArgoDb,
        live: ArgoDb,
        vector: ProfileIndex,
        embedder: Arc<dyn Embedder>,
        narrator: Option<Arc<dyn Narrator>>,
    ) -> Self {
        let cache = QueryCache::new(
            Duration::from_secs(config.query.cache_ttl_secs),
            config.query.cache_max_entries,
        );
        Self {
            config,
            dev,
            live,
            vector,
            embedder,
            narrator,
            cache,
        }
    }

    pub fn dev_store(&self) -> &ArgoDb {
        &self.dev
    }

    pub fn live_store(&self) -> &ArgoDb {
        &self.live
    }

    fn db_for(&self, store: StoreKind) -> &ArgoDb {
        match store {
            StoreKind::Dev => &self.dev,
            StoreKind::Live => &self.live,
        }
    }

    /// Queries about the latest data go to the live store; everything
    /// else runs against the stable dev snapshot
    fn store_for(&self, classified: &ClassifiedQuery) -> StoreKind {
        if classified.entities.recent {
            StoreKind::Live
        } else {
            StoreKind::Dev
        }
    }

    /// Answer one natural-language query
    pub async fn answer(&self, raw_query: &str) -> Result<ChatResponse> {
        let classified = classify(raw_query);
        let store = self.store_for(&classified);
        let fingerprint = query_fingerprint(&classified, store);

        if let Some(hit) = self.cache.get(&fingerprint) {
            return Ok(hit);
        }

        info!(intent = %classified.intent, store = %store, "routing query");

        let response = match classified.intent {
            Intent::Informational => self.informational(&classified).await,
            Intent::Semantic => self.semantic(&classified, store).await?,
            Intent::Hybrid => self.hybrid(&classified, store).await?,
            _ => self.sql_route(&classified, store, None).await?,
        };

        self.cache.put(fingerprint, response.clone());
        Ok(response)
    }

    async fn informational(&self, classified: &ClassifiedQuery) -> ChatResponse {
        let message = answer::informational(
            &classified.raw,
            self.narrator.as_deref(),
            &self.config.answer,
        )
        .await;

        ChatResponse {
            status: "success".to_string(),
            message,
            query_type: classified.intent.to_string(),
            has_data: false,
            show_map: false,
            table_data: None,
            map_data: None,
        }
    }

    async fn sql_route(
        &self,
        classified: &ClassifiedQuery,
        store: StoreKind,
        candidate_ids: Option<&[i64]>,
    ) -> Result<ChatResponse> {
        let plan = synthesize(classified, &self.config.query, candidate_ids)?;
        let rows = self
            .db_for(store)
            .query(
                &plan.sql,
                &plan.bindings,
                self.config.query.row_cap,
                Duration::from_secs(self.config.query.sql_timeout_secs),
            )
            .await?;

        let table = shape_table(&plan, rows, self.config.query.depth_bin_meters);
        let message = answer::summarize_table(classified, &table, &self.config.answer);
        let map_data = build_map_data(classified, &table);

        Ok(ChatResponse {
            status: "success".to_string(),
            message,
            query_type: classified.intent.to_string(),
            has_data: true,
            show_map: map_data.is_some(),
            table_data: Some(table),
            map_data,
        })
    }

    async fn semantic(
        &self,
        classified: &ClassifiedQuery,
        store: StoreKind,
    ) -> Result<ChatResponse> {
        let hits = match self.vector_recall(classified, store).await {
            Ok(hits) => hits,
            Err(e) => {
                warn!("semantic recall unavailable: {}", e);
                return Ok(degraded_semantic_response(classified));
            }
        };

        let table = self.hits_to_table(hits).await?;
        let message = answer::summarize_table(classified, &table, &self.config.answer);
        let map_data = build_map_data(classified, &table);

        Ok(ChatResponse {
            status: "success".to_string(),
            message,
            query_type: classified.intent.to_string(),
            has_data: !table.rows.is_empty(),
            show_map: map_data.is_some(),
            table_data: Some(table),
            map_data,
        })
    }

    async fn hybrid(
        &self,
        classified: &ClassifiedQuery,
        store: StoreKind,
    ) -> Result<ChatResponse> {
        match self.vector_recall(classified, store).await {
            Ok(hits) if !hits.is_empty() => {
                let ids: Vec<i64> = hits.iter().map(|h| h.profile_id).collect();
                self.sql_route(classified, store, Some(&ids)).await
            }
            Ok(_) => self.sql_route(classified, store, None).await,
            Err(e) => {
                // Degrade to plain SQL when the embedding path is down
                warn!("hybrid recall unavailable, falling back to SQL: {}", e);
                self.sql_route(classified, store, None).await
            }
        }
    }

    async fn vector_recall(
        &self,
        classified: &ClassifiedQuery,
        store: StoreKind,
    ) -> Result<Vec<ProfileHit>> {
        let embedding = self
            .embedder
            .embed(vec![classified.raw.clone()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::Embedding("No embedding returned".to_string()))?;

        let filter = filter_from_entities(&classified.entities, store);
        self.vector
            .search(embedding, self.config.query.top_k_default, Some(filter))
            .await
    }

    /// Enrich vector hits with their store rows for display
    async fn hits_to_table(&self, hits: Vec<ProfileHit>) -> Result<TableData> {
        let columns = vec![
            "global_profile_id".to_string(),
            "float_id".to_string(),
            "region".to_string(),
            "latitude".to_string(),
            "longitude".to_string(),
            "datetime".to_string(),
            "score".to_string(),
        ];

        let mut rows = Vec::with_capacity(hits.len());
        for hit in hits {
            let source = StoreKind::from_str(&hit.payload.store).unwrap_or(StoreKind::Dev);
            let profile = self.db_for(source).get_profile(hit.profile_id).await?;

            let mut object = serde_json::Map::new();
            object.insert("global_profile_id".to_string(), hit.profile_id.into());
            object.insert("float_id".to_string(), hit.payload.float_id.clone().into());
            object.insert("region".to_string(), hit.payload.region.clone().into());
            match &profile {
                Some(p) => {
                    object.insert("latitude".to_string(), json_f64(p.latitude));
                    object.insert("longitude".to_string(), json_f64(p.longitude));
                    object.insert(
                        "datetime".to_string(),
                        p.datetime.clone().map(Into::into).unwrap_or(serde_json::Value::Null),
                    );
                }
                None => {
                    object.insert("latitude".to_string(), serde_json::Value::Null);
                    object.insert("longitude".to_string(), serde_json::Value::Null);
                    object.insert("datetime".to_string(), serde_json::Value::Null);
                }
            }
            object.insert(
                "score".to_string(),
                json_f64(Some((hit.score as f64 * 10_000.0).round() / 10_000.0)),
            );
            rows.push(serde_json::Value::Object(object));
        }

        let total_rows = rows.len();
        Ok(TableData {
            columns,
            rows,
            total_rows,
        })
    }
}

fn json_f64(value: Option<f64>) -> serde_json::Value {
    value
        .and_then(serde_json::Number::from_f64)
        .map(serde_json::Value::Number)
        .unwrap_or(serde_json::Value::Null)
}

fn degraded_semantic_response(classified: &ClassifiedQuery) -> ChatResponse {
    ChatResponse {
        status: "success".to_string(),
        message: "Semantic search is temporarily unavailable. Try a float ID, a named \
                  region such as the Arabian Sea, or a time window instead."
            .to_string(),
        query_type: classified.intent.to_string(),
        has_data: false,
        show_map: false,
        table_data: None,
        map_data: None,
    }
}

fn filter_from_entities(entities: &EntityBag, store: StoreKind) -> ProfileFilter {
    ProfileFilter {
        store: Some(store.to_string()),
        float_id: entities.float_ids.first().cloned(),
        region: entities.regions.first().cloned(),
        institution: entities.institutions.first().cloned(),
        year: entities.year.map(|y| y as i64),
        season: entities.season.clone(),
        depth_band: None,
    }
}

/// Canonicalize rows for display. Aggregated plans turn the numeric
/// depth bin into a `depth_range` label in the leading column.
fn shape_table(plan: &SqlPlan, rows: QueryRows, bin_width: f64) -> TableData {
    match plan.shape {
        PlanShape::Raw => TableData {
            total_rows: rows.len(),
            columns: rows.columns,
            rows: rows.rows,
        },
        PlanShape::Aggregated => {
            let columns: Vec<String> = std::iter::once("depth_range".to_string())
                .chain(rows.columns.iter().filter(|c| *c != "depth_bin").cloned())
                .collect();

            let shaped: Vec<serde_json::Value> = rows
                .rows
                .into_iter()
                .map(|row| {
                    let mut object = serde_json::Map::new();
                    let bin = row.get("depth_bin").and_then(|v| v.as_f64()).unwrap_or(0.0);
                    object.insert(
                        "depth_range".to_string(),
                        format!("{}-{}m", bin as i64, (bin + bin_width) as i64).into(),
                    );
                    if let Some(source) = row.as_object() {
                        for (key, value) in source {
                            if key != "depth_bin" {
                                object.insert(key.clone(), value.clone());
                            }
                        }
                    }
                    serde_json::Value::Object(object)
                })
                .collect();

            TableData {
                total_rows: shaped.len(),
                columns,
                rows: shaped,
            }
        }
    }
}

/// Build the map payload when rows carry positions
fn build_map_data(classified: &ClassifiedQuery, table: &TableData) -> Option<MapData> {
    let has_position = table.columns.iter().any(|c| c == "latitude")
        && table.columns.iter().any(|c| c == "longitude");
    if !has_position {
        return None;
    }

    let points: Vec<MapPoint> = table
        .rows
        .iter()
        .filter_map(|row| {
            let lat = row.get("latitude")?.as_f64()?;
            let lng = row.get("longitude")?.as_f64()?;
            Some(MapPoint {
                lat,
                lng,
                temperature: row.get("temperature").and_then(|v| v.as_f64()),
                salinity: row.get("salinity").and_then(|v| v.as_f64()),
                float_id: row
                    .get("float_id")
                    .and_then(|v| v.as_str())
                    .map(String::from),
                datetime: row
                    .get("datetime")
                    .and_then(|v| v.as_str())
                    .map(String::from),
            })
        })
        .take(MAP_POINT_CAP)
        .collect();

    if points.is_empty() {
        return None;
    }

    Some(MapData {
        points,
        parameter: classified
            .entities
            .parameters
            .first()
            .map(|p| p.column().to_string())
            .unwrap_or_else(|| "temperature".to_string()),
        region: classified.entities.regions.first().cloned(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embed::stub::StubEmbedder;
    use crate::parse::{ParsedLevel, ParsedProfile};
    use crate::store::IdRange;
    use chrono::TimeZone;

    async fn seeded_engine(embedder: StubEmbedder) -> QueryEngine {
        let config = Config::default();
        let dev = ArgoDb::connect_memory(StoreKind::Dev, IdRange::new(1, 1_000))
            .await
            .unwrap();
        let live = ArgoDb::connect_memory(StoreKind::Live, IdRange::new(1_000, 2_000))
            .await
            .unwrap();
        let vector = ProfileIndex::new("http://127.0.0.1:6334", "test_profiles", 8, None)
            .await
            .unwrap();

        // Arabian Sea floats with casts through the upper 200 dbar
        for (float_id, cycle, lat, lon, day) in [
            ("1902482", 1_i64, 15.0, 65.0, 5_u32),
            ("1902482", 2, 15.2, 65.3, 15),
            ("5906527", 1, 12.0, 70.0, 8),
        ] {
            let profile = ParsedProfile {
                float_id: float_id.to_string(),
                cycle_number: Some(cycle),
                datetime: chrono::Utc.with_ymd_and_hms(2025, 1, day, 0, 0, 0).single(),
                latitude: Some(lat),
                longitude: Some(lon),
                ..Default::default()
            };
            let levels: Vec<ParsedLevel> = (0..4)
                .map(|i| ParsedLevel {
                    level: i,
                    pressure: Some(10.0 + 60.0 * i as f64),
                    temperature: Some(28.0 - 2.0 * i as f64),
                    salinity: Some(35.0 + 0.05 * i as f64),
                })
                .collect();
            dev.upsert_profile(&profile, &levels, "fp").await.unwrap();
        }

        QueryEngine::new(config, dev, live, vector, Arc::new(embedder), None)
    }

    #[tokio::test]
    async fn test_informational_has_no_table() {
        let engine = seeded_engine(StubEmbedder::new(8)).await;
        let response = engine.answer("What are Argo floats?").await.unwrap();

        assert!(!response.has_data);
        assert!(response.table_data.is_none());
        assert_eq!(response.query_type, "informational");
        let sentences = response.message.matches(['.', '!', '?']).count();
        assert!((2..=4).contains(&sentences));
    }

    #[tokio::test]
    async fn test_aggregated_spatial_query_bins_by_depth() {
        let engine = seeded_engine(StubEmbedder::new(8)).await;
        let response = engine
            .answer("Show me temperature in the Arabian Sea")
            .await
            .unwrap();

        assert!(response.has_data);
        let table = response.table_data.unwrap();
        for column in [
            "depth_range",
            "avg_temperature",
            "min_temperature",
            "max_temperature",
            "measurement_count",
        ] {
            assert!(
                table.columns.iter().any(|c| c == column),
                "missing column {}",
                column
            );
        }

        // Pressures 10/70/130/190 fall into the 0/50/100/150 bins;
        // total_rows counts bins, not raw measurements
        assert_eq!(table.total_rows, 4);
        assert_eq!(
            table.rows[0].get("depth_range").unwrap().as_str().unwrap(),
            "0-50m"
        );

        // Aggregated tables carry no positions, so no map payload
        assert!(!response.show_map);
    }

    #[tokio::test]
    async fn test_float_lookup_returns_only_that_float() {
        let engine = seeded_engine(StubEmbedder::new(8)).await;
        let response = engine.answer("Get data from float 1902482").await.unwrap();

        let table = response.table_data.unwrap();
        assert!(!table.rows.is_empty());
        assert!(table.total_rows <= engine.config.query.raw_row_limit);
        for row in &table.rows {
            assert_eq!(row.get("float_id").unwrap().as_str().unwrap(), "1902482");
        }

        // Raw rows carry positions; the map payload follows
        assert!(response.show_map);
        let map = response.map_data.unwrap();
        assert!(!map.points.is_empty());
        assert!(map.points.len() <= 100);
    }

    #[tokio::test]
    async fn test_cache_returns_identical_payload() {
        let engine = seeded_engine(StubEmbedder::new(8)).await;

        let first = engine
            .answer("Show me temperature in the Arabian Sea")
            .await
            .unwrap();
        let second = engine
            .answer("show me  temperature in the arabian sea")
            .await
            .unwrap();

        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }

    #[tokio::test]
    async fn test_semantic_degrades_when_embedding_down() {
        let engine = seeded_engine(StubEmbedder::failing()).await;
        let response = engine.answer("find unusual deep-water patterns").await.unwrap();

        assert!(!response.has_data);
        assert!(response.table_data.is_none());
        assert!(response.message.contains("unavailable"));
    }

    #[tokio::test]
    async fn test_hybrid_falls_back_to_sql_when_embedding_down() {
        let engine = seeded_engine(StubEmbedder::failing()).await;
        let response = engine
            .answer("compare temperature patterns in the Arabian Sea")
            .await
            .unwrap();

        // The vector stage is skipped; SQL still answers
        assert!(response.has_data);
        let table = response.table_data.unwrap();
        assert!(table.columns.iter().any(|c| c == "avg_temperature"));
    }

    #[tokio::test]
    async fn test_empty_result_suggests_broadening() {
        let engine = seeded_engine(StubEmbedder::new(8)).await;
        let response = engine
            .answer("Show me temperature in the Bay of Bengal")
            .await
            .unwrap();

        let table = response.table_data.unwrap();
        assert!(table.rows.is_empty());
        assert!(response.message.contains("No data matched"));
    }
}
