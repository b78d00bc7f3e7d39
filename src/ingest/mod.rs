//! Ingestion orchestration
//!
//! One tick: open an automation run, discover candidates on the mirror,
//! then per file download → parse → upsert → embed → index. Failure
//! isolation is per file; the fingerprint map and the store's natural
//! key make a re-run after a crash resume where it stopped. A lock file
//! keeps one writer per store.

use crate::config::Config;
use crate::crawl::{Downloaded, FingerprintMap, MirrorCrawler, RemoteFile};
use crate::embed::{embed_in_batches, profile_document, Embedder};
use crate::error::{Error, Result};
use crate::parse::{parse_profile_file, ParsedProfile};
use crate::store::{ArgoDb, Profile, RunStatus, StoreKind, UpsertOutcome};
use crate::vector::{ProfileIndex, ProfilePayload, ProfilePoint};
use chrono::DateTime;
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Upper bound on vector backfills per tick
const RECONCILE_BACKFILL_CAP: usize = 500;

/// Counters for one tick
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TickStats {
    pub files_discovered: usize,
    pub files_downloaded: usize,
    pub files_failed: usize,
    pub profiles_added: usize,
    pub profiles_skipped: usize,
    pub measurements_added: usize,
    pub vectors_indexed: usize,
    pub vectors_deleted: usize,
    pub duration_seconds: f64,
    pub status: String,
    pub errors: Vec<String>,
}

/// Exclusive per-store ingestion lock backed by a lock file
#[derive(Debug)]
struct IngestLock {
    file: File,
}

impl IngestLock {
    fn acquire(path: &Path, store: StoreKind) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(path)?;
        file.try_lock_exclusive()
            .map_err(|_| Error::IngestLocked(store.to_string()))?;
        Ok(Self { file })
    }
}

impl Drop for IngestLock {
    fn drop(&mut self) {
        let _ = fs2::FileExt::unlock(&self.file);
    }
}

/// The write-path driver for one target store
pub struct IngestPipeline {
    config: Config,
    target: StoreKind,
    dev: ArgoDb,
    live: ArgoDb,
    vector: ProfileIndex,
    embedder: Arc<dyn Embedder>,
}

impl IngestPipeline {
    pub fn new(
        config: Config,
        target: StoreKind,
        dev: ArgoDb,
        live: ArgoDb,
        vector: ProfileIndex,
        embedder: Arc<dyn Embedder>,
    ) -> Self {
        Self {
            config,
            target,
            dev,
            live,
            vector,
            embedder,
        }
    }

    fn store(&self) -> &ArgoDb {
        match self.target {
            StoreKind::Dev => &self.dev,
            StoreKind::Live => &self.live,
        }
    }

    /// Run one ingestion tick
    pub async fn run_tick(&self) -> Result<TickStats> {
        let lock_path = self.config.ingest_lock_file(&self.target.to_string());
        let _lock = IngestLock::acquire(&lock_path, self.target)?;

        let started = Instant::now();
        let deadline = started + Duration::from_secs(self.config.ingest.tick_wall_clock_secs);

        let mut run = self.store().open_run().await?;
        let mut stats = TickStats::default();

        let outcome = self.tick_inner(&mut stats, deadline).await;

        stats.duration_seconds = started.elapsed().as_secs_f64();
        let attempted = stats.files_downloaded + stats.files_failed;
        let status = match &outcome {
            Err(_) => RunStatus::Error,
            Ok(()) => {
                let error_rate = stats.files_failed as f64 / attempted.max(1) as f64;
                if attempted > 0 && error_rate > self.config.ingest.error_rate_tolerance {
                    RunStatus::Error
                } else {
                    RunStatus::Completed
                }
            }
        };
        stats.status = status.to_string();

        run.status = status.to_string();
        run.files_discovered = stats.files_discovered as i64;
        run.files_downloaded = stats.files_downloaded as i64;
        run.profiles_added = stats.profiles_added as i64;
        run.measurements_added = stats.measurements_added as i64;
        run.duration_seconds = Some(stats.duration_seconds);
        if let Err(e) = &outcome {
            run.error_message = Some(e.to_string());
        } else if !stats.errors.is_empty() {
            run.error_message = Some(stats.errors.join("; "));
        }
        self.store().update_run(&run).await?;

        info!(
            store = %self.target,
            status = %run.status,
            files = stats.files_downloaded,
            profiles = stats.profiles_added,
            "ingestion tick finished"
        );

        outcome?;
        Ok(stats)
    }

    async fn tick_inner(&self, stats: &mut TickStats, deadline: Instant) -> Result<()> {
        let mut map = FingerprintMap::load(&self.config.fingerprint_file(&self.target.to_string()))?;
        let crawler = MirrorCrawler::new(self.config.ingest.clone())?;

        // The tick proceeds without the vector index when Qdrant is
        // down; missing vectors are backfilled by a later reconcile.
        let vector_ready = match self.vector.ensure_collection().await {
            Ok(()) => true,
            Err(e) => {
                warn!("vector index unavailable for this tick: {}", e);
                stats.errors.push(format!("vector index: {}", e));
                false
            }
        };

        let candidates = crawler
            .discover(&map, self.config.ingest.file_budget_per_tick)
            .await?;
        stats.files_discovered = candidates.len();

        let mut consecutive_write_faults = 0usize;

        for file in &candidates {
            if Instant::now() >= deadline {
                warn!("tick wall clock exhausted; deferring remaining files");
                break;
            }

            let downloaded = match crawler
                .download(file, &self.config.paths.download_dir, deadline)
                .await
            {
                Ok(d) => d,
                Err(Error::RemoteTerminal(reason)) => {
                    map.record_terminal(&file.remote_path, &reason);
                    map.save()?;
                    stats.files_failed += 1;
                    stats.errors.push(reason);
                    continue;
                }
                Err(e) => {
                    // Transient; the next tick retries this path
                    stats.files_failed += 1;
                    stats.errors.push(e.to_string());
                    continue;
                }
            };
            stats.files_downloaded += 1;

            match self.ingest_file(file, &downloaded, vector_ready, stats).await {
                Ok(()) => {
                    map.record_success(
                        &file.remote_path,
                        file.size,
                        file.last_modified.clone(),
                        downloaded.sha256.clone(),
                    );
                    map.save()?;
                    consecutive_write_faults = 0;
                }
                Err(e) => {
                    stats.files_failed += 1;
                    stats.errors.push(format!("{}: {}", file.remote_path, e));
                    consecutive_write_faults += 1;
                    if consecutive_write_faults >= self.config.ingest.consecutive_write_fault_limit
                    {
                        return Err(Error::Other(format!(
                            "{} consecutive write faults, aborting tick",
                            consecutive_write_faults
                        )));
                    }
                }
            }
        }

        if vector_ready {
            if let Err(e) = self.reconcile_vectors(stats).await {
                warn!("vector reconcile failed: {}", e);
                stats.errors.push(format!("reconcile: {}", e));
            }
        }

        Ok(())
    }

    /// Parse one downloaded file and commit its profiles. Each profile
    /// with its measurements is one transaction; vector upserts follow
    /// the relational commit.
    async fn ingest_file(
        &self,
        file: &RemoteFile,
        downloaded: &Downloaded,
        vector_ready: bool,
        stats: &mut TickStats,
    ) -> Result<()> {
        let parsed = parse_profile_file(&downloaded.path)?;
        if !parsed.diagnostics.notes.is_empty() {
            for note in &parsed.diagnostics.notes {
                warn!(file = %file.filename, "{}", note);
            }
        }

        let mut pending: Vec<(i64, String, ProfilePayload)> = Vec::new();

        for (profile, levels) in &parsed.profiles {
            match self
                .store()
                .upsert_profile(profile, levels, &downloaded.sha256)
                .await?
            {
                UpsertOutcome::Inserted(id) => {
                    stats.profiles_added += 1;
                    stats.measurements_added += levels.len();
                    let document = profile_document(profile, levels.len());
                    let payload =
                        ProfilePayload::from_profile(profile, self.target, id, document.clone());
                    pending.push((id, document, payload));
                }
                UpsertOutcome::Skipped(_) => {
                    stats.profiles_skipped += 1;
                }
            }
        }

        if vector_ready && !pending.is_empty() {
            if let Err(e) = self.index_profiles(&pending).await {
                // The rows are committed; reconcile backfills the
                // vectors on a later tick.
                warn!(file = %file.filename, "vector indexing deferred: {}", e);
                stats.errors.push(format!("vector index {}: {}", file.filename, e));
            } else {
                stats.vectors_indexed += pending.len();
            }
        }

        info!(
            file = %file.filename,
            profiles = parsed.profiles.len(),
            "ingested file"
        );
        Ok(())
    }

    async fn index_profiles(&self, pending: &[(i64, String, ProfilePayload)]) -> Result<()> {
        let documents: Vec<String> = pending.iter().map(|(_, doc, _)| doc.clone()).collect();
        let embeddings = embed_in_batches(
            self.embedder.as_ref(),
            documents,
            self.config.embedding.batch_size,
        )
        .await?;

        let points: Vec<ProfilePoint> = pending
            .iter()
            .zip(embeddings)
            .map(|((id, _, payload), vector)| ProfilePoint {
                id: *id,
                vector,
                payload: payload.clone(),
            })
            .collect();

        self.vector.upsert_points(points).await
    }

    /// Repair drift between the relational stores and the vector index:
    /// delete orphaned points, backfill missing ones for the target
    /// store
    async fn reconcile_vectors(&self, stats: &mut TickStats) -> Result<()> {
        let indexed: std::collections::HashSet<i64> =
            self.vector.list_all_point_ids().await?.into_iter().collect();

        let mut known: std::collections::HashSet<i64> =
            self.dev.all_profile_ids().await?.into_iter().collect();
        known.extend(self.live.all_profile_ids().await?);

        // A vector record exists iff its profile exists in some store
        let orphans: Vec<i64> = indexed.difference(&known).copied().collect();
        if !orphans.is_empty() {
            info!(count = orphans.len(), "deleting orphaned vector points");
            self.vector.delete_points(&orphans).await?;
            stats.vectors_deleted += orphans.len();
        }

        let missing: Vec<i64> = self
            .store()
            .all_profile_ids()
            .await?
            .into_iter()
            .filter(|id| !indexed.contains(id))
            .take(RECONCILE_BACKFILL_CAP)
            .collect();

        if missing.is_empty() {
            return Ok(());
        }

        info!(count = missing.len(), "backfilling missing vector points");
        let mut pending = Vec::with_capacity(missing.len());
        for id in missing {
            let Some(row) = self.store().get_profile(id).await? else {
                continue;
            };
            let profile = parsed_from_row(&row);
            let document = profile_document(&profile, row.measurement_count as usize);
            let payload = ProfilePayload::from_profile(&profile, self.target, id, document.clone());
            pending.push((id, document, payload));
        }

        self.index_profiles(&pending).await?;
        stats.vectors_indexed += pending.len();
        Ok(())
    }
}

/// Rebuild the parser-level view of a stored profile row, for
/// re-deriving its embedding document
fn parsed_from_row(row: &Profile) -> ParsedProfile {
    ParsedProfile {
        local_index: 0,
        float_id: row.float_id.clone(),
        cycle_number: row.cycle_number,
        datetime: row
            .datetime
            .as_deref()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.to_utc()),
        latitude: row.latitude,
        longitude: row.longitude,
        min_pressure: row.min_pressure,
        max_pressure: row.max_pressure,
        project_name: row.project_name.clone(),
        institution: row.institution.clone(),
        data_mode: row.data_mode.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embed::stub::StubEmbedder;
    use crate::parse::testutil::{CdfBuilder, TestValues};
    use crate::parse::{NC_CHAR, NC_DOUBLE, NC_FLOAT, NC_INT};
    use crate::store::IdRange;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn sample_file_bytes() -> Vec<u8> {
        let mut b = CdfBuilder::new();
        b.dim("N_PROF", 2);
        b.dim("N_LEVELS", 2);
        b.dim("STRING8", 8);
        b.global_attr_text("institution", "CORIOLIS");

        let mut platforms = b"5906527 ".to_vec();
        platforms.extend(b"1902482 ");
        b.var("PLATFORM_NUMBER", &[0, 2], NC_CHAR, &[], TestValues::Chars(platforms));
        b.var("CYCLE_NUMBER", &[0], NC_INT, &[], TestValues::Ints(vec![1, 4]));
        b.var(
            "JULD",
            &[0],
            NC_DOUBLE,
            &[],
            TestValues::Doubles(vec![27394.0, 27395.0]),
        );
        b.var(
            "LATITUDE",
            &[0],
            NC_DOUBLE,
            &[],
            TestValues::Doubles(vec![15.0, 16.0]),
        );
        b.var(
            "LONGITUDE",
            &[0],
            NC_DOUBLE,
            &[],
            TestValues::Doubles(vec![70.0, 71.0]),
        );
        b.var(
            "PRES",
            &[0, 1],
            NC_FLOAT,
            &[],
            TestValues::Floats(vec![5.0, 100.0, 6.0, 110.0]),
        );
        b.var(
            "TEMP",
            &[0, 1],
            NC_FLOAT,
            &[],
            TestValues::Floats(vec![28.0, 20.0, 27.5, 19.5]),
        );
        b.var(
            "PSAL",
            &[0, 1],
            NC_FLOAT,
            &[],
            TestValues::Floats(vec![35.0, 35.2, 35.1, 35.3]),
        );
        b.build()
    }

    async fn mount_mirror(server: &MockServer, bytes: &[u8]) {
        Mock::given(method("GET"))
            .and(path("/geo/indian_ocean/"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(
                br#"<html><body><a href="20250101_prof.nc">file</a></body></html>"#.to_vec(),
                "text/html",
            ))
            .mount(server)
            .await;
        Mock::given(method("HEAD"))
            .and(path("/geo/indian_ocean/20250101_prof.nc"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("Last-Modified", "Wed, 01 Jan 2025 06:00:00 GMT"),
            )
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/geo/indian_ocean/20250101_prof.nc"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw(bytes.to_vec(), "application/octet-stream"),
            )
            .mount(server)
            .await;
    }

    async fn pipeline_for(server: &MockServer, base: &TempDir) -> IngestPipeline {
        let mut config = Config::default();
        config.ingest.remote_root_url = format!("{}/geo/indian_ocean/", server.uri());
        config.ingest.retry_max = 1;
        config.ingest.backoff_base_secs = 0;
        config.ingest.per_file_timeout_secs = 5;
        config.ingest.listing_timeout_secs = 5;
        config.paths.base_dir = base.path().to_path_buf();
        config.paths.download_dir = base.path().join("downloads");

        let dev = ArgoDb::connect_memory(StoreKind::Dev, IdRange::new(1, 1_000))
            .await
            .unwrap();
        let live = ArgoDb::connect_memory(StoreKind::Live, IdRange::new(1_000, 2_000))
            .await
            .unwrap();
        // No Qdrant in tests; the tick degrades and skips indexing
        let vector = ProfileIndex::new("http://127.0.0.1:1", "test_profiles", 8, None)
            .await
            .unwrap();

        IngestPipeline::new(
            config,
            StoreKind::Live,
            dev,
            live,
            vector,
            Arc::new(StubEmbedder::new(8)),
        )
    }

    #[tokio::test]
    async fn test_tick_ingests_discovered_file() {
        let server = MockServer::start().await;
        mount_mirror(&server, &sample_file_bytes()).await;
        let base = TempDir::new().unwrap();
        let pipeline = pipeline_for(&server, &base).await;

        let stats = pipeline.run_tick().await.unwrap();

        assert_eq!(stats.files_discovered, 1);
        assert_eq!(stats.files_downloaded, 1);
        assert_eq!(stats.profiles_added, 2);
        assert_eq!(stats.measurements_added, 4);
        assert_eq!(stats.status, "completed");

        let store = pipeline.store();
        assert_eq!(store.profile_count().await.unwrap(), 2);
        assert_eq!(store.measurement_count().await.unwrap(), 4);

        // IDs came from the live range
        for id in store.all_profile_ids().await.unwrap() {
            assert!(store.id_range().contains(id));
        }

        let runs = store.recent_runs(5).await.unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].status, "completed");
        assert_eq!(runs[0].profiles_added, 2);
    }

    #[tokio::test]
    async fn test_second_tick_is_a_no_op() {
        let server = MockServer::start().await;
        mount_mirror(&server, &sample_file_bytes()).await;
        let base = TempDir::new().unwrap();
        let pipeline = pipeline_for(&server, &base).await;

        pipeline.run_tick().await.unwrap();
        let second = pipeline.run_tick().await.unwrap();

        // The fingerprint map suppresses the download entirely
        assert_eq!(second.files_downloaded, 0);
        assert_eq!(second.profiles_added, 0);
        assert_eq!(pipeline.store().profile_count().await.unwrap(), 2);
        assert_eq!(pipeline.store().measurement_count().await.unwrap(), 4);
    }

    #[tokio::test]
    async fn test_terminal_failure_parks_the_path() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/geo/indian_ocean/"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(
                br#"<html><body><a href="gone_prof.nc">file</a></body></html>"#.to_vec(),
                "text/html",
            ))
            .mount(&server)
            .await;
        Mock::given(method("HEAD"))
            .and(path("/geo/indian_ocean/gone_prof.nc"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/geo/indian_ocean/gone_prof.nc"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let base = TempDir::new().unwrap();
        let pipeline = pipeline_for(&server, &base).await;

        let first = pipeline.run_tick().await.unwrap();
        assert_eq!(first.files_failed, 1);
        assert_eq!(first.status, "error");

        // Parked for good: the next tick does not re-attempt it
        let second = pipeline.run_tick().await.unwrap();
        assert_eq!(second.files_discovered, 0);
        assert_eq!(second.files_failed, 0);
    }

    #[tokio::test]
    async fn test_lock_file_excludes_second_writer() {
        let base = TempDir::new().unwrap();
        let lock_path = base.path().join("ingest-live.lock");

        let held = IngestLock::acquire(&lock_path, StoreKind::Live).unwrap();
        let err = IngestLock::acquire(&lock_path, StoreKind::Live).unwrap_err();
        assert!(matches!(err, Error::IngestLocked(_)));

        drop(held);
        IngestLock::acquire(&lock_path, StoreKind::Live).unwrap();
    }
}
