//! Remote mirror crawling
//!
//! This module provides:
//! - Breadth-first traversal of the GDAC HTTP directory tree
//! - HTML index-page parsing and accept-glob filtering
//! - Download decisions driven by the persistent fingerprint map
//! - Bounded-retry downloads with content hashing

mod fingerprint;

pub use fingerprint::*;

use crate::config::IngestConfig;
use crate::error::{Error, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use reqwest::Client;
use scraper::{Html, Selector};
use sha2::{Digest, Sha256};
use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use url::Url;

/// A download candidate discovered on the mirror
#[derive(Debug, Clone)]
pub struct RemoteFile {
    pub url: String,
    /// Path relative to the mirror root, the fingerprint-map key
    pub remote_path: String,
    pub filename: String,
    pub size: Option<u64>,
    pub last_modified: Option<String>,
}

/// A downloaded file on local disk
#[derive(Debug, Clone)]
pub struct Downloaded {
    pub path: PathBuf,
    pub sha256: String,
    pub size: u64,
}

/// Mirror crawler state
pub struct MirrorCrawler {
    client: Client,
    config: IngestConfig,
    root: Url,
    globs: GlobSet,
}

impl MirrorCrawler {
    pub fn new(config: IngestConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.listing_timeout_secs))
            .gzip(true)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .map_err(|e| Error::Crawl(format!("Failed to create HTTP client: {}", e)))?;

        let mut builder = GlobSetBuilder::new();
        for pattern in &config.accept_globs {
            let glob = Glob::new(pattern)
                .map_err(|e| Error::Config(format!("bad accept glob '{}': {}", pattern, e)))?;
            builder.add(glob);
        }
        let globs = builder
            .build()
            .map_err(|e| Error::Config(format!("bad accept globs: {}", e)))?;

        let mut root = Url::parse(&config.remote_root_url)?;
        if !root.path().ends_with('/') {
            root.set_path(&format!("{}/", root.path()));
        }

        Ok(Self {
            client,
            config,
            root,
            globs,
        })
    }

    /// Walk the directory tree breadth-first and return up to `budget`
    /// candidates the fingerprint map wants downloaded
    pub async fn discover(&self, map: &FingerprintMap, budget: usize) -> Result<Vec<RemoteFile>> {
        let mut queue: VecDeque<Url> = VecDeque::new();
        queue.push_back(self.root.clone());

        let mut visited: HashSet<String> = HashSet::new();
        let mut candidates = Vec::new();
        let mut pages = 0usize;

        'pages: while let Some(dir) = queue.pop_front() {
            if candidates.len() >= budget {
                break;
            }
            if pages >= self.config.max_listing_pages {
                warn!(
                    "Reached listing page cap ({}); stopping discovery",
                    self.config.max_listing_pages
                );
                break;
            }
            if !visited.insert(dir.to_string()) {
                continue;
            }
            pages += 1;

            let entries = match self.list_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) => {
                    warn!("Failed to list {}: {}", dir, e);
                    continue;
                }
            };

            for entry in entries {
                let Ok(joined) = dir.join(&entry) else {
                    continue;
                };
                if !joined.as_str().starts_with(self.root.as_str()) {
                    continue;
                }

                if entry.ends_with('/') {
                    let segment = entry.trim_end_matches('/');
                    if self.should_descend(segment) {
                        queue.push_back(joined);
                    }
                    continue;
                }

                let filename = entry.rsplit('/').next().unwrap_or(&entry).to_string();
                if !self.globs.is_match(&filename) {
                    continue;
                }

                let remote_path = joined.as_str()[self.root.as_str().len()..].to_string();
                let (size, last_modified) = self.head_file(&joined).await;

                if map.needs_download(&remote_path, size, last_modified.as_deref()) {
                    debug!(path = %remote_path, "new download candidate");
                    candidates.push(RemoteFile {
                        url: joined.to_string(),
                        remote_path,
                        filename,
                        size,
                        last_modified,
                    });
                    if candidates.len() >= budget {
                        break 'pages;
                    }
                }
            }
        }

        info!(
            candidates = candidates.len(),
            pages, "mirror discovery complete"
        );
        Ok(candidates)
    }

    /// Descend into date subtrees only when they pass the year/month
    /// filters; non-numeric segments (region directories) always pass
    fn should_descend(&self, segment: &str) -> bool {
        if segment.is_empty() || segment == "." || segment == ".." {
            return false;
        }

        if segment.len() == 4 && segment.chars().all(|c| c.is_ascii_digit()) {
            return self.config.years.is_empty()
                || self.config.years.iter().any(|y| y == segment);
        }

        if segment.len() <= 2 && segment.chars().all(|c| c.is_ascii_digit()) {
            if self.config.months.is_empty() {
                return true;
            }
            let wanted: Option<u32> = segment.parse().ok();
            return self
                .config
                .months
                .iter()
                .any(|m| m.parse::<u32>().ok() == wanted && wanted.is_some());
        }

        true
    }

    /// Fetch and parse one HTML index page into its link targets
    async fn list_dir(&self, dir: &Url) -> Result<Vec<String>> {
        debug!("Listing {}", dir);

        let response = self.client.get(dir.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Crawl(format!("HTTP {}: {}", status, dir)));
        }

        let body = response.text().await?;
        Ok(parse_index_links(&body))
    }

    /// HEAD a candidate for its (size, last-modified) pair; failures
    /// degrade to unknown metadata, which forces a download
    async fn head_file(&self, url: &Url) -> (Option<u64>, Option<String>) {
        match self.client.head(url.clone()).send().await {
            Ok(response) if response.status().is_success() => {
                let size = response
                    .headers()
                    .get(reqwest::header::CONTENT_LENGTH)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse().ok());
                let last_modified = response
                    .headers()
                    .get(reqwest::header::LAST_MODIFIED)
                    .and_then(|v| v.to_str().ok())
                    .map(|v| v.to_string());
                (size, last_modified)
            }
            _ => (None, None),
        }
    }

    /// Download one candidate with bounded exponential backoff. 4xx is
    /// terminal for the path; 5xx and transport errors retry until the
    /// retry cap or the tick deadline, whichever comes first.
    pub async fn download(
        &self,
        file: &RemoteFile,
        dest_dir: &Path,
        deadline: Instant,
    ) -> Result<Downloaded> {
        std::fs::create_dir_all(dest_dir)?;
        let dest = dest_dir.join(&file.filename);

        let mut attempt = 0u32;
        loop {
            match self.try_download_once(file, &dest).await {
                Ok(downloaded) => {
                    info!(
                        file = %file.filename,
                        bytes = downloaded.size,
                        "downloaded"
                    );
                    return Ok(downloaded);
                }
                Err(e @ Error::RemoteTerminal(_)) => return Err(e),
                Err(e) => {
                    if attempt >= self.config.retry_max {
                        return Err(Error::Crawl(format!(
                            "{} failed after {} attempts: {}",
                            file.url,
                            attempt + 1,
                            e
                        )));
                    }
                    let backoff =
                        Duration::from_secs(self.config.backoff_base_secs << attempt.min(6));
                    if Instant::now() + backoff >= deadline {
                        return Err(Error::Crawl(format!(
                            "{} abandoned, tick budget exhausted: {}",
                            file.url, e
                        )));
                    }
                    warn!(
                        "Download attempt {} for {} failed ({}); retrying in {:?}",
                        attempt + 1,
                        file.url,
                        e,
                        backoff
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
            }
        }
    }

    async fn try_download_once(&self, file: &RemoteFile, dest: &Path) -> Result<Downloaded> {
        let response = self
            .client
            .get(&file.url)
            .timeout(Duration::from_secs(self.config.per_file_timeout_secs))
            .send()
            .await?;

        let status = response.status();
        if status.is_client_error() {
            return Err(Error::RemoteTerminal(format!("HTTP {}: {}", status, file.url)));
        }
        if !status.is_success() {
            return Err(Error::Crawl(format!("HTTP {}: {}", status, file.url)));
        }

        let bytes = response.bytes().await?;
        let sha256 = hex_digest(&bytes);

        // Write to a temp name first so a crash never leaves a
        // half-written file at the final path.
        let tmp = dest.with_extension("nc.tmp");
        std::fs::write(&tmp, &bytes)?;
        std::fs::rename(&tmp, dest)?;

        Ok(Downloaded {
            path: dest.to_path_buf(),
            sha256,
            size: bytes.len() as u64,
        })
    }
}

/// Extract candidate hrefs from an HTML directory index
fn parse_index_links(html: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    let selector = Selector::parse("a[href]").expect("static selector");

    document
        .select(&selector)
        .filter_map(|a| a.value().attr("href"))
        .filter(|href| {
            !href.is_empty()
                && !href.starts_with('?')
                && !href.starts_with('#')
                && !href.starts_with("../")
                && *href != "/"
        })
        .map(|href| href.to_string())
        .collect()
}

fn hex_digest(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}
