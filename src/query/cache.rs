//! Content-addressed query result cache
//!
//! Keyed by a fingerprint over (normalized query, intent, entities,
//! store), bounded by TTL and an LRU entry cap. Writers race benignly:
//! every writer computes the same canonical payload for a key.

use super::intent::ClassifiedQuery;
use super::ChatResponse;
use crate::store::StoreKind;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::debug;

/// Stable fingerprint of a classified query against one store
pub fn query_fingerprint(classified: &ClassifiedQuery, store: StoreKind) -> String {
    let normalized = classified
        .raw
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    let entities = serde_json::to_string(&classified.entities).unwrap_or_default();

    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    hasher.update([0]);
    hasher.update(classified.intent.to_string().as_bytes());
    hasher.update([0]);
    hasher.update(entities.as_bytes());
    hasher.update([0]);
    hasher.update(store.to_string().as_bytes());

    hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

struct CacheEntry {
    response: ChatResponse,
    created: Instant,
    last_used: Instant,
}

/// Shared result cache with last-writer-wins semantics
pub struct QueryCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
    ttl: Duration,
    max_entries: usize,
}

impl QueryCache {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
            max_entries: max_entries.max(1),
        }
    }

    /// Fetch an unexpired entry and refresh its recency
    pub fn get(&self, fingerprint: &str) -> Option<ChatResponse> {
        let mut entries = self.entries.lock().expect("cache lock");
        let entry = entries.get_mut(fingerprint)?;

        if entry.created.elapsed() >= self.ttl {
            entries.remove(fingerprint);
            return None;
        }

        entry.last_used = Instant::now();
        debug!(fingerprint, "query cache hit");
        Some(entry.response.clone())
    }

    /// Store a computed payload, evicting expired entries and the least
    /// recently used entry when full
    pub fn put(&self, fingerprint: String, response: ChatResponse) {
        let mut entries = self.entries.lock().expect("cache lock");

        entries.retain(|_, e| e.created.elapsed() < self.ttl);

        while entries.len() >= self.max_entries {
            let oldest = entries
                .iter()
                .min_by_key(|(_, e)| e.last_used)
                .map(|(k, _)| k.clone());
            match oldest {
                Some(key) => entries.remove(&key),
                None => break,
            };
        }

        let now = Instant::now();
        entries.insert(
            fingerprint,
            CacheEntry {
                response,
                created: now,
                last_used: now,
            },
        );
    }

    pub fn len(&self) -> usize {
        self.entries.lock().expect("cache lock").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
