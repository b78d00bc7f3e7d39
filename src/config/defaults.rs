//! Default values for configuration

/// Default Qdrant gRPC URL for local development (port 6334, not 6333 REST)
pub fn default_qdrant_url() -> String {
    std::env::var("QDRANT_URL").unwrap_or_else(|_| "http://127.0.0.1:6334".to_string())
}

/// Default environment variable name for Qdrant API key
pub fn default_qdrant_api_key_env() -> String {
    "".to_string()
}

/// Default collection name
pub fn default_collection_name() -> String {
    "floatchat_profiles".to_string()
}

/// Default GDAC mirror root for the Indian Ocean geo subtree
pub fn default_remote_root_url() -> String {
    std::env::var("FLOATCHAT_MIRROR_URL")
        .unwrap_or_else(|_| "https://data-argo.ifremer.fr/geo/indian_ocean/".to_string())
}

/// Default accept patterns for profile files
pub fn default_accept_globs() -> Vec<String> {
    vec!["*.nc".to_string()]
}

/// Default maximum files downloaded per ingestion tick
pub fn default_file_budget_per_tick() -> usize {
    10
}

/// Default per-file download timeout in seconds
pub fn default_per_file_timeout_secs() -> u64 {
    120
}

/// Default maximum retries for a transient download failure
pub fn default_retry_max() -> u32 {
    3
}

/// Default base for exponential retry backoff, in seconds
pub fn default_backoff_base_secs() -> u64 {
    2
}

/// Default wall-clock budget for one ingestion tick (50 minutes,
/// under the hourly cadence)
pub fn default_tick_wall_clock_secs() -> u64 {
    3000
}

/// Default per-tick error tolerance (fraction of files that may fail
/// before the run is marked as an error)
pub fn default_error_rate_tolerance() -> f64 {
    0.5
}

/// Default number of consecutive store write faults that aborts a tick
pub fn default_consecutive_write_fault_limit() -> usize {
    5
}

/// Default user agent
pub fn default_crawl_user_agent() -> String {
    format!("floatchat/{} (Argo Mirror)", env!("CARGO_PKG_VERSION"))
}

/// Default directory-listing request timeout in seconds
pub fn default_listing_timeout_secs() -> u64 {
    30
}

/// Default maximum directory pages fetched per discovery pass
pub fn default_max_listing_pages() -> usize {
    256
}

/// Default global-profile-ID range for the dev snapshot store
pub fn default_dev_id_range() -> [i64; 2] {
    [1, 1_000_000]
}

/// Default global-profile-ID range for the live store, strictly above dev
pub fn default_live_id_range() -> [i64; 2] {
    [1_000_000, i64::MAX]
}

/// Default embedding backend URL
pub fn default_embedding_backend_url() -> String {
    std::env::var("FLOATCHAT_EMBEDDING_BACKEND_URL")
        .unwrap_or_else(|_| "http://127.0.0.1:7997/v1/embeddings".to_string())
}

/// Default embedding model (BAAI/bge-small-en-v1.5)
pub fn default_embedding_model() -> String {
    "BAAI/bge-small-en-v1.5".to_string()
}

/// Default embedding dimension (must match model)
pub fn default_embedding_dimension() -> usize {
    384
}

/// Default batch size for embedding
pub fn default_embedding_batch_size() -> usize {
    32
}

/// Default embedding request timeout in seconds
pub fn default_embedding_timeout_secs() -> u64 {
    60
}

/// Default narrator backend URL (OpenAI-compatible chat completions)
pub fn default_narrator_backend_url() -> String {
    std::env::var("FLOATCHAT_NARRATOR_BACKEND_URL")
        .unwrap_or_else(|_| "http://127.0.0.1:8082/v1/chat/completions".to_string())
}

/// Default narrator request timeout in seconds
pub fn default_narrator_timeout_secs() -> u64 {
    30
}

/// Default hard cap on rows fetched by any guarded query
pub fn default_row_cap() -> usize {
    5000
}

/// Default LIMIT applied to raw (non-aggregated) lookups
pub fn default_raw_row_limit() -> usize {
    500
}

/// Default SQL execution timeout in seconds
pub fn default_sql_timeout_secs() -> u64 {
    10
}

/// Default query-cache TTL in seconds
pub fn default_cache_ttl_secs() -> u64 {
    300
}

/// Default query-cache entry bound
pub fn default_cache_max_entries() -> usize {
    256
}

/// Default top-k for vector search
pub fn default_top_k() -> usize {
    20
}

/// Default depth-bin width for aggregated queries, in meters
pub fn default_depth_bin_meters() -> f64 {
    50.0
}

/// Default maximum binned depth for aggregated queries, in meters
pub fn default_depth_bin_max_meters() -> f64 {
    2000.0
}

/// Default sentence budget for informational answers
pub fn default_max_sentences_informational() -> usize {
    4
}

/// Default sentence budget for data answers
pub fn default_max_sentences_data() -> usize {
    6
}

/// Default bind address for the read API
pub fn default_bind_addr() -> String {
    "127.0.0.1:8080".to_string()
}
