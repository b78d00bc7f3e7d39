//! Embedding generation
//!
//! This module provides an abstraction over embedding models with:
//! - A trait for embedding backends
//! - An HTTP backend (OpenAI-compatible /embeddings endpoint)
//! - The deterministic profile-document serialization fed to the model
//! - Batch processing for efficiency

mod document;
mod http_backend;

pub use document::*;
pub use http_backend::*;

use crate::config::EmbeddingConfig;
use crate::error::Result;
use async_trait::async_trait;

/// Trait for embedding providers
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a batch of texts
    async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>>;

    /// Get the embedding dimension
    fn dimension(&self) -> usize;

    /// Get the model name
    fn model_name(&self) -> &str;
}

/// Create an embedder based on configuration
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Box<dyn Embedder>> {
    let embedder = HttpEmbedder::new(config)?;
    Ok(Box::new(embedder))
}

/// Helper to embed in batches
pub async fn embed_in_batches(
    embedder: &dyn Embedder,
    texts: Vec<String>,
    batch_size: usize,
) -> Result<Vec<Vec<f32>>> {
    let mut all_embeddings = Vec::with_capacity(texts.len());

    for chunk in texts.chunks(batch_size.max(1)) {
        let batch_texts: Vec<String> = chunk.to_vec();
        let embeddings = embedder.embed(batch_texts).await?;
        all_embeddings.extend(embeddings);
    }

    Ok(all_embeddings)
}

#[cfg(test)]
pub(crate) mod stub {
    use super::*;
    use crate::error::Error;
    use sha2::{Digest, Sha256};

    /// Deterministic embedder for tests: the vector is derived from a
    /// hash of the input text, so equal inputs embed equally.
    pub struct StubEmbedder {
        pub dimension: usize,
        pub fail: bool,
    }

    impl StubEmbedder {
        pub fn new(dimension: usize) -> Self {
            Self {
                dimension,
                fail: false,
            }
        }

        pub fn failing() -> Self {
            Self {
                dimension: 8,
                fail: true,
            }
        }
    }

    #[async_trait]
    impl Embedder for StubEmbedder {
        async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
            if self.fail {
                return Err(Error::Embedding("stub backend down".to_string()));
            }
            Ok(texts
                .iter()
                .map(|text| {
                    let digest = Sha256::digest(text.as_bytes());
                    (0..self.dimension)
                        .map(|i| digest[i % digest.len()] as f32 / 255.0)
                        .collect()
                })
                .collect())
        }

        fn dimension(&self) -> usize {
            self.dimension
        }

        fn model_name(&self) -> &str {
            "stub"
        }
    }
}
