//! Narration capability
//!
//! A narrow interface over an LLM used to phrase informational answers.
//! The core never depends on a particular provider; the HTTP backend
//! speaks the OpenAI chat-completions shape and any fault degrades the
//! caller to template narration.

use crate::config::NarratorConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Trait for narration providers
#[async_trait]
pub trait Narrator: Send + Sync {
    /// Produce a short prose answer for a prompt
    async fn narrate(&self, prompt: &str) -> Result<String>;
}

/// Create a narrator when one is configured
pub fn create_narrator(config: &NarratorConfig) -> Result<Option<Box<dyn Narrator>>> {
    if !config.enabled {
        return Ok(None);
    }
    Ok(Some(Box::new(HttpNarrator::new(config)?)))
}

/// Narrator over an OpenAI-compatible chat-completions endpoint
pub struct HttpNarrator {
    client: reqwest::Client,
    url: String,
    model: String,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

impl HttpNarrator {
    pub fn new(config: &NarratorConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Narrate(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url: config.backend_url.clone(),
            model: config.model.clone(),
        })
    }
}

#[async_trait]
impl Narrator for HttpNarrator {
    async fn narrate(&self, prompt: &str) -> Result<String> {
        debug!(chars = prompt.len(), "narration request");

        let response = self
            .client
            .post(&self.url)
            .json(&ChatRequest {
                model: &self.model,
                messages: vec![ChatMessage {
                    role: "user",
                    content: prompt,
                }],
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Narrate(format!(
                "narrator backend returned {}",
                status
            )));
        }

        let parsed: ChatResponse = response.json().await?;
        let text = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| Error::Narrate("narrator returned no choices".to_string()))?;

        Ok(text)
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config_for(server: &MockServer) -> NarratorConfig {
        let mut config = NarratorConfig::default();
        config.enabled = true;
        config.backend_url = format!("{}/v1/chat/completions", server.uri());
        config.model = "test-model".to_string();
        config.timeout_secs = 5;
        config
    }

    #[tokio::test]
    async fn test_narrate_round_trip() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"content": "Argo floats drift with ocean currents."}}]
            })))
            .mount(&server)
            .await;

        let narrator = HttpNarrator::new(&config_for(&server)).unwrap();
        let text = narrator.narrate("What are Argo floats?").await.unwrap();
        assert_eq!(text, "Argo floats drift with ocean currents.");
    }

    #[tokio::test]
    async fn test_backend_fault_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let narrator = HttpNarrator::new(&config_for(&server)).unwrap();
        assert!(narrator.narrate("hello").await.is_err());
    }

    #[test]
    fn test_disabled_config_yields_no_narrator() {
        let config = NarratorConfig::default();
        assert!(create_narrator(&config).unwrap().is_none());
    }
}
