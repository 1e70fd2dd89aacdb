//! Gemini API Provider
//!
//! Implements both provider capabilities against the Generative Language
//! API: synchronous `generateContent` completions (pro/flash tiers, optional
//! web-search tool) and the deep-research interaction lifecycle with an
//! ephemeral file store for reference documents.
//!
//! Transient HTTP failures are retried with exponential backoff; the retry
//! decision follows `ErrorCategory::is_retryable`.

use std::time::Duration;

use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use super::{CompletionRequest, GenerativeProvider, ModelTier, ResearchProvider, ResearchStatus};
use crate::config::ProviderSettings;
use crate::constants::{provider as provider_constants, research as research_constants};
use crate::types::{ForgeError, ProviderError, Result};

/// Gemini API provider with secure API key handling
pub struct GeminiProvider {
    /// API key stored securely - never exposed in logs or debug output
    api_key: SecretString,
    api_base: String,
    pro_model: String,
    flash_model: String,
    temperature: f32,
    max_output_tokens: usize,
    client: reqwest::Client,
}

impl std::fmt::Debug for GeminiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiProvider")
            .field("api_key", &"[REDACTED]")
            .field("api_base", &self.api_base)
            .field("pro_model", &self.pro_model)
            .field("flash_model", &self.flash_model)
            .field("temperature", &self.temperature)
            .field("max_output_tokens", &self.max_output_tokens)
            .finish()
    }
}

impl GeminiProvider {
    /// Create a provider from settings. Missing credentials are a
    /// configuration error detected here, before any step runs.
    pub fn new(settings: &ProviderSettings) -> Result<Self> {
        let api_key = settings
            .api_key
            .clone()
            .or_else(|| std::env::var("GEMINI_API_KEY").ok())
            .ok_or_else(|| {
                ForgeError::Config(
                    "Gemini API key not found. Set GEMINI_API_KEY env var or provide in config"
                        .to_string(),
                )
            })?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| ForgeError::ProviderApi(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            api_key: SecretString::from(api_key),
            api_base: settings.api_base.trim_end_matches('/').to_string(),
            pro_model: settings.pro_model.clone(),
            flash_model: settings.flash_model.clone(),
            temperature: settings.temperature,
            max_output_tokens: settings.max_output_tokens,
            client,
        })
    }

    fn model_for(&self, tier: ModelTier) -> &str {
        match tier {
            ModelTier::Pro => &self.pro_model,
            ModelTier::Flash => &self.flash_model,
        }
    }

    fn retry_policy() -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(Duration::from_millis(provider_constants::BASE_DELAY_MS))
            .with_max_delay(Duration::from_secs(provider_constants::MAX_DELAY_SECS))
            .with_max_times(provider_constants::MAX_RETRIES)
    }

    /// POST a JSON body and decode the JSON response, classifying HTTP
    /// errors into provider-error categories.
    async fn post_json(&self, url: &str, body: &Value) -> Result<Value> {
        let response = self
            .client
            .post(url)
            .header("x-goog-api-key", self.api_key.expose_secret())
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| {
                ForgeError::Provider(ProviderError::new(
                    crate::types::ErrorCategory::Network,
                    format!("Request failed: {}", e),
                ))
            })?;

        Self::decode_response(response).await
    }

    async fn get_json(&self, url: &str) -> Result<Value> {
        let response = self
            .client
            .get(url)
            .header("x-goog-api-key", self.api_key.expose_secret())
            .send()
            .await
            .map_err(|e| {
                ForgeError::Provider(ProviderError::new(
                    crate::types::ErrorCategory::Network,
                    format!("Request failed: {}", e),
                ))
            })?;

        Self::decode_response(response).await
    }

    async fn decode_response(response: reqwest::Response) -> Result<Value> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_http_status(
                status.as_u16(),
                format!("Gemini API error ({}): {}", status, body),
            )
            .into());
        }
        response
            .json()
            .await
            .map_err(|e| ForgeError::ProviderApi(format!("Failed to parse response: {}", e)))
    }

    async fn try_complete(&self, request: &CompletionRequest) -> Result<String> {
        let model = self.model_for(request.tier);
        let url = format!("{}/models/{}:generateContent", self.api_base, model);

        let mut body = json!({
            "contents": [{
                "role": "user",
                "parts": [{"text": request.prompt}],
            }],
            "generationConfig": {
                "temperature": self.temperature,
                "maxOutputTokens": self.max_output_tokens,
            },
        });
        if request.use_search {
            body["tools"] = json!([{"google_search": {}}]);
        }

        debug!(model, "Sending completion request");
        let response = self.post_json(&url, &body).await?;

        let completion: GenerateContentResponse = serde_json::from_value(response)
            .map_err(|e| ForgeError::ProviderApi(format!("Unexpected response shape: {}", e)))?;

        let text: String = completion
            .candidates
            .first()
            .map(|c| {
                c.content
                    .parts
                    .iter()
                    .filter_map(|p| p.text.as_deref())
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        if text.is_empty() {
            return Err(ForgeError::ProviderApi(
                "No content in Gemini response".to_string(),
            ));
        }
        Ok(text)
    }
}

#[async_trait]
impl GenerativeProvider for GeminiProvider {
    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        info!(
            tier = request.tier.as_str(),
            model = self.model_for(request.tier),
            search = request.use_search,
            "Generating with Gemini"
        );

        (|| self.try_complete(request))
            .retry(Self::retry_policy())
            .when(ForgeError::is_retryable)
            .notify(|err, dur| warn!("Completion attempt failed, retrying in {:?}: {}", dur, err))
            .await
    }

    fn name(&self) -> &str {
        "gemini"
    }
}

#[async_trait]
impl ResearchProvider for GeminiProvider {
    async fn create_reference_store(&self, label: &str) -> Result<String> {
        let url = format!("{}/fileStores", self.api_base);
        let response = self
            .post_json(&url, &json!({"displayName": label}))
            .await?;

        resource_name(&response)
            .ok_or_else(|| ForgeError::ProviderApi("File store response missing name".to_string()))
    }

    async fn attach_document(&self, store_id: &str, content: &str, label: &str) -> Result<()> {
        let url = format!("{}/{}/documents", self.api_base, store_id);
        let response = self
            .post_json(
                &url,
                &json!({
                    "displayName": label,
                    "inlineText": content,
                }),
            )
            .await?;

        let doc_name = resource_name(&response)
            .ok_or_else(|| ForgeError::ProviderApi("Document response missing name".to_string()))?;

        // Block until the provider reports the attachment indexed
        let poll_interval =
            Duration::from_secs(research_constants::ATTACH_POLL_INTERVAL_SECS);
        let deadline = Duration::from_secs(research_constants::ATTACH_TIMEOUT_SECS);
        let started = tokio::time::Instant::now();

        loop {
            let doc_url = format!("{}/{}", self.api_base, doc_name);
            let doc = self.get_json(&doc_url).await?;
            let state = doc.get("state").and_then(Value::as_str).unwrap_or("");
            if state == "ACTIVE" {
                debug!(doc = %doc_name, "Document indexed");
                return Ok(());
            }
            if state == "FAILED" {
                return Err(ForgeError::ProviderApi(format!(
                    "Document indexing failed for {}",
                    doc_name
                )));
            }
            if started.elapsed() >= deadline {
                return Err(ForgeError::timeout(
                    format!("indexing document {}", doc_name),
                    deadline,
                ));
            }
            tokio::time::sleep(poll_interval).await;
        }
    }

    async fn start_research(&self, prompt: &str, store_id: &str) -> Result<String> {
        // The interactions endpoint only accepts streamed requests; we send
        // the stream flag and read just the first event, which carries the
        // interaction resource. Semantically this is start-and-return-handle.
        let url = format!("{}/interactions", self.api_base);
        let body = json!({
            "agent": "deep-research",
            "input": prompt,
            "fileStoreNames": [store_id],
            "stream": true,
            "background": true,
        });

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", self.api_key.expose_secret())
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                ForgeError::Provider(ProviderError::new(
                    crate::types::ErrorCategory::Network,
                    format!("Request failed: {}", e),
                ))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_http_status(
                status.as_u16(),
                format!("Gemini API error ({}): {}", status, body),
            )
            .into());
        }

        let text = response
            .text()
            .await
            .map_err(|e| ForgeError::ProviderApi(format!("Failed to read stream: {}", e)))?;
        let first_event = parse_first_stream_event(&text).ok_or_else(|| {
            ForgeError::ProviderApi("Interaction stream contained no events".to_string())
        })?;

        resource_name(&first_event).ok_or_else(|| {
            ForgeError::ProviderApi("Interaction event missing name".to_string())
        })
    }

    async fn poll_research(&self, interaction_id: &str) -> Result<ResearchStatus> {
        let url = format!("{}/{}", self.api_base, interaction_id);
        let response = self.get_json(&url).await?;

        let state = response
            .get("state")
            .and_then(Value::as_str)
            .unwrap_or("UNKNOWN");
        match state {
            "IN_PROGRESS" | "PENDING" => Ok(ResearchStatus::InProgress),
            "COMPLETED" => {
                let text = response
                    .pointer("/output/text")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                Ok(ResearchStatus::Completed(text))
            }
            "FAILED" => {
                let detail = response
                    .pointer("/error/message")
                    .and_then(Value::as_str)
                    .unwrap_or("provider reported failure")
                    .to_string();
                Ok(ResearchStatus::Failed(detail))
            }
            other => Err(ForgeError::ProviderApi(format!(
                "Unknown interaction state: {}",
                other
            ))),
        }
    }

    async fn delete_reference_store(&self, store_id: &str) -> Result<()> {
        let url = format!("{}/{}", self.api_base, store_id);
        let response = self
            .client
            .delete(&url)
            .header("x-goog-api-key", self.api_key.expose_secret())
            .send()
            .await
            .map_err(|e| {
                ForgeError::Provider(ProviderError::new(
                    crate::types::ErrorCategory::Network,
                    format!("Request failed: {}", e),
                ))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_http_status(
                status.as_u16(),
                format!("Gemini API error ({}): {}", status, body),
            )
            .into());
        }
        Ok(())
    }
}

/// Extract the `name` field of an API resource response.
fn resource_name(value: &Value) -> Option<String> {
    value
        .get("name")
        .and_then(Value::as_str)
        .map(ToString::to_string)
}

/// Parse the first JSON event from an SSE or JSON-lines body.
fn parse_first_stream_event(body: &str) -> Option<Value> {
    for line in body.lines() {
        let line = line.trim();
        let payload = line.strip_prefix("data:").map(str::trim).unwrap_or(line);
        if payload.is_empty() {
            continue;
        }
        if let Ok(value) = serde_json::from_str::<Value>(payload) {
            return Some(value);
        }
    }
    // Fall back to treating the whole body as one JSON document
    serde_json::from_str(body).ok()
}

// Response types

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Content,
}

#[derive(Debug, Deserialize, Serialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize, Serialize)]
struct Part {
    #[serde(default)]
    text: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_api_key_is_config_error() {
        let settings = ProviderSettings {
            api_key: None,
            ..Default::default()
        };
        // Only deterministic when the env var is absent
        if std::env::var("GEMINI_API_KEY").is_err() {
            assert!(matches!(
                GeminiProvider::new(&settings),
                Err(ForgeError::Config(_))
            ));
        }
    }

    #[test]
    fn test_parse_first_stream_event_sse() {
        let body = "data: {\"name\": \"interactions/abc\"}\n\ndata: {\"delta\": \"x\"}\n";
        let event = parse_first_stream_event(body).unwrap();
        assert_eq!(resource_name(&event).unwrap(), "interactions/abc");
    }

    #[test]
    fn test_parse_first_stream_event_plain_json() {
        let body = "{\"name\": \"interactions/xyz\", \"state\": \"PENDING\"}";
        let event = parse_first_stream_event(body).unwrap();
        assert_eq!(resource_name(&event).unwrap(), "interactions/xyz");
    }

    #[test]
    fn test_parse_first_stream_event_empty() {
        assert!(parse_first_stream_event("").is_none());
        assert!(parse_first_stream_event("not json at all").is_none());
    }
}
