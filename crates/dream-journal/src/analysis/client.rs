//! HTTP client for the generative-language endpoints: structured dream
//! analysis, free-form chat turns and image generation.
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::schema::{build_analysis_prompt, response_schema};
use super::AnalysisError;
use crate::config::Config;
use crate::journal_db::ChatRole;

/// One turn of a chat history sent to the model.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub text: String,
}

impl ChatTurn {
    pub fn user(text: impl Into<String>) -> Self {
        Self { role: ChatRole::User, text: text.into() }
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self { role: ChatRole::Model, text: text.into() }
    }
}

#[async_trait]
pub trait GenerativeBackend: Send + Sync {
    /// Raw JSON text of the twelve-field analysis.
    async fn analyze_dream(&self, dream_text: &str) -> Result<String, AnalysisError>;

    /// Next model reply given the whole conversation so far.
    async fn chat(&self, history: &[ChatTurn]) -> Result<String, AnalysisError>;

    /// Base64-encoded image for `prompt`.
    async fn generate_image(&self, prompt: &str) -> Result<String, AnalysisError>;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: String,
    response_schema: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PredictRequest {
    instances: Vec<PredictInstance>,
    parameters: PredictParameters,
}

#[derive(Debug, Serialize)]
struct PredictInstance {
    prompt: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PredictParameters {
    sample_count: u32,
}

#[derive(Debug, Deserialize)]
struct PredictResponse {
    #[serde(default)]
    predictions: Vec<Prediction>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Prediction {
    bytes_base64_encoded: Option<String>,
}

pub struct GeminiClient {
    base_url: String,
    api_key: String,
    text_model: String,
    image_model: String,
    http_client: reqwest::Client,
}

impl GeminiClient {
    pub fn new(
        base_url: &str,
        api_key: &str,
        text_model: &str,
        image_model: &str,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build generative HTTP client: {}", e))?;
        info!("Generative client initialized with endpoint: {}", base_url);
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            text_model: text_model.to_string(),
            image_model: image_model.to_string(),
            http_client,
        })
    }

    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        Self::new(
            &config.gemini_base_url,
            &config.gemini_api_key,
            &config.gemini_text_model,
            &config.gemini_image_model,
            Duration::from_secs(config.analysis_timeout_seconds),
        )
    }

    fn generate_url(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.text_model)
    }

    fn predict_url(&self) -> String {
        format!("{}/models/{}:predict", self.base_url, self.image_model)
    }

    fn ensure_key(&self) -> Result<(), AnalysisError> {
        if self.api_key.is_empty() {
            return Err(AnalysisError::MissingApiKey);
        }
        Ok(())
    }

    async fn post<B: Serialize, R: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        body: &B,
    ) -> Result<R, AnalysisError> {
        self.ensure_key()?;
        let response = self
            .http_client
            .post(url)
            .query(&[("key", self.api_key.as_str())])
            .json(body)
            .send()
            .await
            .map_err(|e| AnalysisError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            warn!("Generative endpoint returned {}: {}", status, body);
            return Err(AnalysisError::Status { status, body });
        }

        response
            .json()
            .await
            .map_err(|e| AnalysisError::Malformed(e.to_string()))
    }

    async fn generate_text(&self, request: GenerateContentRequest) -> Result<String, AnalysisError> {
        let response: GenerateContentResponse = self.post(&self.generate_url(), &request).await?;
        response
            .candidates
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content)
            .and_then(|content| content.parts.into_iter().next())
            .and_then(|part| part.text)
            .ok_or(AnalysisError::MissingCandidate)
    }
}

#[async_trait]
impl GenerativeBackend for GeminiClient {
    async fn analyze_dream(&self, dream_text: &str) -> Result<String, AnalysisError> {
        debug!("Requesting structured analysis ({} chars)", dream_text.len());
        let request = GenerateContentRequest {
            contents: vec![Content {
                role: Some(ChatRole::User.as_str().to_string()),
                parts: vec![Part { text: Some(build_analysis_prompt(dream_text)) }],
            }],
            generation_config: Some(GenerationConfig {
                response_mime_type: "application/json".to_string(),
                response_schema: response_schema(),
            }),
        };
        self.generate_text(request).await
    }

    async fn chat(&self, history: &[ChatTurn]) -> Result<String, AnalysisError> {
        debug!("Requesting chat reply over {} turns", history.len());
        let request = GenerateContentRequest {
            contents: history
                .iter()
                .map(|turn| Content {
                    role: Some(turn.role.as_str().to_string()),
                    parts: vec![Part { text: Some(turn.text.clone()) }],
                })
                .collect(),
            generation_config: None,
        };
        self.generate_text(request).await
    }

    async fn generate_image(&self, prompt: &str) -> Result<String, AnalysisError> {
        debug!("Requesting image generation");
        let request = PredictRequest {
            instances: vec![PredictInstance { prompt: prompt.to_string() }],
            parameters: PredictParameters { sample_count: 1 },
        };
        let response: PredictResponse = self.post(&self.predict_url(), &request).await?;
        let encoded = response
            .predictions
            .into_iter()
            .next()
            .and_then(|prediction| prediction.bytes_base64_encoded)
            .ok_or(AnalysisError::MissingCandidate)?;

        base64::engine::general_purpose::STANDARD
            .decode(encoded.as_bytes())
            .map_err(|e| AnalysisError::Malformed(format!("image is not valid base64: {}", e)))?;
        Ok(encoded)
    }
}
