//! Remote vision model backend
//!
//! Sends each image inline (base64 data URL) to a chat-completion endpoint
//! together with an extraction prompt. Requests are paced with a fixed
//! delay to stay inside the service's rate limit.

use anyhow::{bail, Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::{Duration, Instant};
use tokio::runtime::Runtime;
use tracing::{debug, info};

use super::OcrEngine;
use crate::error::BenchError;

/// Remote engine settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Display name
    pub name: String,
    /// Chat-completion endpoint
    pub api_url: String,
    /// Model identifier sent with every request
    pub model: String,
    /// Environment variable holding the API key
    pub api_key_env: String,
    /// Instruction sent alongside the image
    pub prompt: String,
    /// Completion token limit
    pub max_tokens: u32,
    /// Minimum delay between the starts of consecutive requests
    pub request_delay_secs: u64,
    /// Per-request HTTP timeout
    pub request_timeout_secs: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            name: "Mistral OCR".to_string(),
            api_url: "https://api.mistral.ai/v1/chat/completions".to_string(),
            model: "pixtral-12b-2409".to_string(),
            api_key_env: "MISTRAL_API_KEY".to_string(),
            prompt: "Extract ALL text from this image exactly as written. \
                     Return only the extracted text, nothing else."
                .to_string(),
            max_tokens: 1024,
            request_delay_secs: 30,
            request_timeout_secs: 60,
        }
    }
}

/// Fixed-delay request pacing
#[derive(Debug)]
pub struct Pacer {
    delay: Duration,
    last_start: Option<Instant>,
}

impl Pacer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            last_start: None,
        }
    }

    /// How long to wait at `now` before the next request may start
    pub fn wait_time(&self, now: Instant) -> Duration {
        match self.last_start {
            Some(last) => self.delay.saturating_sub(now.saturating_duration_since(last)),
            None => Duration::ZERO,
        }
    }

    /// Block until the next request may start, then claim the slot
    pub fn wait(&mut self) {
        let wait = self.wait_time(Instant::now());
        if !wait.is_zero() {
            debug!("Rate limit: waiting {:?} before next request", wait);
            std::thread::sleep(wait);
        }
        self.last_start = Some(Instant::now());
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: String,
}

/// State created by `initialize`
struct Session {
    runtime: Runtime,
    client: reqwest::Client,
    api_key: String,
    pacer: Pacer,
}

/// Remote chat-completion OCR engine
pub struct RemoteEngine {
    config: RemoteConfig,
    session: Option<Session>,
}

impl RemoteEngine {
    pub fn new(config: RemoteConfig) -> Self {
        Self {
            config,
            session: None,
        }
    }

    /// Build the chat-completion request body for one image
    fn request_body(&self, image_url: &str) -> serde_json::Value {
        serde_json::json!({
            "model": self.config.model,
            "messages": [{
                "role": "user",
                "content": [
                    { "type": "image_url", "image_url": { "url": image_url } },
                    { "type": "text", "text": self.config.prompt },
                ],
            }],
            "max_tokens": self.config.max_tokens,
        })
    }

    async fn send_request(
        client: &reqwest::Client,
        url: &str,
        api_key: &str,
        body: &serde_json::Value,
    ) -> Result<String> {
        let response = client
            .post(url)
            .bearer_auth(api_key)
            .json(body)
            .send()
            .await
            .context("Failed to send OCR request")?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            bail!("Remote OCR request failed with status {}: {}", status, detail.trim());
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .context("Failed to parse OCR response")?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content.trim().to_string())
            .context("OCR response contained no choices")
    }
}

impl OcrEngine for RemoteEngine {
    fn initialize(&mut self) -> Result<()> {
        let api_key = std::env::var(&self.config.api_key_env).unwrap_or_default();
        if api_key.trim().is_empty() {
            return Err(BenchError::MissingApiKey {
                var: self.config.api_key_env.clone(),
            }
            .into());
        }

        let runtime = Runtime::new().context("Failed to create tokio runtime")?;
        let client = {
            let _guard = runtime.enter();
            reqwest::Client::builder()
                .timeout(Duration::from_secs(self.config.request_timeout_secs))
                .build()
                .context("Failed to create HTTP client")?
        };

        self.session = Some(Session {
            runtime,
            client,
            api_key: api_key.trim().to_string(),
            pacer: Pacer::new(Duration::from_secs(self.config.request_delay_secs)),
        });

        info!(
            "{} ready ({}, {}s between requests)",
            self.config.name, self.config.model, self.config.request_delay_secs
        );
        Ok(())
    }

    fn before_sample(&mut self) {
        if let Some(session) = self.session.as_mut() {
            session.pacer.wait();
        }
    }

    fn extract_text(&mut self, image: &Path) -> Result<String> {
        let image_url = encode_image(image)?;
        let body = self.request_body(&image_url);

        let Some(session) = self.session.as_ref() else {
            bail!("{} used before initialization", self.config.name);
        };

        session.runtime.block_on(Self::send_request(
            &session.client,
            &self.config.api_url,
            &session.api_key,
            &body,
        ))
    }

    fn display_name(&self) -> String {
        self.config.name.clone()
    }
}

/// Read an image and encode it as a `data:` URL
pub fn encode_image(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("Failed to read image {}", path.display()))?;
    Ok(format!("data:{};base64,{}", mime_type(path), STANDARD.encode(bytes)))
}

/// MIME type derived from the file extension
fn mime_type(path: &Path) -> String {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_else(|| "png".to_string());

    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg".to_string(),
        "tif" => "image/tiff".to_string(),
        other => format!("image/{}", other),
    }
}
