// src/provider/openai.rs — OpenAI Chat API provider

use async_trait::async_trait;
use futures::StreamExt;
use reqwest_eventsource::{Event, RequestBuilderExt};
use std::time::Duration;

use super::{GenOptions, GenProvider, ProviderConfig, TextStream};
use crate::infra::errors::EngramError;

/// Keys carrying this marker are scaffolding placeholders, not real
/// credentials; treat them the same as a missing key.
const PLACEHOLDER_KEY_MARKER: &str = "-n0tr3al";

const SYSTEM_PROMPT: &str = "You are a helpful AI assistant. Provide clear, concise, and helpful \
     responses. When provided with conversation history, use it to give more contextual and \
     relevant answers.";

const PROBE_TIMEOUT: Duration = Duration::from_secs(3);

pub struct OpenAiProvider {
    api_key: String,
    client: reqwest::Client,
    base_url: String,
    defaults: ProviderConfig,
}

impl OpenAiProvider {
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            client: reqwest::Client::new(),
            base_url: "https://api.openai.com/v1".into(),
            defaults: ProviderConfig::default(),
        }
    }

    pub fn with_base_url(api_key: String, base_url: String) -> Self {
        Self {
            api_key,
            client: reqwest::Client::new(),
            base_url,
            defaults: ProviderConfig::default(),
        }
    }

    /// Construct from the OPENAI_API_KEY environment variable. A missing
    /// variable is not an error here — availability probing reports it.
    pub fn from_env() -> Self {
        Self::new(std::env::var("OPENAI_API_KEY").unwrap_or_default())
    }

    fn key_is_usable(&self) -> bool {
        !self.api_key.trim().is_empty() && !self.api_key.contains(PLACEHOLDER_KEY_MARKER)
    }

    fn check_request(&self, prompt: &str) -> Result<(), EngramError> {
        if prompt.trim().is_empty() {
            return Err(EngramError::InvalidInput("prompt cannot be empty".into()));
        }
        if !self.key_is_usable() {
            return Err(EngramError::AuthFailure {
                provider: self.id().into(),
            });
        }
        Ok(())
    }

    fn build_request_body(&self, prompt: &str, options: &GenOptions, stream: bool) -> serde_json::Value {
        let model = options.model.as_deref().unwrap_or(&self.defaults.model);
        let temperature = options.temperature.unwrap_or(self.defaults.temperature);
        let max_tokens = options.max_tokens.unwrap_or(self.defaults.max_tokens);

        serde_json::json!({
            "model": model,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": prompt },
            ],
            "temperature": temperature,
            "max_tokens": max_tokens,
            "stream": stream,
        })
    }

    fn request_timeout(&self, options: &GenOptions) -> Duration {
        options.timeout.unwrap_or(self.defaults.timeout)
    }

    fn normalize_transport(&self, e: reqwest::Error) -> EngramError {
        if e.is_timeout() {
            EngramError::Timeout {
                provider: self.id().into(),
            }
        } else if e.is_connect() {
            EngramError::Unavailable {
                provider: self.id().into(),
            }
        } else {
            EngramError::Provider {
                provider: self.id().into(),
                message: e.to_string(),
            }
        }
    }

    fn normalize_status(&self, status: reqwest::StatusCode, retry_after_ms: u64, body: String) -> EngramError {
        match status {
            reqwest::StatusCode::TOO_MANY_REQUESTS => EngramError::RateLimited {
                provider: self.id().into(),
                retry_after_ms,
            },
            reqwest::StatusCode::UNAUTHORIZED | reqwest::StatusCode::FORBIDDEN => {
                EngramError::AuthFailure {
                    provider: self.id().into(),
                }
            }
            s if s.is_server_error() => EngramError::Unavailable {
                provider: self.id().into(),
            },
            s => EngramError::Provider {
                provider: self.id().into(),
                message: format!("HTTP {}: {}", s, body),
            },
        }
    }
}

fn retry_after_ms(response: &reqwest::Response) -> u64 {
    response
        .headers()
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
        .map(|secs| secs * 1000)
        .unwrap_or(5000)
}

#[async_trait]
impl GenProvider for OpenAiProvider {
    fn id(&self) -> &str {
        "openai"
    }

    async fn get_response(
        &self,
        prompt: &str,
        options: &GenOptions,
    ) -> Result<String, EngramError> {
        self.check_request(prompt)?;

        let body = self.build_request_body(prompt, options, false);

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .timeout(self.request_timeout(options))
            .json(&body)
            .send()
            .await
            .map_err(|e| self.normalize_transport(e))?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = retry_after_ms(&response);
            let error_body = response.text().await.unwrap_or_default();
            return Err(self.normalize_status(status, retry_after, error_body));
        }

        let resp: serde_json::Value = response.json().await.map_err(|e| EngramError::Provider {
            provider: self.id().into(),
            message: format!("Failed to parse response: {}", e),
        })?;

        let content = resp["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or("")
            .to_string();

        if content.trim().is_empty() {
            return Err(EngramError::Provider {
                provider: self.id().into(),
                message: "model returned an empty response".into(),
            });
        }

        tracing::debug!(chars = content.len(), "generated response");
        Ok(content)
    }

    async fn stream_response(
        &self,
        prompt: &str,
        options: &GenOptions,
    ) -> Result<TextStream, EngramError> {
        self.check_request(prompt)?;

        let body = self.build_request_body(prompt, options, true);

        let request_builder = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .timeout(self.request_timeout(options))
            .json(&body);

        let mut es = request_builder
            .eventsource()
            .map_err(|e| EngramError::Provider {
                provider: self.id().into(),
                message: format!("Failed to open SSE stream: {}", e),
            })?;

        let provider = self.id().to_string();

        let stream = async_stream::stream! {
            while let Some(event) = es.next().await {
                match event {
                    Ok(Event::Open) => {}
                    Ok(Event::Message(msg)) => {
                        if msg.data == "[DONE]" {
                            break;
                        }
                        let parsed: serde_json::Value = match serde_json::from_str(&msg.data) {
                            Ok(v) => v,
                            Err(e) => {
                                yield Err(EngramError::Provider {
                                    provider: provider.clone(),
                                    message: format!("Failed to parse SSE data: {}", e),
                                });
                                break;
                            }
                        };

                        let delta = parsed["choices"][0]["delta"]["content"]
                            .as_str()
                            .unwrap_or("")
                            .to_string();
                        if !delta.is_empty() {
                            yield Ok(delta);
                        }

                        if parsed["choices"][0]["finish_reason"].as_str().is_some() {
                            break;
                        }
                    }
                    Err(reqwest_eventsource::Error::StreamEnded) => break,
                    Err(reqwest_eventsource::Error::InvalidStatusCode(status, _)) => {
                        let err = match status {
                            reqwest::StatusCode::TOO_MANY_REQUESTS => EngramError::RateLimited {
                                provider: provider.clone(),
                                retry_after_ms: 5000,
                            },
                            reqwest::StatusCode::UNAUTHORIZED
                            | reqwest::StatusCode::FORBIDDEN => EngramError::AuthFailure {
                                provider: provider.clone(),
                            },
                            s if s.is_server_error() => EngramError::Unavailable {
                                provider: provider.clone(),
                            },
                            s => EngramError::Provider {
                                provider: provider.clone(),
                                message: format!("HTTP {}", s),
                            },
                        };
                        yield Err(err);
                        break;
                    }
                    Err(reqwest_eventsource::Error::Transport(e)) => {
                        let err = if e.is_timeout() {
                            EngramError::Timeout {
                                provider: provider.clone(),
                            }
                        } else if e.is_connect() {
                            EngramError::Unavailable {
                                provider: provider.clone(),
                            }
                        } else {
                            EngramError::Provider {
                                provider: provider.clone(),
                                message: e.to_string(),
                            }
                        };
                        yield Err(err);
                        break;
                    }
                    Err(e) => {
                        yield Err(EngramError::Provider {
                            provider: provider.clone(),
                            message: format!("SSE stream error: {}", e),
                        });
                        break;
                    }
                }
            }
        };

        Ok(Box::pin(stream))
    }

    async fn is_available(&self) -> bool {
        if !self.key_is_usable() {
            tracing::debug!("openai key missing or placeholder; provider unavailable");
            return false;
        }

        // Cheap read-only probe against the models listing.
        let result = self
            .client
            .get(format!("{}/models", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .timeout(PROBE_TIMEOUT)
            .send()
            .await;

        match result {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                tracing::debug!("openai availability probe failed: {e}");
                false
            }
        }
    }
}
