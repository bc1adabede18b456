// src/provider/memory_aware.rs — Memory augmentation wrapper
//
// Wraps any provider with transparent conversation memory: retrieved
// records are folded into the prompt before generation, and the finished
// turn is written back to the store afterwards. Memory failures never
// surface to the caller — retrieval and persistence are both bounded by
// timeouts, logged, and swallowed here and nowhere else.

use async_trait::async_trait;
use futures::StreamExt;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::mpsc;
use uuid::Uuid;

use super::{GenOptions, GenProvider, ProviderConfig, ProviderConfigPatch, TextStream};
use crate::infra::errors::EngramError;
use crate::memory::store::MemorySearchResult;
use crate::memory::StoreHandle;

const MEMORY_SEARCH_TIMEOUT: Duration = Duration::from_secs(5);
const MEMORY_SAVE_TIMEOUT: Duration = Duration::from_secs(10);

/// In-flight accumulation state for one streamed generation.
struct GenerationSession {
    id: Uuid,
    buffer: String,
}

impl GenerationSession {
    fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            buffer: String::new(),
        }
    }

    fn push(&mut self, chunk: &str) {
        self.buffer.push_str(chunk);
    }
}

pub struct MemoryAwareProvider {
    inner: Arc<dyn GenProvider>,
    store: StoreHandle,
    config: RwLock<ProviderConfig>,
}

impl MemoryAwareProvider {
    pub fn new(inner: Arc<dyn GenProvider>, store: StoreHandle) -> Self {
        Self::with_config(inner, store, ProviderConfig::default())
    }

    pub fn with_config(
        inner: Arc<dyn GenProvider>,
        store: StoreHandle,
        config: ProviderConfig,
    ) -> Self {
        Self {
            inner,
            store,
            config: RwLock::new(config),
        }
    }

    /// Merge partial fields into the existing config.
    pub fn update_config(&self, patch: &ProviderConfigPatch) {
        self.config.write().unwrap().apply(patch);
    }

    /// Defensive copy of the current config.
    pub fn get_config(&self) -> ProviderConfig {
        self.config.read().unwrap().clone()
    }

    pub fn set_memory_enabled(&self, enabled: bool) {
        self.config.write().unwrap().memory_enabled = enabled;
    }

    pub fn is_memory_enabled(&self) -> bool {
        self.config.read().unwrap().memory_enabled
    }

    /// Per-call override wins over provider config.
    fn should_use_memory(&self, options: &GenOptions) -> bool {
        options
            .memory_enabled
            .unwrap_or_else(|| self.is_memory_enabled())
    }

    /// Fill unset generation fields from the wrapper's config so the
    /// inner provider sees one coherent set of parameters.
    fn effective_options(&self, options: &GenOptions) -> GenOptions {
        let config = self.get_config();
        GenOptions {
            memory_enabled: options.memory_enabled,
            max_memory_results: options.max_memory_results,
            model: options.model.clone().or(Some(config.model)),
            temperature: options.temperature.or(Some(config.temperature)),
            max_tokens: options.max_tokens.or(Some(config.max_tokens)),
            timeout: options.timeout.or(Some(config.timeout)),
        }
    }

    /// Retrieve relevant records and rewrite the prompt around them.
    /// Every failure path falls back to the original prompt.
    async fn enhance_prompt(&self, prompt: &str, options: &GenOptions) -> String {
        if prompt.trim().is_empty() {
            return prompt.to_string();
        }

        let max_results = options
            .max_memory_results
            .unwrap_or_else(|| self.get_config().max_memory_context);

        let search = self.store.search_memory(prompt.to_string(), max_results);
        let memories = match tokio::time::timeout(MEMORY_SEARCH_TIMEOUT, search).await {
            Ok(results) => results,
            Err(_) => {
                tracing::warn!(
                    provider = self.inner.id(),
                    "memory search timed out; using original prompt"
                );
                return prompt.to_string();
            }
        };

        if memories.is_empty() {
            tracing::debug!(provider = self.inner.id(), "no relevant memories for prompt");
            return prompt.to_string();
        }

        let context = format_memory_context(&memories);
        tracing::debug!(
            provider = self.inner.id(),
            count = memories.len(),
            "augmented prompt with memory context"
        );

        format!("{context}\n\nCurrent user input: {prompt}")
    }

    /// Persist a finished turn as two records. Best-effort: bounded by a
    /// timeout, failures logged and discarded.
    async fn save_turn(store: &StoreHandle, provider_id: &str, user_input: &str, response: &str) {
        if user_input.trim().is_empty() || response.trim().is_empty() {
            tracing::debug!("skipping memory save for empty turn");
            return;
        }

        let save = async {
            store
                .add_memory(
                    user_input.trim().to_string(),
                    Some(serde_json::json!({ "isUser": true, "provider": provider_id })),
                )
                .await?;
            store
                .add_memory(
                    response.trim().to_string(),
                    Some(serde_json::json!({ "isUser": false, "provider": provider_id })),
                )
                .await?;
            Ok::<(), EngramError>(())
        };

        match tokio::time::timeout(MEMORY_SAVE_TIMEOUT, save).await {
            Ok(Ok(())) => tracing::debug!("saved conversation turn to memory"),
            Ok(Err(e)) => tracing::warn!("failed to save conversation turn: {e}"),
            Err(_) => tracing::warn!("memory save timed out"),
        }
    }

    /// Fan the inner stream out to the caller and an accumulation buffer.
    ///
    /// A spawned task drives the source and forwards every chunk through
    /// an unbounded channel, so the caller starts receiving immediately
    /// and accumulation can never apply backpressure to delivery. When
    /// the source completes, the buffered text is persisted and only then
    /// does the caller's stream close. A caller that walks away stops
    /// delivery but not accumulation; the partial turn is persisted as-is.
    fn tee_stream(&self, mut inner: TextStream, user_prompt: String) -> TextStream {
        let (tx, mut rx) = mpsc::unbounded_channel::<Result<String, EngramError>>();
        let store = self.store.clone();
        let provider_id = self.inner.id().to_string();

        tokio::spawn(async move {
            let mut session = GenerationSession::new();
            let mut delivering = true;
            let mut errored = false;

            tracing::debug!(session = %session.id, "streaming generation started");

            while let Some(item) = inner.next().await {
                match item {
                    Ok(chunk) => {
                        session.push(&chunk);
                        if delivering && tx.send(Ok(chunk)).is_err() {
                            delivering = false;
                            tracing::debug!(
                                session = %session.id,
                                "stream consumer disconnected; continuing accumulation"
                            );
                        }
                    }
                    Err(e) => {
                        errored = true;
                        if delivering {
                            let _ = tx.send(Err(e));
                        }
                        break;
                    }
                }
            }

            // Persist before closing the caller's stream, mirroring the
            // non-streaming path. An errored stream is not persisted.
            if !errored {
                Self::save_turn(&store, &provider_id, &user_prompt, &session.buffer).await;
            }
            tracing::debug!(session = %session.id, "streaming generation finished");
        });

        let stream = async_stream::stream! {
            while let Some(item) = rx.recv().await {
                yield item;
            }
        };

        Box::pin(stream)
    }
}

/// Render retrieved records into the context block prepended to prompts.
fn format_memory_context(memories: &[MemorySearchResult]) -> String {
    let entries: Vec<String> = memories
        .iter()
        .enumerate()
        .map(|(i, result)| {
            let is_user = result
                .record
                .metadata
                .as_ref()
                .and_then(|m| m.get("isUser"))
                .and_then(|v| v.as_bool())
                .unwrap_or(false);
            let role = if is_user { "User" } else { "Assistant" };
            format!("[Memory {}] {}: {}", i + 1, role, result.record.content)
        })
        .collect();

    format!(
        "Relevant conversation history:\n{}\n\nPlease use this context to provide a more informed response.",
        entries.join("\n")
    )
}

#[async_trait]
impl GenProvider for MemoryAwareProvider {
    fn id(&self) -> &str {
        self.inner.id()
    }

    async fn get_response(
        &self,
        prompt: &str,
        options: &GenOptions,
    ) -> Result<String, EngramError> {
        let use_memory = self.should_use_memory(options);
        let options = self.effective_options(options);

        let enhanced = if use_memory {
            self.enhance_prompt(prompt, &options).await
        } else {
            prompt.to_string()
        };

        let response = self.inner.get_response(&enhanced, &options).await?;

        if use_memory {
            Self::save_turn(&self.store, self.inner.id(), prompt, &response).await;
        }

        Ok(response)
    }

    async fn stream_response(
        &self,
        prompt: &str,
        options: &GenOptions,
    ) -> Result<TextStream, EngramError> {
        let use_memory = self.should_use_memory(options);
        let options = self.effective_options(options);

        let enhanced = if use_memory {
            self.enhance_prompt(prompt, &options).await
        } else {
            prompt.to_string()
        };

        let stream = self.inner.stream_response(&enhanced, &options).await?;

        if !use_memory {
            return Ok(stream);
        }

        Ok(self.tee_stream(stream, prompt.to_string()))
    }

    async fn is_available(&self) -> bool {
        self.inner.is_available().await
    }
}
