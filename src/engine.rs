// src/engine.rs — Collaborator-facing facade
//
// The surface UI, voice, and background layers call into. Everything
// routes through the resilience layer, so callers never see raw
// transport errors.

use serde::Deserialize;
use serde_json::Value;

use crate::infra::config::Config;
use crate::infra::errors::EngramError;
use crate::memory::{MemoryRecord, MemorySearchResult, MemoryStats, StoreHandle};
use crate::provider::registry::ProviderRegistry;
use crate::provider::robust::{robust_response, robust_stream};
use crate::provider::{GenOptions, ProviderKind, TextStream};

/// A document supplied by a dashboard or ingestion surface.
#[derive(Debug, Clone, Deserialize)]
pub struct DocumentInput {
    pub id: String,
    pub text: String,
    pub metadata: Option<Value>,
}

pub struct Engine {
    registry: ProviderRegistry,
    memory: StoreHandle,
    preferred: ProviderKind,
    search_limit: u32,
}

impl Engine {
    pub fn new(registry: ProviderRegistry, memory: StoreHandle, config: &Config) -> Self {
        let preferred = ProviderKind::parse(&config.generation.default_provider)
            .unwrap_or(ProviderKind::OpenAi);
        Self {
            registry,
            memory,
            preferred,
            search_limit: config.memory.search_limit,
        }
    }

    /// Preferred provider for this engine's attempts; per-call overrides
    /// go through [`Engine::send_message_with`].
    pub fn preferred_provider(&self) -> ProviderKind {
        self.preferred
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    pub async fn send_message(&self, text: &str) -> Result<String, EngramError> {
        self.send_message_with(text, self.preferred, &GenOptions::default())
            .await
    }

    pub async fn send_message_with(
        &self,
        text: &str,
        preferred: ProviderKind,
        options: &GenOptions,
    ) -> Result<String, EngramError> {
        robust_response(&self.registry, text, preferred, options).await
    }

    pub async fn send_streaming_message(&self, text: &str) -> TextStream {
        self.send_streaming_message_with(text, self.preferred, &GenOptions::default())
            .await
    }

    pub async fn send_streaming_message_with(
        &self,
        text: &str,
        preferred: ProviderKind,
        options: &GenOptions,
    ) -> TextStream {
        robust_stream(&self.registry, text, preferred, options).await
    }

    /// Ranked memory search for inspection surfaces.
    pub async fn search_memories(&self, query: &str) -> Vec<MemorySearchResult> {
        self.memory
            .search_memory(query.to_string(), self.search_limit)
            .await
    }

    /// Ingest external documents as memory records. The caller's id is
    /// preserved under `sourceId` in the record metadata.
    pub async fn add_documents(
        &self,
        documents: Vec<DocumentInput>,
    ) -> Result<Vec<MemoryRecord>, EngramError> {
        let mut records = Vec::with_capacity(documents.len());
        for doc in documents {
            let mut metadata = match doc.metadata {
                Some(Value::Object(map)) => map,
                _ => serde_json::Map::new(),
            };
            metadata.insert("sourceId".into(), Value::String(doc.id));

            let record = self
                .memory
                .add_memory(doc.text, Some(Value::Object(metadata)))
                .await?;
            records.push(record);
        }
        Ok(records)
    }

    pub async fn list_memories(
        &self,
        offset: u32,
        limit: u32,
    ) -> Result<Vec<MemoryRecord>, EngramError> {
        self.memory.get_all_memories(offset, limit).await
    }

    pub async fn delete_memory(&self, id: i64) -> Result<bool, EngramError> {
        self.memory.delete_memory(id).await
    }

    pub async fn clear_memories(&self) -> Result<(), EngramError> {
        self.memory.clear_all_memories().await
    }

    pub async fn memory_stats(&self) -> Result<MemoryStats, EngramError> {
        self.memory.get_stats().await
    }
}
