// src/provider/mod.rs — Generation provider layer

pub mod memory_aware;
pub mod ondevice;
pub mod openai;
pub mod registry;
pub mod robust;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::time::Duration;

use crate::infra::errors::EngramError;

/// Live token stream: text chunks in arrival order.
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String, EngramError>> + Send>>;

/// Core trait that all generation providers implement.
#[async_trait]
pub trait GenProvider: Send + Sync {
    /// Stable identifier for logging and metadata tagging.
    fn id(&self) -> &str;

    async fn get_response(&self, prompt: &str, options: &GenOptions)
        -> Result<String, EngramError>;

    async fn stream_response(
        &self,
        prompt: &str,
        options: &GenOptions,
    ) -> Result<TextStream, EngramError>;

    /// Cheap, side-effect-free health probe. Returns false rather than
    /// erroring when misconfigured or unreachable.
    async fn is_available(&self) -> bool;
}

/// The backends the registry knows how to construct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    OpenAi,
    OnDevice,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "openai",
            ProviderKind::OnDevice => "ondevice",
        }
    }

    /// The other half of the two-provider failover pair.
    pub fn alternate(&self) -> Self {
        match self {
            ProviderKind::OpenAi => ProviderKind::OnDevice,
            ProviderKind::OnDevice => ProviderKind::OpenAi,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "openai" => Some(ProviderKind::OpenAi),
            "ondevice" | "on-device" | "local" => Some(ProviderKind::OnDevice),
            _ => None,
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-call options. Unset fields fall back to the provider's config.
#[derive(Debug, Clone, Default)]
pub struct GenOptions {
    pub memory_enabled: Option<bool>,
    pub max_memory_results: Option<u32>,
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub timeout: Option<Duration>,
}

impl GenOptions {
    /// Copy of these options with the memory flag forced.
    pub fn with_memory(&self, enabled: bool) -> Self {
        Self {
            memory_enabled: Some(enabled),
            ..self.clone()
        }
    }
}

/// Per-provider settings. Owned by the memory-aware wrapper; mutated only
/// through field-wise merges.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderConfig {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout: Duration,
    pub memory_enabled: bool,
    pub max_memory_context: u32,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o-2024-11-20".into(),
            temperature: 0.7,
            max_tokens: 2048,
            timeout: Duration::from_secs(30),
            memory_enabled: true,
            max_memory_context: 3,
        }
    }
}

/// Partial update merged into an existing [`ProviderConfig`].
#[derive(Debug, Clone, Default)]
pub struct ProviderConfigPatch {
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub timeout: Option<Duration>,
    pub memory_enabled: Option<bool>,
    pub max_memory_context: Option<u32>,
}

impl ProviderConfig {
    pub fn apply(&mut self, patch: &ProviderConfigPatch) {
        if let Some(model) = &patch.model {
            self.model = model.clone();
        }
        if let Some(temperature) = patch.temperature {
            self.temperature = temperature;
        }
        if let Some(max_tokens) = patch.max_tokens {
            self.max_tokens = max_tokens;
        }
        if let Some(timeout) = patch.timeout {
            self.timeout = timeout;
        }
        if let Some(memory_enabled) = patch.memory_enabled {
            self.memory_enabled = memory_enabled;
        }
        if let Some(max_memory_context) = patch.max_memory_context {
            self.max_memory_context = max_memory_context;
        }
    }

    pub fn from_generation(gen: &crate::infra::config::GenerationConfig) -> Self {
        Self {
            model: gen.model.clone(),
            temperature: gen.temperature,
            max_tokens: gen.max_tokens,
            timeout: Duration::from_secs(gen.timeout_seconds),
            memory_enabled: gen.memory_enabled,
            max_memory_context: gen.max_memory_context,
        }
    }
}
