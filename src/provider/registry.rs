// src/provider/registry.rs — Provider construction and selection
//
// Explicitly constructed and passed to callers; there is no global
// instance. One decorated provider is cached per kind, and the active
// slot is a single Arc swap so readers always see a fully-built provider.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use super::memory_aware::MemoryAwareProvider;
use super::ondevice::OnDeviceProvider;
use super::openai::OpenAiProvider;
use super::{GenProvider, ProviderConfig, ProviderKind};
use crate::memory::StoreHandle;

/// Probe order for best-available selection. The on-device provider is
/// listed first because it can always serve.
const PREFERENCE_ORDER: [ProviderKind; 2] = [ProviderKind::OnDevice, ProviderKind::OpenAi];

pub struct ProviderRegistry {
    providers: Mutex<HashMap<ProviderKind, Arc<MemoryAwareProvider>>>,
    current: RwLock<Option<Arc<MemoryAwareProvider>>>,
    store: StoreHandle,
    base_config: ProviderConfig,
    default_kind: ProviderKind,
}

impl ProviderRegistry {
    pub fn new(store: StoreHandle, base_config: ProviderConfig) -> Self {
        Self {
            providers: Mutex::new(HashMap::new()),
            current: RwLock::new(None),
            store,
            base_config,
            default_kind: ProviderKind::OnDevice,
        }
    }

    pub fn with_default(mut self, kind: ProviderKind) -> Self {
        self.default_kind = kind;
        self
    }

    fn build(&self, kind: ProviderKind, config: Option<ProviderConfig>) -> Arc<MemoryAwareProvider> {
        let inner: Arc<dyn GenProvider> = match kind {
            ProviderKind::OpenAi => Arc::new(OpenAiProvider::from_env()),
            ProviderKind::OnDevice => Arc::new(OnDeviceProvider::new()),
        };
        Arc::new(MemoryAwareProvider::with_config(
            inner,
            self.store.clone(),
            config.unwrap_or_else(|| self.base_config.clone()),
        ))
    }

    /// Cached construction: one instance per kind for the registry's life.
    pub fn create_provider(&self, kind: ProviderKind) -> Arc<MemoryAwareProvider> {
        self.create_provider_with(kind, None)
    }

    /// Like [`create_provider`], with an explicit config applied when the
    /// instance is first constructed. An already-cached provider keeps
    /// its config (mutate it through `update_config` instead).
    ///
    /// [`create_provider`]: ProviderRegistry::create_provider
    pub fn create_provider_with(
        &self,
        kind: ProviderKind,
        config: Option<ProviderConfig>,
    ) -> Arc<MemoryAwareProvider> {
        self.providers
            .lock()
            .unwrap()
            .entry(kind)
            .or_insert_with(|| self.build(kind, config))
            .clone()
    }

    /// Construct (or reuse) and mark as current. An unavailable provider
    /// is still set — actual failover belongs to the resilience layer,
    /// not here.
    pub async fn set_active_provider(&self, kind: ProviderKind) -> Arc<MemoryAwareProvider> {
        self.set_active_provider_with(kind, None).await
    }

    pub async fn set_active_provider_with(
        &self,
        kind: ProviderKind,
        config: Option<ProviderConfig>,
    ) -> Arc<MemoryAwareProvider> {
        let provider = self.create_provider_with(kind, config);

        if !provider.is_available().await {
            tracing::warn!(
                provider = %kind,
                "provider is not available; setting it active anyway and relying on fallback"
            );
        }

        *self.current.write().unwrap() = Some(provider.clone());
        provider
    }

    /// The active provider, lazily initialized to the default kind.
    pub async fn get_current_provider(&self) -> Arc<MemoryAwareProvider> {
        if let Some(provider) = self.current.read().unwrap().clone() {
            return provider;
        }
        self.set_active_provider(self.default_kind).await
    }

    /// Walk the preference order and activate the first healthy provider.
    /// When nothing probes healthy the on-device fallback is forced: this
    /// registry never leaves the system without an active provider.
    pub async fn switch_to_best_available_provider(&self) -> Arc<MemoryAwareProvider> {
        for kind in PREFERENCE_ORDER {
            let provider = self.create_provider(kind);
            if provider.is_available().await {
                tracing::info!(provider = %kind, "switched to provider");
                *self.current.write().unwrap() = Some(provider.clone());
                return provider;
            }
            tracing::warn!(provider = %kind, "provider is not available");
        }

        tracing::warn!("no providers available; forcing on-device fallback");
        let fallback = self.create_provider(ProviderKind::OnDevice);
        *self.current.write().unwrap() = Some(fallback.clone());
        fallback
    }

    /// Probe every known kind. Used by status surfaces, not failover.
    pub async fn check_all_providers(&self) -> Vec<(ProviderKind, bool)> {
        let mut results = Vec::new();
        for kind in PREFERENCE_ORDER {
            let provider = self.create_provider(kind);
            results.push((kind, provider.is_available().await));
        }
        results
    }

    /// Kind of the currently active provider, if one has been selected.
    pub fn current_kind(&self) -> Option<ProviderKind> {
        self.current
            .read()
            .unwrap()
            .as_ref()
            .and_then(|p| ProviderKind::parse(p.id()))
    }
}
