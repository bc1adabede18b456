// tests/registry_test.rs — Integration test: provider registry selection

use std::sync::Arc;

use engram::memory::{spawn_store_server, MemoryManager, StoreHandle};
use engram::provider::registry::ProviderRegistry;
use engram::provider::{GenProvider, ProviderConfig, ProviderKind};

fn test_store_handle() -> StoreHandle {
    let manager = MemoryManager::in_memory(32).unwrap();
    let (handle, _join) = spawn_store_server(manager.store);
    handle
}

fn test_registry() -> ProviderRegistry {
    std::env::set_var("OPENAI_API_KEY", "");
    ProviderRegistry::new(test_store_handle(), ProviderConfig::default())
}

#[tokio::test]
async fn test_create_provider_caches_instances() {
    let registry = test_registry();

    let a = registry.create_provider(ProviderKind::OnDevice);
    let b = registry.create_provider(ProviderKind::OnDevice);
    assert!(Arc::ptr_eq(&a, &b));

    let c = registry.create_provider(ProviderKind::OpenAi);
    assert!(!Arc::ptr_eq(&a, &c));
    assert_eq!(c.id(), "openai");
}

#[tokio::test]
async fn test_get_current_lazily_selects_default() {
    let registry = test_registry();
    assert_eq!(registry.current_kind(), None);

    let provider = registry.get_current_provider().await;
    assert_eq!(provider.id(), "ondevice");
    assert_eq!(registry.current_kind(), Some(ProviderKind::OnDevice));

    // Subsequent reads reuse the already-active provider.
    let again = registry.get_current_provider().await;
    assert!(Arc::ptr_eq(&provider, &again));
}

#[tokio::test]
async fn test_set_active_keeps_unavailable_provider() {
    let registry = test_registry();

    // The network provider probes unavailable (no credential), but the
    // registry still activates it; failover is the resilience layer's job.
    let provider = registry.set_active_provider(ProviderKind::OpenAi).await;
    assert!(!provider.is_available().await);
    assert_eq!(registry.current_kind(), Some(ProviderKind::OpenAi));
}

#[tokio::test]
async fn test_switch_to_best_available_picks_healthy_provider() {
    let registry = test_registry();

    let provider = registry.switch_to_best_available_provider().await;
    assert_eq!(provider.id(), "ondevice");
    assert!(provider.is_available().await);
    assert_eq!(registry.current_kind(), Some(ProviderKind::OnDevice));
}

#[tokio::test]
async fn test_registry_never_without_provider() {
    let registry = test_registry();

    // Even after activating an unavailable provider, best-available
    // selection always lands on something that can serve.
    registry.set_active_provider(ProviderKind::OpenAi).await;
    let provider = registry.switch_to_best_available_provider().await;
    assert!(provider.is_available().await);
}

#[tokio::test]
async fn test_check_all_providers_reports_both_kinds() {
    let registry = test_registry();

    let results = registry.check_all_providers().await;
    assert_eq!(results.len(), 2);

    let ondevice = results
        .iter()
        .find(|(kind, _)| *kind == ProviderKind::OnDevice)
        .unwrap();
    assert!(ondevice.1);

    let openai = results
        .iter()
        .find(|(kind, _)| *kind == ProviderKind::OpenAi)
        .unwrap();
    assert!(!openai.1);
}

#[tokio::test]
async fn test_explicit_config_applies_on_first_construction() {
    let registry = test_registry();

    let config = ProviderConfig {
        max_memory_context: 9,
        ..Default::default()
    };
    let provider = registry.create_provider_with(ProviderKind::OnDevice, Some(config));
    assert_eq!(provider.get_config().max_memory_context, 9);

    // A cached instance keeps its config; later explicit configs are
    // ignored in favor of update_config.
    let again = registry.create_provider_with(
        ProviderKind::OnDevice,
        Some(ProviderConfig {
            max_memory_context: 1,
            ..Default::default()
        }),
    );
    assert!(Arc::ptr_eq(&provider, &again));
    assert_eq!(again.get_config().max_memory_context, 9);
}

#[tokio::test]
async fn test_default_kind_override() {
    let registry = ProviderRegistry::new(test_store_handle(), ProviderConfig::default())
        .with_default(ProviderKind::OpenAi);
    std::env::set_var("OPENAI_API_KEY", "");

    let provider = registry.get_current_provider().await;
    assert_eq!(provider.id(), "openai");
}
