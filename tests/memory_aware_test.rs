// tests/memory_aware_test.rs — Integration test: memory augmentation wrapper

use async_trait::async_trait;
use futures::StreamExt;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

use engram::infra::errors::EngramError;
use engram::memory::{spawn_store_server, MemoryManager, StoreHandle};
use engram::provider::memory_aware::MemoryAwareProvider;
use engram::provider::{
    GenOptions, GenProvider, ProviderConfig, ProviderConfigPatch, TextStream,
};

fn test_store_handle() -> StoreHandle {
    let manager = MemoryManager::in_memory(32).unwrap();
    let (handle, _join) = spawn_store_server(manager.store);
    handle
}

/// Echoes the prompt back and records what it was actually asked.
struct EchoProvider {
    seen_prompts: Mutex<Vec<String>>,
}

impl EchoProvider {
    fn new() -> Self {
        Self {
            seen_prompts: Mutex::new(Vec::new()),
        }
    }

    fn last_prompt(&self) -> String {
        self.seen_prompts.lock().unwrap().last().cloned().unwrap_or_default()
    }
}

#[async_trait]
impl GenProvider for EchoProvider {
    fn id(&self) -> &str {
        "echo"
    }

    async fn get_response(
        &self,
        prompt: &str,
        _options: &GenOptions,
    ) -> Result<String, EngramError> {
        self.seen_prompts.lock().unwrap().push(prompt.to_string());
        Ok(format!("echo: {prompt}"))
    }

    async fn stream_response(
        &self,
        prompt: &str,
        _options: &GenOptions,
    ) -> Result<TextStream, EngramError> {
        self.seen_prompts.lock().unwrap().push(prompt.to_string());
        let chunks = vec![Ok("echo: ".to_string()), Ok(prompt.to_string())];
        Ok(Box::pin(futures::stream::iter(chunks)))
    }

    async fn is_available(&self) -> bool {
        true
    }
}

/// Streams whatever the test feeds through its channel.
struct ChannelProvider {
    rx: Mutex<Option<mpsc::UnboundedReceiver<Result<String, EngramError>>>>,
}

impl ChannelProvider {
    fn new() -> (Self, mpsc::UnboundedSender<Result<String, EngramError>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                rx: Mutex::new(Some(rx)),
            },
            tx,
        )
    }
}

#[async_trait]
impl GenProvider for ChannelProvider {
    fn id(&self) -> &str {
        "channel"
    }

    async fn get_response(
        &self,
        _prompt: &str,
        _options: &GenOptions,
    ) -> Result<String, EngramError> {
        unimplemented!("streaming-only test provider")
    }

    async fn stream_response(
        &self,
        _prompt: &str,
        _options: &GenOptions,
    ) -> Result<TextStream, EngramError> {
        let mut rx = self
            .rx
            .lock()
            .unwrap()
            .take()
            .expect("stream_response called twice");
        let stream = async_stream::stream! {
            while let Some(item) = rx.recv().await {
                yield item;
            }
        };
        Ok(Box::pin(stream))
    }

    async fn is_available(&self) -> bool {
        true
    }
}

#[tokio::test]
async fn test_non_streaming_persists_both_turns() {
    let store = test_store_handle();
    let provider = MemoryAwareProvider::new(Arc::new(EchoProvider::new()), store.clone());

    let response = provider
        .get_response("remember the milk", &GenOptions::default())
        .await
        .unwrap();
    assert_eq!(response, "echo: remember the milk");

    let stats = store.get_stats().await.unwrap();
    assert_eq!(stats.total_memories, 2);

    let records = store.get_all_memories(0, 10).await.unwrap();
    let user = records
        .iter()
        .find(|r| r.content == "remember the milk")
        .expect("user turn persisted");
    let assistant = records
        .iter()
        .find(|r| r.content == "echo: remember the milk")
        .expect("assistant turn persisted");

    let user_meta = user.metadata.as_ref().unwrap();
    assert_eq!(user_meta["isUser"], true);
    assert_eq!(user_meta["provider"], "echo");
    let assistant_meta = assistant.metadata.as_ref().unwrap();
    assert_eq!(assistant_meta["isUser"], false);
}

#[tokio::test]
async fn test_second_request_sees_memory_context() {
    let store = test_store_handle();
    let echo = Arc::new(EchoProvider::new());
    let provider = MemoryAwareProvider::new(echo.clone(), store.clone());

    provider
        .get_response("my name is Ada", &GenOptions::default())
        .await
        .unwrap();

    provider
        .get_response("what is my name", &GenOptions::default())
        .await
        .unwrap();

    let prompt = echo.last_prompt();
    assert!(prompt.starts_with("Relevant conversation history:\n"));
    assert!(prompt.contains("[Memory 1]"));
    assert!(prompt.contains("my name is Ada"));
    assert!(prompt.contains("Please use this context to provide a more informed response."));
    assert!(prompt.ends_with("Current user input: what is my name"));
}

#[tokio::test]
async fn test_memory_roles_rendered_from_metadata() {
    let store = test_store_handle();
    let echo = Arc::new(EchoProvider::new());
    let provider = MemoryAwareProvider::new(echo.clone(), store.clone());

    provider
        .get_response("favorite color question", &GenOptions::default())
        .await
        .unwrap();

    provider
        .get_response("favorite color again", &GenOptions::default())
        .await
        .unwrap();

    let prompt = echo.last_prompt();
    assert!(prompt.contains("User: favorite color question"));
    assert!(prompt.contains("Assistant: echo: favorite color question"));
}

#[tokio::test]
async fn test_memory_disabled_passes_prompt_through() {
    let store = test_store_handle();
    let echo = Arc::new(EchoProvider::new());
    let provider = MemoryAwareProvider::new(echo.clone(), store.clone());

    let options = GenOptions::default().with_memory(false);
    provider.get_response("plain prompt", &options).await.unwrap();

    assert_eq!(echo.last_prompt(), "plain prompt");
    let stats = store.get_stats().await.unwrap();
    assert_eq!(stats.total_memories, 0);
}

#[tokio::test]
async fn test_per_call_override_beats_provider_config() {
    let store = test_store_handle();
    let echo = Arc::new(EchoProvider::new());
    let provider = MemoryAwareProvider::new(echo.clone(), store.clone());
    provider.set_memory_enabled(false);

    // Config says off, call says on: the call wins.
    provider
        .get_response("override wins", &GenOptions::default().with_memory(true))
        .await
        .unwrap();

    let stats = store.get_stats().await.unwrap();
    assert_eq!(stats.total_memories, 2);
}

#[tokio::test]
async fn test_config_updates_merge() {
    let store = test_store_handle();
    let provider = MemoryAwareProvider::new(Arc::new(EchoProvider::new()), store);

    provider.update_config(&ProviderConfigPatch {
        temperature: Some(0.2),
        max_memory_context: Some(7),
        ..Default::default()
    });

    let config = provider.get_config();
    assert_eq!(config.temperature, 0.2);
    assert_eq!(config.max_memory_context, 7);
    // Unpatched fields unchanged
    assert_eq!(config.max_tokens, ProviderConfig::default().max_tokens);

    provider.set_memory_enabled(false);
    assert!(!provider.is_memory_enabled());
    assert!(!provider.get_config().memory_enabled);
}

#[tokio::test]
async fn test_streaming_tee_delivers_before_persisting() {
    let store = test_store_handle();
    let (channel_provider, tx) = ChannelProvider::new();
    let provider = MemoryAwareProvider::new(Arc::new(channel_provider), store.clone());

    let mut stream = provider
        .stream_response("stream me", &GenOptions::default())
        .await
        .unwrap();

    // First chunk arrives while the source stream is still open — the
    // wrapper cannot have buffered the whole response first.
    tx.send(Ok("Hello ".to_string())).unwrap();
    let first = stream.next().await.unwrap().unwrap();
    assert_eq!(first, "Hello ");

    // Nothing persisted yet: the turn is still in flight.
    let stats = store.get_stats().await.unwrap();
    assert_eq!(stats.total_memories, 0);

    tx.send(Ok("world".to_string())).unwrap();
    drop(tx);

    // Drain to completion; the stream only closes after persistence.
    let mut rest = String::new();
    while let Some(chunk) = stream.next().await {
        rest.push_str(&chunk.unwrap());
    }
    assert_eq!(rest, "world");

    let stats = store.get_stats().await.unwrap();
    assert_eq!(stats.total_memories, 2);

    let records = store.get_all_memories(0, 10).await.unwrap();
    assert!(records.iter().any(|r| r.content == "Hello world"));
    assert!(records.iter().any(|r| r.content == "stream me"));
}

#[tokio::test]
async fn test_streaming_chunks_identical_to_source() {
    let store = test_store_handle();
    let provider = MemoryAwareProvider::new(Arc::new(EchoProvider::new()), store);

    let mut stream = provider
        .stream_response("verbatim", &GenOptions::default())
        .await
        .unwrap();

    let mut chunks = Vec::new();
    while let Some(chunk) = stream.next().await {
        chunks.push(chunk.unwrap());
    }
    assert_eq!(chunks, vec!["echo: ".to_string(), "verbatim".to_string()]);
}

#[tokio::test]
async fn test_streaming_error_not_persisted() {
    let store = test_store_handle();
    let (channel_provider, tx) = ChannelProvider::new();
    let provider = MemoryAwareProvider::new(Arc::new(channel_provider), store.clone());

    let mut stream = provider
        .stream_response("doomed stream", &GenOptions::default())
        .await
        .unwrap();

    tx.send(Ok("partial".to_string())).unwrap();
    tx.send(Err(EngramError::Provider {
        provider: "channel".into(),
        message: "mid-stream failure".into(),
    }))
    .unwrap();

    assert_eq!(stream.next().await.unwrap().unwrap(), "partial");
    assert!(stream.next().await.unwrap().is_err());
    assert!(stream.next().await.is_none());

    let stats = store.get_stats().await.unwrap();
    assert_eq!(stats.total_memories, 0);
}

#[tokio::test]
async fn test_abandoned_stream_does_not_crash_and_persists_partial() {
    let store = test_store_handle();
    let (channel_provider, tx) = ChannelProvider::new();
    let provider = MemoryAwareProvider::new(Arc::new(channel_provider), store.clone());

    let mut stream = provider
        .stream_response("walk away", &GenOptions::default())
        .await
        .unwrap();

    tx.send(Ok("partial ".to_string())).unwrap();
    assert_eq!(stream.next().await.unwrap().unwrap(), "partial ");

    // Caller abandons the stream mid-generation.
    drop(stream);

    // The source keeps producing, then finishes.
    tx.send(Ok("answer".to_string())).unwrap();
    drop(tx);

    // Accumulation survived the disconnect; the turn lands as-is.
    let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(2);
    loop {
        let stats = store.get_stats().await.unwrap();
        if stats.total_memories == 2 {
            break;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "partial turn was never persisted"
        );
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }

    let records = store.get_all_memories(0, 10).await.unwrap();
    assert!(records.iter().any(|r| r.content == "partial answer"));
}
