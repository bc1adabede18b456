// src/provider/robust.rs — Multi-level resilience over providers
//
// The only layer allowed to exhaust retries. Attempt order is
// (provider × memory-on/off): for each provider in [preferred, alternate],
// try with memory first and retry the same provider without memory before
// moving on. The response path reports total failure as a summary error;
// the stream path degrades to a synthetic apology stream instead, so
// stream callers always receive a valid stream.

use super::registry::ProviderRegistry;
use super::{GenOptions, GenProvider, ProviderKind, TextStream};
use crate::infra::errors::EngramError;

const FALLBACK_MESSAGE: &str = "I'm sorry, but I'm currently experiencing technical difficulties. \
     All AI services are temporarily unavailable. Please try again in a few moments.";

pub async fn robust_response(
    registry: &ProviderRegistry,
    message: &str,
    preferred: ProviderKind,
    options: &GenOptions,
) -> Result<String, EngramError> {
    let mut last_error: Option<EngramError> = None;

    for kind in [preferred, preferred.alternate()] {
        tracing::debug!(provider = %kind, "attempting response");
        let provider = registry.create_provider(kind);

        match attempt_response(provider.as_ref(), message, options).await {
            Ok(response) => return Ok(response),
            Err(e) => {
                tracing::warn!(provider = %kind, "provider failed: {e}");
                last_error = Some(e);
            }
        }
    }

    Err(EngramError::AllProvidersFailed {
        last_error: last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "unknown error".into()),
    })
}

pub async fn robust_stream(
    registry: &ProviderRegistry,
    message: &str,
    preferred: ProviderKind,
    options: &GenOptions,
) -> TextStream {
    for kind in [preferred, preferred.alternate()] {
        tracing::debug!(provider = %kind, "attempting stream");
        let provider = registry.create_provider(kind);

        match attempt_stream(provider.as_ref(), message, options).await {
            Ok(stream) => return stream,
            Err(e) => {
                tracing::warn!(provider = %kind, "stream provider failed: {e}");
            }
        }
    }

    tracing::warn!("all providers failed; returning apology stream");
    Box::pin(futures::stream::once(async {
        Ok(FALLBACK_MESSAGE.to_string())
    }))
}

/// One provider's attempt: memory-enabled first, memory-disabled retry on
/// failure — unless the caller disabled memory outright.
async fn attempt_response(
    provider: &dyn GenProvider,
    message: &str,
    options: &GenOptions,
) -> Result<String, EngramError> {
    if options.memory_enabled == Some(false) {
        return provider.get_response(message, options).await;
    }

    match provider
        .get_response(message, &options.with_memory(true))
        .await
    {
        Ok(response) => Ok(response),
        Err(e) => {
            tracing::warn!(
                provider = provider.id(),
                "memory-enabled request failed, retrying without memory: {e}"
            );
            provider
                .get_response(message, &options.with_memory(false))
                .await
        }
    }
}

async fn attempt_stream(
    provider: &dyn GenProvider,
    message: &str,
    options: &GenOptions,
) -> Result<TextStream, EngramError> {
    if options.memory_enabled == Some(false) {
        return provider.stream_response(message, options).await;
    }

    match provider
        .stream_response(message, &options.with_memory(true))
        .await
    {
        Ok(stream) => Ok(stream),
        Err(e) => {
            tracing::warn!(
                provider = provider.id(),
                "memory-enabled stream failed, retrying without memory: {e}"
            );
            provider
                .stream_response(message, &options.with_memory(false))
                .await
        }
    }
}

/// Map an error onto one of a fixed set of user-facing messages. Callers
/// surface these instead of raw provider errors.
pub fn friendly_error_message(error: &EngramError) -> &'static str {
    let message = error.to_string().to_lowercase();

    if message.contains("rate limit") || message.contains("429") {
        return "I'm currently experiencing high demand. Please wait a moment and try again.";
    }
    if message.contains("api key") || message.contains("401") || message.contains("unauthorized") {
        return "There's an issue with the AI service configuration. Please try again later.";
    }
    if message.contains("timed out") || message.contains("timeout") {
        return "The request timed out. Please try again with a shorter message.";
    }
    if message.contains("network") || message.contains("connection") {
        return "There's a network connectivity issue. Please check your connection and try again.";
    }
    if message.contains("no body") || message.contains("empty response") {
        return "The AI service returned an empty response. Please try again.";
    }

    "I encountered an unexpected error. Please try again."
}
