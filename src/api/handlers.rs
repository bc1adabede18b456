// src/api/handlers.rs

use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::Response;
use axum::Json;
use futures::StreamExt;

use crate::api::{auth, types::*, ApiState};
use crate::provider::robust::friendly_error_message;
use crate::provider::{GenOptions, ProviderKind};

fn parse_provider(
    requested: Option<&str>,
    state: &ApiState,
) -> Result<ProviderKind, (StatusCode, Json<ErrorResponse>)> {
    match requested {
        None => Ok(state.engine.preferred_provider()),
        Some(name) => ProviderKind::parse(name).ok_or((
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: format!("Unknown provider '{name}'"),
            }),
        )),
    }
}

/// POST /api/v1/chat — Full response for one message.
pub async fn chat(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(body): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, (StatusCode, Json<ErrorResponse>)> {
    auth::check_auth(&state, &headers)?;

    if body.message.trim().is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: "Message cannot be empty".into(),
            }),
        ));
    }

    let preferred = parse_provider(body.provider.as_deref(), &state)?;
    let options = GenOptions {
        memory_enabled: body.memory,
        ..Default::default()
    };

    match state
        .engine
        .send_message_with(&body.message, preferred, &options)
        .await
    {
        Ok(response) => Ok(Json(ChatResponse { response })),
        Err(e) => {
            tracing::warn!("chat request failed: {e}");
            Err((
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ErrorResponse {
                    error: friendly_error_message(&e).into(),
                }),
            ))
        }
    }
}

/// POST /api/v1/chat/stream — Chunked plain-text response body.
///
/// The stream path never fails outright: exhaustion already degrades to
/// an apology stream inside the resilience layer. Mid-stream errors are
/// rendered as a friendly trailer instead of aborting the body.
pub async fn chat_stream(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(body): Json<ChatRequest>,
) -> Result<Response, (StatusCode, Json<ErrorResponse>)> {
    auth::check_auth(&state, &headers)?;

    if body.message.trim().is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: "Message cannot be empty".into(),
            }),
        ));
    }

    let preferred = parse_provider(body.provider.as_deref(), &state)?;
    let options = GenOptions {
        memory_enabled: body.memory,
        ..Default::default()
    };

    let stream = state
        .engine
        .send_streaming_message_with(&body.message, preferred, &options)
        .await;

    let body_stream = stream.map(|item| match item {
        Ok(chunk) => Ok::<_, std::convert::Infallible>(axum::body::Bytes::from(chunk)),
        Err(e) => {
            tracing::warn!("stream error surfaced to client: {e}");
            Ok(axum::body::Bytes::from(format!(
                "\n{}",
                friendly_error_message(&e)
            )))
        }
    });

    let response = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/plain; charset=utf-8")
        .body(Body::from_stream(body_stream))
        .map_err(|e| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: format!("Failed to build response: {e}"),
                }),
            )
        })?;

    Ok(response)
}

/// POST /api/v1/memories — Ingest documents as memory records.
pub async fn add_memories(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(body): Json<AddMemoriesRequest>,
) -> Result<(StatusCode, Json<AddMemoriesResponse>), (StatusCode, Json<ErrorResponse>)> {
    auth::check_auth(&state, &headers)?;

    match state.engine.add_documents(body.documents).await {
        Ok(records) => Ok((
            StatusCode::CREATED,
            Json(AddMemoriesResponse {
                added: records.len(),
                ids: records.iter().map(|r| r.id).collect(),
            }),
        )),
        Err(e) => Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: e.to_string(),
            }),
        )),
    }
}

/// GET /api/v1/memories — Paginated record listing.
pub async fn list_memories(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<MemoryListEntry>>, (StatusCode, Json<ErrorResponse>)> {
    auth::check_auth(&state, &headers)?;

    let records = state
        .engine
        .list_memories(params.offset.unwrap_or(0), params.limit.unwrap_or(50))
        .await
        .map_err(|e| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: e.to_string(),
                }),
            )
        })?;

    Ok(Json(
        records
            .into_iter()
            .map(|r| MemoryListEntry {
                id: r.id,
                content: r.content,
                timestamp: r.timestamp,
                metadata: r.metadata,
            })
            .collect(),
    ))
}

/// GET /api/v1/memories/search — Ranked search for dashboards.
pub async fn search_memories(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Query(params): Query<SearchParams>,
) -> Result<Json<Vec<SearchHit>>, (StatusCode, Json<ErrorResponse>)> {
    auth::check_auth(&state, &headers)?;

    let results = state.engine.search_memories(&params.q).await;
    let limit = params.limit.unwrap_or(u32::MAX) as usize;

    Ok(Json(
        results
            .into_iter()
            .take(limit)
            .map(|r| SearchHit {
                id: r.record.id,
                content: r.record.content,
                timestamp: r.record.timestamp,
                relevance_score: r.relevance_score,
                metadata: r.record.metadata,
            })
            .collect(),
    ))
}

/// GET /api/v1/memories/stats
pub async fn memory_stats(
    State(state): State<ApiState>,
    headers: HeaderMap,
) -> Result<Json<crate::memory::MemoryStats>, (StatusCode, Json<ErrorResponse>)> {
    auth::check_auth(&state, &headers)?;

    state.engine.memory_stats().await.map(Json).map_err(|e| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                error: e.to_string(),
            }),
        )
    })
}

/// DELETE /api/v1/memories/:id
pub async fn delete_memory(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<ErrorResponse>)> {
    auth::check_auth(&state, &headers)?;

    match state.engine.delete_memory(id).await {
        Ok(true) => Ok(Json(serde_json::json!({ "deleted": id }))),
        Ok(false) => Err((
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: format!("Memory '{id}' not found"),
            }),
        )),
        Err(e) => Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                error: e.to_string(),
            }),
        )),
    }
}

/// GET /api/v1/health
pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
