// src/api/types.rs — Request/response DTOs

use serde::{Deserialize, Serialize};

use crate::engine::DocumentInput;

#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    /// "openai" or "ondevice"; defaults to the engine's preference.
    pub provider: Option<String>,
    /// Per-request memory override.
    pub memory: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub response: String,
}

#[derive(Debug, Deserialize)]
pub struct AddMemoriesRequest {
    pub documents: Vec<DocumentInput>,
}

#[derive(Debug, Serialize)]
pub struct AddMemoriesResponse {
    pub added: usize,
    pub ids: Vec<i64>,
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    pub q: String,
    pub limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub offset: Option<u32>,
    pub limit: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct SearchHit {
    pub id: i64,
    pub content: String,
    pub timestamp: String,
    pub relevance_score: f64,
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
pub struct MemoryListEntry {
    pub id: i64,
    pub content: String,
    pub timestamp: String,
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}
