// src/memory/store.rs — SQLite operations for memory records

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde_json::Value;

use crate::infra::errors::EngramError;
use crate::memory::vector::placeholder_vector;

/// One persisted conversational fragment.
///
/// Records are immutable after insert: the only way to change content is
/// delete-and-reinsert, which assigns a fresh id.
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryRecord {
    pub id: i64,
    pub content: String,
    pub vector: Vec<f32>,
    pub timestamp: String,
    pub metadata: Option<Value>,
}

/// A record paired with its query-specific relevance. Computed fresh on
/// every search, never cached.
#[derive(Debug, Clone)]
pub struct MemorySearchResult {
    pub record: MemoryRecord,
    pub relevance_score: f64,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct MemoryStats {
    pub total_memories: u64,
    pub oldest_memory: Option<String>,
    pub newest_memory: Option<String>,
}

/// Low-level SQLite operations for the memory log.
pub struct Store {
    conn: Connection,
    vector_dimensions: usize,
}

impl Store {
    pub fn new(conn: Connection, vector_dimensions: usize) -> Self {
        Self {
            conn,
            vector_dimensions,
        }
    }

    /// Insert a new record. Fails with `InvalidInput` on empty or
    /// whitespace-only content; storage failures propagate.
    pub fn add_memory(
        &self,
        content: &str,
        metadata: Option<&Value>,
    ) -> Result<MemoryRecord, EngramError> {
        if content.trim().is_empty() {
            return Err(EngramError::InvalidInput(
                "memory content cannot be empty".into(),
            ));
        }

        let timestamp = Utc::now().to_rfc3339();
        let vector = placeholder_vector(content, self.vector_dimensions);
        let vector_json = serde_json::to_string(&vector)?;
        let metadata_json = metadata.map(|m| m.to_string());

        self.conn.execute(
            "INSERT INTO memories (content, vector, timestamp, metadata)
             VALUES (?1, ?2, ?3, ?4)",
            params![content, vector_json, timestamp, metadata_json],
        )?;

        let id = self.conn.last_insert_rowid();
        let record = self
            .get_memory_by_id(id)?
            .ok_or(EngramError::Storage(rusqlite::Error::QueryReturnedNoRows))?;

        tracing::debug!(id = record.id, "added memory record");
        Ok(record)
    }

    /// Rank stored records against a free-text query.
    ///
    /// Two passes: a full-text match ranked by FTS5's own relevance
    /// signal, then a substring scan over the remaining rows (ordered by
    /// recency) to catch partial and non-tokenizable matches. Both sets
    /// are rescored with [`text_relevance`] and merged. Search is
    /// best-effort by contract — storage failures degrade to the
    /// substring scan, and then to an empty result set, never an error.
    pub fn search_memory(&self, query: &str, limit: u32) -> Vec<MemorySearchResult> {
        if query.trim().is_empty() {
            return Vec::new();
        }

        let mut fts_records: Vec<MemoryRecord> = Vec::new();
        if let Some(sanitized) = sanitize_fts_query(query) {
            match self.fts_search(&sanitized, limit) {
                Ok(records) => fts_records = records,
                Err(e) => {
                    tracing::warn!("full-text search failed, falling back to substring scan: {e}");
                }
            }
        }

        let remaining = limit.saturating_sub(fts_records.len() as u32);
        let fts_ids: Vec<i64> = fts_records.iter().map(|r| r.id).collect();

        let like_records = if remaining > 0 {
            match self.like_search(query, &fts_ids, remaining) {
                Ok(records) => records,
                Err(e) => {
                    tracing::warn!("substring scan failed, returning partial results: {e}");
                    Vec::new()
                }
            }
        } else {
            Vec::new()
        };

        let mut results: Vec<MemorySearchResult> = fts_records
            .into_iter()
            .chain(like_records)
            .map(|record| {
                let relevance_score = text_relevance(query, &record.content);
                MemorySearchResult {
                    record,
                    relevance_score,
                }
            })
            .collect();

        results.sort_by(|a, b| {
            b.relevance_score
                .partial_cmp(&a.relevance_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        results.truncate(limit as usize);
        results
    }

    fn fts_search(&self, match_query: &str, limit: u32) -> Result<Vec<MemoryRecord>, EngramError> {
        let mut stmt = self.conn.prepare(
            "SELECT m.id, m.content, m.vector, m.timestamp, m.metadata
             FROM memories_fts f
             JOIN memories m ON m.id = f.rowid
             WHERE memories_fts MATCH ?1
             ORDER BY rank
             LIMIT ?2",
        )?;

        let rows = stmt.query_map(params![match_query, limit], row_to_record)?;

        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }

    fn like_search(
        &self,
        query: &str,
        exclude_ids: &[i64],
        limit: u32,
    ) -> Result<Vec<MemoryRecord>, EngramError> {
        // exclude_ids come from our own FTS pass, so splicing them into the
        // statement is safe.
        let exclusion = if exclude_ids.is_empty() {
            String::new()
        } else {
            let ids: Vec<String> = exclude_ids.iter().map(|id| id.to_string()).collect();
            format!("AND id NOT IN ({})", ids.join(","))
        };

        let sql = format!(
            "SELECT id, content, vector, timestamp, metadata
             FROM memories
             WHERE content LIKE '%' || ?1 || '%'
             {exclusion}
             ORDER BY created_at DESC
             LIMIT ?2",
        );

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![query, limit], row_to_record)?;

        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }

    pub fn get_memory_by_id(&self, id: i64) -> Result<Option<MemoryRecord>, EngramError> {
        let record = self
            .conn
            .query_row(
                "SELECT id, content, vector, timestamp, metadata
                 FROM memories WHERE id = ?1",
                params![id],
                row_to_record,
            )
            .optional()?;
        Ok(record)
    }

    pub fn get_all_memories(
        &self,
        offset: u32,
        limit: u32,
    ) -> Result<Vec<MemoryRecord>, EngramError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, content, vector, timestamp, metadata
             FROM memories ORDER BY created_at DESC LIMIT ?1 OFFSET ?2",
        )?;

        let rows = stmt.query_map(params![limit, offset], row_to_record)?;

        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }

    /// Returns true when a row was actually removed.
    pub fn delete_memory(&self, id: i64) -> Result<bool, EngramError> {
        let changed = self
            .conn
            .execute("DELETE FROM memories WHERE id = ?1", params![id])?;
        Ok(changed > 0)
    }

    pub fn clear_all_memories(&self) -> Result<(), EngramError> {
        self.conn.execute("DELETE FROM memories", [])?;
        tracing::debug!("cleared all memory records");
        Ok(())
    }

    /// Count plus min/max creation time. Both aggregates run over the
    /// created_at index, so no full scan is needed.
    pub fn get_stats(&self) -> Result<MemoryStats, EngramError> {
        let total: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM memories", [], |r| r.get(0))?;

        let (oldest, newest): (Option<String>, Option<String>) = self.conn.query_row(
            "SELECT MIN(created_at), MAX(created_at) FROM memories",
            [],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )?;

        Ok(MemoryStats {
            total_memories: total as u64,
            oldest_memory: oldest,
            newest_memory: newest,
        })
    }

    /// Get a reference to the underlying connection (for advanced queries).
    pub fn conn(&self) -> &Connection {
        &self.conn
    }
}

fn row_to_record(row: &Row) -> rusqlite::Result<MemoryRecord> {
    let vector_json: Option<String> = row.get(2)?;
    let metadata_json: Option<String> = row.get(4)?;

    Ok(MemoryRecord {
        id: row.get(0)?,
        content: row.get(1)?,
        vector: vector_json
            .and_then(|v| serde_json::from_str(&v).ok())
            .unwrap_or_default(),
        timestamp: row.get(3)?,
        metadata: metadata_json.and_then(|m| serde_json::from_str(&m).ok()),
    })
}

/// Rewrite untrusted query text into something FTS5 will always accept,
/// or None when nothing searchable remains.
pub fn sanitize_fts_query(query: &str) -> Option<String> {
    let cleaned: String = query
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                ' '
            }
        })
        .collect();

    let words: Vec<&str> = cleaned.split_whitespace().collect();
    if words.is_empty() {
        return None;
    }

    // Quote each word so hyphens and digits can't be parsed as operators;
    // OR-join for broad matching.
    Some(
        words
            .iter()
            .map(|w| format!("\"{w}\""))
            .collect::<Vec<_>>()
            .join(" OR "),
    )
}

/// Unified relevance score used for both search passes:
/// substring bonus + weighted word overlap, scaled by a length penalty.
///
/// The formula favors short fragments; kept as-is for ranking stability
/// even though it is a known improvement target.
pub fn text_relevance(query: &str, content: &str) -> f64 {
    let query_lower = query.to_lowercase();
    let content_lower = content.to_lowercase();

    let mut score = 0.0;

    if content_lower.contains(&query_lower) {
        score += 1.0;
    }

    let query_words: Vec<&str> = query_lower.split_whitespace().collect();
    if !query_words.is_empty() {
        let content_words: Vec<&str> = content_lower.split_whitespace().collect();
        let matching = query_words
            .iter()
            .filter(|qw| content_words.iter().any(|cw| cw.contains(*qw)))
            .count();
        score += matching as f64 / query_words.len() as f64 * 0.5;
    }

    let length_penalty = (1.0 - content.chars().count() as f64 / 1000.0).max(0.1);
    score * length_penalty
}
