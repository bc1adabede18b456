// src/memory/store_server.rs — Async message passing for Store
//
// One background task owns the SQLite connection; callers talk to it
// through a cloneable handle. This is also what serializes writes: every
// insert/delete goes through the same command loop.

use serde_json::Value;
use tokio::sync::{mpsc, oneshot};

use crate::infra::errors::EngramError;
use crate::memory::store::{MemoryRecord, MemorySearchResult, MemoryStats, Store};

#[derive(Debug)]
pub enum StoreCommand {
    AddMemory {
        content: String,
        metadata: Option<Value>,
        resp: oneshot::Sender<Result<MemoryRecord, EngramError>>,
    },
    SearchMemory {
        query: String,
        limit: u32,
        resp: oneshot::Sender<Vec<MemorySearchResult>>,
    },
    GetMemoryById {
        id: i64,
        resp: oneshot::Sender<Result<Option<MemoryRecord>, EngramError>>,
    },
    GetAllMemories {
        offset: u32,
        limit: u32,
        resp: oneshot::Sender<Result<Vec<MemoryRecord>, EngramError>>,
    },
    DeleteMemory {
        id: i64,
        resp: oneshot::Sender<Result<bool, EngramError>>,
    },
    ClearAllMemories {
        resp: oneshot::Sender<Result<(), EngramError>>,
    },
    GetStats {
        resp: oneshot::Sender<Result<MemoryStats, EngramError>>,
    },
}

/// A handle to the Store that uses message passing.
#[derive(Clone)]
pub struct StoreHandle {
    tx: mpsc::Sender<StoreCommand>,
}

fn store_stopped() -> EngramError {
    EngramError::Other(anyhow::anyhow!("memory store task stopped"))
}

impl StoreHandle {
    pub fn new(tx: mpsc::Sender<StoreCommand>) -> Self {
        Self { tx }
    }

    pub async fn add_memory(
        &self,
        content: String,
        metadata: Option<Value>,
    ) -> Result<MemoryRecord, EngramError> {
        let (resp_tx, resp_rx) = oneshot::channel();
        self.tx
            .send(StoreCommand::AddMemory {
                content,
                metadata,
                resp: resp_tx,
            })
            .await
            .map_err(|_| store_stopped())?;
        resp_rx.await.map_err(|_| store_stopped())?
    }

    /// Search never fails: if the store task is gone the result is simply
    /// empty, matching the degrade-don't-propagate contract of search.
    pub async fn search_memory(&self, query: String, limit: u32) -> Vec<MemorySearchResult> {
        let (resp_tx, resp_rx) = oneshot::channel();
        if self
            .tx
            .send(StoreCommand::SearchMemory {
                query,
                limit,
                resp: resp_tx,
            })
            .await
            .is_err()
        {
            tracing::warn!("memory store task stopped; search returns no results");
            return Vec::new();
        }
        resp_rx.await.unwrap_or_default()
    }

    pub async fn get_memory_by_id(&self, id: i64) -> Result<Option<MemoryRecord>, EngramError> {
        let (resp_tx, resp_rx) = oneshot::channel();
        self.tx
            .send(StoreCommand::GetMemoryById { id, resp: resp_tx })
            .await
            .map_err(|_| store_stopped())?;
        resp_rx.await.map_err(|_| store_stopped())?
    }

    pub async fn get_all_memories(
        &self,
        offset: u32,
        limit: u32,
    ) -> Result<Vec<MemoryRecord>, EngramError> {
        let (resp_tx, resp_rx) = oneshot::channel();
        self.tx
            .send(StoreCommand::GetAllMemories {
                offset,
                limit,
                resp: resp_tx,
            })
            .await
            .map_err(|_| store_stopped())?;
        resp_rx.await.map_err(|_| store_stopped())?
    }

    pub async fn delete_memory(&self, id: i64) -> Result<bool, EngramError> {
        let (resp_tx, resp_rx) = oneshot::channel();
        self.tx
            .send(StoreCommand::DeleteMemory { id, resp: resp_tx })
            .await
            .map_err(|_| store_stopped())?;
        resp_rx.await.map_err(|_| store_stopped())?
    }

    pub async fn clear_all_memories(&self) -> Result<(), EngramError> {
        let (resp_tx, resp_rx) = oneshot::channel();
        self.tx
            .send(StoreCommand::ClearAllMemories { resp: resp_tx })
            .await
            .map_err(|_| store_stopped())?;
        resp_rx.await.map_err(|_| store_stopped())?
    }

    pub async fn get_stats(&self) -> Result<MemoryStats, EngramError> {
        let (resp_tx, resp_rx) = oneshot::channel();
        self.tx
            .send(StoreCommand::GetStats { resp: resp_tx })
            .await
            .map_err(|_| store_stopped())?;
        resp_rx.await.map_err(|_| store_stopped())?
    }
}

/// Helper to spawn the store server and return a handle.
pub fn spawn_store_server(store: Store) -> (StoreHandle, tokio::task::JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(100);
    let handle = StoreHandle::new(tx);
    let join_handle = tokio::spawn(run_store_server(store, rx));
    (handle, join_handle)
}

/// The background task that owns the Store.
pub async fn run_store_server(store: Store, mut rx: mpsc::Receiver<StoreCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            StoreCommand::AddMemory {
                content,
                metadata,
                resp,
            } => {
                let res = store.add_memory(&content, metadata.as_ref());
                let _ = resp.send(res);
            }
            StoreCommand::SearchMemory { query, limit, resp } => {
                let res = store.search_memory(&query, limit);
                let _ = resp.send(res);
            }
            StoreCommand::GetMemoryById { id, resp } => {
                let res = store.get_memory_by_id(id);
                let _ = resp.send(res);
            }
            StoreCommand::GetAllMemories {
                offset,
                limit,
                resp,
            } => {
                let res = store.get_all_memories(offset, limit);
                let _ = resp.send(res);
            }
            StoreCommand::DeleteMemory { id, resp } => {
                let res = store.delete_memory(id);
                let _ = resp.send(res);
            }
            StoreCommand::ClearAllMemories { resp } => {
                let res = store.clear_all_memories();
                let _ = resp.send(res);
            }
            StoreCommand::GetStats { resp } => {
                let res = store.get_stats();
                let _ = resp.send(res);
            }
        }
    }
}
