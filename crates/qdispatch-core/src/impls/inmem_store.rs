//! InMemoryTaskStore - 開発・テスト用の TaskStore
//!
//! # 実装詳細
//! - HashMap<TaskId, String> に JSON 文字列で保存（本番の KV と同じ形）
//! - tokio の Mutex で排他制御（ロックを跨いで await しない）
//! - `set_reachable(false)` で障害を模擬できる

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::{StoreError, Task, TaskId};
use crate::ports::TaskStore;

pub struct InMemoryTaskStore {
    records: Mutex<HashMap<TaskId, String>>,
    /// Simulated network reachability of the backend.
    reachable: AtomicBool,
    /// Whether this client currently holds a live connection.
    connected: AtomicBool,
    writes: AtomicUsize,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            reachable: AtomicBool::new(true),
            connected: AtomicBool::new(true),
            writes: AtomicUsize::new(0),
        }
    }

    /// Simulate an outage (`false`) or recovery (`true`).
    ///
    /// An outage also drops the connection, so after recovery someone has to
    /// call `connect` again before operations succeed.
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
        if !reachable {
            self.connected.store(false, Ordering::SeqCst);
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Number of successful `set` calls so far.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.lock().await.is_empty()
    }

    /// Store raw bytes under `id`, bypassing encoding (corrupt-record tests).
    pub async fn insert_raw(&self, id: TaskId, raw: impl Into<String>) {
        self.records.lock().await.insert(id, raw.into());
    }

    fn check(&self) -> Result<(), StoreError> {
        if !self.reachable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("in-memory store unreachable".into()));
        }
        if !self.connected.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("not connected".into()));
        }
        Ok(())
    }
}

impl Default for InMemoryTaskStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn connect(&self) -> Result<(), StoreError> {
        if !self.reachable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("in-memory store unreachable".into()));
        }
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.check()
    }

    async fn set(&self, task: &Task) -> Result<(), StoreError> {
        self.check()?;
        let raw = serde_json::to_string(task).map_err(|e| StoreError::Encode {
            task_id: task.id,
            message: e.to_string(),
        })?;
        self.records.lock().await.insert(task.id, raw);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn get(&self, id: &TaskId) -> Result<Option<Task>, StoreError> {
        self.check()?;
        let raw = self.records.lock().await.get(id).cloned();
        raw.map(|raw| {
            serde_json::from_str(&raw).map_err(|e| StoreError::Decode {
                task_id: *id,
                message: e.to_string(),
            })
        })
        .transpose()
    }

    async fn close(&self) -> Result<(), StoreError> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }
}
