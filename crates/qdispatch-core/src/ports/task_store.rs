//! TaskStore port - タスクの正本（source of truth）
//!
//! 契約は単一キーの get / set のみ。
//! - set は upsert で、戻った時点で durable
//! - キーを跨ぐトランザクションは不要（1 タスクの終端書き込みは 1 worker が担う）
//! - 削除はしない（TTL などは store 側のポリシー）

use async_trait::async_trait;

use crate::domain::{StoreError, Task, TaskId};

#[async_trait]
pub trait TaskStore: Send + Sync {
    /// (Re)establish the connection. Idempotent.
    async fn connect(&self) -> Result<(), StoreError>;

    /// Cheap reachability probe used by health checks and the supervisor.
    async fn ping(&self) -> Result<(), StoreError>;

    /// Upsert the record under its id.
    async fn set(&self, task: &Task) -> Result<(), StoreError>;

    /// Read a record. Absence is `Ok(None)`, never an error.
    async fn get(&self, id: &TaskId) -> Result<Option<Task>, StoreError>;

    async fn close(&self) -> Result<(), StoreError>;
}
