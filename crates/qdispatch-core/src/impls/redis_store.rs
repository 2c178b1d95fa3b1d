//! RedisTaskStore - Redis を正本にする TaskStore（`redis` feature）
//!
//! # キー
//! | Key | Value |
//! |-----|-------|
//! | `{prefix}:{task_id}` | Task の JSON |
//!
//! 接続は multiplexed connection を 1 本だけ持つ。切れた場合の張り直しは
//! ConnectivitySupervisor が `ping` 失敗を見て `connect` を呼ぶことで行う。

use ::redis::aio::MultiplexedConnection;
use ::redis::AsyncCommands;
use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::{StoreError, Task, TaskId};
use crate::ports::TaskStore;

pub struct RedisTaskStore {
    client: ::redis::Client,
    conn: RwLock<Option<MultiplexedConnection>>,
    key_prefix: String,
}

impl RedisTaskStore {
    /// Build a client for `url`. No connection is made until `connect`.
    pub fn new(url: &str, key_prefix: impl Into<String>) -> Result<Self, StoreError> {
        let client = ::redis::Client::open(url)
            .map_err(|e| StoreError::Backend(format!("invalid redis url {url}: {e}")))?;
        Ok(Self {
            client,
            conn: RwLock::new(None),
            key_prefix: key_prefix.into(),
        })
    }

    fn key(&self, id: &TaskId) -> String {
        format!("{}:{}", self.key_prefix, id)
    }

    async fn connection(&self) -> Result<MultiplexedConnection, StoreError> {
        self.conn
            .read()
            .await
            .clone()
            .ok_or_else(|| StoreError::Unavailable("redis not connected".into()))
    }
}

fn backend(e: ::redis::RedisError) -> StoreError {
    StoreError::Backend(e.to_string())
}

#[async_trait]
impl TaskStore for RedisTaskStore {
    async fn connect(&self) -> Result<(), StoreError> {
        let conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| StoreError::Unavailable(format!("failed to connect to redis: {e}")))?;
        *self.conn.write().await = Some(conn);
        tracing::info!("connected to redis");
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.connection().await?;
        ::redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Ok(())
    }

    async fn set(&self, task: &Task) -> Result<(), StoreError> {
        let raw = serde_json::to_string(task).map_err(|e| StoreError::Encode {
            task_id: task.id,
            message: e.to_string(),
        })?;
        let mut conn = self.connection().await?;
        conn.set::<_, _, ()>(self.key(&task.id), raw)
            .await
            .map_err(backend)
    }

    async fn get(&self, id: &TaskId) -> Result<Option<Task>, StoreError> {
        let mut conn = self.connection().await?;
        let raw: Option<String> = conn.get(self.key(id)).await.map_err(backend)?;
        raw.map(|raw| {
            serde_json::from_str(&raw).map_err(|e| StoreError::Decode {
                task_id: *id,
                message: e.to_string(),
            })
        })
        .transpose()
    }

    async fn close(&self) -> Result<(), StoreError> {
        // multiplexed connection は drop で閉じる
        self.conn.write().await.take();
        Ok(())
    }
}
