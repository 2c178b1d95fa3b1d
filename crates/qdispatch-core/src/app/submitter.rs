//! TaskSubmitter - 新しいタスクを作って永続化し、バスに通知する
//!
//! 順序は必ず「store に PENDING を書く → 通知」。
//! - store への書き込み失敗はそのまま呼び出し側へ（タスクは作られていない）
//! - 通知は best-effort。失敗してもサブミットは成功扱いで、`notified: false`
//!   を返す（そのタスクは PENDING のまま取り残されうる）

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::domain::{DispatchError, Notification, Task, TaskId, TaskStatus};
use crate::ports::{Clock, IdGenerator, NotificationBus, TaskStore};

/// Submission input as it arrives from a transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitRequest {
    pub circuit: String,
    pub shots: i64,
}

/// Returned once the task is durably stored.
///
/// On the wire the status is lowercase (`"pending"`), unlike the stored
/// record which keeps `"PENDING"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitReceipt {
    pub task_id: TaskId,
    #[serde(with = "lowercase_status")]
    pub status: TaskStatus,
    /// Whether the bus accepted the wake-up notification.
    pub notified: bool,
}

mod lowercase_status {
    use serde::{Deserialize, Deserializer, Serializer, de};

    use crate::domain::TaskStatus;

    pub fn serialize<S: Serializer>(status: &TaskStatus, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&status.as_str().to_ascii_lowercase())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<TaskStatus, D::Error> {
        let raw = String::deserialize(d)?;
        match raw.as_str() {
            "pending" => Ok(TaskStatus::Pending),
            "processing" => Ok(TaskStatus::Processing),
            "completed" => Ok(TaskStatus::Completed),
            "failed" => Ok(TaskStatus::Failed),
            other => Err(de::Error::unknown_variant(
                other,
                &["pending", "processing", "completed", "failed"],
            )),
        }
    }
}

pub struct TaskSubmitter {
    store: Arc<dyn TaskStore>,
    bus: Arc<dyn NotificationBus>,
    ids: Arc<dyn IdGenerator>,
    clock: Arc<dyn Clock>,
    subject: String,
}

impl TaskSubmitter {
    pub fn new(
        store: Arc<dyn TaskStore>,
        bus: Arc<dyn NotificationBus>,
        ids: Arc<dyn IdGenerator>,
        clock: Arc<dyn Clock>,
        subject: impl Into<String>,
    ) -> Self {
        Self {
            store,
            bus,
            ids,
            clock,
            subject: subject.into(),
        }
    }

    pub async fn submit_request(&self, request: SubmitRequest) -> Result<SubmitReceipt, DispatchError> {
        self.submit(request.circuit, request.shots).await
    }

    pub async fn submit(
        &self,
        circuit: impl Into<String>,
        shots: i64,
    ) -> Result<SubmitReceipt, DispatchError> {
        let shots = u32::try_from(shots)
            .ok()
            .filter(|&s| s > 0)
            .ok_or_else(|| {
                DispatchError::InvalidRequest(format!(
                    "shots must be between 1 and {}, got {shots}",
                    u32::MAX
                ))
            })?;

        let task_id = self.ids.generate_task_id();
        let task = Task::new(task_id, circuit, shots, self.clock.now())
            .ok_or_else(|| DispatchError::InvalidRequest("shots must be positive".into()))?;

        self.store.set(&task).await?;
        info!(%task_id, shots, "task stored");

        let notified = self.notify(task_id).await;
        Ok(SubmitReceipt {
            task_id,
            status: task.status,
            notified,
        })
    }

    async fn notify(&self, task_id: TaskId) -> bool {
        if !self.bus.is_connected() {
            warn!(%task_id, "bus not connected; task not published");
            return false;
        }
        let payload = Notification::new(task_id).encode();
        match self.bus.publish(&self.subject, payload).await {
            Ok(()) => {
                info!(%task_id, subject = %self.subject, "task published");
                true
            }
            Err(e) => {
                warn!(%task_id, error = %e, "failed to publish task");
                false
            }
        }
    }
}
