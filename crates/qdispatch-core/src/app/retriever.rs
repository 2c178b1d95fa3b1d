//! TaskRetriever - id で Task を読むだけ（キャッシュなし）
//!
//! 存在しない id は `Ok(None)`（not found）であってエラーではない。

use std::sync::Arc;

use crate::domain::{DispatchError, Task, TaskId};
use crate::ports::TaskStore;

pub struct TaskRetriever {
    store: Arc<dyn TaskStore>,
}

impl TaskRetriever {
    pub fn new(store: Arc<dyn TaskStore>) -> Self {
        Self { store }
    }

    pub async fn get(&self, task_id: &TaskId) -> Result<Option<Task>, DispatchError> {
        Ok(self.store.get(task_id).await?)
    }

    /// Look up by the raw id string from a transport. An id that cannot be
    /// parsed cannot exist, so it is reported as not found too.
    pub async fn lookup(&self, raw: &str) -> Result<Option<Task>, DispatchError> {
        match raw.parse::<TaskId>() {
            Ok(task_id) => self.get(&task_id).await,
            Err(_) => Ok(None),
        }
    }
}
