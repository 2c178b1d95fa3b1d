//! ActiveTasks - 処理中タスクの集合（プロセスローカル、非永続）
//!
//! 複数の実行コンテキストから触られるので、集合そのものは
//! `watch::Sender` の中に置き、変更は `send_modify` 経由でのみ行う。
//! drain 待ちは受信側で「空になる」のを待つだけ。

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use crate::domain::TaskId;

/// Shared handle; clones see the same set.
#[derive(Clone)]
pub struct ActiveTasks {
    // 同じ id の重複配送に備えて多重集合にする
    tx: Arc<watch::Sender<BTreeMap<TaskId, usize>>>,
}

/// Removes its id from the set when dropped, on every exit path.
#[must_use = "the task leaves the active set as soon as the guard is dropped"]
pub struct ActiveGuard {
    tasks: ActiveTasks,
    id: TaskId,
}

impl ActiveTasks {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(BTreeMap::new());
        Self { tx: Arc::new(tx) }
    }

    pub fn enter(&self, id: TaskId) -> ActiveGuard {
        self.tx.send_modify(|set| *set.entry(id).or_insert(0) += 1);
        ActiveGuard {
            tasks: self.clone(),
            id,
        }
    }

    fn leave(&self, id: TaskId) {
        self.tx.send_modify(|set| {
            if let Some(n) = set.get_mut(&id) {
                *n -= 1;
                if *n == 0 {
                    set.remove(&id);
                }
            }
        });
    }

    /// Number of distinct ids in flight.
    pub fn len(&self) -> usize {
        self.tx.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tx.borrow().is_empty()
    }

    pub fn contains(&self, id: &TaskId) -> bool {
        self.tx.borrow().contains_key(id)
    }

    /// Sorted ids currently in flight.
    pub fn snapshot(&self) -> Vec<TaskId> {
        self.tx.borrow().keys().copied().collect()
    }

    /// Wait until the set is empty. `false` if `timeout` ran out first.
    pub async fn wait_empty(&self, timeout: Duration) -> bool {
        let mut rx = self.tx.subscribe();
        matches!(
            tokio::time::timeout(timeout, rx.wait_for(|set| set.is_empty())).await,
            Ok(Ok(_))
        )
    }
}

impl Default for ActiveTasks {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.tasks.leave(self.id);
    }
}
