//! TaskProcessor - 1 タスクを状態機械に沿って進める
//!
//! # フロー
//! 1. ActiveTasks に登録（guard の drop で必ず外れる）
//! 2. TaskStore から読む（無ければ UnknownTask で終了）
//! 3. PENDING -> PROCESSING を即座に永続化
//! 4. EngineRunner で実行（blocking pool）
//! 5. 成功: COMPLETED + result を永続化
//! 6. 2〜5 の失敗: FAILED + error を永続化（それも失敗したら Stuck）
//!
//! Processor 内ではリトライしない。再実行は新しい id での再投入になる。

use std::sync::Arc;
use std::time::Instant;

use tracing::{error, info, warn};

use crate::app::{ActiveTasks, EngineRunner};
use crate::domain::{ProcessOutcome, Task, TaskId};
use crate::ports::{Clock, TaskStore};

pub struct TaskProcessor {
    store: Arc<dyn TaskStore>,
    engine: EngineRunner,
    clock: Arc<dyn Clock>,
    active: ActiveTasks,
}

impl TaskProcessor {
    pub fn new(
        store: Arc<dyn TaskStore>,
        engine: EngineRunner,
        clock: Arc<dyn Clock>,
        active: ActiveTasks,
    ) -> Self {
        Self {
            store,
            engine,
            clock,
            active,
        }
    }

    pub async fn process(&self, task_id: TaskId) -> ProcessOutcome {
        let _active = self.active.enter(task_id);

        let mut task = match self.store.get(&task_id).await {
            Ok(Some(task)) => task,
            Ok(None) => {
                warn!(%task_id, "task not found in store; dropping notification");
                return ProcessOutcome::UnknownTask;
            }
            Err(e) => {
                error!(%task_id, error = %e, "failed to load task");
                return ProcessOutcome::Unreadable {
                    error: e.to_string(),
                };
            }
        };

        if let Err(e) = task.start_processing() {
            info!(%task_id, status = %e.from, "task is not pending; skipping duplicate notification");
            return ProcessOutcome::Skipped { status: e.from };
        }
        if let Err(e) = self.store.set(&task).await {
            return self
                .fail(task, format!("failed to persist PROCESSING state: {e}"))
                .await;
        }
        info!(%task_id, shots = task.shots, "processing task");

        let started = Instant::now();
        let counts = match self.engine.run(task.circuit.clone(), task.shots).await {
            Ok(counts) => counts,
            Err(e) => return self.fail(task, e.to_string()).await,
        };
        info!(
            %task_id,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "circuit execution finished"
        );

        let processing = task.clone();
        if let Err(e) = task.complete(counts, self.clock.now()) {
            return self.fail(processing, e.to_string()).await;
        }
        match self.store.set(&task).await {
            Ok(()) => {
                info!(%task_id, "task completed");
                ProcessOutcome::Completed
            }
            Err(e) => {
                self.fail(processing, format!("failed to persist result: {e}"))
                    .await
            }
        }
    }

    async fn fail(&self, mut task: Task, reason: String) -> ProcessOutcome {
        let task_id = task.id;
        warn!(%task_id, error = %reason, "task failed");

        if let Err(e) = task.fail(reason.clone(), self.clock.now()) {
            error!(%task_id, error = %e, "cannot mark task failed");
            return ProcessOutcome::Stuck {
                error: e.to_string(),
            };
        }
        match self.store.set(&task).await {
            Ok(()) => ProcessOutcome::Failed { error: reason },
            Err(e) => {
                // 記録は PROCESSING（または PENDING）のまま残りうる
                error!(%task_id, error = %e, "failed to persist FAILED state; task may stay PROCESSING");
                ProcessOutcome::Stuck {
                    error: format!("{reason}; then failed to persist FAILED state: {e}"),
                }
            }
        }
    }
}
