//! ShutdownCoordinator - 停止シグナル後の後始末
//!
//! # フロー
//! 1. WorkerPool を close（新しい admission を全て拒否）
//! 2. in-flight が 0 になるのを `drain_timeout` まで待つ
//! 3. 待ち切れなくても、バスと store を閉じて終わる
//!
//! 実行中のエンジン呼び出しは止めない。timeout は「どれだけ待つか」だけを決める。

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::app::{ActiveTasks, WorkerPool};
use crate::domain::TaskId;
use crate::ports::{NotificationBus, TaskStore};

/// Resolves once the stop flag is raised, or its sender is gone.
pub(crate) async fn stopped(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShutdownReport {
    /// Every admitted task finished within the drain timeout.
    pub drained: bool,
    /// Ids still being processed when the timeout ran out.
    pub abandoned: Vec<TaskId>,
}

pub struct ShutdownCoordinator {
    pool: Arc<WorkerPool>,
    active: ActiveTasks,
    bus: Arc<dyn NotificationBus>,
    store: Arc<dyn TaskStore>,
    drain_timeout: Duration,
}

impl ShutdownCoordinator {
    pub fn new(
        pool: Arc<WorkerPool>,
        active: ActiveTasks,
        bus: Arc<dyn NotificationBus>,
        store: Arc<dyn TaskStore>,
        drain_timeout: Duration,
    ) -> Self {
        Self {
            pool,
            active,
            bus,
            store,
            drain_timeout,
        }
    }

    pub async fn drain(&self) -> ShutdownReport {
        self.pool.close();
        info!(
            in_flight = self.pool.in_flight(),
            timeout_ms = self.drain_timeout.as_millis() as u64,
            "admission closed; draining in-flight tasks"
        );

        let drained = self.pool.wait_idle(self.drain_timeout).await;
        let abandoned = if drained {
            Vec::new()
        } else {
            self.active.snapshot()
        };
        if drained {
            info!("all in-flight tasks finished");
        } else {
            warn!(
                abandoned = abandoned.len(),
                "drain timeout elapsed; leaving running tasks behind"
            );
        }

        if let Err(e) = self.bus.close().await {
            warn!(error = %e, "failed to close bus");
        }
        if let Err(e) = self.store.close().await {
            warn!(error = %e, "failed to close store");
        }
        info!("shutdown complete");

        ShutdownReport { drained, abandoned }
    }
}
