//! Dispatcher - 通知を bounded な並行実行に変換するループ
//!
//! # フロー
//! 1. Subscription から 1 件受け取る
//! 2. decode（壊れていれば warn して捨てる。ループは止めない）
//! 3. WorkerPool の空きを待つ（唯一のバックプレッシャ点）
//! 4. TaskProcessor をプールに渡し、完了は待たずに次へ
//!
//! 停止フラグが立つか購読が切れたら抜ける。どちらで抜けたかは
//! `DispatchExit` で呼び出し側（ConnectivitySupervisor）に返す。

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

use crate::app::shutdown::stopped;
use crate::app::{TaskProcessor, WorkerPool};
use crate::domain::{Notification, ProcessOutcome, TaskId};
use crate::ports::Subscription;

const REPORT_CAPACITY: usize = 256;

/// What the dispatcher did with one notification. Observers may lag and
/// miss reports; nothing depends on them being read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DispatchReport {
    Malformed { reason: String },
    Admitted { task_id: TaskId },
    Processed { task_id: TaskId, outcome: ProcessOutcome },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchExit {
    /// Stop was requested.
    Shutdown,
    /// The subscription ended; the bus needs reconnecting.
    Disconnected,
}

pub struct Dispatcher {
    pool: Arc<WorkerPool>,
    processor: Arc<TaskProcessor>,
    reports: broadcast::Sender<DispatchReport>,
}

impl Dispatcher {
    pub fn new(pool: Arc<WorkerPool>, processor: Arc<TaskProcessor>) -> Self {
        let (reports, _) = broadcast::channel(REPORT_CAPACITY);
        Self {
            pool,
            processor,
            reports,
        }
    }

    pub fn reports(&self) -> broadcast::Receiver<DispatchReport> {
        self.reports.subscribe()
    }

    pub async fn run(
        &self,
        mut subscription: Subscription,
        shutdown: &mut watch::Receiver<bool>,
    ) -> DispatchExit {
        info!(subject = subscription.subject(), "dispatch loop started");
        loop {
            let payload = tokio::select! {
                biased;
                _ = stopped(shutdown) => return DispatchExit::Shutdown,
                payload = subscription.next() => match payload {
                    Some(payload) => payload,
                    None => return DispatchExit::Disconnected,
                },
            };
            if let Some(exit) = self.dispatch(&payload, shutdown).await {
                return exit;
            }
        }
    }

    async fn dispatch(
        &self,
        payload: &[u8],
        shutdown: &mut watch::Receiver<bool>,
    ) -> Option<DispatchExit> {
        let task_id = match Notification::decode(payload) {
            Ok(notification) => notification.task_id,
            Err(e) => {
                warn!(error = %e, "dropping malformed notification");
                self.report(DispatchReport::Malformed {
                    reason: e.to_string(),
                });
                return None;
            }
        };

        let processor = Arc::clone(&self.processor);
        let reports = self.reports.clone();
        let work = async move {
            let _ = reports.send(DispatchReport::Admitted { task_id });
            let outcome = processor.process(task_id).await;
            debug!(%task_id, ?outcome, "task processed");
            let _ = reports.send(DispatchReport::Processed { task_id, outcome });
        };

        tokio::select! {
            biased;
            _ = stopped(shutdown) => Some(DispatchExit::Shutdown),
            admitted = self.pool.submit(work) => match admitted {
                // 完了は待たない。スロットは work の終了時に返る
                Ok(_detached) => {
                    debug!(%task_id, in_flight = self.pool.in_flight(), "task admitted");
                    None
                }
                Err(e) => {
                    info!(%task_id, error = %e, "admission refused; leaving dispatch loop");
                    Some(DispatchExit::Shutdown)
                }
            },
        }
    }

    fn report(&self, report: DispatchReport) {
        let _ = self.reports.send(report);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::{ActiveTasks, EngineRunner};
    use crate::domain::{Counts, Task};
    use crate::impls::{FnEngine, InMemoryTaskStore};
    use crate::ports::{SystemClock, TaskStore};
    use chrono::Utc;
    use std::time::Duration;
    use tokio::sync::mpsc;
    use ulid::Ulid;

    struct Harness {
        store: Arc<InMemoryTaskStore>,
        pool: Arc<WorkerPool>,
        dispatcher: Arc<Dispatcher>,
        feed: mpsc::Sender<Vec<u8>>,
        subscription: Option<Subscription>,
    }

    fn harness(capacity: usize) -> Harness {
        let store = Arc::new(InMemoryTaskStore::new());
        let engine = FnEngine::new(|_: &str, shots| {
            Ok(Counts::from([("0".to_string(), u64::from(shots))]))
        });
        let processor = Arc::new(TaskProcessor::new(
            store.clone(),
            EngineRunner::new(Arc::new(engine), 2),
            Arc::new(SystemClock),
            ActiveTasks::new(),
        ));
        let pool = Arc::new(WorkerPool::new(capacity));
        let dispatcher = Arc::new(Dispatcher::new(pool.clone(), processor));
        let (feed, rx) = mpsc::channel(16);
        Harness {
            store,
            pool,
            dispatcher,
            feed,
            subscription: Some(Subscription::new("tasks", rx)),
        }
    }

    async fn next_report(rx: &mut broadcast::Receiver<DispatchReport>) -> DispatchReport {
        tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("report in time")
            .expect("report channel open")
    }

    #[tokio::test]
    async fn valid_notification_is_processed() {
        let mut h = harness(2);
        let task = Task::new(TaskId::from_ulid(Ulid::new()), "h 0", 8, Utc::now()).unwrap();
        h.store.set(&task).await.unwrap();
        let mut reports = h.dispatcher.reports();
        let (_stop, mut shutdown) = watch::channel(false);

        let dispatcher = h.dispatcher.clone();
        let subscription = h.subscription.take().unwrap();
        let loop_handle =
            tokio::spawn(async move { dispatcher.run(subscription, &mut shutdown).await });

        h.feed.send(Notification::new(task.id).encode()).await.unwrap();

        assert_eq!(
            next_report(&mut reports).await,
            DispatchReport::Admitted { task_id: task.id }
        );
        assert_eq!(
            next_report(&mut reports).await,
            DispatchReport::Processed {
                task_id: task.id,
                outcome: ProcessOutcome::Completed
            }
        );

        drop(h.feed);
        assert_eq!(loop_handle.await.unwrap(), DispatchExit::Disconnected);
    }

    #[tokio::test]
    async fn malformed_message_does_not_stop_the_loop() {
        let mut h = harness(1);
        let mut reports = h.dispatcher.reports();
        let (_stop, mut shutdown) = watch::channel(false);

        let dispatcher = h.dispatcher.clone();
        let subscription = h.subscription.take().unwrap();
        let loop_handle =
            tokio::spawn(async move { dispatcher.run(subscription, &mut shutdown).await });

        h.feed.send(b"not json".to_vec()).await.unwrap();
        h.feed.send(br#"{"other": 1}"#.to_vec()).await.unwrap();
        let unknown = TaskId::from_ulid(Ulid::new());
        h.feed.send(Notification::new(unknown).encode()).await.unwrap();

        assert!(matches!(next_report(&mut reports).await, DispatchReport::Malformed { .. }));
        assert!(matches!(next_report(&mut reports).await, DispatchReport::Malformed { .. }));
        assert_eq!(
            next_report(&mut reports).await,
            DispatchReport::Admitted { task_id: unknown }
        );
        assert_eq!(
            next_report(&mut reports).await,
            DispatchReport::Processed {
                task_id: unknown,
                outcome: ProcessOutcome::UnknownTask
            }
        );
        assert!(h.store.is_empty().await);

        drop(h.feed);
        assert_eq!(loop_handle.await.unwrap(), DispatchExit::Disconnected);
    }

    #[tokio::test]
    async fn stop_flag_ends_the_loop() {
        let mut h = harness(1);
        let (stop, mut shutdown) = watch::channel(false);

        let dispatcher = h.dispatcher.clone();
        let subscription = h.subscription.take().unwrap();
        let loop_handle =
            tokio::spawn(async move { dispatcher.run(subscription, &mut shutdown).await });

        stop.send_replace(true);
        assert_eq!(loop_handle.await.unwrap(), DispatchExit::Shutdown);
    }

    #[tokio::test]
    async fn closed_pool_ends_the_loop() {
        let mut h = harness(1);
        h.pool.close();
        let (_stop, mut shutdown) = watch::channel(false);

        let dispatcher = h.dispatcher.clone();
        let subscription = h.subscription.take().unwrap();
        let loop_handle =
            tokio::spawn(async move { dispatcher.run(subscription, &mut shutdown).await });

        h.feed
            .send(Notification::new(TaskId::from_ulid(Ulid::new())).encode())
            .await
            .unwrap();
        assert_eq!(loop_handle.await.unwrap(), DispatchExit::Shutdown);
    }

    #[test]
    fn reports_serialize_with_event_tag() {
        let id = TaskId::from_ulid(Ulid::new());
        let wire = serde_json::to_value(DispatchReport::Processed {
            task_id: id,
            outcome: ProcessOutcome::UnknownTask,
        })
        .unwrap();
        assert_eq!(wire["event"], "processed");
        assert_eq!(wire["outcome"]["outcome"], "UNKNOWN_TASK");
    }
}
