//! 統合テスト用のハーネス: in-memory の store / bus で App を起動する。

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;

use qdispatch_core::app::{App, AppBuilder, DispatchReport, ShutdownReport};
use qdispatch_core::config::Settings;
use qdispatch_core::domain::{DispatchError, Task, TaskId, TaskStatus};
use qdispatch_core::impls::{InMemoryBus, InMemoryTaskStore};
use qdispatch_core::ports::ExecutionEngine;

pub const SUBJECT: &str = "tasks";

pub struct Harness {
    pub app: Arc<App>,
    pub bus: Arc<InMemoryBus>,
    pub store: Arc<InMemoryTaskStore>,
    stop: Option<oneshot::Sender<()>>,
    worker: JoinHandle<Result<ShutdownReport, DispatchError>>,
}

pub async fn start(
    capacity: usize,
    engine: Arc<dyn ExecutionEngine>,
    drain_timeout: Duration,
) -> Harness {
    let mut settings = Settings::default();
    settings.worker.max_concurrent_tasks = capacity;
    settings.worker.engine_threads = capacity.max(2);

    let bus = Arc::new(InMemoryBus::new());
    let store = Arc::new(InMemoryTaskStore::new());
    let app = Arc::new(
        AppBuilder::new()
            .settings(settings)
            .store(store.clone())
            .bus(bus.clone())
            .engine(engine)
            .reconnect_interval(Duration::from_millis(20))
            .drain_timeout(drain_timeout)
            .build()
            .unwrap(),
    );

    let (stop, stopped) = oneshot::channel::<()>();
    let worker = tokio::spawn({
        let app = app.clone();
        async move {
            app.run_until(async move {
                let _ = stopped.await;
            })
            .await
        }
    });

    let harness = Harness {
        app,
        bus,
        store,
        stop: Some(stop),
        worker,
    };
    harness.wait_subscribed().await;
    harness
}

impl Harness {
    /// Wait until the dispatcher holds a live subscription.
    pub async fn wait_subscribed(&self) {
        eventually("dispatcher subscription", || self.bus.subscriber_count(SUBJECT) == 1).await;
    }

    pub fn reports(&self) -> broadcast::Receiver<DispatchReport> {
        self.app.reports()
    }

    pub async fn status_of(&self, id: &TaskId) -> Option<TaskStatus> {
        self.app
            .retriever()
            .get(id)
            .await
            .unwrap()
            .map(|task| task.status)
    }

    /// Poll retrieval until the task reaches `status`.
    pub async fn wait_for_status(&self, id: &TaskId, status: TaskStatus) -> Task {
        for _ in 0..500 {
            if let Some(task) = self.app.retriever().get(id).await.unwrap() {
                if task.status == status {
                    return task;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("task {id} never reached {status}");
    }

    pub async fn shutdown(mut self) -> ShutdownReport {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        self.worker.await.unwrap().unwrap()
    }
}

pub async fn eventually(what: &str, mut check: impl FnMut() -> bool) {
    for _ in 0..500 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {what}");
}

pub async fn next_report(rx: &mut broadcast::Receiver<DispatchReport>) -> DispatchReport {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("dispatch report in time")
        .expect("report channel open")
}

/// Blocks engine calls until opened. Tracks how many calls are inside.
#[derive(Default)]
pub struct Gate {
    open: Mutex<bool>,
    cv: Condvar,
    inside: AtomicUsize,
    peak: AtomicUsize,
}

impl Gate {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn pass(&self) {
        let now = self.inside.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        let mut open = self.open.lock().unwrap();
        while !*open {
            open = self.cv.wait(open).unwrap();
        }
        drop(open);
        self.inside.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn open(&self) {
        *self.open.lock().unwrap() = true;
        self.cv.notify_all();
    }

    pub fn inside(&self) -> usize {
        self.inside.load(Ordering::SeqCst)
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}
