//! ConnectivitySupervisor - バスと store の接続を見張る
//!
//! 両方に同じ方針を取る: `interval` ごとに確認し、落ちていれば `connect`。
//!
//! # バス
//! 1. 未接続なら connect → subscribe
//! 2. Dispatcher を走らせる（購読が切れるか停止フラグまで）
//! 3. 切れたら `interval` 待って 1 に戻る
//!
//! 一度も繋がらないまま `startup_attempts` 回失敗したら致命的エラーとして返す。
//! 一度でも繋がった後の切断は何度でもリトライする。
//!
//! # store
//! `interval` ごとに ping。失敗していれば connect を試す。

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::app::shutdown::stopped;
use crate::app::{DispatchExit, Dispatcher};
use crate::domain::{BusError, DispatchError};
use crate::ports::{NotificationBus, Subscription, TaskStore};

pub struct ConnectivitySupervisor {
    bus: Arc<dyn NotificationBus>,
    store: Arc<dyn TaskStore>,
    dispatcher: Arc<Dispatcher>,
    subject: String,
    interval: Duration,
    startup_attempts: Option<u32>,
}

impl ConnectivitySupervisor {
    pub fn new(
        bus: Arc<dyn NotificationBus>,
        store: Arc<dyn TaskStore>,
        dispatcher: Arc<Dispatcher>,
        subject: impl Into<String>,
        interval: Duration,
    ) -> Self {
        Self {
            bus,
            store,
            dispatcher,
            subject: subject.into(),
            interval,
            startup_attempts: None,
        }
    }

    pub fn with_startup_attempts(mut self, attempts: Option<u32>) -> Self {
        self.startup_attempts = attempts;
        self
    }

    /// Run until the stop flag is raised. Errors only when the bus could never
    /// be reached within `startup_attempts`.
    pub async fn run(&self, shutdown: watch::Receiver<bool>) -> Result<(), DispatchError> {
        tokio::try_join!(
            self.supervise_bus(shutdown.clone()),
            self.supervise_store(shutdown),
        )?;
        Ok(())
    }

    async fn supervise_bus(&self, mut shutdown: watch::Receiver<bool>) -> Result<(), DispatchError> {
        let mut ever_connected = false;
        let mut failures: u32 = 0;

        loop {
            let stop_requested = *shutdown.borrow();
            if stop_requested {
                return Ok(());
            }
            match self.attach().await {
                Ok(subscription) => {
                    ever_connected = true;
                    failures = 0;
                    info!(subject = %self.subject, "subscribed to bus");
                    match self.dispatcher.run(subscription, &mut shutdown).await {
                        DispatchExit::Shutdown => return Ok(()),
                        DispatchExit::Disconnected => {
                            warn!(
                                retry_in_ms = self.interval.as_millis() as u64,
                                "bus subscription ended; reconnecting"
                            );
                        }
                    }
                }
                Err(e) => {
                    failures = failures.saturating_add(1);
                    if !ever_connected && self.startup_attempts.is_some_and(|max| failures >= max) {
                        error!(error = %e, attempts = failures, "giving up on initial bus connection");
                        return Err(DispatchError::TransientConnectivity(format!(
                            "bus unreachable after {failures} attempts: {e}"
                        )));
                    }
                    warn!(
                        error = %e,
                        attempt = failures,
                        retry_in_ms = self.interval.as_millis() as u64,
                        "bus connection failed"
                    );
                }
            }

            tokio::select! {
                biased;
                _ = stopped(&mut shutdown) => return Ok(()),
                _ = tokio::time::sleep(self.interval) => {}
            }
        }
    }

    async fn attach(&self) -> Result<Subscription, BusError> {
        if !self.bus.is_connected() {
            self.bus.connect().await?;
            info!("connected to bus");
        }
        self.bus.subscribe(&self.subject).await
    }

    async fn supervise_store(&self, mut shutdown: watch::Receiver<bool>) -> Result<(), DispatchError> {
        let mut healthy = true;
        loop {
            tokio::select! {
                biased;
                _ = stopped(&mut shutdown) => return Ok(()),
                _ = tokio::time::sleep(self.interval) => {}
            }

            if self.store.ping().await.is_ok() {
                if !healthy {
                    info!("store reachable again");
                }
                healthy = true;
                continue;
            }
            match self.store.connect().await {
                Ok(()) => {
                    info!("reconnected to store");
                    healthy = true;
                }
                Err(e) if healthy => {
                    warn!(error = %e, "store unreachable; will keep retrying");
                    healthy = false;
                }
                Err(e) => debug!(error = %e, "store still unreachable"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::{ActiveTasks, EngineRunner, TaskProcessor, WorkerPool};
    use crate::domain::Counts;
    use crate::impls::{FnEngine, InMemoryBus, InMemoryTaskStore};
    use crate::ports::SystemClock;

    const TICK: Duration = Duration::from_millis(20);

    fn supervisor(bus: Arc<InMemoryBus>, store: Arc<InMemoryTaskStore>) -> ConnectivitySupervisor {
        let processor = Arc::new(TaskProcessor::new(
            store.clone(),
            EngineRunner::new(Arc::new(FnEngine::new(|_: &str, _| Ok(Counts::new()))), 1),
            Arc::new(SystemClock),
            ActiveTasks::new(),
        ));
        let dispatcher = Arc::new(Dispatcher::new(Arc::new(WorkerPool::new(1)), processor));
        ConnectivitySupervisor::new(bus, store, dispatcher, "tasks", TICK)
    }

    async fn eventually(mut check: impl FnMut() -> bool) -> bool {
        for _ in 0..100 {
            if check() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }

    #[tokio::test]
    async fn resubscribes_after_disconnect() {
        let bus = Arc::new(InMemoryBus::new());
        let store = Arc::new(InMemoryTaskStore::new());
        let supervisor = Arc::new(supervisor(bus.clone(), store));
        let (stop, shutdown) = watch::channel(false);

        let handle = tokio::spawn({
            let supervisor = supervisor.clone();
            async move { supervisor.run(shutdown).await }
        });
        assert!(eventually(|| bus.subscriber_count("tasks") == 1).await);

        bus.disconnect();
        assert_eq!(bus.subscriber_count("tasks"), 0);
        assert!(eventually(|| bus.subscriber_count("tasks") == 1).await);
        assert!(bus.is_connected());

        stop.send_replace(true);
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn keeps_retrying_until_bus_comes_back() {
        let bus = Arc::new(InMemoryBus::new());
        bus.set_reachable(false);
        let store = Arc::new(InMemoryTaskStore::new());
        let supervisor = Arc::new(supervisor(bus.clone(), store));
        let (stop, shutdown) = watch::channel(false);

        let handle = tokio::spawn({
            let supervisor = supervisor.clone();
            async move { supervisor.run(shutdown).await }
        });
        tokio::time::sleep(TICK * 5).await;
        assert!(!bus.is_connected());

        bus.set_reachable(true);
        assert!(eventually(|| bus.subscriber_count("tasks") == 1).await);

        stop.send_replace(true);
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn startup_attempts_bound_initial_connection() {
        let bus = Arc::new(InMemoryBus::new());
        bus.set_reachable(false);
        let store = Arc::new(InMemoryTaskStore::new());
        let supervisor = supervisor(bus, store).with_startup_attempts(Some(3));
        let (_stop, shutdown) = watch::channel(false);

        let err = tokio::time::timeout(Duration::from_secs(2), supervisor.run(shutdown))
            .await
            .unwrap()
            .unwrap_err();
        assert!(matches!(err, DispatchError::TransientConnectivity(_)));
    }

    #[tokio::test]
    async fn reconnects_store_after_outage() {
        let bus = Arc::new(InMemoryBus::new());
        let store = Arc::new(InMemoryTaskStore::new());
        let supervisor = Arc::new(supervisor(bus, store.clone()));
        let (stop, shutdown) = watch::channel(false);

        let handle = tokio::spawn({
            let supervisor = supervisor.clone();
            async move { supervisor.run(shutdown).await }
        });

        store.set_reachable(false);
        tokio::time::sleep(TICK * 3).await;
        assert!(!store.is_connected());

        store.set_reachable(true);
        assert!(eventually(|| store.is_connected()).await);

        stop.send_replace(true);
        handle.await.unwrap().unwrap();
    }
}
