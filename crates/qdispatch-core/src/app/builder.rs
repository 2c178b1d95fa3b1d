//! AppBuilder - コンポーネントのワイヤリングと App
//!
//! # Fail-fast 設計
//! - store / bus / engine は必須。足りなければ build() で `MissingComponents`
//! - Settings は build() 時に validate する
//! - clock / id generator は省略可（SystemClock / UlidGenerator）
//!
//! # 使用例
//! ```ignore
//! let app = AppBuilder::new()
//!     .settings(settings)
//!     .store(Arc::new(InMemoryTaskStore::new()))
//!     .bus(Arc::new(InMemoryBus::new()))
//!     .engine(Arc::new(FnEngine::new(simulate)))
//!     .build()?;
//! let receipt = app.submitter().submit("h 0; measure 0", 100).await?;
//! app.run().await?;
//! ```

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, watch};
use tracing::{error, info, warn};

use crate::app::signals::wait_for_shutdown_signal;
use crate::app::{
    ActiveTasks, ConnectivitySupervisor, DispatchReport, Dispatcher, EngineRunner, HealthReport,
    ShutdownCoordinator, ShutdownReport, TaskProcessor, TaskRetriever, TaskSubmitter,
    WorkerPool, WorkerStatus,
};
use crate::config::{ConfigError, Settings};
use crate::domain::DispatchError;
use crate::ports::{
    Clock, ExecutionEngine, IdGenerator, NotificationBus, SystemClock, TaskStore, UlidGenerator,
};

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("missing components: {0:?}")]
    MissingComponents(Vec<&'static str>),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

#[derive(Default)]
pub struct AppBuilder {
    settings: Settings,
    store: Option<Arc<dyn TaskStore>>,
    bus: Option<Arc<dyn NotificationBus>>,
    engine: Option<Arc<dyn ExecutionEngine>>,
    clock: Option<Arc<dyn Clock>>,
    ids: Option<Arc<dyn IdGenerator>>,
    reconnect_interval: Option<Duration>,
    drain_timeout: Option<Duration>,
}

impl AppBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    pub fn store(mut self, store: Arc<dyn TaskStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn bus(mut self, bus: Arc<dyn NotificationBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn engine(mut self, engine: Arc<dyn ExecutionEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = Some(ids);
        self
    }

    /// Sub-second override of `worker.reconnect_interval_secs` (tests).
    pub fn reconnect_interval(mut self, interval: Duration) -> Self {
        self.reconnect_interval = Some(interval);
        self
    }

    /// Sub-second override of `worker.drain_timeout_secs` (tests).
    pub fn drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = Some(timeout);
        self
    }

    pub fn build(self) -> Result<App, BuildError> {
        self.settings.validate()?;

        let mut missing = Vec::new();
        if self.store.is_none() {
            missing.push("store");
        }
        if self.bus.is_none() {
            missing.push("bus");
        }
        if self.engine.is_none() {
            missing.push("engine");
        }
        let (Some(store), Some(bus), Some(engine)) = (self.store, self.bus, self.engine) else {
            return Err(BuildError::MissingComponents(missing));
        };

        let settings = self.settings;
        let clock: Arc<dyn Clock> = match self.clock {
            Some(clock) => clock,
            None => Arc::new(SystemClock),
        };
        let ids: Arc<dyn IdGenerator> = match self.ids {
            Some(ids) => ids,
            None => Arc::new(UlidGenerator::new(Arc::clone(&clock))),
        };

        let active = ActiveTasks::new();
        let pool = Arc::new(WorkerPool::new(settings.worker.max_concurrent_tasks));
        let processor = Arc::new(TaskProcessor::new(
            Arc::clone(&store),
            EngineRunner::new(engine, settings.worker.engine_threads),
            Arc::clone(&clock),
            active.clone(),
        ));
        let dispatcher = Arc::new(Dispatcher::new(Arc::clone(&pool), processor));
        let submitter = Arc::new(TaskSubmitter::new(
            Arc::clone(&store),
            Arc::clone(&bus),
            ids,
            clock,
            settings.bus.subject.clone(),
        ));
        let retriever = Arc::new(TaskRetriever::new(Arc::clone(&store)));

        Ok(App {
            reconnect_interval: self
                .reconnect_interval
                .unwrap_or_else(|| settings.worker.reconnect_interval()),
            drain_timeout: self
                .drain_timeout
                .unwrap_or_else(|| settings.worker.drain_timeout()),
            settings,
            store,
            bus,
            pool,
            active,
            dispatcher,
            submitter,
            retriever,
        })
    }
}

/// A wired worker. Submission and retrieval work at any time; `run` /
/// `run_until` drive dispatch and end with shutdown, so call one of them once.
pub struct App {
    settings: Settings,
    store: Arc<dyn TaskStore>,
    bus: Arc<dyn NotificationBus>,
    pool: Arc<WorkerPool>,
    active: ActiveTasks,
    dispatcher: Arc<Dispatcher>,
    submitter: Arc<TaskSubmitter>,
    retriever: Arc<TaskRetriever>,
    reconnect_interval: Duration,
    drain_timeout: Duration,
}

impl App {
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn submitter(&self) -> Arc<TaskSubmitter> {
        Arc::clone(&self.submitter)
    }

    pub fn retriever(&self) -> Arc<TaskRetriever> {
        Arc::clone(&self.retriever)
    }

    pub fn reports(&self) -> broadcast::Receiver<DispatchReport> {
        self.dispatcher.reports()
    }

    pub fn status(&self) -> WorkerStatus {
        WorkerStatus {
            capacity: self.pool.capacity(),
            in_flight: self.pool.in_flight(),
            accepting: !self.pool.is_closed(),
            active: self.active.snapshot(),
        }
    }

    pub async fn health(&self) -> HealthReport {
        HealthReport {
            bus_connected: self.bus.is_connected(),
            store_reachable: self.store.ping().await.is_ok(),
        }
    }

    /// Serve until SIGINT/SIGTERM/SIGQUIT (Ctrl-C elsewhere), then shut down.
    pub async fn run(&self) -> Result<ShutdownReport, DispatchError> {
        self.run_until(async {
            if let Err(e) = wait_for_shutdown_signal().await {
                error!(error = %e, "cannot install signal handlers; falling back to ctrl-c");
                let _ = tokio::signal::ctrl_c().await;
            }
        })
        .await
    }

    /// Serve until `signal` resolves, then stop admissions and drain.
    ///
    /// Connections are closed on every path. The error case is a bus that
    /// was never reachable within `worker.startup_attempts`.
    pub async fn run_until<S>(&self, signal: S) -> Result<ShutdownReport, DispatchError>
    where
        S: Future<Output = ()>,
    {
        if let Err(e) = self.store.connect().await {
            warn!(error = %e, "store unreachable at startup; will keep retrying");
        }

        let (stop, shutdown) = watch::channel(false);
        let supervisor = ConnectivitySupervisor::new(
            Arc::clone(&self.bus),
            Arc::clone(&self.store),
            Arc::clone(&self.dispatcher),
            self.settings.bus.subject.clone(),
            self.reconnect_interval,
        )
        .with_startup_attempts(self.settings.worker.startup_attempts);

        info!(
            capacity = self.pool.capacity(),
            subject = %self.settings.bus.subject,
            "worker started"
        );

        let supervised = supervisor.run(shutdown);
        tokio::pin!(supervised);
        tokio::pin!(signal);

        let supervised = tokio::select! {
            result = &mut supervised => result,
            () = &mut signal => {
                info!("stop requested");
                stop.send_replace(true);
                supervised.await
            }
        };

        let report = ShutdownCoordinator::new(
            Arc::clone(&self.pool),
            self.active.clone(),
            Arc::clone(&self.bus),
            Arc::clone(&self.store),
            self.drain_timeout,
        )
        .drain()
        .await;

        supervised.map(|()| report)
    }
}
