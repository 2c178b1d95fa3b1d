//! App - アプリケーション層
//!
//! ports を組み合わせて、投入から実行・停止までのロジックを実装する。
//!
//! # 主要コンポーネント
//! - **AppBuilder / App**: ワイヤリングと起動・停止
//! - **TaskSubmitter / TaskRetriever**: 投入と参照
//! - **Dispatcher**: 通知 → bounded な並行実行
//! - **TaskProcessor**: 1 タスクの状態遷移（PENDING → PROCESSING → 終端）
//! - **ConnectivitySupervisor**: バス / store の再接続
//! - **ShutdownCoordinator**: admission 停止と drain
//! - **WorkerPool / ActiveTasks / EngineRunner**: 並行性の部品

pub mod active;
pub mod builder;
pub mod dispatcher;
pub mod engine_runner;
pub mod pool;
pub mod processor;
pub mod retriever;
pub mod shutdown;
pub mod signals;
pub mod status;
pub mod submitter;
pub mod supervisor;

pub use self::active::{ActiveGuard, ActiveTasks};
pub use self::builder::{App, AppBuilder, BuildError};
pub use self::dispatcher::{DispatchExit, DispatchReport, Dispatcher};
pub use self::engine_runner::EngineRunner;
pub use self::pool::{Completion, PoolError, WorkerPool};
pub use self::processor::TaskProcessor;
pub use self::retriever::TaskRetriever;
pub use self::shutdown::{ShutdownCoordinator, ShutdownReport};
pub use self::signals::wait_for_shutdown_signal;
pub use self::status::{HealthReport, WorkerStatus};
pub use self::submitter::{SubmitReceipt, SubmitRequest, TaskSubmitter};
pub use self::supervisor::ConnectivitySupervisor;
