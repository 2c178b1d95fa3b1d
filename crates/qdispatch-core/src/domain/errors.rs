//! Errors - エラー型と分類
//!
//! 外部依存（store / bus / engine）ごとのエラーと、それらを束ねる
//! `DispatchError` を定義します。
//!
//! 壊れた通知（MalformedMessage）や store に無い task（UnknownTask）は
//! 呼び出し元へ返すエラーではなく、`DispatchReport` / `ProcessOutcome` で観測する。

use super::TaskId;

/// ErrorKind は呼び出し側がリトライ可否を判断するための分類
///
/// - Rejected: 入力が不正（リトライ無意味、入力を直す）
/// - Transient: 一時的な接続断（時間をおいてリトライ）
/// - Infrastructure: 永続化層の障害
/// - Permanent: そのタスクについては確定した失敗
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Rejected,
    Transient,
    Infrastructure,
    Permanent,
}

/// TaskStore のエラー
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store is unavailable: {0}")]
    Unavailable(String),

    #[error("store backend error: {0}")]
    Backend(String),

    #[error("failed to encode task {task_id}: {message}")]
    Encode { task_id: TaskId, message: String },

    #[error("failed to decode task {task_id}: {message}")]
    Decode { task_id: TaskId, message: String },
}

/// NotificationBus のエラー
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BusError {
    #[error("bus is not connected")]
    NotConnected,

    #[error("bus is unreachable: {0}")]
    Unreachable(String),

    #[error("bus is closed")]
    Closed,
}

/// ExecutionEngine のエラー
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    #[error("engine rejected circuit: {0}")]
    Rejected(String),

    #[error("engine failed: {0}")]
    Failed(String),

    #[error("engine panicked: {0}")]
    Panicked(String),
}

/// Top-level error for orchestration operations.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("connectivity lost: {0}")]
    TransientConnectivity(String),

    #[error(transparent)]
    Execution(#[from] EngineError),
}

impl From<BusError> for DispatchError {
    fn from(e: BusError) -> Self {
        DispatchError::TransientConnectivity(e.to_string())
    }
}

impl DispatchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DispatchError::InvalidRequest(_) => ErrorKind::Rejected,
            DispatchError::TransientConnectivity(_) => ErrorKind::Transient,
            DispatchError::Store(StoreError::Unavailable(_)) => ErrorKind::Transient,
            DispatchError::Store(_) => ErrorKind::Infrastructure,
            DispatchError::Execution(_) => ErrorKind::Permanent,
        }
    }
}
