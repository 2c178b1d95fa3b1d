//! EngineRunner - ExecutionEngine を blocking pool へ逃がして呼ぶ
//!
//! - 呼び出しは `spawn_blocking` 上で行い、I/O 側のスケジューリングを塞がない
//! - 同時実行数は `threads` で上限を設ける
//! - 呼び出し側の future が drop されてもエンジン呼び出しは止まらない
//!   （協調的キャンセルのみ）

use std::sync::Arc;

use tokio::sync::Semaphore;

use crate::domain::{Counts, EngineError};
use crate::ports::ExecutionEngine;

#[derive(Clone)]
pub struct EngineRunner {
    engine: Arc<dyn ExecutionEngine>,
    threads: Arc<Semaphore>,
}

impl EngineRunner {
    pub fn new(engine: Arc<dyn ExecutionEngine>, threads: usize) -> Self {
        Self {
            engine,
            threads: Arc::new(Semaphore::new(threads.max(1))),
        }
    }

    pub async fn run(&self, circuit: String, shots: u32) -> Result<Counts, EngineError> {
        let permit = Arc::clone(&self.threads)
            .acquire_owned()
            .await
            .map_err(|_| EngineError::Failed("engine pool is closed".into()))?;
        let engine = Arc::clone(&self.engine);

        tokio::task::spawn_blocking(move || {
            // permit はエンジンが戻るまで握っておく
            let _permit = permit;
            engine.execute(&circuit, shots)
        })
        .await
        .map_err(|e| EngineError::Panicked(e.to_string()))?
    }
}
