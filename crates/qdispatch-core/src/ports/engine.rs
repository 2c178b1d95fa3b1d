//! ExecutionEngine port - circuit を実行して測定結果を返す外部計算機
//!
//! CPU bound かつ同期 API。呼び出し側（app::engine_runner）が
//! blocking pool へ逃がすので、ここでは async にしない。

use crate::domain::{Counts, EngineError};

pub trait ExecutionEngine: Send + Sync + 'static {
    /// Run `circuit` `shots` times and return outcome label -> count.
    fn execute(&self, circuit: &str, shots: u32) -> Result<Counts, EngineError>;
}
