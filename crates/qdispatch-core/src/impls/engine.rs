//! FnEngine - クロージャを ExecutionEngine として使うためのアダプタ
//!
//! 本物のシミュレータを持たない組み込み先やテストで使う。

use crate::domain::{Counts, EngineError};
use crate::ports::ExecutionEngine;

pub struct FnEngine<F> {
    f: F,
}

impl<F> FnEngine<F>
where
    F: Fn(&str, u32) -> Result<Counts, EngineError> + Send + Sync + 'static,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F> ExecutionEngine for FnEngine<F>
where
    F: Fn(&str, u32) -> Result<Counts, EngineError> + Send + Sync + 'static,
{
    fn execute(&self, circuit: &str, shots: u32) -> Result<Counts, EngineError> {
        (self.f)(circuit, shots)
    }
}
