//! WorkerPool - 容量 N の bounded worker pool
//!
//! admission（受け入れ）とバックプレッシャを 1 つの型にまとめる。
//! - `submit` は空きスロットが出るまで待つ（ここが唯一の待ち点）
//! - スロットは future の終了時に必ず返る（panic 含む）
//! - `close` 後の `submit` は即座に `PoolError::Closed`

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{OwnedSemaphorePermit, Semaphore, watch};
use tokio::task::JoinHandle;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PoolError {
    #[error("worker pool is closed")]
    Closed,

    #[error("pooled work aborted: {0}")]
    Aborted(String),
}

/// Completion signal for one admitted unit of work.
///
/// Dropping it detaches the work; the slot is still released when it ends.
#[derive(Debug)]
pub struct Completion<T> {
    handle: JoinHandle<T>,
}

impl<T> Completion<T> {
    pub async fn wait(self) -> Result<T, PoolError> {
        self.handle
            .await
            .map_err(|e| PoolError::Aborted(e.to_string()))
    }
}

pub struct WorkerPool {
    slots: Arc<Semaphore>,
    capacity: usize,
    in_flight: Arc<watch::Sender<usize>>,
}

/// Held by running work: one slot plus one in-flight count.
struct Slot {
    _permit: OwnedSemaphorePermit,
    in_flight: Arc<watch::Sender<usize>>,
}

impl Slot {
    fn new(permit: OwnedSemaphorePermit, in_flight: Arc<watch::Sender<usize>>) -> Self {
        in_flight.send_modify(|n| *n += 1);
        Self {
            _permit: permit,
            in_flight,
        }
    }
}

impl Drop for Slot {
    fn drop(&mut self) {
        self.in_flight.send_modify(|n| *n = n.saturating_sub(1));
    }
}

impl WorkerPool {
    /// Pool admitting at most `capacity` (min 1) concurrent futures.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (in_flight, _rx) = watch::channel(0);
        Self {
            slots: Arc::new(Semaphore::new(capacity)),
            capacity,
            in_flight: Arc::new(in_flight),
        }
    }

    /// Wait for a free slot, then run `work` concurrently with the caller.
    pub async fn submit<F>(&self, work: F) -> Result<Completion<F::Output>, PoolError>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let permit = Arc::clone(&self.slots)
            .acquire_owned()
            .await
            .map_err(|_| PoolError::Closed)?;
        let slot = Slot::new(permit, Arc::clone(&self.in_flight));
        let handle = tokio::spawn(async move {
            // panic で unwind しても slot は drop される
            let _slot = slot;
            work.await
        });
        Ok(Completion { handle })
    }

    /// Refuse every further admission. Running work is left alone.
    pub fn close(&self) {
        self.slots.close();
    }

    pub fn is_closed(&self) -> bool {
        self.slots.is_closed()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn in_flight(&self) -> usize {
        *self.in_flight.borrow()
    }

    /// Wait for in-flight work to reach zero. `false` on timeout.
    pub async fn wait_idle(&self, timeout: Duration) -> bool {
        let mut rx = self.in_flight.subscribe();
        matches!(
            tokio::time::timeout(timeout, rx.wait_for(|n| *n == 0)).await,
            Ok(Ok(_))
        )
    }
}
