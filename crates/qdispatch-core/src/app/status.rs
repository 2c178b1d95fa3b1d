//! Status - ワーカーの状態と依存先の疎通

use serde::Serialize;

use crate::domain::TaskId;

/// Point-in-time view of the worker's admission state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkerStatus {
    /// Limiter capacity N.
    pub capacity: usize,
    pub in_flight: usize,
    /// Whether new notifications are still admitted.
    pub accepting: bool,
    /// Ids in the active-task set, sorted.
    pub active: Vec<TaskId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub bus_connected: bool,
    pub store_reachable: bool,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.bus_connected && self.store_reachable
    }
}
