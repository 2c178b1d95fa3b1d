//! NotificationBus port - fire-and-forget の pub/sub
//!
//! バスは「起床シグナル」であって work queue ではない。
//! - at-most-once: 切断中に流れたメッセージは失われ、再配送されない
//! - ack なし、publisher を跨ぐ順序保証なし
//!
//! 購読はコールバックではなく `Subscription`（pull 型の受信口）で表現する。

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::domain::BusError;

#[async_trait]
pub trait NotificationBus: Send + Sync {
    /// (Re)establish the connection. Idempotent.
    async fn connect(&self) -> Result<(), BusError>;

    fn is_connected(&self) -> bool;

    /// Fire-and-forget publish. `Ok` only means the bus accepted the bytes.
    async fn publish(&self, subject: &str, payload: Vec<u8>) -> Result<(), BusError>;

    /// Start receiving messages published to `subject` from now on.
    async fn subscribe(&self, subject: &str) -> Result<Subscription, BusError>;

    async fn close(&self) -> Result<(), BusError>;
}

/// Pull-based receiver for one subject.
///
/// `next()` yields `None` once the bus disconnects or closes; the owner is
/// expected to reconnect and subscribe again. Dropping it unsubscribes.
#[derive(Debug)]
pub struct Subscription {
    subject: String,
    rx: mpsc::Receiver<Vec<u8>>,
}

impl Subscription {
    pub fn new(subject: impl Into<String>, rx: mpsc::Receiver<Vec<u8>>) -> Self {
        Self {
            subject: subject.into(),
            rx,
        }
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub async fn next(&mut self) -> Option<Vec<u8>> {
        self.rx.recv().await
    }
}
