//! InMemoryBus - 開発・テスト用の NotificationBus
//!
//! # 実装詳細
//! - subject ごとに購読者（mpsc::Sender）の一覧を持つ
//! - publish は try_send。受信側が詰まっていれば黙って捨てる（at-most-once）
//! - 切断すると購読者を全て破棄するので、各 Subscription は None を返して終わる
//!
//! `disconnect()` / `set_reachable()` で接続断を模擬できる。

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::domain::BusError;
use crate::ports::{NotificationBus, Subscription};

const DEFAULT_BUFFER: usize = 1024;

type Subscribers = HashMap<String, Vec<mpsc::Sender<Vec<u8>>>>;

pub struct InMemoryBus {
    subscribers: Mutex<Subscribers>,
    connected: AtomicBool,
    reachable: AtomicBool,
    closed: AtomicBool,
    buffer: usize,
    delivered: AtomicUsize,
    dropped: AtomicUsize,
}

impl InMemoryBus {
    /// A connected bus with the default per-subscriber buffer.
    pub fn new() -> Self {
        Self::with_buffer(DEFAULT_BUFFER)
    }

    pub fn with_buffer(buffer: usize) -> Self {
        Self {
            subscribers: Mutex::new(HashMap::new()),
            connected: AtomicBool::new(true),
            reachable: AtomicBool::new(true),
            closed: AtomicBool::new(false),
            buffer: buffer.max(1),
            delivered: AtomicUsize::new(0),
            dropped: AtomicUsize::new(0),
        }
    }

    /// Drop the connection. Every live subscription ends; messages published
    /// while disconnected are lost.
    pub fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
        self.lock().clear();
    }

    /// Simulate the broker going away (`false`) or coming back (`true`).
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
        if !reachable {
            self.disconnect();
        }
    }

    pub fn subscriber_count(&self, subject: &str) -> usize {
        self.lock()
            .get(subject)
            .map(|subs| subs.iter().filter(|tx| !tx.is_closed()).count())
            .unwrap_or(0)
    }

    /// Messages handed to at least one subscriber.
    pub fn delivered_count(&self) -> usize {
        self.delivered.load(Ordering::SeqCst)
    }

    /// Messages lost because nobody could take them.
    pub fn dropped_count(&self) -> usize {
        self.dropped.load(Ordering::SeqCst)
    }

    fn lock(&self) -> MutexGuard<'_, Subscribers> {
        self.subscribers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for InMemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NotificationBus for InMemoryBus {
    async fn connect(&self) -> Result<(), BusError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(BusError::Closed);
        }
        if !self.reachable.load(Ordering::SeqCst) {
            return Err(BusError::Unreachable("in-memory bus unreachable".into()));
        }
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn publish(&self, subject: &str, payload: Vec<u8>) -> Result<(), BusError> {
        if !self.is_connected() {
            return Err(BusError::NotConnected);
        }
        let mut subscribers = self.lock();
        let mut handed_over = false;
        if let Some(subs) = subscribers.get_mut(subject) {
            subs.retain(|tx| !tx.is_closed());
            for tx in subs.iter() {
                // 詰まっている購読者には届けない（再送はしない）
                if tx.try_send(payload.clone()).is_ok() {
                    handed_over = true;
                }
            }
        }
        if handed_over {
            self.delivered.fetch_add(1, Ordering::SeqCst);
        } else {
            self.dropped.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    async fn subscribe(&self, subject: &str) -> Result<Subscription, BusError> {
        if !self.is_connected() {
            return Err(BusError::NotConnected);
        }
        let (tx, rx) = mpsc::channel(self.buffer);
        self.lock().entry(subject.to_string()).or_default().push(tx);
        Ok(Subscription::new(subject, rx))
    }

    async fn close(&self) -> Result<(), BusError> {
        self.closed.store(true, Ordering::SeqCst);
        self.disconnect();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn publish_reaches_subscriber() {
        let bus = InMemoryBus::new();
        let mut sub = bus.subscribe("tasks").await.unwrap();

        bus.publish("tasks", b"hello".to_vec()).await.unwrap();

        assert_eq!(sub.next().await, Some(b"hello".to_vec()));
        assert_eq!(bus.delivered_count(), 1);
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_lost() {
        let bus = InMemoryBus::new();
        bus.publish("tasks", b"lost".to_vec()).await.unwrap();

        // 後から購読しても届かない
        let mut sub = bus.subscribe("tasks").await.unwrap();
        let got = tokio::time::timeout(Duration::from_millis(50), sub.next()).await;
        assert!(got.is_err());
        assert_eq!(bus.dropped_count(), 1);
    }

    #[tokio::test]
    async fn disconnect_ends_subscriptions_and_refuses_publish() {
        let bus = InMemoryBus::new();
        let mut sub = bus.subscribe("tasks").await.unwrap();

        bus.disconnect();

        assert_eq!(sub.next().await, None);
        assert_eq!(
            bus.publish("tasks", b"x".to_vec()).await,
            Err(BusError::NotConnected)
        );
        assert_eq!(bus.subscriber_count("tasks"), 0);

        bus.connect().await.unwrap();
        assert!(bus.is_connected());
    }

    #[tokio::test]
    async fn unreachable_bus_refuses_connect() {
        let bus = InMemoryBus::new();
        bus.set_reachable(false);
        assert!(matches!(bus.connect().await, Err(BusError::Unreachable(_))));

        bus.set_reachable(true);
        bus.connect().await.unwrap();
    }

    #[tokio::test]
    async fn full_subscriber_drops_message() {
        let bus = InMemoryBus::with_buffer(1);
        let mut sub = bus.subscribe("tasks").await.unwrap();

        bus.publish("tasks", b"1".to_vec()).await.unwrap();
        bus.publish("tasks", b"2".to_vec()).await.unwrap();

        assert_eq!(sub.next().await, Some(b"1".to_vec()));
        assert_eq!(bus.dropped_count(), 1);
    }

    #[tokio::test]
    async fn closed_bus_cannot_reconnect() {
        let bus = InMemoryBus::new();
        bus.close().await.unwrap();
        assert_eq!(bus.connect().await, Err(BusError::Closed));
    }
}
