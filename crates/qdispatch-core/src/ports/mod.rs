//! Ports - 抽象化レイヤー
//!
//! 外部システム（key-value store, message bus, 実行エンジン）への
//! インターフェース。app 層はここの trait にだけ依存し、実装は
//! コンストラクタで注入される（グローバルなクライアントは持たない）。
//!
//! # 設計原則
//! - TaskStore が正本
//! - NotificationBus は task_id だけを運ぶ起床シグナル
//! - ExecutionEngine は同期・CPU bound

pub mod bus;
pub mod clock;
pub mod engine;
pub mod id_generator;
pub mod task_store;

pub use self::bus::{NotificationBus, Subscription};
pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::engine::ExecutionEngine;
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::task_store::TaskStore;
