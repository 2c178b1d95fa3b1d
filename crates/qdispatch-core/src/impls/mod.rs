//! Impls - ports の実装
//!
//! # 含まれる実装
//! - **InMemoryTaskStore**: 開発・テスト用の正本
//! - **InMemoryBus**: 開発・テスト用の pub/sub
//! - **FnEngine**: クロージャを ExecutionEngine にするアダプタ
//! - **RedisTaskStore**: `redis` feature 有効時のみ

pub mod engine;
pub mod inmem_bus;
pub mod inmem_store;
#[cfg(feature = "redis")]
pub mod redis_store;

pub use self::engine::FnEngine;
pub use self::inmem_bus::InMemoryBus;
pub use self::inmem_store::InMemoryTaskStore;
#[cfg(feature = "redis")]
pub use self::redis_store::RedisTaskStore;
