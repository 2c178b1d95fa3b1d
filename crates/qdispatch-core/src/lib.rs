//! qdispatch-core
//!
//! 量子回路タスクの投入・配送・実行をまとめるライブラリ。
//! store が正本で、バスは task_id だけを運ぶ起床シグナル。
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, task, notification, outcome, errors）
//! - **ports**: 抽象化レイヤー（TaskStore, NotificationBus, ExecutionEngine, Clock, IdGenerator）
//! - **impls**: 実装（in-memory の store / bus、FnEngine、`redis` feature で RedisTaskStore）
//! - **app**: アプリケーションロジック（builder, submitter, dispatcher, processor, supervisor, shutdown）
//! - **config**: 設定（TOML + 環境変数）

pub mod app;
pub mod config;
pub mod domain;
pub mod impls;
pub mod ports;

pub use app::{App, AppBuilder};
pub use config::Settings;
