//! notiq-core
//!
//! 優先度付き通知配送キュー。
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, priority, state, item, retry）
//! - **ports**: 抽象化レイヤー（Backend, Sender, Clock, IdGenerator）
//! - **impls**: 実装（InMemoryBackend = EntryStore + PriorityIndex）
//! - **app**: アプリケーション層（builder, queue, scheduler_loop, stats, health）
//! - **config**: `QueueConfig`（デフォルト値、`NOTIQ_*` 環境変数）
//! - **error**: 呼び出し側と backend に返すエラー型

pub mod app;
pub mod config;
pub mod domain;
pub mod error;
pub mod impls;
pub mod ports;

pub use app::{BuildError, EnqueueOptions, HealthReport, NotificationQueue, QueueBuilder, QueueStats};
pub use config::QueueConfig;
pub use domain::{ItemId, ItemStatus, Priority, QueueItem, StatusCounts};
pub use error::{BackendError, QueueError, QueueResult};
pub use ports::{Backend, SendError, SendReport, Sender};
