//! App - アプリケーション層
//!
//! このモジュールは、ports を組み合わせて動作中のキューを組み立てます。
//!
//! # 主要コンポーネント
//! - **QueueBuilder**: 構築とワイヤリング、backend のフォールバック
//! - **NotificationQueue**: 公開 API（enqueue / status / stats / cleanup / lifecycle）
//! - **SchedulerLoop**: 定期的な drain → deliver
//! - **StatsTracker**: 増分カウンタ
//! - **HealthMonitor**: stuck した in-flight item の検出

pub mod builder;
pub mod health;
pub mod queue;
pub mod scheduler_loop;
pub mod stats;

pub use self::builder::{BuildError, QueueBuilder};
pub use self::health::{HealthMonitor, HealthReport};
pub use self::queue::{EnqueueOptions, NotificationQueue};
pub use self::stats::{QueueStats, StatCounter, StatsTracker};
