//! Ports - 抽象化レイヤー
//!
//! キューが依存する trait を定義します。配送先（push / SMS / email）や
//! 永続化先（SQL, Redis など）の詳細はこの境界の外に置きます。
//!
//! # 設計原則
//! - item record が source of truth（正本）
//! - priority index は配送待ちの id だけを持つ
//! - 時刻と id は注入可能（テストでは `ManualClock` を使う）

pub mod backend;
pub mod clock;
pub mod id_generator;
pub mod sender;

pub use self::backend::Backend;
pub use self::clock::{Clock, ManualClock, SystemClock};
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::sender::{SendError, SendReport, Sender};
