//! Impls - 同梱の port 実装
//!
//! # 含まれる実装
//! - **InMemoryBackend**: デフォルトの揮発性 backend（EntryStore + PriorityIndex）
//!
//! 永続化 backend はこの crate の外で [`crate::ports::Backend`] を実装します。

pub mod entry_store;
pub mod inmem_backend;
pub mod priority_index;

pub use self::entry_store::EntryStore;
pub use self::inmem_backend::InMemoryBackend;
pub use self::priority_index::PriorityIndex;
