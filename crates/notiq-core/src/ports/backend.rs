//! Backend port - item の保存先と配送待ち index の抽象化
//!
//! デフォルトは in-memory 実装（[`crate::impls::InMemoryBackend`]）。
//! 永続化実装（SQL テーブル + index、Redis sorted set など）も同じ trait の
//! 後ろに差し込めます。
//!
//! # 実装側の契約
//! - `create` は上書きしない: 同じ id の二件目は `BackendError::Duplicate`。
//! - `save` は record 全体の last-write-wins upsert。同一 record への書き込みは
//!   直列化され、読み手が書きかけの record を見ることはない。
//! - `drain_ready` は一つのアトミックな操作: 最大 `limit` 件の id を優先度順
//!   （urgent, high, normal, low）、同一クラス内は投入順で返し、
//!   `next_ready_at > now` の id は飛ばす。返した id は同じ操作の中で index
//!   から外し in-flight にする。古い id（record なし、pending でない、
//!   in-flight 済み）は index から捨てる。
//! - in-flight の id への `enqueue` は返却扱い: in-flight を解除してクラスの
//!   末尾に積む操作をアトミックに行う。
//! - `release` は index に戻さずに in-flight を解除する。呼び出し側は終端状態を
//!   保存してから release する。
//! - `expire_pending_before` は index 上の未 claim の pending のうち cutoff より
//!   前に作られたものをアトミックに `Expired` にする。

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{ItemId, Priority, QueueItem, StatusCounts};
use crate::error::BackendError;

/// Backend は item record と priority index をまとめて提供する
///
/// 契約はモジュールドキュメントを参照。
///
/// # Thread Safety
/// - `Send + Sync` を要求（scheduler loop、公開 API、health check が共有する）
#[async_trait]
pub trait Backend: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Connect / migrate / warm up. Called once by the queue builder.
    async fn init(&self) -> Result<(), BackendError> {
        Ok(())
    }

    // -- entry store --

    async fn create(&self, item: QueueItem) -> Result<ItemId, BackendError>;

    async fn get(&self, id: ItemId) -> Result<Option<QueueItem>, BackendError>;

    async fn save(&self, item: &QueueItem) -> Result<(), BackendError>;

    /// Returns whether a record was removed.
    async fn delete(&self, id: ItemId) -> Result<bool, BackendError>;

    /// Completed/failed/expired items with `created_at < cutoff`.
    async fn list_terminal_older_than(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<QueueItem>, BackendError>;

    async fn counts_by_status(&self) -> Result<StatusCounts, BackendError>;

    // -- priority index --

    async fn enqueue(&self, id: ItemId, priority: Priority) -> Result<(), BackendError>;

    async fn drain_ready(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<ItemId>, BackendError>;

    async fn release(&self, id: ItemId) -> Result<(), BackendError>;

    async fn in_flight(&self) -> Result<Vec<ItemId>, BackendError>;

    async fn expire_pending_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<ItemId>, BackendError>;
}
