//! IdGenerator port - ID 生成の抽象化
//!
//! # 実装
//! - **UlidGenerator**: ULID ベース（本番用）、clock の時刻で採番

use std::sync::{Mutex, PoisonError};
use std::time::SystemTime;

use ulid::{Generator, Ulid};

use crate::domain::ItemId;
use crate::ports::Clock;

/// IdGenerator は item id を採番する
///
/// # Thread Safety
/// - `Send + Sync` を要求（複数タスクから同時に enqueue できる）
pub trait IdGenerator: Send + Sync {
    fn generate_item_id(&self) -> ItemId;
}

/// ULID ids stamped with the clock's current time.
///
/// Uses a monotonic generator, so ids created within the same millisecond
/// (or while a `ManualClock` stands still) remain distinct and ordered.
pub struct UlidGenerator<C> {
    clock: C,
    generator: Mutex<Generator>,
}

impl<C: Clock> UlidGenerator<C> {
    pub fn new(clock: C) -> Self {
        Self {
            clock,
            generator: Mutex::new(Generator::new()),
        }
    }
}

impl<C: Clock> IdGenerator for UlidGenerator<C> {
    fn generate_item_id(&self) -> ItemId {
        let now = self.clock.now();
        let mut generator = self.generator.lock().unwrap_or_else(PoisonError::into_inner);
        let ulid = generator
            .generate_from_datetime(SystemTime::from(now))
            // random part overflowed within one millisecond
            .unwrap_or_else(|_| Ulid::from_parts(now.timestamp_millis() as u64, rand::random()));
        ItemId::from_ulid(ulid)
    }
}
