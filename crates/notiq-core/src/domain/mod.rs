//! Domain - ドメインモデル
//!
//! ids, priority, item record, status, retry policy。
//! backend、タイマー、sender のことはここでは知らない。

pub mod ids;
pub mod item;
pub mod priority;
pub mod retry;
pub mod state;

pub use self::ids::ItemId;
pub use self::item::QueueItem;
pub use self::priority::{Priority, UnknownPriority};
pub use self::retry::{MAX_JITTER_RATIO, RetryPolicy};
pub use self::state::{ItemStatus, StatusCounts};

use chrono::{DateTime, TimeDelta, Utc};
use std::time::Duration;

/// `now + delay`, saturating at the far end of the calendar.
pub fn instant_after(now: DateTime<Utc>, delay: Duration) -> DateTime<Utc> {
    TimeDelta::from_std(delay)
        .ok()
        .and_then(|d| now.checked_add_signed(d))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// `now - span`, saturating at the start of the calendar.
pub fn instant_before(now: DateTime<Utc>, span: Duration) -> DateTime<Utc> {
    TimeDelta::from_std(span)
        .ok()
        .and_then(|d| now.checked_sub_signed(d))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}
