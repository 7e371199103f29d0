//! Sender port - 配送の抽象化
//!
//! 実際の配送（push / SMS / email）は外部に任せる。キューは一回の試行の
//! 結果だけを受け取り、retry のタイミングはキュー側が決める。

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result reported by a sender for one delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendReport {
    pub success: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SendReport {
    pub fn delivered() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    pub fn rejected(reason: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(reason.into()),
        }
    }
}

/// Transport-level failure raised by a sender.
///
/// The queue treats these exactly like `SendReport { success: false, .. }`.
#[derive(Debug, Error)]
pub enum SendError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("invalid payload: {0}")]
    InvalidPayload(String),
}

/// Sender は通知 payload を一件配送する
///
/// 実装側で retry しないこと。retry のタイミングはキューが持つ。
///
/// # Thread Safety
/// - `Send + Sync` を要求（試行ごとに別タスクから呼ばれる）
#[async_trait]
pub trait Sender: Send + Sync {
    async fn send(&self, payload: &serde_json::Value) -> Result<SendReport, SendError>;

    /// Human-readable name for logs.
    fn name(&self) -> &str {
        "sender"
    }
}
