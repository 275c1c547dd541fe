//! # Publisher
//!
//! 事件总线的出站可靠性层。
//!
//! 负责：
//! - 延迟 / 定时发布
//! - 按事件名分组的批量发布（大小或超时触发 flush）
//! - 投递失败后的后台指数退避重试
//! - 发布并等待订阅者确认 (ack)

mod ack;
mod batch;
pub mod error;
pub mod publisher;
mod retry;
pub mod stats;

pub use ack::AckOutcome;
pub use error::PublishError;
pub use publisher::{BatchEntry, BatchEntryResult, BatchPublishReport, PublishReceipt, Publisher};
pub use stats::PublisherStats;

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Lock a std mutex, recovering the data if a holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
