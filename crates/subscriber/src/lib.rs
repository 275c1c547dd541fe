//! # Subscriber
//!
//! 事件总线的入站可靠性层。
//!
//! 负责：
//! - 过滤 / 转换 / 节流 / 防抖
//! - 失败策略：忽略、指数退避重试、死信
//! - 按事件统计处理次数、错误与平均耗时
//! - 向发布者回送 ack

pub mod combinators;
pub mod metrics;
pub mod options;
pub mod plan;
pub mod subscriber;

pub use combinators::{debounce, throttle};
pub use metrics::SubscriptionMetrics;
pub use options::{Filter, SubscribeOptions, Transform};
pub use plan::SubscriptionPlan;
pub use subscriber::Subscriber;
