//! # Event Bus
//!
//! 进程内事件分发引擎。
//!
//! 负责：
//! - 按事件名维护 listener 注册表（顺序、去重、上限）
//! - Fan-out：同步启动全部 listener，再等待全部完成
//! - 失败隔离：handler 错误/panic 记入指标并转发到 `"error"` 事件
//! - 命名空间门面 `Namespace`

pub mod bus;
pub mod metrics;
pub mod namespace;
pub mod subscription;

pub use bus::{EmitReport, EventBus, EventBusBuilder};
pub use contracts::{BusError, Envelope, EventName, Handler};
pub use metrics::EventMetrics;
pub use namespace::Namespace;
pub use subscription::{ListenerId, Subscription};
