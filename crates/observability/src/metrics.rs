//! 事件总线指标模块
//!
//! `record_*` 函数写入全局 `metrics` recorder（未安装 recorder 时为空操作）；
//! `RunningStats` 用于进程内聚合（订阅者平均处理耗时等）。

use metrics::{counter, histogram};

/// 记录一次 emit
pub fn record_emit(event: &str, listeners: usize) {
    counter!("eventbus_emits_total", "event" => event.to_string()).increment(1);
    histogram!("eventbus_emit_fanout").record(listeners as f64);
}

/// 记录处理器失败
pub fn record_handler_failure(event: &str) {
    counter!("eventbus_handler_failures_total", "event" => event.to_string()).increment(1);
}

/// 记录发布结果
pub fn record_published(event: &str, success: bool) {
    let status = if success { "success" } else { "failure" };
    counter!(
        "eventbus_published_total",
        "event" => event.to_string(),
        "status" => status
    )
    .increment(1);
}

/// 记录重试结果 (`scheduled` / `success` / `exhausted`)
pub fn record_retry(event: &str, outcome: &'static str) {
    counter!(
        "eventbus_retries_total",
        "event" => event.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

/// 记录死信
pub fn record_dead_letter(event: &str) {
    counter!("eventbus_dead_letters_total", "event" => event.to_string()).increment(1);
}

/// 记录订阅者处理耗时
pub fn record_processing_ms(subscriber: &str, elapsed_ms: f64) {
    histogram!("eventbus_processing_ms", "subscriber" => subscriber.to_string())
        .record(elapsed_ms);
}

/// 统计摘要
#[derive(Debug, Clone, Default)]
pub struct StatsSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl From<&RunningStats> for StatsSummary {
    fn from(stats: &RunningStats) -> Self {
        Self {
            count: stats.count,
            min: stats.min,
            max: stats.max,
            mean: stats.mean(),
            std_dev: stats.std_dev(),
        }
    }
}

impl std::fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.count == 0 {
            write!(f, "N/A")
        } else {
            write!(
                f,
                "min={:.3}, max={:.3}, mean={:.3}, std={:.3} (n={})",
                self.min, self.max, self.mean, self.std_dev, self.count
            )
        }
    }
}

/// 在线统计计算器 (Welford's algorithm)
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    /// 添加新值
    pub fn push(&mut self, value: f64) {
        self.count += 1;

        if self.count == 1 {
            self.min = value;
            self.max = value;
            self.mean = value;
            self.m2 = 0.0;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);

            let delta = value - self.mean;
            self.mean += delta / self.count as f64;
            let delta2 = value - self.mean;
            self.m2 += delta * delta2;
        }
    }

    /// 样本数量
    pub fn count(&self) -> u64 {
        self.count
    }

    /// 均值
    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.mean
        }
    }

    /// 方差
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    /// 标准差
    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }

    pub fn summary(&self) -> StatsSummary {
        StatsSummary::from(self)
    }
}
