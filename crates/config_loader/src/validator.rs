//! 配置校验模块
//!
//! 校验规则：
//! - bus.max_listeners > 0
//! - publisher.batch_size > 0，batch_timeout_ms > 0
//! - subscriber.id 非空
//! - subscriber.dead_letter_event 非空

use contracts::{BusBlueprint, ConfigError};

/// 校验 BusBlueprint 配置
///
/// 返回第一个遇到的错误，或 Ok(())。
pub fn validate(blueprint: &BusBlueprint) -> Result<(), ConfigError> {
    validate_bus(blueprint)?;
    validate_publisher(blueprint)?;
    validate_subscriber(blueprint)?;
    Ok(())
}

fn validate_bus(blueprint: &BusBlueprint) -> Result<(), ConfigError> {
    if blueprint.bus.max_listeners == 0 {
        return Err(ConfigError::validation(
            "bus.max_listeners",
            "max_listeners must be > 0",
        ));
    }
    Ok(())
}

/// 校验发布者配置
fn validate_publisher(blueprint: &BusBlueprint) -> Result<(), ConfigError> {
    let publisher = &blueprint.publisher;

    if publisher.batch_size == 0 {
        return Err(ConfigError::validation(
            "publisher.batch_size",
            "batch_size must be > 0",
        ));
    }
    if publisher.batch_timeout_ms == 0 {
        return Err(ConfigError::validation(
            "publisher.batch_timeout_ms",
            "batch_timeout_ms must be > 0",
        ));
    }
    Ok(())
}

/// 校验订阅者配置
fn validate_subscriber(blueprint: &BusBlueprint) -> Result<(), ConfigError> {
    let subscriber = &blueprint.subscriber;

    if subscriber.id.trim().is_empty() {
        return Err(ConfigError::validation(
            "subscriber.id",
            "subscriber id cannot be empty",
        ));
    }
    if subscriber.dead_letter_event.is_empty() {
        return Err(ConfigError::validation(
            "subscriber.dead_letter_event",
            "dead_letter_event cannot be empty",
        ));
    }
    Ok(())
}
