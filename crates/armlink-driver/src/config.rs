//! 链路配置
//!
//! 端点、重连策略和各类时间参数都是运行时配置，不属于线路协议。
//! 时间字段以毫秒存储，便于 TOML / JSON 直接书写。

use crate::LinkError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// 链路配置
///
/// `Default` 即协议约定的默认值：
///
/// | 字段 | 默认值 |
/// |------|--------|
/// | `reconnect_interval_ms` | 3000 |
/// | `max_reconnect_attempts` | 5 |
/// | `max_reconnect_delay_ms` | 30000 |
/// | `heartbeat_interval_ms` | 30000 |
/// | `heartbeat_timeout_ms` | 5000 |
/// | `message_timeout_ms` | 10000 |
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// 服务端地址（`ws://`）
    pub url: String,

    /// 重连基准间隔
    #[serde(alias = "reconnectInterval")]
    pub reconnect_interval_ms: u64,

    /// 最大连续重连次数，超过后进入 `Error`
    #[serde(alias = "maxReconnectAttempts")]
    pub max_reconnect_attempts: u32,

    /// 退避延迟上限
    #[serde(alias = "maxReconnectDelay")]
    pub max_reconnect_delay_ms: u64,

    #[serde(alias = "heartbeatInterval")]
    pub heartbeat_interval_ms: u64,

    #[serde(alias = "heartbeatTimeout")]
    pub heartbeat_timeout_ms: u64,

    /// 等待关联应答的默认超时
    #[serde(alias = "messageTimeout")]
    pub message_timeout_ms: u64,

    /// 离线命令队列上限（`None` 表示不限）
    #[serde(alias = "maxQueueLength")]
    pub max_queue_len: Option<usize>,

    /// 初始订阅的消息类型
    pub subscriptions: Vec<String>,

    /// 事件通道容量
    pub event_buffer: usize,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            url: "ws://localhost:8000/ws/robot".to_string(),
            reconnect_interval_ms: 3000,
            max_reconnect_attempts: 5,
            max_reconnect_delay_ms: 30_000,
            heartbeat_interval_ms: 30_000,
            heartbeat_timeout_ms: 5000,
            message_timeout_ms: 10_000,
            max_queue_len: None,
            subscriptions: Vec::new(),
            event_buffer: 1024,
        }
    }
}

impl LinkConfig {
    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_millis(self.reconnect_interval_ms)
    }

    pub fn max_reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.max_reconnect_delay_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_millis(self.heartbeat_timeout_ms)
    }

    pub fn message_timeout(&self) -> Duration {
        Duration::from_millis(self.message_timeout_ms)
    }

    /// 校验配置
    ///
    /// 心跳超时必须短于心跳间隔，否则上一个探测还没判定就会被下一个覆盖。
    pub fn validate(&self) -> Result<(), LinkError> {
        let invalid = |msg: &str| Err(LinkError::InvalidConfig(msg.to_string()));

        if self.url.trim().is_empty() {
            return invalid("url must not be empty");
        }
        if self.reconnect_interval_ms == 0 {
            return invalid("reconnect_interval_ms must be > 0");
        }
        if self.max_reconnect_delay_ms < self.reconnect_interval_ms {
            return invalid("max_reconnect_delay_ms must be >= reconnect_interval_ms");
        }
        if self.heartbeat_interval_ms == 0 || self.heartbeat_timeout_ms == 0 {
            return invalid("heartbeat intervals must be > 0");
        }
        if self.heartbeat_timeout_ms >= self.heartbeat_interval_ms {
            return invalid("heartbeat_timeout_ms must be < heartbeat_interval_ms");
        }
        if self.message_timeout_ms == 0 {
            return invalid("message_timeout_ms must be > 0");
        }
        if self.max_queue_len == Some(0) {
            return invalid("max_queue_len must be > 0 when set");
        }
        if self.event_buffer == 0 {
            return invalid("event_buffer must be > 0");
        }
        Ok(())
    }

    pub fn from_toml_str(content: &str) -> Result<Self, LinkError> {
        let config: LinkConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, LinkError> {
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }
}
