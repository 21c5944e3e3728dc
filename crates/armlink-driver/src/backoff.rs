//! 重连退避策略
//!
//! 第 n 次重连（n ≥ 1）前的等待时间为 `min(base × 2^(n−1), cap)`，
//! 默认参数下依次为 3s, 6s, 12s, 24s, 30s, 30s ...

use crate::config::LinkConfig;
use std::time::Duration;

/// 计算第 `attempt` 次重连前的延迟（`attempt` 为 0 时按 1 处理）
pub fn backoff_delay(attempt: u32, base: Duration, cap: Duration) -> Duration {
    let exponent = attempt.max(1) - 1;
    let factor = 1u32.checked_shl(exponent).unwrap_or(u32::MAX);
    base.checked_mul(factor).unwrap_or(cap).min(cap)
}

/// 重连策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub base: Duration,
    pub cap: Duration,
    pub max_attempts: u32,
}

impl ReconnectPolicy {
    pub fn from_config(config: &LinkConfig) -> Self {
        Self {
            base: config.reconnect_interval(),
            cap: config.max_reconnect_delay(),
            max_attempts: config.max_reconnect_attempts,
        }
    }

    /// 第 `attempt` 次重连的延迟；超过上限时返回 `None`
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        (attempt <= self.max_attempts).then(|| backoff_delay(attempt, self.base, self.cap))
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::from_config(&LinkConfig::default())
    }
}
