//! 链路指标
//!
//! 原子计数器，由工作线程更新，任何线程都可以无锁读取。

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct LinkMetrics {
    /// 收到的入站帧数（含解析失败的帧）
    pub frames_rx: AtomicU64,
    /// 成功交给传输层的出站帧数
    pub frames_tx: AtomicU64,
    pub parse_errors: AtomicU64,
    pub send_errors: AtomicU64,
    /// 与待应答请求匹配上的应答数
    pub replies_matched: AtomicU64,
    /// 请求已超时后才到达的应答数
    pub late_replies: AtomicU64,
    pub message_timeouts: AtomicU64,
    pub heartbeat_misses: AtomicU64,
    pub reconnect_attempts: AtomicU64,
    /// 因队列上限被淘汰的离线命令数
    pub queue_evictions: AtomicU64,
    pub safety_violations: AtomicU64,
}

impl LinkMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// 计数器 +1
    pub(crate) fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            frames_rx: self.frames_rx.load(Ordering::Relaxed),
            frames_tx: self.frames_tx.load(Ordering::Relaxed),
            parse_errors: self.parse_errors.load(Ordering::Relaxed),
            send_errors: self.send_errors.load(Ordering::Relaxed),
            replies_matched: self.replies_matched.load(Ordering::Relaxed),
            late_replies: self.late_replies.load(Ordering::Relaxed),
            message_timeouts: self.message_timeouts.load(Ordering::Relaxed),
            heartbeat_misses: self.heartbeat_misses.load(Ordering::Relaxed),
            reconnect_attempts: self.reconnect_attempts.load(Ordering::Relaxed),
            queue_evictions: self.queue_evictions.load(Ordering::Relaxed),
            safety_violations: self.safety_violations.load(Ordering::Relaxed),
        }
    }
}

/// 指标快照
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetricsSnapshot {
    pub frames_rx: u64,
    pub frames_tx: u64,
    pub parse_errors: u64,
    pub send_errors: u64,
    pub replies_matched: u64,
    pub late_replies: u64,
    pub message_timeouts: u64,
    pub heartbeat_misses: u64,
    pub reconnect_attempts: u64,
    pub queue_evictions: u64,
    pub safety_violations: u64,
}

impl MetricsSnapshot {
    /// 入站帧解析失败率（百分比）
    pub fn parse_error_rate(&self) -> f64 {
        if self.frames_rx == 0 {
            return 0.0;
        }
        (self.parse_errors as f64 / self.frames_rx as f64) * 100.0
    }
}
