//! 心跳监视
//!
//! 连接建立后每隔 `interval` 发一次 `heartbeat` 探测，并为该探测设置 `timeout`。
//! 超时未收到对应的 `heartbeat_response` 只产生一次"连接不稳定"告警，
//! 不会因此断开连接或改变连接状态。
//!
//! 本结构不持有定时器，只记录截止时间；由工作线程在截止时间到达时调用 `poll`。

use std::time::{Duration, Instant};

/// 正在等待应答的探测
#[derive(Debug, Clone, PartialEq, Eq)]
struct Probe {
    id: String,
    sent_at: Instant,
    deadline: Instant,
}

/// `poll` 的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeartbeatAction {
    /// 上一个探测超时未应答
    Missed { probe_id: String },
    /// 该发下一个探测了
    ProbeDue,
}

#[derive(Debug)]
pub struct HeartbeatMonitor {
    interval: Duration,
    timeout: Duration,
    next_probe_at: Option<Instant>,
    awaiting: Option<Probe>,
    consecutive_misses: u32,
}

impl HeartbeatMonitor {
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self {
            interval,
            timeout,
            next_probe_at: None,
            awaiting: None,
            consecutive_misses: 0,
        }
    }

    /// 启动（连接建立时调用），第一个探测在一个周期后发出
    pub fn start(&mut self, now: Instant) {
        self.next_probe_at = Some(now + self.interval);
        self.awaiting = None;
        self.consecutive_misses = 0;
    }

    /// 停止并清除所有截止时间
    pub fn stop(&mut self) {
        self.next_probe_at = None;
        self.awaiting = None;
    }

    pub fn is_running(&self) -> bool {
        self.next_probe_at.is_some()
    }

    pub fn consecutive_misses(&self) -> u32 {
        self.consecutive_misses
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        let timeout = self.awaiting.as_ref().map(|p| p.deadline);
        match (self.next_probe_at, timeout) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// 处理到期的截止时间
    ///
    /// 超时检查先于下一次探测，同一时刻两者都到期时先报告未应答。
    pub fn poll(&mut self, now: Instant) -> Vec<HeartbeatAction> {
        let mut actions = Vec::new();
        if self
            .awaiting
            .as_ref()
            .is_some_and(|probe| probe.deadline <= now)
            && let Some(probe) = self.awaiting.take()
        {
            self.consecutive_misses += 1;
            actions.push(HeartbeatAction::Missed { probe_id: probe.id });
        }
        if self.next_probe_at.is_some_and(|at| at <= now) {
            actions.push(HeartbeatAction::ProbeDue);
        }
        actions
    }

    /// 记录已发出的探测，并安排下一次
    pub fn probe_sent(&mut self, id: impl Into<String>, now: Instant) {
        self.awaiting = Some(Probe {
            id: id.into(),
            sent_at: now,
            deadline: now + self.timeout,
        });
        self.next_probe_at = Some(now + self.interval);
    }

    /// 探测发送失败：不等待应答，按周期再试
    pub fn probe_failed(&mut self, now: Instant) {
        self.next_probe_at = Some(now + self.interval);
    }

    /// 收到 `heartbeat_response`
    ///
    /// 应答带有关联 ID 时必须与当前探测一致；不带时视为对当前探测的应答。
    /// 返回往返时间，过期或无关的应答返回 `None`。
    pub fn on_reply(&mut self, correlation_id: Option<&str>, now: Instant) -> Option<Duration> {
        let matches = match (&self.awaiting, correlation_id) {
            (Some(probe), Some(id)) => probe.id == id,
            (Some(_), None) => true,
            (None, _) => false,
        };
        if !matches {
            return None;
        }
        let probe = self.awaiting.take()?;
        self.consecutive_misses = 0;
        Some(now.saturating_duration_since(probe.sent_at))
    }
}
