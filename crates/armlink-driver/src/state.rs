//! 连接状态与共享上下文
//!
//! 所有状态只由工作线程写入；句柄侧通过原子变量和 `ArcSwap` 无锁读取。

use crate::hooks::ObserverRegistry;
use crate::metrics::LinkMetrics;
use arc_swap::{ArcSwap, ArcSwapOption};
use armlink_protocol::TelemetryFrame;
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU32, AtomicUsize, Ordering};
use std::time::Duration;

/// 连接状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum ConnectionState {
    #[default]
    Disconnected = 0,
    Connecting = 1,
    Connected = 2,
    /// 重连次数耗尽，需调用方显式 `connect()`
    Error = 3,
}

impl ConnectionState {
    /// 从 u8 转换（无效值视为 `Disconnected`）
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Connecting,
            2 => Self::Connected,
            3 => Self::Error,
            _ => Self::Disconnected,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Error => "error",
        }
    }

    /// `connect()` 在这些状态下是空操作
    pub fn is_active(self) -> bool {
        matches!(self, Self::Connecting | Self::Connected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 连接状态（原子版本，用于线程间共享）
#[derive(Debug)]
pub struct AtomicConnectionState {
    inner: AtomicU8,
}

impl AtomicConnectionState {
    pub fn new(state: ConnectionState) -> Self {
        Self {
            inner: AtomicU8::new(state.as_u8()),
        }
    }

    pub fn get(&self) -> ConnectionState {
        ConnectionState::from_u8(self.inner.load(Ordering::Acquire))
    }

    /// 写入新状态，返回旧状态
    pub fn swap(&self, state: ConnectionState) -> ConnectionState {
        ConnectionState::from_u8(self.inner.swap(state.as_u8(), Ordering::AcqRel))
    }
}

impl Default for AtomicConnectionState {
    fn default() -> Self {
        Self::new(ConnectionState::Disconnected)
    }
}

/// 心跳健康状况
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HealthStatus {
    /// 本次连接尚无心跳结果
    #[default]
    Unknown,
    Healthy,
    /// 最近一次心跳未在超时内应答
    Unstable,
}

/// 链路健康快照
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LinkHealth {
    pub status: HealthStatus,
    /// 最近一次心跳往返时间
    pub last_rtt: Option<Duration>,
    /// 连续未应答的心跳数
    pub consecutive_misses: u32,
}

/// 句柄与工作线程共享的上下文
pub struct LinkContext {
    pub state: AtomicConnectionState,
    /// 当前遥测快照（整体替换，不原地修改）
    pub telemetry: Arc<ArcSwapOption<TelemetryFrame>>,
    pub health: ArcSwap<LinkHealth>,
    /// 当前订阅集合（有序）
    pub subscriptions: ArcSwap<Vec<String>>,
    pub queue_len: AtomicUsize,
    pub pending_requests: AtomicUsize,
    /// 当前连续重连次数
    pub reconnect_attempt: AtomicU32,
    pub observers: RwLock<ObserverRegistry>,
    pub metrics: LinkMetrics,
}

impl LinkContext {
    pub fn new() -> Self {
        Self {
            state: AtomicConnectionState::default(),
            telemetry: Arc::new(ArcSwapOption::empty()),
            health: ArcSwap::from_pointee(LinkHealth::default()),
            subscriptions: ArcSwap::from_pointee(Vec::new()),
            queue_len: AtomicUsize::new(0),
            pending_requests: AtomicUsize::new(0),
            reconnect_attempt: AtomicU32::new(0),
            observers: RwLock::new(ObserverRegistry::new()),
            metrics: LinkMetrics::new(),
        }
    }
}

impl Default for LinkContext {
    fn default() -> Self {
        Self::new()
    }
}
