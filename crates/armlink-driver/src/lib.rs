//! 驱动层模块
//!
//! 本模块提供机械臂实时指令/遥测通道的核心功能，包括：
//! - 连接生命周期（指数退避自动重连，手动断开后不再重连）
//! - 心跳检测（未应答只报告链路不稳定，不改变连接状态）
//! - 请求/应答关联与超时
//! - 离线命令队列（重连后按原顺序发出）
//! - 遥测摄取（ArcSwap 无锁读取最新快照）与安全检查
//! - 观察者系统：类型化回调或有界事件通道
//!
//! # 线程模型
//!
//! 每个 [`ConnectionManager`] 拥有一个工作线程，所有状态迁移和定时器都在该线程上串行执行；
//! 句柄上的写操作是发给工作线程的消息，读操作是无锁快照。

mod builder;
pub mod backoff;
pub mod channel;
pub mod config;
pub mod dispatcher;
mod error;
pub mod events;
pub mod heartbeat;
pub mod hooks;
mod manager;
pub mod metrics;
pub mod queue;
pub mod safety;
pub mod state;
pub mod telemetry;
mod worker;

pub use backoff::{ReconnectPolicy, backoff_delay};
pub use builder::LinkBuilder;
pub use channel::EventChannel;
pub use config::LinkConfig;
pub use dispatcher::{PendingReply, ReplyOutcome, SendOptions, SendReceipt};
pub use error::LinkError;
pub use events::{FaultKind, LinkEvent, LinkFault, RemoteFault, Severity};
pub use hooks::{LinkObserver, ObserverRegistry};
pub use manager::ConnectionManager;
pub use metrics::{LinkMetrics, MetricsSnapshot};
pub use safety::{SafetyMonitor, SafetyViolation, ViolationKind};
pub use state::{ConnectionState, HealthStatus, LinkHealth};
