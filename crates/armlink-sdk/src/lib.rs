//! Armlink SDK - 机械臂实时指令/遥测通道 Rust SDK
//!
//! 通过单条持久连接（默认 WebSocket）向机械臂服务端发送指令、接收遥测，
//! 并在链路异常时自动重连、缓存离线指令、检测关节越限。
//!
//! # 架构设计
//!
//! 本 SDK 采用分层架构，从底层到高层：
//!
//! - **协议层** (`protocol`): 信封、消息类型、类型化指令、遥测帧、机械臂限位配置
//! - **传输层** (`transport`): 连接抽象，WebSocket 后端和内存 Mock 后端
//! - **驱动层** (`driver`): 工作线程、心跳、请求关联、离线队列、安全检查
//! - **兜底路由** (`fallback`): 实时通道不可用时转交调用方的 HTTP 接口
//!
//! # 快速开始
//!
//! ```no_run
//! use armlink_sdk::prelude::*;
//! use std::time::Duration;
//!
//! armlink_sdk::init_logger!();
//!
//! let link = LinkBuilder::new()
//!     .url("ws://localhost:8000/ws/robot")
//!     .subscribe(["robot_telemetry"])
//!     .build()
//!     .unwrap();
//! let events = link.events();
//! link.connect().unwrap();
//!
//! while let Ok(event) = events.recv_timeout(Duration::from_secs(5)) {
//!     if let LinkEvent::Safety(violation) = event {
//!         eprintln!("{}", violation.message);
//!     }
//! }
//! ```

pub mod fallback;
pub mod logging;

// Prelude 模块
pub mod prelude;

pub use armlink_driver as driver;
pub use armlink_protocol as protocol;
pub use armlink_transport as transport;

// --- 用户以此为界 ---

// 协议层
pub use armlink_protocol::{Command, Envelope, ProtocolError, RobotConfig, TelemetryFrame};

// 传输层
pub use armlink_transport::{Transport, TransportError};

// 驱动层
pub use armlink_driver::{
    ConnectionManager, ConnectionState, LinkBuilder, LinkConfig, LinkError, LinkEvent, LinkFault,
    LinkHealth, LinkObserver, SafetyViolation, SendOptions, SendReceipt,
};

pub use fallback::{CommandRouter, HttpSubmitter, RouterError};
pub use logging::init_logger;
