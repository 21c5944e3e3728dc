//! Prelude - 常用类型的便捷导入
//!
//! ```rust
//! use armlink_sdk::prelude::*;
//! ```

pub use armlink_driver::{
    ConnectionManager, ConnectionState, EventChannel, FaultKind, HealthStatus, LinkBuilder,
    LinkConfig, LinkEvent, LinkFault, LinkHealth, LinkObserver, RemoteFault, SafetyViolation,
    SendOptions, SendReceipt, Severity, ViolationKind,
};
pub use armlink_protocol::{Command, Envelope, InboundKind, RobotConfig, TelemetryFrame};

// 错误类型
pub use crate::fallback::RouterError;
pub use armlink_driver::LinkError;
pub use armlink_protocol::ProtocolError;
pub use armlink_transport::TransportError;
