//! # Armlink Protocol
//!
//! 机械臂实时通道的消息协议定义（无传输依赖）
//!
//! ## 模块
//!
//! - `envelope`: 统一消息信封（`type` / `payload` / `messageId` / `timestamp`）
//! - `kinds`: 上行/下行消息类型
//! - `commands`: 类型安全的上行命令构建
//! - `ids`: 消息关联 ID 生成
//! - `telemetry`: 遥测帧解析与规范化
//! - `config`: 机器人安全阈值配置（`RobotConfig`）
//!
//! ## 编码
//!
//! 每个方向的每条消息都是一个 JSON 对象：
//!
//! ```text
//! { "type": string, "payload": object|null, "messageId": string, "timestamp": ISO-8601 }
//! ```

pub mod commands;
pub mod config;
pub mod envelope;
pub mod ids;
pub mod kinds;
pub mod telemetry;

// 重新导出常用类型
pub use commands::Command;
pub use config::{JointLimit, RobotConfig};
pub use envelope::Envelope;
pub use ids::MessageIdGenerator;
pub use kinds::{InboundKind, OutboundKind, RemoteFaultKind};
pub use telemetry::{Position3, RawTelemetry, TelemetryFrame};

use thiserror::Error;

/// 协议层错误
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// JSON 解析失败（信封或负载格式不正确）
    #[error("Malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),

    /// 信封缺少必需字段
    #[error("Missing field: {0}")]
    MissingField(&'static str),

    /// 负载结构不符合预期
    #[error("Invalid payload for '{kind}': {reason}")]
    InvalidPayload { kind: String, reason: String },

    /// 配置文件解析失败
    #[error("Config parse error: {0}")]
    Config(#[from] toml::de::Error),

    /// 配置值非法
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
