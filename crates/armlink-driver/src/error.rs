//! 驱动层错误类型定义

use armlink_protocol::ProtocolError;
use armlink_transport::TransportError;
use std::time::Duration;
use thiserror::Error;

/// 驱动层错误类型
///
/// 只覆盖本地误用和调用方可感知的结果（等待应答超时 / 被取消）。
/// 链路上的问题（断线、解析失败、发送失败）以事件形式上报，不会从这里返回。
#[derive(Error, Debug)]
pub enum LinkError {
    /// 工作线程已退出（控制通道已关闭）
    #[error("Link worker is not running")]
    WorkerGone,

    /// 配置非法
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// 未在期限内收到应答
    #[error("No reply to '{message_type}' within {timeout:?}")]
    Timeout {
        message_type: String,
        timeout: Duration,
    },

    /// 请求在应答前被取消（队列清空、手动断开或队列溢出淘汰）
    #[error("Request '{message_id}' was cancelled")]
    Cancelled { message_id: String },

    /// 传输层错误
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// 协议错误
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// 配置文件解析失败
    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
