//! 链路事件
//!
//! 调用方看到的是一串状态变化和告警/错误事件，而不是公共方法抛出的错误。
//! 唯一的致命事件是 `connection_failed`（重连次数耗尽），需要调用方显式重连。

use crate::safety::SafetyViolation;
use crate::state::ConnectionState;
use armlink_protocol::{Envelope, RemoteFaultKind, TelemetryFrame};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// 严重程度
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Warning => f.write_str("warning"),
            Severity::Error => f.write_str("error"),
        }
    }
}

/// 本地链路故障分类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultKind {
    /// 建连或通信失败（按退避策略重试）
    ConnectionError,
    /// 入站帧无法解析（丢弃，通道继续）
    ParseError,
    /// 本地发送失败（命令已重新入队）
    SendError,
    /// 请求未在期限内收到应答（不自动重试）
    MessageTimeout,
    /// 心跳未在期限内应答（连接不稳定）
    WebsocketTimeout,
    /// 离线队列达到上限，最旧的命令被淘汰
    QueueOverflow,
    /// 重连次数耗尽（致命）
    ConnectionFailed,
}

impl FaultKind {
    /// 事件码
    pub const fn code(self) -> &'static str {
        match self {
            FaultKind::ConnectionError => "connection_error",
            FaultKind::ParseError => "parse_error",
            FaultKind::SendError => "send_error",
            FaultKind::MessageTimeout => "message_timeout",
            FaultKind::WebsocketTimeout => "websocket_timeout",
            FaultKind::QueueOverflow => "queue_overflow",
            FaultKind::ConnectionFailed => "connection_failed",
        }
    }

    pub const fn severity(self) -> Severity {
        match self {
            FaultKind::ConnectionFailed => Severity::Error,
            _ => Severity::Warning,
        }
    }

    pub const fn is_fatal(self) -> bool {
        matches!(self, FaultKind::ConnectionFailed)
    }
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// 本地链路故障
#[derive(Debug, Clone, PartialEq)]
pub struct LinkFault {
    pub kind: FaultKind,
    pub severity: Severity,
    pub message: String,
    /// 相关消息的类型（超时、发送失败时填写）
    pub message_type: Option<String>,
    pub message_id: Option<String>,
}

impl LinkFault {
    pub fn new(kind: FaultKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            severity: kind.severity(),
            message: message.into(),
            message_type: None,
            message_id: None,
        }
    }

    /// 关联到某条消息
    pub fn for_message(mut self, message_type: impl Into<String>, message_id: impl Into<String>) -> Self {
        self.message_type = Some(message_type.into());
        self.message_id = Some(message_id.into());
        self
    }
}

impl fmt::Display for LinkFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)
    }
}

/// 服务端报告的错误，原样转交调用方
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteFault {
    pub kind: RemoteFaultKind,
    pub message: String,
    pub details: Option<Value>,
    /// 触发该错误的请求（若服务端给出）
    pub correlation_id: Option<String>,
}

impl RemoteFault {
    /// 从 `error` 消息解析
    ///
    /// 错误码取 `payload.code`，其次 `payload.errorType`，都没有时视为 `robot_error`。
    pub fn from_error_envelope(envelope: &Envelope) -> Self {
        let code = envelope
            .payload_str("code")
            .or_else(|| envelope.payload_str("errorType"))
            .unwrap_or("robot_error");
        let message = envelope
            .payload_str("message")
            .or_else(|| envelope.payload_str("error"))
            .unwrap_or("remote error")
            .to_string();
        Self {
            kind: RemoteFaultKind::from_code(code),
            message,
            details: envelope.payload.clone(),
            correlation_id: envelope.correlation_id.clone(),
        }
    }

    /// 失败的 `execution_result`（`success: false`）视为 `execution_error`
    pub fn from_failed_execution(envelope: &Envelope) -> Option<Self> {
        let payload = envelope.payload.as_ref()?;
        if payload.get("success")?.as_bool()? {
            return None;
        }
        let message = envelope
            .payload_str("error")
            .or_else(|| envelope.payload_str("message"))
            .unwrap_or("execution failed")
            .to_string();
        Some(Self {
            kind: RemoteFaultKind::ExecutionError,
            message,
            details: envelope.payload.clone(),
            correlation_id: envelope.correlation_id.clone(),
        })
    }

    pub fn severity(&self) -> Severity {
        if self.kind.is_warning() {
            Severity::Warning
        } else {
            Severity::Error
        }
    }
}

/// 链路事件
#[derive(Debug, Clone)]
pub enum LinkEvent {
    StateChanged {
        from: ConnectionState,
        to: ConnectionState,
    },
    Fault(LinkFault),
    Remote(RemoteFault),
    /// 新的遥测快照
    Telemetry(Arc<TelemetryFrame>),
    Safety(SafetyViolation),
    /// 其他入站消息（执行结果/进度、机器人状态、连接状态）
    Message(Envelope),
    ReconnectScheduled {
        attempt: u32,
        delay: Duration,
    },
    HeartbeatAck {
        rtt: Duration,
    },
}
