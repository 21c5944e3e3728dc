//! 消息类型定义
//!
//! 信封中的 `type` 字段在线路上是字符串；这里提供上行与下行两组强类型枚举。
//! 未知类型不会导致解析失败，由上层决定如何处理。

use std::fmt;

/// 上行（客户端 -> 服务端）消息类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutboundKind {
    ExecuteCode,
    RequestTelemetry,
    RequestPosition,
    MoveJoint,
    MoveToPosition,
    EmergencyStop,
    StartCalibration,
    ResetToHome,
    Heartbeat,
    Subscribe,
    Unsubscribe,
}

impl OutboundKind {
    /// 所有上行类型（按协议文档顺序）
    pub const ALL: [OutboundKind; 11] = [
        OutboundKind::ExecuteCode,
        OutboundKind::RequestTelemetry,
        OutboundKind::RequestPosition,
        OutboundKind::MoveJoint,
        OutboundKind::MoveToPosition,
        OutboundKind::EmergencyStop,
        OutboundKind::StartCalibration,
        OutboundKind::ResetToHome,
        OutboundKind::Heartbeat,
        OutboundKind::Subscribe,
        OutboundKind::Unsubscribe,
    ];

    /// 线路上的类型字符串
    pub const fn as_str(self) -> &'static str {
        match self {
            OutboundKind::ExecuteCode => "execute_code",
            OutboundKind::RequestTelemetry => "request_telemetry",
            OutboundKind::RequestPosition => "request_position",
            OutboundKind::MoveJoint => "move_joint",
            OutboundKind::MoveToPosition => "move_to_position",
            OutboundKind::EmergencyStop => "emergency_stop",
            OutboundKind::StartCalibration => "start_calibration",
            OutboundKind::ResetToHome => "reset_to_home",
            OutboundKind::Heartbeat => "heartbeat",
            OutboundKind::Subscribe => "subscribe",
            OutboundKind::Unsubscribe => "unsubscribe",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == value)
    }
}

impl fmt::Display for OutboundKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 下行（服务端 -> 客户端）消息类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InboundKind {
    RobotTelemetry,
    ExecutionResult,
    ExecutionProgress,
    RobotStatus,
    Error,
    HeartbeatResponse,
    ConnectionStatus,
}

impl InboundKind {
    pub const ALL: [InboundKind; 7] = [
        InboundKind::RobotTelemetry,
        InboundKind::ExecutionResult,
        InboundKind::ExecutionProgress,
        InboundKind::RobotStatus,
        InboundKind::Error,
        InboundKind::HeartbeatResponse,
        InboundKind::ConnectionStatus,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            InboundKind::RobotTelemetry => "robot_telemetry",
            InboundKind::ExecutionResult => "execution_result",
            InboundKind::ExecutionProgress => "execution_progress",
            InboundKind::RobotStatus => "robot_status",
            InboundKind::Error => "error",
            InboundKind::HeartbeatResponse => "heartbeat_response",
            InboundKind::ConnectionStatus => "connection_status",
        }
    }

    /// 解析下行类型字符串，未知类型返回 `None`
    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == value)
    }
}

impl fmt::Display for InboundKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 远端上报的语义错误类别
///
/// 来自 `error` 消息负载中的 `code`（或 `errorType`）字段，原样透传给调用方。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RemoteFaultKind {
    ExecutionError,
    RobotError,
    RobotWarning,
    /// 未识别的错误码（保留原始字符串）
    Other(String),
}

impl RemoteFaultKind {
    pub fn from_code(code: &str) -> Self {
        match code {
            "execution_error" => RemoteFaultKind::ExecutionError,
            "robot_error" => RemoteFaultKind::RobotError,
            "robot_warning" => RemoteFaultKind::RobotWarning,
            other => RemoteFaultKind::Other(other.to_string()),
        }
    }

    pub fn code(&self) -> &str {
        match self {
            RemoteFaultKind::ExecutionError => "execution_error",
            RemoteFaultKind::RobotError => "robot_error",
            RemoteFaultKind::RobotWarning => "robot_warning",
            RemoteFaultKind::Other(code) => code,
        }
    }

    /// 是否仅为警告（不代表执行失败）
    pub fn is_warning(&self) -> bool {
        matches!(self, RemoteFaultKind::RobotWarning)
    }
}

impl fmt::Display for RemoteFaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}
