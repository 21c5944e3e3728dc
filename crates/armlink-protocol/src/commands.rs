//! 上行命令构建
//!
//! 每个变体对应一个上行消息类型及其负载结构。

use crate::envelope::Envelope;
use crate::kinds::OutboundKind;
use serde_json::{Value, json};

/// 上行命令
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// 执行用户代码
    ExecuteCode { code: String, language: String },
    RequestTelemetry,
    RequestPosition,
    /// 单关节运动（角度单位：度）
    MoveJoint {
        joint: usize,
        angle: f64,
        speed: Option<f64>,
    },
    /// 末端运动到目标位置
    MoveToPosition {
        x: f64,
        y: f64,
        z: f64,
        speed: Option<f64>,
    },
    EmergencyStop,
    StartCalibration,
    ResetToHome,
    Heartbeat,
    Subscribe { message_types: Vec<String> },
    Unsubscribe { message_types: Vec<String> },
    /// 任意类型（用于协议扩展或调试）
    Custom {
        kind: String,
        payload: Option<Value>,
    },
}

impl Command {
    /// 线路上的类型字符串
    pub fn kind(&self) -> &str {
        match self {
            Command::ExecuteCode { .. } => OutboundKind::ExecuteCode.as_str(),
            Command::RequestTelemetry => OutboundKind::RequestTelemetry.as_str(),
            Command::RequestPosition => OutboundKind::RequestPosition.as_str(),
            Command::MoveJoint { .. } => OutboundKind::MoveJoint.as_str(),
            Command::MoveToPosition { .. } => OutboundKind::MoveToPosition.as_str(),
            Command::EmergencyStop => OutboundKind::EmergencyStop.as_str(),
            Command::StartCalibration => OutboundKind::StartCalibration.as_str(),
            Command::ResetToHome => OutboundKind::ResetToHome.as_str(),
            Command::Heartbeat => OutboundKind::Heartbeat.as_str(),
            Command::Subscribe { .. } => OutboundKind::Subscribe.as_str(),
            Command::Unsubscribe { .. } => OutboundKind::Unsubscribe.as_str(),
            Command::Custom { kind, .. } => kind,
        }
    }

    pub fn payload(&self) -> Option<Value> {
        match self {
            Command::ExecuteCode { code, language } => {
                Some(json!({ "code": code, "language": language }))
            },
            Command::MoveJoint {
                joint,
                angle,
                speed,
            } => Some(with_speed(json!({ "joint": joint, "angle": angle }), *speed)),
            Command::MoveToPosition { x, y, z, speed } => {
                Some(with_speed(json!({ "x": x, "y": y, "z": z }), *speed))
            },
            Command::Subscribe { message_types } | Command::Unsubscribe { message_types } => {
                Some(json!({ "messageTypes": message_types }))
            },
            Command::Custom { payload, .. } => payload.clone(),
            Command::RequestTelemetry
            | Command::RequestPosition
            | Command::EmergencyStop
            | Command::StartCalibration
            | Command::ResetToHome
            | Command::Heartbeat => None,
        }
    }

    /// 封装为带 ID 的信封（时间戳取当前时间）
    pub fn into_envelope(self, message_id: impl Into<String>) -> Envelope {
        let payload = self.payload();
        Envelope::outbound(self.kind(), payload, message_id)
    }
}

fn with_speed(mut value: Value, speed: Option<f64>) -> Value {
    if let (Some(speed), Some(object)) = (speed, value.as_object_mut()) {
        object.insert("speed".to_string(), json!(speed));
    }
    value
}
