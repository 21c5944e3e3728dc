//! 遥测帧
//!
//! `RawTelemetry` 是线路上的原始形态（所有字段可缺省），
//! `TelemetryFrame` 是规范化后的不可变快照。
//!
//! # 规范化规则
//!
//! - 每个关节数组都对齐到期望的关节数（arity）
//! - 缺失的字段或缺失的尾部元素：优先取上一帧的值，否则为 0
//! - 多余的元素被截断
//! - 不做平滑/滤波，每一帧被接受后即为权威值

use crate::ProtocolError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 末端位置
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// 线路上的遥测负载
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawTelemetry {
    #[serde(default)]
    pub joint_angles: Option<Vec<f64>>,
    #[serde(default)]
    pub joint_velocities: Option<Vec<f64>>,
    #[serde(default)]
    pub joint_currents: Option<Vec<f64>>,
    #[serde(default)]
    pub joint_temperatures: Option<Vec<f64>>,
    #[serde(default)]
    pub end_effector_position: Option<Position3>,
    #[serde(default)]
    pub system_status: Option<String>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

impl RawTelemetry {
    /// 从 `robot_telemetry` 负载解析
    pub fn from_payload(payload: Option<&Value>) -> Result<Self, ProtocolError> {
        let payload = payload.ok_or(ProtocolError::MissingField("payload"))?;
        if !payload.is_object() {
            return Err(ProtocolError::InvalidPayload {
                kind: "robot_telemetry".to_string(),
                reason: "payload is not an object".to_string(),
            });
        }
        Ok(Self::deserialize(payload)?)
    }
}

/// 规范化遥测快照（创建后不再修改）
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryFrame {
    /// 关节角度（度）
    pub joint_angles: Vec<f64>,
    pub joint_velocities: Vec<f64>,
    /// 关节电流（A）
    pub joint_currents: Vec<f64>,
    /// 关节温度（℃）
    pub joint_temperatures: Vec<f64>,
    pub end_effector_position: Position3,
    pub system_status: String,
    pub timestamp: DateTime<Utc>,
}

impl TelemetryFrame {
    /// 全零帧
    pub fn zeroed(joints: usize, timestamp: DateTime<Utc>) -> Self {
        Self {
            joint_angles: vec![0.0; joints],
            joint_velocities: vec![0.0; joints],
            joint_currents: vec![0.0; joints],
            joint_temperatures: vec![0.0; joints],
            end_effector_position: Position3::default(),
            system_status: "unknown".to_string(),
            timestamp,
        }
    }

    /// 规范化原始遥测
    ///
    /// # 参数
    /// - `raw`: 原始负载
    /// - `previous`: 上一帧（用于补齐缺失字段）
    /// - `joints`: 期望的关节数
    /// - `fallback_ts`: 负载未携带时间戳时使用（通常是信封时间戳）
    pub fn normalize(
        raw: RawTelemetry,
        previous: Option<&TelemetryFrame>,
        joints: usize,
        fallback_ts: DateTime<Utc>,
    ) -> Self {
        let fill = |values: Option<Vec<f64>>, prev: Option<&Vec<f64>>| {
            align(values, prev.map(Vec::as_slice), joints)
        };

        Self {
            joint_angles: fill(raw.joint_angles, previous.map(|p| &p.joint_angles)),
            joint_velocities: fill(raw.joint_velocities, previous.map(|p| &p.joint_velocities)),
            joint_currents: fill(raw.joint_currents, previous.map(|p| &p.joint_currents)),
            joint_temperatures: fill(
                raw.joint_temperatures,
                previous.map(|p| &p.joint_temperatures),
            ),
            end_effector_position: raw
                .end_effector_position
                .or_else(|| previous.map(|p| p.end_effector_position))
                .unwrap_or_default(),
            system_status: raw
                .system_status
                .or_else(|| previous.map(|p| p.system_status.clone()))
                .unwrap_or_else(|| "unknown".to_string()),
            timestamp: raw.timestamp.unwrap_or(fallback_ts),
        }
    }

    pub fn joint_count(&self) -> usize {
        self.joint_angles.len()
    }
}

fn align(values: Option<Vec<f64>>, previous: Option<&[f64]>, joints: usize) -> Vec<f64> {
    let mut values = values.unwrap_or_default();
    values.truncate(joints);
    for i in values.len()..joints {
        values.push(previous.and_then(|p| p.get(i).copied()).unwrap_or(0.0));
    }
    values
}
