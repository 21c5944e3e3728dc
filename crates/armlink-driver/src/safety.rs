//! 遥测安全检查
//!
//! 每一帧遥测都与 `RobotConfig` 中的阈值比较：
//!
//! | 检查项 | 条件 | 严重程度 |
//! |--------|------|----------|
//! | 关节角度 | 超出 `joint_limits[i]`（闭区间外） | error |
//! | 关节温度 | `> max_temperature` | warning |
//! | 关节电流 | `> max_current[i]` | warning |
//!
//! 同一帧的所有违规都会上报。检查是纯函数，不修改配置，也不阻止命令发送；
//! 是否因 error 级违规而停机由调用方决定。

use crate::events::Severity;
use armlink_protocol::{RobotConfig, TelemetryFrame};
use std::fmt;
use std::sync::Arc;

/// 违规类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViolationKind {
    AngleLimit,
    Temperature,
    Current,
}

impl ViolationKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            ViolationKind::AngleLimit => "angle-limit",
            ViolationKind::Temperature => "temperature",
            ViolationKind::Current => "current",
        }
    }
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 一次安全违规
#[derive(Debug, Clone, PartialEq)]
pub struct SafetyViolation {
    pub joint_index: usize,
    pub kind: ViolationKind,
    pub severity: Severity,
    /// 实测值
    pub measured: f64,
    /// 被突破的阈值
    pub limit: f64,
    pub message: String,
}

/// 安全监视器
#[derive(Debug, Clone)]
pub struct SafetyMonitor {
    config: Arc<RobotConfig>,
}

impl SafetyMonitor {
    pub fn new(config: Arc<RobotConfig>) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RobotConfig {
        &self.config
    }

    pub fn evaluate(&self, frame: &TelemetryFrame) -> Vec<SafetyViolation> {
        evaluate(frame, &self.config)
    }
}

/// 检查一帧遥测
///
/// 只检查配置中有阈值的关节；帧里多出来的关节被忽略。
pub fn evaluate(frame: &TelemetryFrame, config: &RobotConfig) -> Vec<SafetyViolation> {
    let mut violations = Vec::new();

    for (i, (angle, limit)) in frame
        .joint_angles
        .iter()
        .zip(&config.joint_limits)
        .enumerate()
    {
        if !limit.contains(*angle) {
            let bound = if *angle > limit.max {
                limit.max
            } else {
                limit.min
            };
            violations.push(SafetyViolation {
                joint_index: i,
                kind: ViolationKind::AngleLimit,
                severity: Severity::Error,
                measured: *angle,
                limit: bound,
                message: format!(
                    "Joint {} angle {:.2}° outside [{:.2}, {:.2}]",
                    i + 1,
                    angle,
                    limit.min,
                    limit.max
                ),
            });
        }
    }

    for (i, temperature) in frame
        .joint_temperatures
        .iter()
        .take(config.joint_count())
        .enumerate()
    {
        if *temperature > config.max_temperature {
            violations.push(SafetyViolation {
                joint_index: i,
                kind: ViolationKind::Temperature,
                severity: Severity::Warning,
                measured: *temperature,
                limit: config.max_temperature,
                message: format!(
                    "Joint {} temperature {:.1}°C exceeds {:.1}°C",
                    i + 1,
                    temperature,
                    config.max_temperature
                ),
            });
        }
    }

    for (i, (current, max)) in frame.joint_currents.iter().zip(&config.max_current).enumerate() {
        if current > max {
            violations.push(SafetyViolation {
                joint_index: i,
                kind: ViolationKind::Current,
                severity: Severity::Warning,
                measured: *current,
                limit: *max,
                message: format!("Joint {} current {:.2}A exceeds {:.2}A", i + 1, current, max),
            });
        }
    }

    violations
}
