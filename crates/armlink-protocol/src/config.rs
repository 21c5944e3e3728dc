//! 机器人安全阈值配置
//!
//! `RobotConfig` 在启动时由外部提供，运行期只读，仅作为安全检查的比较阈值。
//!
//! TOML 示例：
//!
//! ```toml
//! max_temperature = 60.0
//! max_current = [2.0, 2.0, 2.0]
//!
//! [[joint_limits]]
//! min = -150.0
//! max = 150.0
//!
//! [[joint_limits]]
//! min = -120.0
//! max = 120.0
//!
//! [[joint_limits]]
//! min = -90.0
//! max = 90.0
//! ```

use crate::ProtocolError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// 单关节角度限位（度，闭区间）
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct JointLimit {
    pub min: f64,
    pub max: f64,
}

impl JointLimit {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// 角度是否在限位内（含边界）
    pub fn contains(&self, angle: f64) -> bool {
        angle >= self.min && angle <= self.max
    }
}

/// 机器人配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RobotConfig {
    /// 关节角度限位，按关节顺序
    #[serde(alias = "jointLimits")]
    pub joint_limits: Vec<JointLimit>,

    /// 关节温度上限（℃，所有关节共用）
    #[serde(alias = "maxTemperature")]
    pub max_temperature: f64,

    /// 关节电流上限（A），按关节顺序
    #[serde(alias = "maxCurrent")]
    pub max_current: Vec<f64>,
}

impl Default for RobotConfig {
    /// 6 轴教学机械臂的默认阈值
    fn default() -> Self {
        Self {
            joint_limits: vec![
                JointLimit::new(-150.0, 150.0),
                JointLimit::new(-120.0, 120.0),
                JointLimit::new(-90.0, 90.0),
                JointLimit::new(-180.0, 180.0),
                JointLimit::new(-90.0, 90.0),
                JointLimit::new(-180.0, 180.0),
            ],
            max_temperature: 60.0,
            max_current: vec![2.0; 6],
        }
    }
}

impl RobotConfig {
    /// 关节数（以限位列表为准）
    pub fn joint_count(&self) -> usize {
        self.joint_limits.len()
    }

    pub fn validate(&self) -> Result<(), ProtocolError> {
        if self.joint_limits.is_empty() {
            return Err(ProtocolError::InvalidConfig(
                "joint_limits must not be empty".to_string(),
            ));
        }
        if let Some((i, limit)) = self
            .joint_limits
            .iter()
            .enumerate()
            .find(|(_, limit)| limit.min > limit.max)
        {
            return Err(ProtocolError::InvalidConfig(format!(
                "joint {i}: min {} > max {}",
                limit.min, limit.max
            )));
        }
        if self.max_current.len() != self.joint_limits.len() {
            return Err(ProtocolError::InvalidConfig(format!(
                "max_current has {} entries, expected {}",
                self.max_current.len(),
                self.joint_limits.len()
            )));
        }
        if !self.max_temperature.is_finite() {
            return Err(ProtocolError::InvalidConfig(
                "max_temperature must be finite".to_string(),
            ));
        }
        Ok(())
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ProtocolError> {
        let config: RobotConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ProtocolError> {
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        let config = RobotConfig::default();
        config.validate().unwrap();
        assert_eq!(config.joint_count(), 6);
        assert_eq!(config.max_current.len(), 6);
    }

    #[test]
    fn test_joint_limit_inclusive() {
        let limit = JointLimit::new(-90.0, 90.0);
        assert!(limit.contains(90.0));
        assert!(limit.contains(-90.0));
        assert!(!limit.contains(90.01));
    }

    #[test]
    fn test_validate_rejects_inverted_limit() {
        let config = RobotConfig {
            joint_limits: vec![JointLimit::new(10.0, -10.0)],
            max_temperature: 60.0,
            max_current: vec![1.0],
        };
        assert!(matches!(
            config.validate(),
            Err(ProtocolError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_validate_rejects_current_length_mismatch() {
        let config = RobotConfig {
            max_current: vec![1.0],
            ..RobotConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_toml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
max_temperature = 55.0
max_current = [1.5, 1.5]

[[joint_limits]]
min = -150.0
max = 150.0

[[joint_limits]]
min = -120.0
max = 120.0
"#
        )
        .unwrap();

        let config = RobotConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.joint_count(), 2);
        assert_eq!(config.max_temperature, 55.0);
        assert_eq!(config.joint_limits[1], JointLimit::new(-120.0, 120.0));
    }

    #[test]
    fn test_camel_case_aliases() {
        let config: RobotConfig = serde_json::from_str(
            r#"{"jointLimits":[{"min":-1,"max":1}],"maxTemperature":50,"maxCurrent":[3]}"#,
        )
        .unwrap();
        assert_eq!(config.max_temperature, 50.0);
        assert_eq!(config.max_current, vec![3.0]);
    }
}
