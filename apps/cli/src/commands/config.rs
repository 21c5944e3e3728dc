//! 配置管理命令
//!
//! 配置文件为 TOML，包含 `[link]`（连接参数）和 `[robot]`（安全阈值）两张表。

use anyhow::{Context, Result};
use armlink_sdk::{LinkConfig, RobotConfig};
use clap::Subcommand;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// 默认配置文件路径：`<config_dir>/armlink/config.toml`
pub fn default_config_file() -> Result<PathBuf> {
    let mut path = dirs::config_dir().ok_or_else(|| anyhow::anyhow!("无法确定配置目录"))?;
    path.push("armlink");
    path.push("config.toml");
    Ok(path)
}

/// CLI 配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    pub link: LinkConfig,
    pub robot: RobotConfig,
}

impl CliConfig {
    /// 加载配置
    ///
    /// `path` 为 `None` 时使用默认路径；默认路径下文件不存在时返回默认配置。
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (path, explicit) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (default_config_file()?, false),
        };

        if !path.exists() {
            if explicit {
                anyhow::bail!("配置文件不存在: {}", path.display());
            }
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path)
            .with_context(|| format!("读取配置文件失败: {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("解析配置文件失败: {}", path.display()))
    }

    /// 解析并校验
    pub fn parse(content: &str) -> Result<Self> {
        let config: CliConfig = toml::from_str(content)?;
        config.link.validate()?;
        config.robot.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// 保存配置
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).context("创建配置目录失败")?;
        }
        let content = format!("# Armlink CLI Configuration\n\n{}", self.to_toml()?);
        fs::write(path, content).context("写入配置文件失败")?;
        Ok(())
    }
}

/// 配置命令
#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// 显示当前生效的配置
    Show,

    /// 写入默认配置文件
    Init {
        /// 覆盖已存在的文件
        #[arg(short, long)]
        force: bool,
    },
}

impl ConfigCommand {
    pub fn execute(self, path: Option<&Path>) -> Result<()> {
        match self {
            ConfigCommand::Show => Self::show_(path),
            ConfigCommand::Init { force } => Self::init_(path, force),
        }
    }

    fn show_(path: Option<&Path>) -> Result<()> {
        let config = CliConfig::load(path)?;
        print!("{}", config.to_toml()?);
        Ok(())
    }

    fn init_(path: Option<&Path>, force: bool) -> Result<()> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => default_config_file()?,
        };
        if path.exists() && !force {
            anyhow::bail!("配置文件已存在: {}（使用 --force 覆盖）", path.display());
        }

        CliConfig::default().save(&path)?;
        println!("✅ 已写入默认配置: {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_partial_config() {
        let config = CliConfig::parse(
            r#"
            [link]
            url = "ws://10.0.0.2:8000/ws/robot"
            maxReconnectAttempts = 8
            "#,
        )
        .unwrap();
        assert_eq!(config.link.url, "ws://10.0.0.2:8000/ws/robot");
        assert_eq!(config.link.max_reconnect_attempts, 8);
        assert_eq!(config.link.heartbeat_interval_ms, 30_000);
        assert_eq!(config.robot.joint_count(), 6);
    }

    #[test]
    fn test_parse_rejects_invalid_values() {
        let result = CliConfig::parse(
            r#"
            [link]
            reconnect_interval_ms = 0
            "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = CliConfig::default();
        config.link.url = "ws://robot.local/ws".to_string();
        config.link.subscriptions = vec!["robot_telemetry".to_string()];
        config.save(&path).unwrap();

        let loaded = CliConfig::load(Some(&path)).unwrap();
        assert_eq!(loaded.link, config.link);
        assert_eq!(loaded.robot, config.robot);
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(CliConfig::load(Some(&dir.path().join("absent.toml"))).is_err());
    }

    #[test]
    fn test_init_refuses_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        ConfigCommand::Init { force: false }
            .execute(Some(&path))
            .unwrap();
        assert!(
            ConfigCommand::Init { force: false }
                .execute(Some(&path))
                .is_err()
        );
        assert!(ConfigCommand::Init { force: true }.execute(Some(&path)).is_ok());
    }
}
