//! # Armlink CLI
//!
//! Command-line interface for the armlink robot command and telemetry channel.
//!
//! ```bash
//! # 写入默认配置（<config_dir>/armlink/config.toml）
//! armlink-cli config init
//!
//! # 监控遥测与安全告警 30 秒
//! armlink-cli --url ws://192.168.1.20:8000/ws/robot monitor --duration 30
//!
//! # 发送命令并等待应答
//! armlink-cli send move_joint --payload '{"joint": 0, "angle": 45.0}' --wait
//!
//! # 急停
//! armlink-cli estop
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

mod commands;
mod utils;

use commands::{CliConfig, ConfigCommand, EstopCommand, MonitorCommand, SendCommand};

/// Armlink CLI - 机械臂实时通道命令行工具
#[derive(Parser, Debug)]
#[command(name = "armlink-cli")]
#[command(about = "Command-line interface for the armlink robot channel", long_about = None)]
#[command(version)]
struct Cli {
    /// 配置文件路径（默认 <config_dir>/armlink/config.toml）
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// 服务端地址（覆盖配置文件）
    #[arg(short, long, global = true)]
    url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// 配置管理
    #[command(subcommand)]
    Config(ConfigCommand),

    /// 监控遥测、安全告警和链路事件
    Monitor {
        #[command(flatten)]
        args: MonitorCommand,
    },

    /// 发送任意类型的消息
    Send {
        #[command(flatten)]
        args: SendCommand,
    },

    /// 急停
    Estop {
        #[command(flatten)]
        args: EstopCommand,
    },
}

/// 加载配置并应用命令行覆盖
fn load_config(path: Option<&Path>, url: Option<&str>) -> Result<CliConfig> {
    let mut config = CliConfig::load(path)?;
    if let Some(url) = url {
        config.link.url = url.to_string();
    }
    Ok(config)
}

fn main() -> Result<()> {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("armlink_cli=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    let path = cli.config.as_deref();
    let url = cli.url.as_deref();

    match cli.command {
        Commands::Config(cmd) => cmd.execute(path),

        Commands::Monitor { args } => {
            let config = load_config(path, url)?;
            args.execute(config.link, config.robot)
        },

        Commands::Send { args } => {
            let config = load_config(path, url)?;
            args.execute(config.link, config.robot)
        },

        Commands::Estop { args } => {
            let config = load_config(path, url)?;
            tracing::info!(url = %config.link.url, "emergency stop requested");
            args.execute(config.link, config.robot)
        },
    }
}
