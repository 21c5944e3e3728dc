//! 发送命令
//!
//! 发送任意类型的消息，可选等待关联应答。

use crate::utils::connect;
use anyhow::{Context, Result};
use armlink_sdk::prelude::*;
use clap::Args;
use serde_json::Value;
use std::time::Duration;

/// 发送命令参数
#[derive(Args, Debug)]
pub struct SendCommand {
    /// 消息类型（如 request_telemetry、move_joint）
    pub kind: String,

    /// JSON 负载
    #[arg(short, long)]
    pub payload: Option<String>,

    /// 等待关联应答
    #[arg(short, long)]
    pub wait: bool,

    /// 等待应答的超时（毫秒）
    #[arg(long, default_value_t = 10_000)]
    pub timeout_ms: u64,
}

impl SendCommand {
    /// 解析负载
    pub fn command(&self) -> Result<Command> {
        let payload = self
            .payload
            .as_deref()
            .map(serde_json::from_str::<Value>)
            .transpose()
            .context("负载不是合法的 JSON")?;
        Ok(Command::Custom {
            kind: self.kind.clone(),
            payload,
        })
    }

    pub fn execute(&self, config: LinkConfig, robot: RobotConfig) -> Result<()> {
        let command = self.command()?;
        let link = connect(config, robot, Duration::from_secs(10))?;

        if self.wait {
            let timeout = Duration::from_millis(self.timeout_ms);
            let reply = link.request(command, timeout)?;
            println!("{}", serde_json::to_string_pretty(&reply)?);
        } else {
            let receipt = link.send(command)?;
            println!("✅ 已发送 {} ({})", self.kind, receipt.message_id);
        }
        Ok(())
    }
}
