//! 急停命令
//!
//! 通过实时通道发送 `emergency_stop`，并等待其真正发出。

use crate::utils::connect;
use anyhow::{Result, bail};
use armlink_sdk::prelude::*;
use clap::Args;
use std::time::{Duration, Instant};

/// 急停命令参数
#[derive(Args, Debug)]
pub struct EstopCommand {
    /// 连接超时（毫秒）
    #[arg(long, default_value_t = 3_000)]
    pub connect_timeout_ms: u64,
}

impl EstopCommand {
    pub fn execute(&self, config: LinkConfig, robot: RobotConfig) -> Result<()> {
        let link = connect(
            config,
            robot,
            Duration::from_millis(self.connect_timeout_ms),
        )?;

        println!("🛑 发送急停命令...");
        let before = link.metrics().frames_tx;
        let receipt = link.send(Command::EmergencyStop)?;

        let deadline = Instant::now() + Duration::from_secs(1);
        while link.metrics().frames_tx == before || link.queue_len() > 0 {
            if Instant::now() >= deadline {
                bail!("急停命令 {} 未能发出", receipt.message_id);
            }
            std::thread::sleep(Duration::from_millis(5));
        }

        println!("✅ 急停已发送 ({})", receipt.message_id);
        Ok(())
    }
}
