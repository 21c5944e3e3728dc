//! 监控命令
//!
//! 持续打印遥测、安全告警和链路事件，直到 Ctrl-C 或达到 `--duration`。

use crate::utils::{connect, describe};
use anyhow::{Context, Result};
use armlink_sdk::prelude::*;
use clap::Args;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// 监控命令参数
#[derive(Args, Debug)]
pub struct MonitorCommand {
    /// 监控时长（秒），默认一直运行
    #[arg(short, long)]
    pub duration: Option<u64>,

    /// 只显示告警和故障
    #[arg(long)]
    pub alerts_only: bool,

    /// 额外订阅的消息类型
    #[arg(short, long, value_delimiter = ',', default_value = "robot_telemetry")]
    pub subscribe: Vec<String>,
}

impl MonitorCommand {
    pub fn execute(&self, config: LinkConfig, robot: RobotConfig) -> Result<()> {
        let running = Arc::new(AtomicBool::new(true));
        let r = running.clone();
        ctrlc::set_handler(move || {
            r.store(false, Ordering::SeqCst);
        })
        .context("安装 Ctrl-C 处理器失败")?;

        let link = connect(config, robot, Duration::from_secs(10))?;
        let events = link.events();
        link.subscribe(self.subscribe.iter().cloned())?;
        println!("📡 监控中（Ctrl-C 退出）");

        let deadline = self.duration.map(|s| Instant::now() + Duration::from_secs(s));
        let mut telemetry_frames = 0u64;
        let mut alerts = 0u64;

        while running.load(Ordering::SeqCst) {
            if deadline.is_some_and(|d| Instant::now() >= d) {
                break;
            }
            let Ok(event) = events.recv_timeout(Duration::from_millis(100)) else {
                continue;
            };

            let is_alert = matches!(
                event,
                LinkEvent::Safety(_) | LinkEvent::Fault(_) | LinkEvent::Remote(_)
            );
            if is_alert {
                alerts += 1;
            }
            if matches!(event, LinkEvent::Telemetry(_)) {
                telemetry_frames += 1;
            }
            if is_alert || !self.alerts_only {
                println!("{}", describe(&event));
            }
        }

        let metrics = link.metrics();
        println!();
        println!("📊 遥测帧: {telemetry_frames}  告警: {alerts}");
        println!(
            "   rx={} tx={} parse_errors={} reconnects={}",
            metrics.frames_rx, metrics.frames_tx, metrics.parse_errors, metrics.reconnect_attempts
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monitor_command_creation() {
        let cmd = MonitorCommand {
            duration: Some(5),
            alerts_only: true,
            subscribe: vec!["robot_telemetry".to_string()],
        };
        assert_eq!(cmd.duration, Some(5));
        assert!(cmd.alerts_only);
    }
}
