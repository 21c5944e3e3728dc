//! 命令共用工具

use anyhow::{Result, bail};
use armlink_sdk::prelude::*;
use std::time::Duration;

/// 建立链路并等待连接成功
pub fn connect(config: LinkConfig, robot: RobotConfig, timeout: Duration) -> Result<ConnectionManager> {
    let url = config.url.clone();
    let link = LinkBuilder::new().config(config).robot_config(robot).build()?;

    println!("🔌 连接到 {url} ...");
    link.connect()?;
    if !link.wait_for_state(ConnectionState::Connected, timeout) {
        bail!("{:?} 内未能连接到 {url}（当前状态: {}）", timeout, link.state());
    }
    Ok(link)
}

/// 事件的单行描述
pub fn describe(event: &LinkEvent) -> String {
    match event {
        LinkEvent::StateChanged { from, to } => format!("state    {from} -> {to}"),
        LinkEvent::Fault(fault) => format!("fault    {fault}"),
        LinkEvent::Remote(fault) => format!("remote   [{}] {}", fault.kind, fault.message),
        LinkEvent::Telemetry(frame) => format!(
            "telemetry status={} angles={:?}",
            frame.system_status, frame.joint_angles
        ),
        LinkEvent::Safety(v) => format!(
            "safety   [{}] joint {} {} (measured {:.2}, limit {:.2})",
            v.severity, v.joint_index, v.kind, v.measured, v.limit
        ),
        LinkEvent::Message(envelope) => format!(
            "message  {} {}",
            envelope.kind,
            envelope
                .payload
                .as_ref()
                .map(|p| p.to_string())
                .unwrap_or_default()
        ),
        LinkEvent::ReconnectScheduled { attempt, delay } => {
            format!("reconnect attempt {attempt} in {delay:?}")
        },
        LinkEvent::HeartbeatAck { rtt } => format!("heartbeat rtt={rtt:?}"),
    }
}
