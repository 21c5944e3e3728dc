//! 集成测试公共工具
//!
//! 所有测试都通过 `MockServer` 驱动完整的工作线程，定时参数缩短到毫秒级。

#![allow(dead_code)]

use armlink_sdk::prelude::*;
use armlink_sdk::transport::MockServer;
use crossbeam_channel::Receiver;
use std::time::{Duration, Instant};

/// 单个断言的最长等待时间
pub const WAIT: Duration = Duration::from_secs(2);

/// 毫秒级定时参数；心跳默认关闭（周期足够长）
pub fn fast_config() -> LinkConfig {
    LinkConfig {
        url: "ws://mock/robot".to_string(),
        reconnect_interval_ms: 20,
        max_reconnect_attempts: 3,
        max_reconnect_delay_ms: 500,
        heartbeat_interval_ms: 60_000,
        heartbeat_timeout_ms: 1_000,
        message_timeout_ms: 1_000,
        ..LinkConfig::default()
    }
}

pub struct Harness {
    pub server: MockServer,
    pub link: ConnectionManager,
    pub events: Receiver<LinkEvent>,
}

impl Harness {
    pub fn new(config: LinkConfig) -> Self {
        Self::with_robot(config, RobotConfig::default())
    }

    pub fn with_robot(config: LinkConfig, robot: RobotConfig) -> Self {
        let server = MockServer::new();
        let link = LinkBuilder::new()
            .config(config)
            .robot_config(robot)
            .transport(server.transport())
            .build()
            .expect("failed to build link");
        let events = link.events();
        Self {
            server,
            link,
            events,
        }
    }

    /// 连接并等待 Connected
    pub fn connected(config: LinkConfig) -> Self {
        let harness = Self::new(config);
        harness.link.connect().unwrap();
        assert!(
            harness
                .link
                .wait_for_state(ConnectionState::Connected, WAIT),
            "link did not connect"
        );
        harness
    }

    /// 等待第一个满足条件的事件（跳过其他事件）
    pub fn wait_event(&self, mut pred: impl FnMut(&LinkEvent) -> bool) -> Option<LinkEvent> {
        let deadline = Instant::now() + WAIT;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.events.recv_timeout(remaining) {
                Ok(event) if pred(&event) => return Some(event),
                Ok(_) => continue,
                Err(_) => return None,
            }
        }
    }

    /// 等待指定类别的故障
    pub fn wait_fault(&self, kind: FaultKind) -> Option<LinkFault> {
        match self.wait_event(|e| matches!(e, LinkEvent::Fault(f) if f.kind == kind))? {
            LinkEvent::Fault(fault) => Some(fault),
            _ => None,
        }
    }

    /// 收集 `window` 时间内的所有事件
    pub fn drain_for(&self, window: Duration) -> Vec<LinkEvent> {
        let deadline = Instant::now() + window;
        let mut events = Vec::new();
        while let Ok(event) = self
            .events
            .recv_timeout(deadline.saturating_duration_since(Instant::now()))
        {
            events.push(event);
        }
        events
    }
}

/// 轮询直到条件成立或超时
pub fn wait_until(mut f: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + WAIT;
    while Instant::now() < deadline {
        if f() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    f()
}
