//! 连接生命周期集成测试
//!
//! 覆盖指数退避重连、重连次数耗尽、主动断开后不再重连。

mod common;

use armlink_sdk::prelude::*;
use armlink_sdk::transport::{CloseCode, OpenBehavior};
use common::{Harness, WAIT, fast_config, wait_until};
use serial_test::serial;
use std::time::{Duration, Instant};

/// 每次断线后的重连延迟依次为 base、2·base、4·base，耗尽后进入 Error
#[test]
#[serial]
fn test_backoff_then_connection_failed() {
    let h = Harness::new(fast_config());
    h.server.set_open_behavior(OpenBehavior::Refuse);

    let started = Instant::now();
    h.link.connect().unwrap();

    let mut delays = Vec::new();
    let failed = h.wait_event(|e| match e {
        LinkEvent::ReconnectScheduled { attempt, delay } => {
            delays.push((*attempt, *delay));
            false
        },
        LinkEvent::Fault(f) => f.kind == FaultKind::ConnectionFailed,
        _ => false,
    });
    let elapsed = started.elapsed();

    let fault = match failed {
        Some(LinkEvent::Fault(fault)) => fault,
        other => panic!("expected connection_failed, got {other:?}"),
    };
    assert_eq!(fault.severity, Severity::Error);
    assert_eq!(
        delays,
        vec![
            (1, Duration::from_millis(20)),
            (2, Duration::from_millis(40)),
            (3, Duration::from_millis(80)),
        ]
    );
    assert!(elapsed >= Duration::from_millis(140), "gave up too early: {elapsed:?}");

    assert!(h.link.wait_for_state(ConnectionState::Error, WAIT));
    // 首次连接 + 3 次重连
    assert_eq!(h.server.open_attempts(), 4);
    assert_eq!(h.link.metrics().reconnect_attempts, 3);

    // Error 状态下不再自动重连
    std::thread::sleep(Duration::from_millis(100));
    assert_eq!(h.server.open_attempts(), 4);
}

#[test]
#[serial]
fn test_explicit_connect_after_failure_resets_attempts() {
    let h = Harness::new(fast_config());
    h.server.set_open_behavior(OpenBehavior::Refuse);
    h.link.connect().unwrap();
    assert!(h.link.wait_for_state(ConnectionState::Error, WAIT));

    h.server.set_open_behavior(OpenBehavior::Accept);
    h.link.connect().unwrap();
    assert!(h.link.wait_for_state(ConnectionState::Connected, WAIT));
    assert_eq!(h.link.reconnect_attempt(), 0);
}

#[test]
#[serial]
fn test_server_close_triggers_reconnect() {
    let h = Harness::connected(fast_config());

    assert!(h.server.drop_connection(CloseCode::GOING_AWAY, "server restart"));
    let scheduled = h.wait_event(|e| matches!(e, LinkEvent::ReconnectScheduled { .. }));
    assert!(matches!(
        scheduled,
        Some(LinkEvent::ReconnectScheduled { attempt: 1, .. })
    ));

    assert!(wait_until(|| h.server.open_attempts() == 2));
    assert!(h.link.wait_for_state(ConnectionState::Connected, WAIT));
    assert_eq!(h.link.reconnect_attempt(), 0);
}

#[test]
#[serial]
fn test_transport_error_triggers_reconnect() {
    let h = Harness::connected(fast_config());
    assert!(h.server.fail_connection("connection reset by peer"));

    let fault = h.wait_fault(FaultKind::ConnectionError).unwrap();
    assert!(fault.message.contains("connection reset"));
    assert!(wait_until(|| h.server.open_attempts() == 2));
    assert!(h.link.wait_for_state(ConnectionState::Connected, WAIT));
}

/// 连接建立过程中主动断开：挂起的连接被取消，之后不再重连
#[test]
#[serial]
fn test_disconnect_while_connecting_cancels_attempt() {
    let h = Harness::new(fast_config());
    h.server.set_open_behavior(OpenBehavior::Hold);

    h.link.connect().unwrap();
    assert!(h.link.wait_for_state(ConnectionState::Connecting, WAIT));
    assert!(wait_until(|| h.server.has_pending_open()));

    h.link.disconnect().unwrap();
    assert!(h.link.wait_for_state(ConnectionState::Disconnected, WAIT));
    assert!(wait_until(|| !h.server.has_pending_open()));
    assert_eq!(h.server.close_codes(), vec![CloseCode::INTENTIONAL]);

    std::thread::sleep(Duration::from_millis(150));
    assert_eq!(h.server.open_attempts(), 1);
    assert_eq!(h.link.state(), ConnectionState::Disconnected);
}

/// 退避等待期间主动断开：已排期的重连被取消
#[test]
#[serial]
fn test_disconnect_cancels_scheduled_reconnect() {
    let config = LinkConfig {
        reconnect_interval_ms: 100,
        ..fast_config()
    };
    let h = Harness::new(config);
    h.server.script_opens([OpenBehavior::Refuse]);

    h.link.connect().unwrap();
    assert!(
        h.wait_event(|e| matches!(e, LinkEvent::ReconnectScheduled { .. }))
            .is_some()
    );
    h.link.disconnect().unwrap();

    std::thread::sleep(Duration::from_millis(250));
    assert_eq!(h.server.open_attempts(), 1);
    assert_eq!(h.link.state(), ConnectionState::Disconnected);
}

/// 主动断开不产生断线故障，也不排期重连
#[test]
#[serial]
fn test_manual_disconnect_is_not_reported_as_loss() {
    let h = Harness::connected(fast_config());
    h.link.disconnect().unwrap();
    assert!(h.link.wait_for_state(ConnectionState::Disconnected, WAIT));

    let events = h.drain_for(Duration::from_millis(150));
    assert!(
        !events.iter().any(|e| matches!(
            e,
            LinkEvent::ReconnectScheduled { .. } | LinkEvent::Fault(_)
        )),
        "{events:?}"
    );
    assert_eq!(h.server.open_attempts(), 1);
}

#[test]
#[serial]
fn test_connect_while_connected_is_noop() {
    let h = Harness::connected(fast_config());
    h.link.connect().unwrap();
    h.link.connect().unwrap();
    std::thread::sleep(Duration::from_millis(50));
    assert_eq!(h.server.open_attempts(), 1);
    assert_eq!(h.link.state(), ConnectionState::Connected);
}
