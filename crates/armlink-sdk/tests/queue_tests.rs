//! 离线队列集成测试
//!
//! 断线期间发出的命令在下一次连接成功、订阅重新声明之后按原顺序发出。

mod common;

use armlink_sdk::prelude::*;
use armlink_sdk::transport::{CloseCode, OpenBehavior};
use common::{Harness, WAIT, fast_config, wait_until};
use serde_json::json;
use serial_test::serial;
use std::time::Duration;

fn move_joint(joint: usize, angle: f64) -> Command {
    Command::MoveJoint {
        joint,
        angle,
        speed: None,
    }
}

#[test]
#[serial]
fn test_queued_commands_follow_subscription_reassertion() {
    let config = LinkConfig {
        subscriptions: vec!["robot_telemetry".into(), "execution_result".into()],
        ..fast_config()
    };
    let h = Harness::new(config);

    let first = h.link.send(move_joint(0, 10.0)).unwrap();
    let second = h.link.send(Command::EmergencyStop).unwrap();
    assert!(wait_until(|| h.link.queue_len() == 2));
    assert!(h.server.sent_frames().is_empty());

    h.link.connect().unwrap();
    assert!(wait_until(|| h.server.sent_frames().len() == 3));

    let sent = h.server.sent_envelopes();
    assert_eq!(
        sent.iter().map(|e| e.kind.as_str()).collect::<Vec<_>>(),
        vec!["subscribe", "move_joint", "emergency_stop"]
    );
    assert_eq!(
        sent[0].payload,
        Some(json!({"messageTypes": ["execution_result", "robot_telemetry"]}))
    );
    assert_eq!(sent[1].message_id, first.message_id);
    assert_eq!(sent[2].message_id, second.message_id);
    assert_eq!(h.link.queue_len(), 0);
}

#[test]
#[serial]
fn test_commands_sent_during_outage_are_flushed_after_reconnect() {
    let config = LinkConfig {
        reconnect_interval_ms: 80,
        subscriptions: vec!["robot_telemetry".into()],
        ..fast_config()
    };
    let h = Harness::connected(config);
    assert!(wait_until(|| h.server.sent_types() == vec!["subscribe"]));
    h.server.clear_sent();

    h.server.drop_connection(CloseCode::ABNORMAL, "network down");
    assert!(h.link.wait_for_state(ConnectionState::Disconnected, WAIT));
    for angle in [1.0, 2.0, 3.0] {
        h.link.send(move_joint(2, angle)).unwrap();
    }

    assert!(h.link.wait_for_state(ConnectionState::Connected, WAIT));
    assert!(wait_until(|| h.server.sent_frames().len() == 4));
    let sent = h.server.sent_envelopes();
    assert_eq!(sent[0].kind, "subscribe");
    let angles: Vec<f64> = sent[1..]
        .iter()
        .map(|e| e.payload.as_ref().unwrap()["angle"].as_f64().unwrap())
        .collect();
    assert_eq!(angles, vec![1.0, 2.0, 3.0]);
}

/// flush 中途发送失败：失败的命令和其后的命令保持顺序留在队列
#[test]
#[serial]
fn test_failed_flush_keeps_remaining_commands() {
    let h = Harness::new(fast_config());
    h.server.set_open_behavior(OpenBehavior::Hold);

    let a = h.link.send(move_joint(0, 1.0)).unwrap();
    let b = h.link.send(move_joint(0, 2.0)).unwrap();
    h.link.connect().unwrap();
    assert!(wait_until(|| h.server.has_pending_open()));

    h.server.set_fail_sends(true);
    h.server.complete_pending_open();
    let fault = h.wait_fault(FaultKind::SendError).unwrap();
    assert_eq!(fault.message_id.as_deref(), Some(a.message_id.as_str()));
    assert_eq!(h.link.queue_len(), 2);

    h.server.set_fail_sends(false);
    let c = h.link.send(move_joint(0, 3.0)).unwrap();
    assert!(wait_until(|| h.server.sent_frames().len() == 3));

    let ids: Vec<String> = h
        .server
        .sent_envelopes()
        .into_iter()
        .map(|e| e.message_id)
        .collect();
    assert_eq!(ids, vec![a.message_id, b.message_id, c.message_id]);
    assert!(wait_until(|| h.link.queue_len() == 0));
}

/// 达到上限时淘汰最旧的命令，其等待方收到取消
#[test]
#[serial]
fn test_queue_cap_evicts_oldest() {
    let config = LinkConfig {
        max_queue_len: Some(2),
        ..fast_config()
    };
    let h = Harness::new(config);

    let oldest = h
        .link
        .send_with(move_joint(1, 5.0), SendOptions::expect_response(None))
        .unwrap();
    h.link.send(move_joint(1, 6.0)).unwrap();
    h.link.send(move_joint(1, 7.0)).unwrap();

    let fault = h.wait_fault(FaultKind::QueueOverflow).unwrap();
    assert_eq!(fault.severity, Severity::Warning);
    assert_eq!(fault.message_id.as_deref(), Some(oldest.message_id.as_str()));

    let result = oldest.reply.unwrap().wait_timeout(WAIT);
    assert!(matches!(result, Err(LinkError::Cancelled { .. })));
    assert_eq!(h.link.queue_len(), 2);
    assert_eq!(h.link.metrics().queue_evictions, 1);
}

#[test]
#[serial]
fn test_clear_queue_and_disconnect_drop_pending_commands() {
    let h = Harness::new(fast_config());
    h.link.send(Command::StartCalibration).unwrap();
    h.link.send(Command::ResetToHome).unwrap();
    assert!(wait_until(|| h.link.queue_len() == 2));

    h.link.clear_queue().unwrap();
    assert!(wait_until(|| h.link.queue_len() == 0));

    h.link.send(Command::RequestTelemetry).unwrap();
    h.link.disconnect().unwrap();
    assert!(wait_until(|| h.link.queue_len() == 0));

    h.link.connect().unwrap();
    assert!(h.link.wait_for_state(ConnectionState::Connected, WAIT));
    std::thread::sleep(Duration::from_millis(30));
    assert!(h.server.sent_frames().is_empty());
}

/// 已连接时发送失败的命令在重试间隔后自动重发，不依赖后续调用
#[test]
#[serial]
fn test_failed_send_retried_while_connected() {
    let h = Harness::connected(fast_config());
    h.server.set_fail_sends(true);

    let stop = h.link.send(Command::EmergencyStop).unwrap();
    let fault = h.wait_fault(FaultKind::SendError).unwrap();
    assert_eq!(fault.message_id.as_deref(), Some(stop.message_id.as_str()));
    assert_eq!(h.link.queue_len(), 1);

    h.server.set_fail_sends(false);
    assert!(wait_until(|| h.server.sent_types() == vec!["emergency_stop"]));
    assert_eq!(h.server.sent_envelopes()[0].message_id, stop.message_id);
    assert!(wait_until(|| h.link.queue_len() == 0));
    assert_eq!(h.link.state(), ConnectionState::Connected);
}
