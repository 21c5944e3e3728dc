//! HTTP 兜底路由
//!
//! 实时通道不可用时，命令改走调用方提供的请求/应答接口（通常是 HTTP）。
//! 本模块只定义边界：[`HttpSubmitter`] 由调用方实现，[`CommandRouter`] 负责选择通道。

use armlink_driver::{ConnectionManager, LinkError, SendReceipt};
use armlink_protocol::Command;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// 兜底提交失败
pub type SubmitError = Box<dyn std::error::Error + Send + Sync>;

/// 请求/应答式的兜底提交接口
pub trait HttpSubmitter: Send + Sync {
    /// 同步提交命令，返回服务端应答内容
    fn submit(&self, command: &Command) -> Result<Value, SubmitError>;
}

/// 路由错误
#[derive(Error, Debug)]
pub enum RouterError {
    #[error(transparent)]
    Link(#[from] LinkError),

    #[error("Fallback submission failed: {0}")]
    Fallback(#[source] SubmitError),
}

/// 命令实际走的通道
#[derive(Debug)]
pub enum Routed {
    /// 已交给实时通道
    Live(SendReceipt),
    /// 已经由兜底接口完成，附带应答内容
    Fallback(Value),
}

/// 在实时通道与兜底接口之间选择
pub struct CommandRouter {
    link: Arc<ConnectionManager>,
    submitter: Box<dyn HttpSubmitter>,
}

impl CommandRouter {
    pub fn new(link: Arc<ConnectionManager>, submitter: impl HttpSubmitter + 'static) -> Self {
        Self {
            link,
            submitter: Box::new(submitter),
        }
    }

    pub fn link(&self) -> &Arc<ConnectionManager> {
        &self.link
    }

    /// 实时通道可用时发送（不等待应答），否则同步走兜底接口
    pub fn dispatch(&self, command: Command) -> Result<Routed, RouterError> {
        if self.link.is_live_channel_available() {
            return Ok(Routed::Live(self.link.send(command)?));
        }
        debug!(kind = command.kind(), state = %self.link.state(), "live channel unavailable, using fallback");
        self.submitter
            .submit(&command)
            .map(Routed::Fallback)
            .map_err(RouterError::Fallback)
    }

    /// 请求/应答：实时通道可用时等待关联应答（最多 `timeout`），否则走兜底接口
    ///
    /// 返回应答的 payload（实时应答没有 payload 时为 `Value::Null`）。
    pub fn request(&self, command: Command, timeout: Duration) -> Result<Value, RouterError> {
        if self.link.is_live_channel_available() {
            let reply = self.link.request(command, timeout)?;
            return Ok(reply.payload.unwrap_or(Value::Null));
        }
        debug!(kind = command.kind(), "live channel unavailable, using fallback");
        self.submitter.submit(&command).map_err(RouterError::Fallback)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use armlink_driver::{ConnectionState, LinkBuilder};
    use armlink_protocol::InboundKind;
    use armlink_transport::MockServer;
    use serde_json::json;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSubmitter {
        submitted: Arc<Mutex<Vec<String>>>,
    }

    impl HttpSubmitter for RecordingSubmitter {
        fn submit(&self, command: &Command) -> Result<Value, SubmitError> {
            self.submitted.lock().unwrap().push(command.kind().to_string());
            Ok(json!({"via": "http"}))
        }
    }

    struct FailingSubmitter;

    impl HttpSubmitter for FailingSubmitter {
        fn submit(&self, _command: &Command) -> Result<Value, SubmitError> {
            Err("service unavailable".into())
        }
    }

    fn link(server: &MockServer) -> Arc<ConnectionManager> {
        Arc::new(
            LinkBuilder::new()
                .url("ws://mock/robot")
                .transport(server.transport())
                .build()
                .unwrap(),
        )
    }

    #[test]
    fn test_uses_fallback_when_disconnected() {
        let server = MockServer::new();
        let submitter = RecordingSubmitter::default();
        let submitted = submitter.submitted.clone();
        let router = CommandRouter::new(link(&server), submitter);

        let routed = router.dispatch(Command::EmergencyStop).unwrap();
        assert!(matches!(routed, Routed::Fallback(v) if v["via"] == "http"));
        assert_eq!(*submitted.lock().unwrap(), vec!["emergency_stop"]);
        assert_eq!(router.link().queue_len(), 0);
    }

    #[test]
    fn test_uses_live_channel_when_connected() {
        let server = MockServer::new();
        let submitter = RecordingSubmitter::default();
        let submitted = submitter.submitted.clone();
        let router = CommandRouter::new(link(&server), submitter);

        router.link().connect().unwrap();
        assert!(
            router
                .link()
                .wait_for_state(ConnectionState::Connected, Duration::from_secs(1))
        );

        let routed = router.dispatch(Command::RequestTelemetry).unwrap();
        assert!(matches!(routed, Routed::Live(_)));
        assert!(submitted.lock().unwrap().is_empty());
    }

    #[test]
    fn test_live_request_returns_reply_payload() {
        let server = MockServer::new();
        let router = CommandRouter::new(link(&server), RecordingSubmitter::default());
        router.link().connect().unwrap();
        assert!(
            router
                .link()
                .wait_for_state(ConnectionState::Connected, Duration::from_secs(1))
        );

        let responder = server.clone();
        let handle = std::thread::spawn(move || {
            for _ in 0..500 {
                if let Some(sent) = responder
                    .sent_envelopes()
                    .into_iter()
                    .find(|e| e.kind == "request_position")
                {
                    responder.reply_to(
                        &sent.message_id,
                        InboundKind::RobotStatus,
                        Some(json!({"position": [1.0, 2.0, 3.0]})),
                    );
                    return;
                }
                std::thread::sleep(Duration::from_millis(2));
            }
        });

        let payload = router
            .request(Command::RequestPosition, Duration::from_secs(1))
            .unwrap();
        handle.join().unwrap();
        assert_eq!(payload["position"], json!([1.0, 2.0, 3.0]));
    }

    #[test]
    fn test_fallback_error_is_reported() {
        let server = MockServer::new();
        let router = CommandRouter::new(link(&server), FailingSubmitter);
        let err = router
            .request(Command::ResetToHome, Duration::from_millis(100))
            .unwrap_err();
        assert!(matches!(err, RouterError::Fallback(_)));
        assert!(err.to_string().contains("service unavailable"));
    }
}
