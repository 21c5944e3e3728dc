//! 内存 Mock 后端
//!
//! `MockTransport` 在进程内模拟服务端，无任何网络依赖。测试通过共享的
//! `MockServer` 句柄注入入站帧、断开连接、控制建连结果，并检查客户端发出的帧。

use crate::{CloseCode, Connection, EventSink, Transport, TransportError};
use armlink_protocol::{Envelope, InboundKind, OutboundKind};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::trace;

/// 建连行为
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenBehavior {
    /// 立即上报 `Opened`
    Accept,
    /// 立即上报 `Error`（模拟连接被拒绝）
    Refuse,
    /// 挂起，直到 `complete_pending_open` / `fail_pending_open`
    Hold,
}

struct ServerState {
    default_behavior: OpenBehavior,
    /// 一次性脚本，优先于默认行为
    scripted: VecDeque<OpenBehavior>,
    open_attempts: usize,
    next_conn_id: u64,
    active: Option<(u64, EventSink)>,
    pending: Option<(u64, EventSink)>,
    sent: Vec<String>,
    fail_sends: bool,
    heartbeat_replies: bool,
    close_codes: Vec<CloseCode>,
}

/// Mock 服务端句柄（可克隆，线程安全）
#[derive(Clone)]
pub struct MockServer {
    state: Arc<Mutex<ServerState>>,
}

impl Default for MockServer {
    fn default() -> Self {
        Self::new()
    }
}

impl MockServer {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(ServerState {
                default_behavior: OpenBehavior::Accept,
                scripted: VecDeque::new(),
                open_attempts: 0,
                next_conn_id: 0,
                active: None,
                pending: None,
                sent: Vec::new(),
                fail_sends: false,
                heartbeat_replies: false,
                close_codes: Vec::new(),
            })),
        }
    }

    /// 创建连接到本服务端的传输
    pub fn transport(&self) -> MockTransport {
        MockTransport {
            server: self.clone(),
        }
    }

    pub fn set_open_behavior(&self, behavior: OpenBehavior) {
        self.state.lock().default_behavior = behavior;
    }

    /// 为接下来的若干次建连指定行为（用完后回到默认行为）
    pub fn script_opens(&self, behaviors: impl IntoIterator<Item = OpenBehavior>) {
        self.state.lock().scripted.extend(behaviors);
    }

    /// 让后续的 `send` 失败
    pub fn set_fail_sends(&self, fail: bool) {
        self.state.lock().fail_sends = fail;
    }

    /// 自动应答 `heartbeat`
    pub fn set_heartbeat_replies(&self, enabled: bool) {
        self.state.lock().heartbeat_replies = enabled;
    }

    pub fn open_attempts(&self) -> usize {
        self.state.lock().open_attempts
    }

    pub fn is_connected(&self) -> bool {
        self.state.lock().active.is_some()
    }

    pub fn has_pending_open(&self) -> bool {
        self.state.lock().pending.is_some()
    }

    /// 客户端主动关闭时使用的关闭码
    pub fn close_codes(&self) -> Vec<CloseCode> {
        self.state.lock().close_codes.clone()
    }

    /// 客户端发出的原始帧
    pub fn sent_frames(&self) -> Vec<String> {
        self.state.lock().sent.clone()
    }

    /// 客户端发出的信封（无法解析的帧被跳过）
    pub fn sent_envelopes(&self) -> Vec<Envelope> {
        self.state
            .lock()
            .sent
            .iter()
            .filter_map(|raw| Envelope::decode(raw).ok())
            .collect()
    }

    /// 客户端发出的消息类型（按发送顺序）
    pub fn sent_types(&self) -> Vec<String> {
        self.sent_envelopes().into_iter().map(|e| e.kind).collect()
    }

    pub fn clear_sent(&self) {
        self.state.lock().sent.clear();
    }

    /// 向当前连接推送一帧原始文本
    ///
    /// 没有活动连接时返回 `false`。
    pub fn push_frame(&self, text: impl Into<String>) -> bool {
        let state = self.state.lock();
        match &state.active {
            Some((_, sink)) => sink.frame(text.into()),
            None => false,
        }
    }

    pub fn push_envelope(&self, envelope: &Envelope) -> bool {
        match envelope.encode() {
            Ok(text) => self.push_frame(text),
            Err(_) => false,
        }
    }

    /// 推送一条下行消息
    pub fn push_message(&self, kind: InboundKind, payload: Option<Value>) -> bool {
        let envelope = Envelope::outbound(kind.as_str(), payload, "srv");
        self.push_envelope(&envelope)
    }

    /// 推送一条对 `message_id` 的应答
    pub fn reply_to(&self, message_id: &str, kind: InboundKind, payload: Option<Value>) -> bool {
        let mut envelope = Envelope::outbound(kind.as_str(), payload, format!("re_{message_id}"));
        envelope.correlation_id = Some(message_id.to_string());
        self.push_envelope(&envelope)
    }

    /// 服务端断开当前连接（上报 `Closed`）
    pub fn drop_connection(&self, code: CloseCode, reason: &str) -> bool {
        let active = self.state.lock().active.take();
        match active {
            Some((_, sink)) => sink.closed(code, reason),
            None => false,
        }
    }

    /// 当前连接出现传输错误（上报 `Error`）
    pub fn fail_connection(&self, message: &str) -> bool {
        let active = self.state.lock().active.take();
        match active {
            Some((_, sink)) => sink.error(message),
            None => false,
        }
    }

    /// 完成挂起的建连
    pub fn complete_pending_open(&self) -> bool {
        let mut state = self.state.lock();
        match state.pending.take() {
            Some((id, sink)) => {
                let delivered = sink.opened();
                state.active = Some((id, sink));
                delivered
            },
            None => false,
        }
    }

    /// 让挂起的建连失败
    pub fn fail_pending_open(&self, message: &str) -> bool {
        let pending = self.state.lock().pending.take();
        match pending {
            Some((_, sink)) => sink.error(message),
            None => false,
        }
    }
}

/// Mock 传输
pub struct MockTransport {
    server: MockServer,
}

impl Transport for MockTransport {
    fn open(&mut self, url: &str, sink: EventSink) -> Result<Box<dyn Connection>, TransportError> {
        let mut state = self.server.state.lock();
        state.open_attempts += 1;
        state.next_conn_id += 1;
        let id = state.next_conn_id;

        let behavior = state
            .scripted
            .pop_front()
            .unwrap_or(state.default_behavior);
        trace!(url, id, ?behavior, "mock open");

        match behavior {
            OpenBehavior::Accept => {
                sink.opened();
                state.active = Some((id, sink));
            },
            OpenBehavior::Refuse => {
                sink.error(format!("connection refused: {url}"));
            },
            OpenBehavior::Hold => {
                state.pending = Some((id, sink));
            },
        }

        Ok(Box::new(MockConnection {
            id,
            server: self.server.clone(),
        }))
    }
}

struct MockConnection {
    id: u64,
    server: MockServer,
}

impl Connection for MockConnection {
    fn send(&mut self, text: String) -> Result<(), TransportError> {
        let mut state = self.server.state.lock();
        let sink = match &state.active {
            Some((id, sink)) if *id == self.id => sink.clone(),
            _ => return Err(TransportError::Closed),
        };
        if state.fail_sends {
            return Err(TransportError::Io("injected send failure".to_string()));
        }

        let heartbeat = if state.heartbeat_replies {
            Envelope::decode(&text)
                .ok()
                .filter(|e| e.outbound_kind() == Some(OutboundKind::Heartbeat))
        } else {
            None
        };
        state.sent.push(text);
        drop(state);

        if let Some(probe) = heartbeat {
            let mut reply = Envelope::outbound(
                InboundKind::HeartbeatResponse.as_str(),
                None,
                format!("re_{}", probe.message_id),
            );
            reply.correlation_id = Some(probe.message_id);
            if let Ok(text) = reply.encode() {
                sink.frame(text);
            }
        }
        Ok(())
    }

    fn close(&mut self, code: CloseCode, _reason: &str) {
        let mut state = self.server.state.lock();
        if matches!(&state.active, Some((id, _)) if *id == self.id) {
            state.active = None;
            state.close_codes.push(code);
        } else if matches!(&state.pending, Some((id, _)) if *id == self.id) {
            state.pending = None;
            state.close_codes.push(code);
        }
    }
}
