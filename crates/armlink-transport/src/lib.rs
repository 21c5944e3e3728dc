//! # Armlink Transport Layer
//!
//! 传输层抽象：一条双向的文本帧连接（open / send / receive / close / 断线通知）。
//!
//! # 事件模型
//!
//! `Transport::open` 立即返回一个 `Connection` 句柄，不阻塞调用方；
//! 连接结果和后续的入站帧全部通过 `EventSink` 异步上报：
//!
//! ```text
//! open() ──► Opened ──► Frame* ──► Closed | Error
//!        └─► Error（建立失败）
//! ```
//!
//! 每个连接恰好上报一次终止事件（`Closed` 或 `Error`）。
//! 每次 `open` 都带一个 generation 编号，上层据此丢弃已被取消的旧连接的事件。

use crossbeam_channel::Sender;
use thiserror::Error;

#[cfg(feature = "websocket")]
pub mod websocket;

#[cfg(feature = "websocket")]
pub use websocket::WebSocketTransport;

#[cfg(feature = "mock")]
pub mod mock;

#[cfg(feature = "mock")]
pub use mock::{MockServer, MockTransport, OpenBehavior};

/// 传输层统一错误类型
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),
    #[error("Connection failed: {0}")]
    Connect(String),
    #[error("Connection closed")]
    Closed,
    /// 发送缓冲区已满
    #[error("Send buffer full")]
    Backpressure,
    #[error("IO error: {0}")]
    Io(String),
}

/// WebSocket 风格的关闭码
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CloseCode(pub u16);

impl CloseCode {
    /// 主动关闭（用户调用 disconnect）
    pub const INTENTIONAL: CloseCode = CloseCode(1000);
    pub const GOING_AWAY: CloseCode = CloseCode(1001);
    /// 异常断开（无关闭帧）
    pub const ABNORMAL: CloseCode = CloseCode(1006);
}

/// 传输事件
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// 连接已建立
    Opened,
    /// 收到一帧文本
    Frame(String),
    /// 连接关闭（终止事件）
    Closed { code: CloseCode, reason: String },
    /// 传输错误（终止事件）
    Error(String),
}

/// 带 generation 的传输事件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportSignal {
    pub generation: u64,
    pub event: TransportEvent,
}

/// 传输事件上报端
///
/// 由上层为每次 `open` 创建，绑定该次连接的 generation。
#[derive(Debug, Clone)]
pub struct EventSink {
    generation: u64,
    tx: Sender<TransportSignal>,
}

impl EventSink {
    pub fn new(generation: u64, tx: Sender<TransportSignal>) -> Self {
        Self { generation, tx }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// 上报事件
    ///
    /// 返回 `false` 表示上层已退出，传输实现应停止工作。
    pub fn emit(&self, event: TransportEvent) -> bool {
        self.tx
            .send(TransportSignal {
                generation: self.generation,
                event,
            })
            .is_ok()
    }

    pub fn opened(&self) -> bool {
        self.emit(TransportEvent::Opened)
    }

    pub fn frame(&self, text: String) -> bool {
        self.emit(TransportEvent::Frame(text))
    }

    pub fn closed(&self, code: CloseCode, reason: impl Into<String>) -> bool {
        self.emit(TransportEvent::Closed {
            code,
            reason: reason.into(),
        })
    }

    pub fn error(&self, message: impl Into<String>) -> bool {
        self.emit(TransportEvent::Error(message.into()))
    }
}

/// 已打开（或正在打开）的连接句柄
pub trait Connection: Send {
    /// 发送一帧文本
    ///
    /// 不阻塞；失败时调用方负责重新排队。
    fn send(&mut self, text: String) -> Result<(), TransportError>;

    /// 关闭连接（正在建立中的连接会被取消）
    ///
    /// 关闭后不保证还会上报终止事件。
    fn close(&mut self, code: CloseCode, reason: &str);
}

/// 连接工厂
pub trait Transport: Send {
    /// 发起连接
    ///
    /// 只有端点本身非法时才同步返回错误；网络层面的失败通过 `sink` 上报 `Error`。
    fn open(&mut self, url: &str, sink: EventSink) -> Result<Box<dyn Connection>, TransportError>;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn open(&mut self, url: &str, sink: EventSink) -> Result<Box<dyn Connection>, TransportError> {
        (**self).open(url, sink)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_sink_tags_generation() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let sink = EventSink::new(7, tx);

        assert!(sink.opened());
        assert!(sink.frame("{}".to_string()));
        assert!(sink.closed(CloseCode::ABNORMAL, "gone"));

        let signals: Vec<_> = rx.try_iter().collect();
        assert_eq!(signals.len(), 3);
        assert!(signals.iter().all(|s| s.generation == 7));
        assert_eq!(signals[0].event, TransportEvent::Opened);
        assert_eq!(
            signals[2].event,
            TransportEvent::Closed {
                code: CloseCode(1006),
                reason: "gone".to_string()
            }
        );
    }

    #[test]
    fn test_event_sink_reports_dropped_receiver() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let sink = EventSink::new(1, tx);
        drop(rx);
        assert!(!sink.error("boom"));
    }

    #[test]
    fn test_transport_error_display() {
        assert_eq!(TransportError::Closed.to_string(), "Connection closed");
        assert!(
            TransportError::Connect("refused".into())
                .to_string()
                .contains("refused")
        );
    }
}
