//! WebSocket 后端
//!
//! 每个连接独占一个 IO 线程：
//!
//! 1. 阻塞建立连接（握手），期间可被 `close()` 取消
//! 2. 设置短读超时后进入循环：先排空发送队列，再读一帧，如此往复
//!
//! 读超时决定了发送延迟的上限（默认 5ms），与入站帧的处理互不阻塞。
//!
//! 只支持明文 `ws://`：读超时只能设置在明文 TCP 流上，`wss://` 在 `open` 时被拒绝。

use crate::{CloseCode, Connection, EventSink, Transport, TransportError};
use crossbeam_channel::{Receiver, Sender, TryRecvError, bounded};
use std::borrow::Cow;
use std::io::ErrorKind;
use std::net::TcpStream;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;
use tracing::{debug, trace, warn};
use tungstenite::protocol::CloseFrame;
use tungstenite::protocol::frame::coding::CloseCode as WsCloseCode;
use tungstenite::stream::MaybeTlsStream;
use tungstenite::{Message, WebSocket};

/// 发送队列容量
const OUTBOUND_CAPACITY: usize = 256;

type Socket = WebSocket<MaybeTlsStream<TcpStream>>;

enum Outbound {
    Text(String),
    Close(CloseCode, String),
}

/// WebSocket 连接工厂
#[derive(Debug, Clone)]
pub struct WebSocketTransport {
    read_timeout: Duration,
}

impl WebSocketTransport {
    pub fn new() -> Self {
        Self {
            read_timeout: Duration::from_millis(5),
        }
    }

    /// 设置 IO 线程的读超时（同时也是发送轮询周期）
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout.max(Duration::from_millis(1));
        self
    }
}

impl Default for WebSocketTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for WebSocketTransport {
    fn open(&mut self, url: &str, sink: EventSink) -> Result<Box<dyn Connection>, TransportError> {
        if !url.starts_with("ws://") {
            return Err(TransportError::InvalidEndpoint(url.to_string()));
        }

        let (out_tx, out_rx) = bounded(OUTBOUND_CAPACITY);
        let cancelled = Arc::new(AtomicBool::new(false));
        let url = url.to_string();
        let read_timeout = self.read_timeout;
        let cancelled_io = cancelled.clone();

        thread::Builder::new()
            .name(format!("armlink-ws-{}", sink.generation()))
            .spawn(move || io_loop(&url, sink, out_rx, cancelled_io, read_timeout))
            .map_err(|e| TransportError::Io(e.to_string()))?;

        Ok(Box::new(WebSocketConnection { out_tx, cancelled }))
    }
}

struct WebSocketConnection {
    out_tx: Sender<Outbound>,
    cancelled: Arc<AtomicBool>,
}

impl Connection for WebSocketConnection {
    fn send(&mut self, text: String) -> Result<(), TransportError> {
        self.out_tx.try_send(Outbound::Text(text)).map_err(|e| {
            if e.is_full() {
                TransportError::Backpressure
            } else {
                TransportError::Closed
            }
        })
    }

    fn close(&mut self, code: CloseCode, reason: &str) {
        self.cancelled.store(true, Ordering::Release);
        let _ = self.out_tx.try_send(Outbound::Close(code, reason.to_string()));
    }
}

impl Drop for WebSocketConnection {
    fn drop(&mut self) {
        // IO 线程发现 cancelled 或发送端断开后自行退出
        self.cancelled.store(true, Ordering::Release);
    }
}

fn io_loop(
    url: &str,
    sink: EventSink,
    out_rx: Receiver<Outbound>,
    cancelled: Arc<AtomicBool>,
    read_timeout: Duration,
) {
    let mut socket = match tungstenite::connect(url) {
        Ok((socket, _response)) => socket,
        Err(e) => {
            if !cancelled.load(Ordering::Acquire) {
                sink.error(format!("connect {url}: {e}"));
            }
            return;
        },
    };

    if let Err(e) = set_read_timeout(&socket, read_timeout) {
        sink.error(format!("configure socket: {e}"));
        return;
    }

    if cancelled.load(Ordering::Acquire) {
        debug!(url, "connection cancelled during handshake");
        close_socket(&mut socket, CloseCode::INTENTIONAL, "cancelled");
        return;
    }

    if !sink.opened() {
        close_socket(&mut socket, CloseCode::GOING_AWAY, "owner gone");
        return;
    }

    loop {
        if drain_outbound(&mut socket, &out_rx, &sink) {
            return;
        }

        match socket.read() {
            Ok(Message::Text(text)) => {
                if !sink.frame(text) {
                    close_socket(&mut socket, CloseCode::GOING_AWAY, "owner gone");
                    return;
                }
            },
            Ok(Message::Binary(bytes)) => match String::from_utf8(bytes) {
                Ok(text) => {
                    sink.frame(text);
                },
                Err(_) => warn!("dropping non-UTF-8 binary frame"),
            },
            Ok(Message::Close(frame)) => {
                let (code, reason) = frame
                    .map(|f| (CloseCode(u16::from(f.code)), f.reason.into_owned()))
                    .unwrap_or((CloseCode::ABNORMAL, String::new()));
                sink.closed(code, reason);
                return;
            },
            Ok(_) => {
                // Ping/Pong 由 tungstenite 自动处理
            },
            Err(tungstenite::Error::Io(e))
                if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) =>
            {
                trace!("read timeout");
            },
            Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => {
                sink.closed(CloseCode::ABNORMAL, "connection closed");
                return;
            },
            Err(e) => {
                if !cancelled.load(Ordering::Acquire) {
                    sink.error(e.to_string());
                }
                return;
            },
        }
    }
}

/// 排空发送队列
///
/// 返回 `true` 表示连接已结束，IO 线程应退出。
fn drain_outbound(socket: &mut Socket, out_rx: &Receiver<Outbound>, sink: &EventSink) -> bool {
    loop {
        match out_rx.try_recv() {
            Ok(Outbound::Text(text)) => {
                if let Err(e) = socket.send(Message::Text(text)) {
                    sink.error(format!("send: {e}"));
                    return true;
                }
            },
            Ok(Outbound::Close(code, reason)) => {
                close_socket(socket, code, &reason);
                return true;
            },
            Err(TryRecvError::Empty) => return false,
            Err(TryRecvError::Disconnected) => {
                close_socket(socket, CloseCode::GOING_AWAY, "connection dropped");
                return true;
            },
        }
    }
}

fn close_socket(socket: &mut Socket, code: CloseCode, reason: &str) {
    let frame = CloseFrame {
        code: WsCloseCode::from(code.0),
        reason: Cow::Owned(reason.to_string()),
    };
    if let Err(e) = socket.close(Some(frame)) {
        debug!("close handshake failed: {e}");
        return;
    }
    // 尽量完成关闭握手，读到 ConnectionClosed 或出错即停止
    for _ in 0..8 {
        match socket.read() {
            Ok(_) => continue,
            Err(tungstenite::Error::Io(e))
                if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) =>
            {
                continue;
            },
            Err(_) => break,
        }
    }
}

fn set_read_timeout(socket: &Socket, timeout: Duration) -> std::io::Result<()> {
    match socket.get_ref() {
        MaybeTlsStream::Plain(stream) => stream.set_read_timeout(Some(timeout)),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_non_websocket_url() {
        let (tx, _rx) = crossbeam_channel::unbounded();
        let mut transport = WebSocketTransport::new();
        let result = transport.open("http://localhost:8000", EventSink::new(1, tx));
        assert!(matches!(result, Err(TransportError::InvalidEndpoint(_))));
    }

    #[test]
    fn test_rejects_tls_url() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let mut transport = WebSocketTransport::new();
        let result = transport.open("wss://robot.local/ws", EventSink::new(2, tx));
        assert!(matches!(result, Err(TransportError::InvalidEndpoint(_))));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_connect_refused_reports_error_event() {
        // 绑定后立即释放端口，确保无人监听
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let (tx, rx) = crossbeam_channel::unbounded();
        let mut transport = WebSocketTransport::new();
        let _conn = transport
            .open(&format!("ws://127.0.0.1:{port}/ws"), EventSink::new(3, tx))
            .unwrap();

        let signal = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(signal.generation, 3);
        assert!(matches!(signal.event, crate::TransportEvent::Error(_)));
    }
}
