//! 基于通道的事件观察者
//!
//! 把链路事件转发到有界 crossbeam 通道，由调用方在自己的线程中消费。
//! 通道满时丢弃事件而不是阻塞工作线程，丢弃数可通过 `dropped_events` 监控。
//! 接收端丢弃后观察者标记为失效，下一次分发时从链路上移除。
//!
//! ```rust
//! use armlink_driver::channel::EventChannel;
//! use armlink_driver::hooks::LinkObserver;
//! use std::sync::Arc;
//!
//! let (channel, rx) = EventChannel::new(256);
//! let dropped = channel.dropped_events().clone();
//! let observer = Arc::new(channel) as Arc<dyn LinkObserver>;
//!
//! std::thread::spawn(move || {
//!     while let Ok(event) = rx.recv() {
//!         println!("{event:?}");
//!     }
//! });
//! # let _ = (observer, dropped);
//! ```

use crate::events::LinkEvent;
use crate::hooks::LinkObserver;
use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

pub struct EventChannel {
    tx: Sender<LinkEvent>,
    dropped_events: Arc<AtomicU64>,
    delivered_events: Arc<AtomicU64>,
    /// 接收端已丢弃
    closed: AtomicBool,
}

impl EventChannel {
    /// 创建容量为 `capacity` 的事件通道
    #[must_use]
    pub fn new(capacity: usize) -> (Self, Receiver<LinkEvent>) {
        let (tx, rx) = bounded(capacity.max(1));
        let channel = Self {
            tx,
            dropped_events: Arc::new(AtomicU64::new(0)),
            delivered_events: Arc::new(AtomicU64::new(0)),
            closed: AtomicBool::new(false),
        };
        (channel, rx)
    }

    /// 因通道已满而丢弃的事件数
    #[must_use]
    pub fn dropped_events(&self) -> &Arc<AtomicU64> {
        &self.dropped_events
    }

    #[must_use]
    pub fn delivered_events(&self) -> &Arc<AtomicU64> {
        &self.delivered_events
    }
}

impl LinkObserver for EventChannel {
    fn on_event(&self, event: &LinkEvent) {
        match self.tx.try_send(event.clone()) {
            Ok(()) => {
                self.delivered_events.fetch_add(1, Ordering::Relaxed);
            },
            Err(TrySendError::Full(_)) => {
                self.dropped_events.fetch_add(1, Ordering::Relaxed);
            },
            Err(TrySendError::Disconnected(_)) => {
                self.closed.store(true, Ordering::Relaxed);
            },
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::ConnectionState;
    use std::time::Duration;

    fn state_event() -> LinkEvent {
        LinkEvent::StateChanged {
            from: ConnectionState::Connecting,
            to: ConnectionState::Connected,
        }
    }

    #[test]
    fn test_events_are_forwarded_in_order() {
        let (channel, rx) = EventChannel::new(8);
        channel.on_event(&state_event());
        channel.on_event(&LinkEvent::HeartbeatAck {
            rtt: Duration::from_millis(2),
        });

        assert!(matches!(rx.try_recv().unwrap(), LinkEvent::StateChanged { .. }));
        assert!(matches!(rx.try_recv().unwrap(), LinkEvent::HeartbeatAck { .. }));
        assert_eq!(channel.delivered_events().load(Ordering::Relaxed), 2);
    }

    #[test]
    fn test_full_channel_drops_instead_of_blocking() {
        let (channel, rx) = EventChannel::new(2);
        for _ in 0..5 {
            channel.on_event(&state_event());
        }
        assert_eq!(rx.len(), 2);
        assert_eq!(channel.dropped_events().load(Ordering::Relaxed), 3);
    }

    #[test]
    fn test_disconnected_receiver_marks_channel_closed() {
        let (channel, rx) = EventChannel::new(2);
        assert!(!channel.is_closed());
        drop(rx);
        channel.on_event(&state_event());
        assert_eq!(channel.dropped_events().load(Ordering::Relaxed), 0);
        assert!(channel.is_closed());
    }
}
