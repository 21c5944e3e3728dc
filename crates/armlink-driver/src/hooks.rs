//! 观察者系统
//!
//! 链路事件按类别分发给任意数量的观察者。同一类别内的事件按发生顺序交付；
//! 不同类别之间不保证相对顺序。
//!
//! # 使用示例
//!
//! ```rust
//! use armlink_driver::hooks::{LinkObserver, ObserverRegistry};
//! use armlink_driver::{LinkFault, SafetyViolation};
//! use std::sync::Arc;
//!
//! struct Printer;
//!
//! impl LinkObserver for Printer {
//!     fn on_fault(&self, fault: &LinkFault) {
//!         eprintln!("{fault}");
//!     }
//!
//!     fn on_safety_violation(&self, violation: &SafetyViolation) {
//!         eprintln!("{}", violation.message);
//!     }
//! }
//!
//! let mut registry = ObserverRegistry::new();
//! registry.add(Arc::new(Printer));
//! assert_eq!(registry.len(), 1);
//! ```

use crate::events::{LinkEvent, LinkFault, RemoteFault};
use crate::safety::SafetyViolation;
use crate::state::ConnectionState;
use armlink_protocol::{Envelope, TelemetryFrame};
use std::sync::Arc;
use std::time::Duration;

/// 链路观察者
///
/// 所有方法都在工作线程上调用，必须快速返回；耗时处理请转发到其他线程
/// （参见 [`EventChannel`](crate::channel::EventChannel)）。
///
/// 每个类别一个方法，默认空实现，只需覆盖关心的类别。
pub trait LinkObserver: Send + Sync {
    /// 所有事件的入口，默认按类别分发到下面的方法
    fn on_event(&self, event: &LinkEvent) {
        match event {
            LinkEvent::StateChanged { from, to } => self.on_state_changed(*from, *to),
            LinkEvent::Fault(fault) => self.on_fault(fault),
            LinkEvent::Remote(fault) => self.on_remote_fault(fault),
            LinkEvent::Telemetry(frame) => self.on_telemetry(frame),
            LinkEvent::Safety(violation) => self.on_safety_violation(violation),
            LinkEvent::Message(envelope) => self.on_message(envelope),
            LinkEvent::ReconnectScheduled { attempt, delay } => {
                self.on_reconnect_scheduled(*attempt, *delay)
            },
            LinkEvent::HeartbeatAck { rtt } => self.on_heartbeat_ack(*rtt),
        }
    }

    fn on_state_changed(&self, from: ConnectionState, to: ConnectionState) {
        let _ = (from, to);
    }

    fn on_fault(&self, fault: &LinkFault) {
        let _ = fault;
    }

    /// 服务端报告的错误（`execution_error` / `robot_error` / `robot_warning` ...）
    fn on_remote_fault(&self, fault: &RemoteFault) {
        let _ = fault;
    }

    fn on_telemetry(&self, frame: &Arc<TelemetryFrame>) {
        let _ = frame;
    }

    fn on_safety_violation(&self, violation: &SafetyViolation) {
        let _ = violation;
    }

    /// 执行结果/进度、机器人状态、连接状态等其他入站消息
    fn on_message(&self, envelope: &Envelope) {
        let _ = envelope;
    }

    fn on_reconnect_scheduled(&self, attempt: u32, delay: Duration) {
        let _ = (attempt, delay);
    }

    fn on_heartbeat_ack(&self, rtt: Duration) {
        let _ = rtt;
    }

    /// 观察者是否已失效（例如通道接收端已丢弃），失效的观察者会被移出列表
    fn is_closed(&self) -> bool {
        false
    }
}

/// 观察者列表
///
/// 自身不做同步，由 `LinkContext` 以 `RwLock<ObserverRegistry>` 持有。
#[derive(Default)]
pub struct ObserverRegistry {
    observers: Vec<Arc<dyn LinkObserver>>,
}

impl ObserverRegistry {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            observers: Vec::new(),
        }
    }

    pub fn add(&mut self, observer: Arc<dyn LinkObserver>) {
        self.observers.push(observer);
    }

    /// 按指针移除；返回是否找到
    pub fn remove(&mut self, observer: &Arc<dyn LinkObserver>) -> bool {
        let before = self.observers.len();
        self.observers.retain(|o| !Arc::ptr_eq(o, observer));
        self.observers.len() != before
    }

    pub fn notify(&self, event: &LinkEvent) {
        for observer in &self.observers {
            observer.on_event(event);
        }
    }

    /// 是否存在已失效的观察者
    pub fn has_closed(&self) -> bool {
        self.observers.iter().any(|o| o.is_closed())
    }

    /// 移除已失效的观察者，返回移除数量
    pub fn prune_closed(&mut self) -> usize {
        let before = self.observers.len();
        self.observers.retain(|o| !o.is_closed());
        before - self.observers.len()
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::FaultKind;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counter {
        faults: AtomicUsize,
        states: AtomicUsize,
    }

    impl LinkObserver for Counter {
        fn on_fault(&self, _fault: &LinkFault) {
            self.faults.fetch_add(1, Ordering::SeqCst);
        }

        fn on_state_changed(&self, _from: ConnectionState, _to: ConnectionState) {
            self.states.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_notify_fans_out_by_category() {
        let a = Arc::new(Counter::default());
        let b = Arc::new(Counter::default());
        let mut registry = ObserverRegistry::new();
        registry.add(a.clone());
        registry.add(b.clone());

        registry.notify(&LinkEvent::Fault(LinkFault::new(FaultKind::ParseError, "bad json")));
        registry.notify(&LinkEvent::StateChanged {
            from: ConnectionState::Disconnected,
            to: ConnectionState::Connecting,
        });
        registry.notify(&LinkEvent::HeartbeatAck {
            rtt: Duration::from_millis(3),
        });

        for counter in [&a, &b] {
            assert_eq!(counter.faults.load(Ordering::SeqCst), 1);
            assert_eq!(counter.states.load(Ordering::SeqCst), 1);
        }
    }

    #[test]
    fn test_remove_by_pointer() {
        let observer: Arc<dyn LinkObserver> = Arc::new(Counter::default());
        let mut registry = ObserverRegistry::new();
        registry.add(observer.clone());
        assert!(registry.remove(&observer));
        assert!(!registry.remove(&observer));
        assert!(registry.is_empty());
    }

    struct Closed;

    impl LinkObserver for Closed {
        fn is_closed(&self) -> bool {
            true
        }
    }

    #[test]
    fn test_prune_closed_keeps_live_observers() {
        let live = Arc::new(Counter::default());
        let mut registry = ObserverRegistry::new();
        registry.add(live.clone());
        registry.add(Arc::new(Closed));
        assert!(registry.has_closed());

        assert_eq!(registry.prune_closed(), 1);
        assert_eq!(registry.len(), 1);
        assert!(!registry.has_closed());

        registry.notify(&LinkEvent::Fault(LinkFault::new(FaultKind::SendError, "x")));
        assert_eq!(live.faults.load(Ordering::SeqCst), 1);
    }
}
