//! 链路工作线程
//!
//! 一个 `ConnectionManager` 对应一个工作线程，它独占连接、定时器和全部组件状态。
//! 状态迁移、定时器回调和入站帧处理都在这个线程上串行执行。
//!
//! # 事件循环
//!
//! ```text
//! loop {
//!     select! {
//!         控制命令（connect / disconnect / send / subscribe ...）
//!         传输事件（Opened / Frame / Closed / Error，带 generation）
//!         最近的截止时间（重连 / 心跳 / 请求超时）
//!     }
//!     处理到期的截止时间
//! }
//! ```
//!
//! 每次建连都会递增 generation，旧连接的迟到事件因此被直接忽略。

use crate::backoff::ReconnectPolicy;
use crate::config::LinkConfig;
use crate::dispatcher::{Correlation, MessageDispatcher, Outgoing, SendFailure, SendOptions};
use crate::events::{FaultKind, LinkEvent, LinkFault, RemoteFault, Severity};
use crate::heartbeat::{HeartbeatAction, HeartbeatMonitor};
use crate::metrics::LinkMetrics;
use crate::queue::CommandQueue;
use crate::state::{ConnectionState, HealthStatus, LinkContext, LinkHealth};
use crate::telemetry::TelemetryIngestor;
use armlink_protocol::{Command, Envelope, InboundKind, MessageIdGenerator, RobotConfig};
use armlink_transport::{
    CloseCode, Connection, EventSink, Transport, TransportError, TransportEvent, TransportSignal,
};
use crossbeam_channel::{Receiver, RecvError, Sender, at, never, select};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Instant;
use tracing::{debug, error, info, trace, warn};

/// 句柄发给工作线程的控制命令
#[derive(Debug)]
pub(crate) enum Control {
    Connect,
    Disconnect,
    Send(Outgoing),
    Subscribe(Vec<String>),
    Unsubscribe(Vec<String>),
    ClearQueue,
    Shutdown,
}

enum Wake {
    Control(Result<Control, RecvError>),
    Signal(Result<TransportSignal, RecvError>),
    Timer,
}

pub(crate) struct Worker {
    config: LinkConfig,
    policy: ReconnectPolicy,
    transport: Box<dyn Transport>,
    ctx: Arc<LinkContext>,
    ids: Arc<MessageIdGenerator>,
    signal_tx: Sender<TransportSignal>,

    generation: u64,
    conn: Option<Box<dyn Connection>>,
    /// 当前连续重连次数（成功建连或显式 connect 时清零）
    attempt: u32,
    reconnect_at: Option<Instant>,
    /// 已连接但发送失败后，重试发出离线队列的时间
    flush_retry_at: Option<Instant>,

    heartbeat: HeartbeatMonitor,
    dispatcher: MessageDispatcher,
    queue: CommandQueue,
    ingestor: TelemetryIngestor,
    subscriptions: BTreeSet<String>,
}

impl Worker {
    pub(crate) fn new(
        config: LinkConfig,
        robot: Arc<RobotConfig>,
        transport: Box<dyn Transport>,
        ctx: Arc<LinkContext>,
        ids: Arc<MessageIdGenerator>,
        signal_tx: Sender<TransportSignal>,
    ) -> Self {
        let subscriptions: BTreeSet<String> = config.subscriptions.iter().cloned().collect();
        let worker = Self {
            policy: ReconnectPolicy::from_config(&config),
            heartbeat: HeartbeatMonitor::new(config.heartbeat_interval(), config.heartbeat_timeout()),
            dispatcher: MessageDispatcher::new(config.message_timeout()),
            queue: CommandQueue::new(config.max_queue_len),
            ingestor: TelemetryIngestor::new(robot, ctx.telemetry.clone()),
            subscriptions,
            config,
            transport,
            ctx,
            ids,
            signal_tx,
            generation: 0,
            conn: None,
            attempt: 0,
            reconnect_at: None,
            flush_retry_at: None,
        };
        worker.publish_subscriptions();
        worker
    }

    /// 事件循环，直到收到 `Shutdown` 或句柄被丢弃
    pub(crate) fn run(mut self, control_rx: Receiver<Control>, signal_rx: Receiver<TransportSignal>) {
        info!(url = %self.config.url, "link worker started");

        loop {
            let timer = match self.next_deadline() {
                Some(deadline) => at(deadline),
                None => never(),
            };

            let wake = select! {
                recv(control_rx) -> msg => Wake::Control(msg),
                recv(signal_rx) -> msg => Wake::Signal(msg),
                recv(timer) -> _ => Wake::Timer,
            };

            match wake {
                Wake::Control(Ok(control)) => {
                    if !self.handle_control(control) {
                        break;
                    }
                },
                Wake::Control(Err(_)) => {
                    debug!("control channel closed");
                    self.disconnect();
                    break;
                },
                Wake::Signal(Ok(signal)) => self.handle_signal(signal),
                // 本线程持有 signal_tx，不会断开
                Wake::Signal(Err(_)) => {},
                Wake::Timer => {},
            }

            self.poll_timers(Instant::now());
            self.publish_gauges();
        }

        self.publish_gauges();
        info!("link worker stopped");
    }

    /// 返回 `false` 表示应退出事件循环
    fn handle_control(&mut self, control: Control) -> bool {
        let now = Instant::now();
        match control {
            Control::Connect => self.connect(now),
            Control::Disconnect => self.disconnect(),
            Control::Send(outgoing) => self.send(outgoing, now),
            Control::Subscribe(types) => self.subscribe(types, now),
            Control::Unsubscribe(types) => self.unsubscribe(types, now),
            Control::ClearQueue => {
                let removed = self.queue.clear();
                debug!(count = removed.len(), "offline queue cleared");
            },
            Control::Shutdown => {
                self.disconnect();
                return false;
            },
        }
        true
    }

    fn handle_signal(&mut self, signal: TransportSignal) {
        if signal.generation != self.generation {
            trace!(
                generation = signal.generation,
                current = self.generation,
                "ignoring event from stale connection"
            );
            return;
        }

        let now = Instant::now();
        match signal.event {
            TransportEvent::Opened => self.on_open(now),
            TransportEvent::Frame(text) => self.on_frame(&text, now),
            TransportEvent::Closed { code, reason } => {
                self.connection_lost(format!("connection closed (code {}): {reason}", code.0), now)
            },
            TransportEvent::Error(message) => self.connection_lost(message, now),
        }
    }

    // ==================== 连接生命周期 ====================

    fn connect(&mut self, now: Instant) {
        let state = self.ctx.state.get();
        if state.is_active() {
            debug!(%state, "connect ignored");
            return;
        }
        self.set_attempt(0);
        self.reconnect_at = None;
        self.open(now);
    }

    fn open(&mut self, now: Instant) {
        self.generation += 1;
        self.set_state(ConnectionState::Connecting);
        info!(
            url = %self.config.url,
            generation = self.generation,
            attempt = self.attempt,
            "opening connection"
        );

        let sink = EventSink::new(self.generation, self.signal_tx.clone());
        match self.transport.open(&self.config.url, sink) {
            Ok(conn) => self.conn = Some(conn),
            Err(e) => self.connection_lost(format!("open failed: {e}"), now),
        }
    }

    /// 连接建立：清零重连计数 → 重新声明订阅 → 启动心跳 → 发出离线队列
    fn on_open(&mut self, now: Instant) {
        self.set_state(ConnectionState::Connected);
        self.set_attempt(0);
        self.ctx.health.store(Arc::new(LinkHealth::default()));

        self.reassert_subscriptions(now);
        self.heartbeat.start(now);
        self.flush_queue(now);
    }

    /// 非主动关闭或传输错误
    fn connection_lost(&mut self, reason: String, now: Instant) {
        let previous = self.ctx.state.get();
        self.conn = None;
        self.heartbeat.stop();
        self.flush_retry_at = None;

        warn!(%previous, %reason, "connection lost");
        self.emit_fault(LinkFault::new(FaultKind::ConnectionError, reason));

        if !previous.is_active() {
            self.set_state(ConnectionState::Disconnected);
            return;
        }

        self.set_attempt(self.attempt + 1);
        match self.policy.delay_for(self.attempt) {
            Some(delay) => {
                LinkMetrics::incr(&self.ctx.metrics.reconnect_attempts);
                self.reconnect_at = Some(now + delay);
                self.set_state(ConnectionState::Disconnected);
                info!(
                    attempt = self.attempt,
                    delay_ms = delay.as_millis() as u64,
                    "reconnect scheduled"
                );
                self.notify(LinkEvent::ReconnectScheduled {
                    attempt: self.attempt,
                    delay,
                });
            },
            None => {
                self.reconnect_at = None;
                self.set_state(ConnectionState::Error);
                self.emit_fault(LinkFault::new(
                    FaultKind::ConnectionFailed,
                    format!(
                        "giving up after {} reconnect attempts; call connect() to retry",
                        self.policy.max_attempts
                    ),
                ));
            },
        }
    }

    /// 主动断开：取消所有定时器和等待方，清空离线队列，不再自动重连
    fn disconnect(&mut self) {
        self.reconnect_at = None;
        self.flush_retry_at = None;
        self.heartbeat.stop();
        let cancelled = self.dispatcher.cancel_all();
        let cleared = self.queue.clear().len();

        if let Some(mut conn) = self.conn.take() {
            conn.close(CloseCode::INTENTIONAL, "client disconnect");
        }
        // 丢弃正在建立中的连接可能产生的事件
        self.generation += 1;
        self.set_attempt(0);

        if self.ctx.state.get() != ConnectionState::Disconnected {
            info!(cancelled, cleared, "disconnected");
        }
        self.set_state(ConnectionState::Disconnected);
    }

    // ==================== 出站 ====================

    fn send(&mut self, outgoing: Outgoing, now: Instant) {
        let connected = self.is_connected();
        if connected && self.queue.is_empty() {
            if let Err(failure) = self.transmit(outgoing, now) {
                self.report_send_failure(&failure.outgoing.envelope, &failure.error);
                self.enqueue(failure.outgoing, now);
                self.schedule_flush_retry(now);
            }
            return;
        }

        trace!(
            message_id = %outgoing.envelope.message_id,
            message_type = %outgoing.envelope.kind,
            "queued"
        );
        self.enqueue(outgoing, now);
        if connected {
            self.flush_queue(now);
        }
    }

    fn transmit(
        &mut self,
        outgoing: Outgoing,
        now: Instant,
    ) -> Result<(), SendFailure> {
        let Some(conn) = self.conn.as_mut() else {
            return Err(SendFailure {
                outgoing,
                error: TransportError::Closed,
            });
        };
        let result = self.dispatcher.transmit(conn.as_mut(), outgoing, now);
        if result.is_ok() {
            LinkMetrics::incr(&self.ctx.metrics.frames_tx);
        }
        result
    }

    /// 发送内部控制帧（订阅、心跳），失败不重新入队；成功时返回消息 ID
    fn transmit_internal(&mut self, command: Command, now: Instant) -> Option<String> {
        let message_id = self.ids.next_id();
        let outgoing = Outgoing::new(
            command.into_envelope(message_id.clone()),
            SendOptions::fire_and_forget(),
        );
        match self.transmit(outgoing, now) {
            Ok(()) => Some(message_id),
            Err(failure) => {
                self.report_send_failure(&failure.outgoing.envelope, &failure.error);
                None
            },
        }
    }

    fn enqueue(&mut self, outgoing: Outgoing, now: Instant) {
        if let Some(evicted) = self.queue.enqueue(outgoing, now) {
            LinkMetrics::incr(&self.ctx.metrics.queue_evictions);
            let envelope = &evicted.outgoing.envelope;
            self.emit_fault(
                LinkFault::new(
                    FaultKind::QueueOverflow,
                    format!(
                        "offline queue full ({} max), dropped oldest '{}'",
                        self.config.max_queue_len.unwrap_or_default(),
                        envelope.kind
                    ),
                )
                .for_message(envelope.kind.clone(), envelope.message_id.clone()),
            );
            // evicted 在此丢弃，其等待方收到取消
        }
    }

    fn flush_queue(&mut self, now: Instant) {
        self.flush_retry_at = None;
        if self.queue.is_empty() {
            return;
        }
        let Some(conn) = self.conn.as_mut() else {
            return;
        };
        let dispatcher = &mut self.dispatcher;
        let metrics = &self.ctx.metrics;

        let outcome = self.queue.flush(|outgoing| {
            dispatcher
                .transmit(conn.as_mut(), outgoing, now)
                .map(|()| LinkMetrics::incr(&metrics.frames_tx))
                .map_err(|failure| (failure.outgoing, failure.error))
        });

        info!(
            sent = outcome.sent,
            remaining = self.queue.len(),
            "flushed offline queue"
        );
        if let Some(error) = outcome.error
            && let Some(head) = self.queue.front()
        {
            let envelope = head.outgoing.envelope.clone();
            self.report_send_failure(&envelope, &error);
            self.schedule_flush_retry(now);
        }
    }

    fn schedule_flush_retry(&mut self, now: Instant) {
        if self.is_connected() && !self.queue.is_empty() {
            let at = now + self.config.reconnect_interval();
            debug!(retry_in_ms = self.config.reconnect_interval_ms, "flush retry scheduled");
            self.flush_retry_at = Some(at);
        }
    }

    fn report_send_failure(&self, envelope: &Envelope, error: &TransportError) {
        LinkMetrics::incr(&self.ctx.metrics.send_errors);
        self.emit_fault(
            LinkFault::new(
                FaultKind::SendError,
                format!("failed to send '{}': {error}", envelope.kind),
            )
            .for_message(envelope.kind.clone(), envelope.message_id.clone()),
        );
    }

    // ==================== 订阅 ====================

    fn subscribe(&mut self, types: Vec<String>, now: Instant) {
        let added: Vec<String> = types
            .into_iter()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .filter(|t| self.subscriptions.insert(t.clone()))
            .collect();
        if added.is_empty() {
            return;
        }
        self.publish_subscriptions();
        debug!(?added, "subscribed");
        if self.is_connected() {
            self.transmit_internal(
                Command::Subscribe {
                    message_types: added,
                },
                now,
            );
        }
    }

    fn unsubscribe(&mut self, types: Vec<String>, now: Instant) {
        let removed: Vec<String> = types
            .into_iter()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .filter(|t| self.subscriptions.remove(t))
            .collect();
        if removed.is_empty() {
            return;
        }
        self.publish_subscriptions();
        debug!(?removed, "unsubscribed");
        if self.is_connected() {
            self.transmit_internal(
                Command::Unsubscribe {
                    message_types: removed,
                },
                now,
            );
        }
    }

    /// 整个订阅集合作为一帧 `subscribe` 发出（有序）
    fn reassert_subscriptions(&mut self, now: Instant) {
        if self.subscriptions.is_empty() {
            return;
        }
        let message_types: Vec<String> = self.subscriptions.iter().cloned().collect();
        debug!(?message_types, "re-asserting subscriptions");
        self.transmit_internal(Command::Subscribe { message_types }, now);
    }

    // ==================== 入站 ====================

    fn on_frame(&mut self, text: &str, now: Instant) {
        LinkMetrics::incr(&self.ctx.metrics.frames_rx);

        let envelope = match Envelope::decode(text) {
            Ok(envelope) => envelope,
            Err(e) => {
                LinkMetrics::incr(&self.ctx.metrics.parse_errors);
                self.emit_fault(LinkFault::new(
                    FaultKind::ParseError,
                    format!("dropping malformed frame: {e}"),
                ));
                return;
            },
        };
        let kind = envelope.inbound_kind();

        if kind != Some(InboundKind::HeartbeatResponse) {
            match self.dispatcher.correlate(&envelope, now) {
                Correlation::Resolved {
                    message_id,
                    message_type,
                    rtt,
                } => {
                    LinkMetrics::incr(&self.ctx.metrics.replies_matched);
                    debug!(
                        %message_id,
                        %message_type,
                        rtt_ms = rtt.as_millis() as u64,
                        "reply matched"
                    );
                },
                Correlation::Late { correlation_id } => {
                    LinkMetrics::incr(&self.ctx.metrics.late_replies);
                    debug!(%correlation_id, kind = %envelope.kind, "dropping late reply");
                    return;
                },
                Correlation::Unsolicited => {},
            }
        }

        self.route(kind, envelope, now);
    }

    /// 按消息类型分发
    fn route(&mut self, kind: Option<InboundKind>, envelope: Envelope, now: Instant) {
        match kind {
            Some(InboundKind::RobotTelemetry) => match self.ingestor.ingest(&envelope) {
                Ok(ingested) => {
                    self.notify(LinkEvent::Telemetry(ingested.frame));
                    for violation in ingested.violations {
                        LinkMetrics::incr(&self.ctx.metrics.safety_violations);
                        match violation.severity {
                            Severity::Error => error!(
                                joint = violation.joint_index,
                                kind = %violation.kind,
                                "{}",
                                violation.message
                            ),
                            Severity::Warning => warn!(
                                joint = violation.joint_index,
                                kind = %violation.kind,
                                "{}",
                                violation.message
                            ),
                        }
                        self.notify(LinkEvent::Safety(violation));
                    }
                },
                Err(e) => {
                    LinkMetrics::incr(&self.ctx.metrics.parse_errors);
                    self.emit_fault(LinkFault::new(
                        FaultKind::ParseError,
                        format!("invalid telemetry payload: {e}"),
                    ));
                },
            },
            Some(InboundKind::HeartbeatResponse) => self.on_heartbeat_reply(&envelope, now),
            Some(InboundKind::Error) => {
                let fault = RemoteFault::from_error_envelope(&envelope);
                warn!(code = %fault.kind, "remote error: {}", fault.message);
                self.notify(LinkEvent::Remote(fault));
            },
            Some(InboundKind::ExecutionResult) => {
                if let Some(fault) = RemoteFault::from_failed_execution(&envelope) {
                    self.notify(LinkEvent::Remote(fault));
                }
                self.notify(LinkEvent::Message(envelope));
            },
            Some(
                InboundKind::ExecutionProgress
                | InboundKind::RobotStatus
                | InboundKind::ConnectionStatus,
            ) => self.notify(LinkEvent::Message(envelope)),
            None => {
                debug!(kind = %envelope.kind, "unknown message type");
                self.notify(LinkEvent::Message(envelope));
            },
        }
    }

    fn on_heartbeat_reply(&mut self, envelope: &Envelope, now: Instant) {
        match self
            .heartbeat
            .on_reply(envelope.correlation_id.as_deref(), now)
        {
            Some(rtt) => {
                self.ctx.health.store(Arc::new(LinkHealth {
                    status: HealthStatus::Healthy,
                    last_rtt: Some(rtt),
                    consecutive_misses: 0,
                }));
                trace!(rtt_us = rtt.as_micros() as u64, "heartbeat ack");
                self.notify(LinkEvent::HeartbeatAck { rtt });
            },
            None => debug!("ignoring stale heartbeat reply"),
        }
    }

    // ==================== 定时器 ====================

    fn next_deadline(&self) -> Option<Instant> {
        [
            self.reconnect_at,
            self.flush_retry_at,
            self.dispatcher.next_deadline(),
            self.heartbeat.next_deadline(),
        ]
        .into_iter()
        .flatten()
        .min()
    }

    fn poll_timers(&mut self, now: Instant) {
        if self.reconnect_at.is_some_and(|at| at <= now) {
            self.reconnect_at = None;
            if !self.ctx.state.get().is_active() {
                self.open(now);
            }
        }

        if self.flush_retry_at.is_some_and(|at| at <= now) {
            self.flush_retry_at = None;
            if self.is_connected() {
                self.flush_queue(now);
            }
        }

        for expired in self.dispatcher.expire(now) {
            LinkMetrics::incr(&self.ctx.metrics.message_timeouts);
            self.emit_fault(
                LinkFault::new(
                    FaultKind::MessageTimeout,
                    format!(
                        "no reply to '{}' within {}ms",
                        expired.message_type,
                        expired.waited.as_millis()
                    ),
                )
                .for_message(expired.message_type, expired.message_id),
            );
        }

        for action in self.heartbeat.poll(now) {
            match action {
                HeartbeatAction::Missed { probe_id } => {
                    LinkMetrics::incr(&self.ctx.metrics.heartbeat_misses);
                    let misses = self.heartbeat.consecutive_misses();
                    let last_rtt = self.ctx.health.load().last_rtt;
                    self.ctx.health.store(Arc::new(LinkHealth {
                        status: HealthStatus::Unstable,
                        last_rtt,
                        consecutive_misses: misses,
                    }));
                    self.emit_fault(LinkFault::new(
                        FaultKind::WebsocketTimeout,
                        format!(
                            "connection unstable: heartbeat {probe_id} not answered within {}ms",
                            self.config.heartbeat_timeout_ms
                        ),
                    ));
                },
                HeartbeatAction::ProbeDue => self.send_heartbeat(now),
            }
        }
    }

    fn send_heartbeat(&mut self, now: Instant) {
        match self.transmit_internal(Command::Heartbeat, now) {
            Some(probe_id) => {
                trace!(%probe_id, "heartbeat sent");
                self.heartbeat.probe_sent(probe_id, now);
            },
            None => self.heartbeat.probe_failed(now),
        }
    }

    // ==================== 发布 ====================

    fn is_connected(&self) -> bool {
        self.conn.is_some() && self.ctx.state.get() == ConnectionState::Connected
    }

    fn set_state(&self, to: ConnectionState) {
        let from = self.ctx.state.swap(to);
        if from != to {
            info!(%from, %to, "connection state changed");
            self.notify(LinkEvent::StateChanged { from, to });
        }
    }

    fn set_attempt(&mut self, attempt: u32) {
        self.attempt = attempt;
        self.ctx.reconnect_attempt.store(attempt, Ordering::Release);
    }

    fn emit_fault(&self, fault: LinkFault) {
        match fault.severity {
            Severity::Error => error!(code = %fault.kind, "{}", fault.message),
            Severity::Warning => warn!(code = %fault.kind, "{}", fault.message),
        }
        self.notify(LinkEvent::Fault(fault));
    }

    fn notify(&self, event: LinkEvent) {
        let stale = {
            let observers = self.ctx.observers.read();
            observers.notify(&event);
            observers.has_closed()
        };
        if stale {
            let removed = self.ctx.observers.write().prune_closed();
            debug!(removed, "removed closed observers");
        }
    }

    fn publish_subscriptions(&self) {
        self.ctx
            .subscriptions
            .store(Arc::new(self.subscriptions.iter().cloned().collect()));
    }

    fn publish_gauges(&self) {
        self.ctx.queue_len.store(self.queue.len(), Ordering::Release);
        self.ctx
            .pending_requests
            .store(self.dispatcher.pending_len(), Ordering::Release);
    }
}
