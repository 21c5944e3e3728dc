//! 连接管理器（对外 API）
//!
//! `ConnectionManager` 是工作线程的句柄：所有写操作都作为控制命令发给工作线程，
//! 读操作直接读共享上下文中的原子变量和快照，不阻塞。

use crate::channel::EventChannel;
use crate::config::LinkConfig;
use crate::dispatcher::{Outgoing, PendingReply, SendOptions, SendReceipt};
use crate::error::LinkError;
use crate::events::LinkEvent;
use crate::hooks::LinkObserver;
use crate::metrics::MetricsSnapshot;
use crate::state::{ConnectionState, LinkContext, LinkHealth};
use crate::worker::{Control, Worker};
use armlink_protocol::{Command, Envelope, MessageIdGenerator, RobotConfig, TelemetryFrame};
use armlink_transport::Transport;
use crossbeam_channel::{Receiver, Sender, unbounded};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::thread::{JoinHandle, spawn};
use std::time::{Duration, Instant};
use tracing::{debug, error};

/// 带超时的 thread join
trait JoinTimeout {
    fn join_timeout(self, timeout: Duration) -> std::thread::Result<()>;
}

impl<T: Send + 'static> JoinTimeout for JoinHandle<T> {
    fn join_timeout(self, timeout: Duration) -> std::thread::Result<()> {
        use std::sync::mpsc;

        let (tx, rx) = mpsc::channel();

        // 看门狗线程负责真正的 join
        spawn(move || {
            let result = self.join();
            let _ = tx.send(result);
        });

        match rx.recv_timeout(timeout) {
            Ok(join_result) => join_result.map(|_| ()),
            // 超时后看门狗线程继续存活，进程退出时回收
            Err(mpsc::RecvTimeoutError::Timeout) => Err(Box::new(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "Thread join timeout",
            ))),
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(Box::new(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "Thread panicked during join",
            ))),
        }
    }
}

/// 实时指令/遥测通道
///
/// 内部持有一个工作线程，负责连接生命周期、心跳、请求超时、离线队列和遥测摄取。
/// 丢弃句柄等价于 `disconnect()` 后结束工作线程。
///
/// # Example
///
/// ```no_run
/// use armlink_driver::LinkBuilder;
/// use armlink_protocol::Command;
/// use std::time::Duration;
///
/// let link = LinkBuilder::new()
///     .url("ws://localhost:8000/ws/robot")
///     .subscribe(["robot_telemetry", "execution_result"])
///     .build()
///     .unwrap();
///
/// link.connect().unwrap();
/// let reply = link
///     .request(Command::RequestPosition, Duration::from_secs(2))
///     .unwrap();
/// println!("{reply:?}");
/// ```
pub struct ConnectionManager {
    control_tx: Option<Sender<Control>>,
    ctx: Arc<LinkContext>,
    ids: Arc<MessageIdGenerator>,
    config: LinkConfig,
    robot: Arc<RobotConfig>,
    worker: Option<JoinHandle<()>>,
}

impl ConnectionManager {
    /// 校验配置并启动工作线程（不会自动连接）
    pub fn new(
        config: LinkConfig,
        robot: RobotConfig,
        transport: Box<dyn Transport>,
    ) -> Result<Self, LinkError> {
        config.validate()?;
        robot.validate()?;

        let robot = Arc::new(robot);
        let ctx = Arc::new(LinkContext::new());
        let ids = Arc::new(MessageIdGenerator::new());
        let (control_tx, control_rx) = unbounded();
        let (signal_tx, signal_rx) = unbounded();

        let worker = Worker::new(
            config.clone(),
            robot.clone(),
            transport,
            ctx.clone(),
            ids.clone(),
            signal_tx,
        );
        let handle = std::thread::Builder::new()
            .name("armlink-worker".into())
            .spawn(move || worker.run(control_rx, signal_rx))?;

        Ok(Self {
            control_tx: Some(control_tx),
            ctx,
            ids,
            config,
            robot,
            worker: Some(handle),
        })
    }

    fn control(&self, control: Control) -> Result<(), LinkError> {
        self.control_tx
            .as_ref()
            .ok_or(LinkError::WorkerGone)?
            .send(control)
            .map_err(|_| LinkError::WorkerGone)
    }

    // ==================== 连接生命周期 ====================

    /// 发起连接
    ///
    /// 已在连接中或已连接时为空操作。会清零重连计数并取消已排期的自动重连。
    /// 连接结果通过状态事件异步报告。
    pub fn connect(&self) -> Result<(), LinkError> {
        self.control(Control::Connect)
    }

    /// 主动断开
    ///
    /// 取消所有定时器和待应答请求、清空离线队列，之后不会自动重连。
    pub fn disconnect(&self) -> Result<(), LinkError> {
        self.control(Control::Disconnect)
    }

    // ==================== 发送 ====================

    /// 发送命令，不等待应答
    pub fn send(&self, command: Command) -> Result<SendReceipt, LinkError> {
        self.send_with(command, SendOptions::fire_and_forget())
    }

    /// 按选项发送命令
    ///
    /// 未连接时命令进入离线队列；`expect_response` 时回执中带 `PendingReply`。
    pub fn send_with(&self, command: Command, options: SendOptions) -> Result<SendReceipt, LinkError> {
        let message_id = self.ids.next_id();
        self.send_envelope(command.into_envelope(message_id), options)
    }

    /// 发送已组装好的信封（消息 ID 由调用方负责唯一性）
    pub fn send_envelope(
        &self,
        envelope: Envelope,
        options: SendOptions,
    ) -> Result<SendReceipt, LinkError> {
        let message_id = envelope.message_id.clone();
        let mut outgoing = Outgoing::new(envelope, options);
        let reply = if options.expect_response {
            let (tx, reply) = PendingReply::channel(&message_id, &outgoing.envelope.kind);
            outgoing = outgoing.with_reply(tx);
            Some(reply)
        } else {
            None
        };

        self.control(Control::Send(outgoing))?;
        Ok(SendReceipt { message_id, reply })
    }

    /// 发送并阻塞等待关联应答，最多等待 `timeout`
    pub fn request(&self, command: Command, timeout: Duration) -> Result<Envelope, LinkError> {
        let receipt = self.send_with(command, SendOptions::expect_response(Some(timeout)))?;
        match receipt.reply {
            Some(reply) => reply.wait_timeout(timeout),
            None => Err(LinkError::Cancelled {
                message_id: receipt.message_id,
            }),
        }
    }

    /// 清空离线队列（被移除命令的等待方收到取消）
    pub fn clear_queue(&self) -> Result<(), LinkError> {
        self.control(Control::ClearQueue)
    }

    // ==================== 订阅 ====================

    pub fn subscribe<I, S>(&self, types: I) -> Result<(), LinkError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.control(Control::Subscribe(types.into_iter().map(Into::into).collect()))
    }

    pub fn unsubscribe<I, S>(&self, types: I) -> Result<(), LinkError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.control(Control::Unsubscribe(types.into_iter().map(Into::into).collect()))
    }

    /// 当前订阅集合（有序）
    pub fn subscriptions(&self) -> Arc<Vec<String>> {
        self.ctx.subscriptions.load_full()
    }

    // ==================== 状态查询 ====================

    pub fn state(&self) -> ConnectionState {
        self.ctx.state.get()
    }

    /// 实时通道是否可用（供上层决定是否走 HTTP 兜底）
    pub fn is_live_channel_available(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    pub fn link_health(&self) -> LinkHealth {
        **self.ctx.health.load()
    }

    /// 最新遥测快照（尚未收到遥测时为 `None`）
    pub fn current_telemetry(&self) -> Option<Arc<TelemetryFrame>> {
        self.ctx.telemetry.load_full()
    }

    pub fn queue_len(&self) -> usize {
        self.ctx.queue_len.load(Ordering::Acquire)
    }

    pub fn pending_requests(&self) -> usize {
        self.ctx.pending_requests.load(Ordering::Acquire)
    }

    /// 当前连续重连次数
    pub fn reconnect_attempt(&self) -> u32 {
        self.ctx.reconnect_attempt.load(Ordering::Acquire)
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.ctx.metrics.snapshot()
    }

    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    pub fn robot_config(&self) -> &RobotConfig {
        &self.robot
    }

    /// 等待进入指定状态（轮询），超时返回 `false`
    pub fn wait_for_state(&self, state: ConnectionState, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.state() == state {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    // ==================== 观察者 ====================

    /// 注册观察者
    ///
    /// 回调在工作线程上执行；不要在回调中注册或移除观察者。
    pub fn add_observer(&self, observer: Arc<dyn LinkObserver>) {
        self.ctx.observers.write().add(observer);
    }

    pub fn remove_observer(&self, observer: &Arc<dyn LinkObserver>) -> bool {
        self.ctx.observers.write().remove(observer)
    }

    /// 当前注册的观察者数量
    pub fn observer_count(&self) -> usize {
        self.ctx.observers.read().len()
    }

    /// 订阅全部链路事件（容量为 `event_buffer`，满时丢弃）
    ///
    /// 丢弃返回的接收端后，对应的观察者在下一个事件时被移除。
    pub fn events(&self) -> Receiver<LinkEvent> {
        let (channel, rx) = EventChannel::new(self.config.event_buffer);
        self.add_observer(Arc::new(channel));
        rx
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        if let Some(tx) = self.control_tx.take() {
            // 工作线程已退出时发送失败，忽略
            let _ = tx.send(Control::Shutdown);
        }

        let join_timeout = Duration::from_secs(2);
        if let Some(handle) = self.worker.take() {
            match handle.join_timeout(join_timeout) {
                Ok(()) => debug!("link worker joined"),
                Err(_e) => error!(
                    "link worker panicked or failed to shut down within {:?}",
                    join_timeout
                ),
            }
        }
    }
}
