//! Builder 模式实现
//!
//! 提供链式构造 `ConnectionManager` 实例的便捷方式。

use crate::config::LinkConfig;
use crate::error::LinkError;
use crate::hooks::LinkObserver;
use crate::manager::ConnectionManager;
use armlink_protocol::RobotConfig;
use armlink_transport::Transport;
use std::sync::Arc;
use std::time::Duration;

/// 链路 Builder（链式构造）
///
/// # Example
///
/// ```no_run
/// use armlink_driver::LinkBuilder;
/// use std::time::Duration;
///
/// // 使用默认配置
/// let link = LinkBuilder::new().build().unwrap();
///
/// // 自定义端点和定时参数
/// let link = LinkBuilder::new()
///     .url("ws://192.168.1.20:8000/ws/robot")
///     .reconnect_interval(Duration::from_secs(1))
///     .max_reconnect_attempts(10)
///     .heartbeat(Duration::from_secs(10), Duration::from_secs(2))
///     .max_queue_len(256)
///     .build()
///     .unwrap();
/// ```
#[derive(Default)]
pub struct LinkBuilder {
    config: LinkConfig,
    robot: RobotConfig,
    /// 传输后端（未设置时使用 WebSocket）
    transport: Option<Box<dyn Transport>>,
    observers: Vec<Arc<dyn LinkObserver>>,
}

impl LinkBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// 服务端地址
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.config.url = url.into();
        self
    }

    /// 整体替换链路配置
    pub fn config(mut self, config: LinkConfig) -> Self {
        self.config = config;
        self
    }

    /// 机械臂限位配置（用于安全检查）
    pub fn robot_config(mut self, robot: RobotConfig) -> Self {
        self.robot = robot;
        self
    }

    /// 重连基础间隔（指数退避的起点）
    pub fn reconnect_interval(mut self, interval: Duration) -> Self {
        self.config.reconnect_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.config.max_reconnect_attempts = attempts;
        self
    }

    /// 心跳间隔与应答超时
    pub fn heartbeat(mut self, interval: Duration, timeout: Duration) -> Self {
        self.config.heartbeat_interval_ms = interval.as_millis() as u64;
        self.config.heartbeat_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// 请求默认应答超时
    pub fn message_timeout(mut self, timeout: Duration) -> Self {
        self.config.message_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// 离线队列上限（超出时淘汰最旧的命令）
    pub fn max_queue_len(mut self, max: usize) -> Self {
        self.config.max_queue_len = Some(max);
        self
    }

    /// 初始订阅（每次连接成功后重新声明）
    pub fn subscribe<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.subscriptions.extend(types.into_iter().map(Into::into));
        self
    }

    /// 自定义传输后端
    pub fn transport(mut self, transport: impl Transport + 'static) -> Self {
        self.transport = Some(Box::new(transport));
        self
    }

    /// 注册观察者（在工作线程启动前注册，不会错过任何事件）
    pub fn observer(mut self, observer: Arc<dyn LinkObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    /// 构建 `ConnectionManager`（不会自动连接）
    pub fn build(self) -> Result<ConnectionManager, LinkError> {
        let transport = match self.transport {
            Some(transport) => transport,
            None => default_transport()?,
        };
        let manager = ConnectionManager::new(self.config, self.robot, transport)?;
        for observer in self.observers {
            manager.add_observer(observer);
        }
        Ok(manager)
    }
}

#[cfg(feature = "websocket")]
fn default_transport() -> Result<Box<dyn Transport>, LinkError> {
    Ok(Box::new(armlink_transport::WebSocketTransport::new()))
}

#[cfg(not(feature = "websocket"))]
fn default_transport() -> Result<Box<dyn Transport>, LinkError> {
    Err(LinkError::InvalidConfig(
        "no transport configured and the `websocket` feature is disabled".to_string(),
    ))
}
