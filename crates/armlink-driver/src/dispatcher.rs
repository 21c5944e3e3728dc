//! 消息分发与关联
//!
//! - 出站：把信封交给传输层；需要应答的请求登记为 `PendingRequest` 并设置超时
//! - 入站：按 `correlationId`（其次 `messageId`）匹配待应答请求，命中则完成该请求
//! - 超时：到期的请求被移除且只报告一次，之后到达的应答视为迟到并丢弃
//! - 其他带 `correlationId` 但无人等待的帧（如对只发送命令的应答）按普通入站消息处理
//!
//! 每个请求的结果通过一个容量为 1 的通道交付，恰好一次：
//! 应答（`Reply`）、超时（`TimedOut`），或发送端被丢弃（取消）。

use crate::error::LinkError;
use armlink_protocol::Envelope;
use armlink_transport::{Connection, TransportError};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError, bounded};
use std::collections::{HashMap, VecDeque};
use std::collections::hash_map::Entry;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// 发送选项
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SendOptions {
    /// 是否等待关联应答
    pub expect_response: bool,
    /// 应答超时（`None` 使用 `LinkConfig::message_timeout`）
    pub timeout: Option<Duration>,
}

impl SendOptions {
    /// 只发送，不等待应答
    pub fn fire_and_forget() -> Self {
        Self::default()
    }

    pub fn expect_response(timeout: Option<Duration>) -> Self {
        Self {
            expect_response: true,
            timeout,
        }
    }
}

/// 请求结果
#[derive(Debug, Clone, PartialEq)]
pub enum ReplyOutcome {
    Reply(Envelope),
    /// 超时，附带实际等待时长
    TimedOut(Duration),
}

/// 待交付的应答（调用方持有）
#[derive(Debug)]
pub struct PendingReply {
    message_id: String,
    message_type: String,
    rx: Receiver<ReplyOutcome>,
}

impl PendingReply {
    pub(crate) fn channel(
        message_id: &str,
        message_type: &str,
    ) -> (Sender<ReplyOutcome>, PendingReply) {
        let (tx, rx) = bounded(1);
        (
            tx,
            PendingReply {
                message_id: message_id.to_string(),
                message_type: message_type.to_string(),
                rx,
            },
        )
    }

    pub fn message_id(&self) -> &str {
        &self.message_id
    }

    /// 阻塞等待结果
    pub fn wait(self) -> Result<Envelope, LinkError> {
        match self.rx.recv() {
            Ok(outcome) => self.into_result(outcome),
            Err(_) => Err(LinkError::Cancelled {
                message_id: self.message_id,
            }),
        }
    }

    /// 最多等待 `timeout`
    pub fn wait_timeout(self, timeout: Duration) -> Result<Envelope, LinkError> {
        match self.rx.recv_timeout(timeout) {
            Ok(outcome) => self.into_result(outcome),
            Err(RecvTimeoutError::Timeout) => Err(LinkError::Timeout {
                message_type: self.message_type,
                timeout,
            }),
            Err(RecvTimeoutError::Disconnected) => Err(LinkError::Cancelled {
                message_id: self.message_id,
            }),
        }
    }

    /// 非阻塞查询；尚无结果时返回 `None`
    pub fn try_get(&self) -> Option<Result<ReplyOutcome, LinkError>> {
        match self.rx.try_recv() {
            Ok(outcome) => Some(Ok(outcome)),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(LinkError::Cancelled {
                message_id: self.message_id.clone(),
            })),
        }
    }

    fn into_result(self, outcome: ReplyOutcome) -> Result<Envelope, LinkError> {
        match outcome {
            ReplyOutcome::Reply(envelope) => Ok(envelope),
            ReplyOutcome::TimedOut(waited) => Err(LinkError::Timeout {
                message_type: self.message_type,
                timeout: waited,
            }),
        }
    }
}

/// `send` 的回执
#[derive(Debug)]
pub struct SendReceipt {
    pub message_id: String,
    /// 仅当 `expect_response` 时存在
    pub reply: Option<PendingReply>,
}

/// 一条待发出的消息
#[derive(Debug)]
pub struct Outgoing {
    pub envelope: Envelope,
    pub options: SendOptions,
    pub(crate) reply: Option<Sender<ReplyOutcome>>,
}

impl Outgoing {
    pub fn new(envelope: Envelope, options: SendOptions) -> Self {
        Self {
            envelope,
            options,
            reply: None,
        }
    }

    pub(crate) fn with_reply(mut self, reply: Sender<ReplyOutcome>) -> Self {
        self.reply = Some(reply);
        self
    }
}

/// 待应答请求（分发器独占）
#[derive(Debug)]
struct PendingRequest {
    message_type: String,
    sent_at: Instant,
    deadline: Instant,
    reply: Option<Sender<ReplyOutcome>>,
}

/// 超时被移除的请求
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpiredRequest {
    pub message_id: String,
    pub message_type: String,
    pub waited: Duration,
}

/// 入站帧的关联结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Correlation {
    /// 完成了一个待应答请求
    Resolved {
        message_id: String,
        message_type: String,
        rtt: Duration,
    },
    /// 指向一个已超时的请求
    Late { correlation_id: String },
    /// 非应答消息，或对不等待应答的消息的回复
    Unsolicited,
}

/// 发送失败，原消息交还调用方
#[derive(Debug)]
pub struct SendFailure {
    pub outgoing: Outgoing,
    pub error: TransportError,
}

/// 记录的已超时请求 ID 上限
const TIMED_OUT_HISTORY: usize = 256;

#[derive(Debug)]
pub struct MessageDispatcher {
    default_timeout: Duration,
    pending: HashMap<String, PendingRequest>,
    /// 最近超时的请求 ID，用于识别迟到应答
    timed_out: VecDeque<String>,
}

impl MessageDispatcher {
    pub fn new(default_timeout: Duration) -> Self {
        Self {
            default_timeout,
            pending: HashMap::new(),
            timed_out: VecDeque::new(),
        }
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_pending(&self, message_id: &str) -> bool {
        self.pending.contains_key(message_id)
    }

    /// 发送一条消息
    ///
    /// 成功后若需要应答则登记待应答请求（超时从此刻起算）。
    /// 失败时原消息原样交还，由调用方决定重新入队。
    pub fn transmit(
        &mut self,
        conn: &mut dyn Connection,
        outgoing: Outgoing,
        now: Instant,
    ) -> Result<(), SendFailure> {
        let text = match outgoing.envelope.encode() {
            Ok(text) => text,
            Err(e) => {
                return Err(SendFailure {
                    outgoing,
                    error: TransportError::Io(format!("encode: {e}")),
                });
            },
        };
        if let Err(error) = conn.send(text) {
            return Err(SendFailure { outgoing, error });
        }

        if outgoing.options.expect_response {
            let timeout = outgoing.options.timeout.unwrap_or(self.default_timeout);
            let Outgoing {
                envelope, reply, ..
            } = outgoing;
            let request = PendingRequest {
                message_type: envelope.kind,
                sent_at: now,
                deadline: now + timeout,
                reply,
            };
            match self.pending.entry(envelope.message_id) {
                Entry::Occupied(mut entry) => {
                    warn!(message_id = %entry.key(), "duplicate pending request replaced");
                    entry.insert(request);
                },
                Entry::Vacant(entry) => {
                    entry.insert(request);
                },
            }
        }
        Ok(())
    }

    /// 尝试把入站帧匹配到待应答请求
    pub fn correlate(&mut self, envelope: &Envelope, now: Instant) -> Correlation {
        let key = match &envelope.correlation_id {
            Some(id) if self.pending.contains_key(id) => id.clone(),
            Some(id) if self.timed_out.contains(id) => {
                return Correlation::Late {
                    correlation_id: id.clone(),
                };
            },
            Some(_) => return Correlation::Unsolicited,
            None if self.pending.contains_key(&envelope.message_id) => envelope.message_id.clone(),
            None => return Correlation::Unsolicited,
        };

        let Some(request) = self.pending.remove(&key) else {
            return Correlation::Unsolicited;
        };
        if let Some(reply) = request.reply {
            // 调用方可能已放弃等待
            let _ = reply.try_send(ReplyOutcome::Reply(envelope.clone()));
        }
        Correlation::Resolved {
            message_id: key,
            message_type: request.message_type,
            rtt: now.saturating_duration_since(request.sent_at),
        }
    }

    /// 最早的超时截止时间
    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.values().map(|p| p.deadline).min()
    }

    /// 移除所有已到期的请求（每个只报告一次）
    pub fn expire(&mut self, now: Instant) -> Vec<ExpiredRequest> {
        let expired_ids: Vec<String> = self
            .pending
            .iter()
            .filter(|(_, p)| p.deadline <= now)
            .map(|(id, _)| id.clone())
            .collect();

        let mut expired: Vec<ExpiredRequest> = expired_ids
            .into_iter()
            .filter_map(|id| {
                let request = self.pending.remove(&id)?;
                let waited = now.saturating_duration_since(request.sent_at);
                if let Some(reply) = request.reply {
                    let _ = reply.try_send(ReplyOutcome::TimedOut(waited));
                }
                if self.timed_out.len() == TIMED_OUT_HISTORY {
                    self.timed_out.pop_front();
                }
                self.timed_out.push_back(id.clone());
                Some(ExpiredRequest {
                    message_id: id,
                    message_type: request.message_type,
                    waited,
                })
            })
            .collect();
        expired.sort_by(|a, b| b.waited.cmp(&a.waited));
        expired
    }

    /// 取消所有待应答请求（手动断开时调用），等待方收到取消
    pub fn cancel_all(&mut self) -> usize {
        let count = self.pending.len();
        if count > 0 {
            debug!(count, "cancelling pending requests");
        }
        self.pending.clear();
        count
    }
}
