//! 离线命令队列
//!
//! 没有可用连接时发出的命令在这里按 FIFO 缓存，重连后按原顺序发出。
//! 发送中途失败时，失败的那条和其后的所有命令保持原顺序留在队列中。

use crate::dispatcher::Outgoing;
use std::collections::VecDeque;
use std::time::Instant;

/// 队列中的一条命令
#[derive(Debug)]
pub struct QueuedCommand {
    pub outgoing: Outgoing,
    pub enqueued_at: Instant,
}

/// 一次 flush 的结果
#[derive(Debug, PartialEq, Eq)]
pub struct FlushOutcome<E> {
    pub sent: usize,
    /// 导致 flush 中止的错误
    pub error: Option<E>,
}

#[derive(Debug, Default)]
pub struct CommandQueue {
    entries: VecDeque<QueuedCommand>,
    max_len: Option<usize>,
}

impl CommandQueue {
    /// `max_len` 为 `None` 时不限长度
    pub fn new(max_len: Option<usize>) -> Self {
        Self {
            entries: VecDeque::new(),
            max_len,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 下一条待发送的命令
    pub fn front(&self) -> Option<&QueuedCommand> {
        self.entries.front()
    }

    /// 追加到队尾
    ///
    /// 超出上限时淘汰并返回队首（最旧）的命令。
    pub fn enqueue(&mut self, outgoing: Outgoing, now: Instant) -> Option<QueuedCommand> {
        self.entries.push_back(QueuedCommand {
            outgoing,
            enqueued_at: now,
        });
        match self.max_len {
            Some(max) if self.entries.len() > max => self.entries.pop_front(),
            _ => None,
        }
    }

    /// 从队首开始依次发送
    ///
    /// `send` 失败时把原消息交还，该消息放回队首，flush 立即停止。
    pub fn flush<E, F>(&mut self, mut send: F) -> FlushOutcome<E>
    where
        F: FnMut(Outgoing) -> Result<(), (Outgoing, E)>,
    {
        let mut sent = 0;
        while let Some(entry) = self.entries.pop_front() {
            let enqueued_at = entry.enqueued_at;
            match send(entry.outgoing) {
                Ok(()) => sent += 1,
                Err((outgoing, error)) => {
                    self.entries.push_front(QueuedCommand {
                        outgoing,
                        enqueued_at,
                    });
                    return FlushOutcome {
                        sent,
                        error: Some(error),
                    };
                },
            }
        }
        FlushOutcome { sent, error: None }
    }

    /// 清空队列，返回被移除的命令（丢弃它们即取消其等待方）
    pub fn clear(&mut self) -> Vec<QueuedCommand> {
        self.entries.drain(..).collect()
    }

    /// 队列中的消息 ID（按发送顺序）
    pub fn message_ids(&self) -> Vec<&str> {
        self.entries
            .iter()
            .map(|e| e.outgoing.envelope.message_id.as_str())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::SendOptions;
    use armlink_protocol::Envelope;

    fn outgoing(id: &str) -> Outgoing {
        Outgoing::new(
            Envelope::outbound("move_joint", None, id),
            SendOptions::fire_and_forget(),
        )
    }

    #[test]
    fn test_flush_preserves_fifo_order() {
        let mut queue = CommandQueue::new(None);
        let now = Instant::now();
        for id in ["a", "b", "c"] {
            assert!(queue.enqueue(outgoing(id), now).is_none());
        }

        let mut sent = Vec::new();
        let outcome = queue.flush(|o| -> Result<(), (Outgoing, ())> {
            sent.push(o.envelope.message_id);
            Ok(())
        });
        assert_eq!(outcome, FlushOutcome { sent: 3, error: None });
        assert_eq!(sent, vec!["a", "b", "c"]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_flush_stops_and_requeues_on_failure() {
        let mut queue = CommandQueue::new(None);
        let now = Instant::now();
        for id in ["a", "b", "c", "d"] {
            queue.enqueue(outgoing(id), now);
        }

        let mut sent = Vec::new();
        let outcome = queue.flush(|o| {
            if o.envelope.message_id == "c" {
                return Err((o, "link down"));
            }
            sent.push(o.envelope.message_id);
            Ok(())
        });

        assert_eq!(outcome.sent, 2);
        assert_eq!(outcome.error, Some("link down"));
        assert_eq!(sent, vec!["a", "b"]);
        assert_eq!(queue.message_ids(), vec!["c", "d"]);
    }

    #[test]
    fn test_cap_evicts_oldest() {
        let mut queue = CommandQueue::new(Some(2));
        let now = Instant::now();
        queue.enqueue(outgoing("a"), now);
        queue.enqueue(outgoing("b"), now);
        let evicted = queue.enqueue(outgoing("c"), now).unwrap();

        assert_eq!(evicted.outgoing.envelope.message_id, "a");
        assert_eq!(queue.message_ids(), vec!["b", "c"]);
    }

    #[test]
    fn test_clear_removes_everything() {
        let mut queue = CommandQueue::new(None);
        let now = Instant::now();
        queue.enqueue(outgoing("a"), now);
        queue.enqueue(outgoing("b"), now);

        let removed = queue.clear();
        assert_eq!(removed.len(), 2);
        assert!(queue.is_empty());
    }
}
