//! 消息关联 ID 生成
//!
//! ID 格式：`msg_<毫秒时间戳>_<会话前缀>_<序号>`
//!
//! - 序号在同一个生成器内单调递增，保证进程内唯一
//! - 会话前缀随机生成，避免重启后与服务端残留的旧 ID 冲突

use rand::Rng;
use std::sync::atomic::{AtomicU64, Ordering};

/// 线程安全的消息 ID 生成器
#[derive(Debug)]
pub struct MessageIdGenerator {
    session: String,
    next: AtomicU64,
}

impl MessageIdGenerator {
    pub fn new() -> Self {
        let session: u32 = rand::thread_rng().r#gen();
        Self {
            session: format!("{session:08x}"),
            next: AtomicU64::new(1),
        }
    }

    /// 生成下一个 ID
    pub fn next_id(&self) -> String {
        let seq = self.next.fetch_add(1, Ordering::Relaxed);
        let millis = chrono::Utc::now().timestamp_millis();
        format!("msg_{millis}_{}_{seq}", self.session)
    }
}

impl Default for MessageIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}
