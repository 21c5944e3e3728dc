//! 遥测摄入
//!
//! 解析 `robot_telemetry` 负载，规范化为 `TelemetryFrame`，整体替换当前快照，
//! 再交给 `SafetyMonitor` 检查。读者持有旧快照的 `Arc` 不会看到撕裂的数据。

use crate::safety::{SafetyMonitor, SafetyViolation};
use arc_swap::ArcSwapOption;
use armlink_protocol::{Envelope, ProtocolError, RawTelemetry, RobotConfig, TelemetryFrame};
use std::sync::Arc;

/// 一次摄入的结果
#[derive(Debug, Clone)]
pub struct Ingested {
    pub frame: Arc<TelemetryFrame>,
    pub violations: Vec<SafetyViolation>,
}

pub struct TelemetryIngestor {
    snapshot: Arc<ArcSwapOption<TelemetryFrame>>,
    safety: SafetyMonitor,
}

impl TelemetryIngestor {
    /// # 参数
    /// - `config`: 机器人阈值（关节数以 `joint_limits` 为准）
    /// - `snapshot`: 当前遥测快照的存放位置（与读者共享）
    pub fn new(config: Arc<RobotConfig>, snapshot: Arc<ArcSwapOption<TelemetryFrame>>) -> Self {
        Self {
            snapshot,
            safety: SafetyMonitor::new(config),
        }
    }

    /// 期望的关节数
    pub fn joints(&self) -> usize {
        self.safety.config().joint_count()
    }

    pub fn current(&self) -> Option<Arc<TelemetryFrame>> {
        self.snapshot.load_full()
    }

    /// 摄入一条遥测消息
    ///
    /// 负载结构不合法时返回错误，当前快照保持不变。
    pub fn ingest(&self, envelope: &Envelope) -> Result<Ingested, ProtocolError> {
        let raw = RawTelemetry::from_payload(envelope.payload.as_ref())?;
        let previous = self.snapshot.load_full();
        let frame = Arc::new(TelemetryFrame::normalize(
            raw,
            previous.as_deref(),
            self.joints(),
            envelope.timestamp,
        ));
        self.snapshot.store(Some(frame.clone()));

        let violations = self.safety.evaluate(&frame);
        Ok(Ingested { frame, violations })
    }
}
