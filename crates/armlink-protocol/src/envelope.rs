//! 消息信封
//!
//! 双向通用的 JSON 信封。上行消息由客户端填写 `messageId` 与 `timestamp`；
//! 下行消息可额外携带 `correlationId`，指向触发它的上行请求。

use crate::ProtocolError;
use crate::kinds::{InboundKind, OutboundKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    /// 消息类型（线路字符串）
    #[serde(rename = "type")]
    pub kind: String,

    /// 负载，可能为 `null`
    #[serde(default)]
    pub payload: Option<Value>,

    #[serde(default)]
    pub message_id: String,

    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,

    /// 下行应答的关联 ID（可选）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
}

impl Envelope {
    /// 构建上行信封
    pub fn outbound(
        kind: impl Into<String>,
        payload: Option<Value>,
        message_id: impl Into<String>,
    ) -> Self {
        Self {
            kind: kind.into(),
            payload,
            message_id: message_id.into(),
            timestamp: Utc::now(),
            correlation_id: None,
        }
    }

    /// 解析一帧原始文本
    ///
    /// 仅要求 `type` 存在且非空；其余字段缺失时使用默认值。
    pub fn decode(raw: &str) -> Result<Self, ProtocolError> {
        let envelope: Envelope = serde_json::from_str(raw)?;
        if envelope.kind.is_empty() {
            return Err(ProtocolError::MissingField("type"));
        }
        Ok(envelope)
    }

    pub fn encode(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }

    /// 下行类型（未知类型返回 `None`）
    pub fn inbound_kind(&self) -> Option<InboundKind> {
        InboundKind::parse(&self.kind)
    }

    pub fn outbound_kind(&self) -> Option<OutboundKind> {
        OutboundKind::parse(&self.kind)
    }

    /// 负载中的字符串字段
    pub fn payload_str(&self, field: &str) -> Option<&str> {
        self.payload.as_ref()?.get(field)?.as_str()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_encode_uses_wire_field_names() {
        let envelope = Envelope::outbound(
            OutboundKind::MoveJoint.as_str(),
            Some(json!({"joint": 1, "angle": 45.0})),
            "msg_1",
        );
        let value: Value = serde_json::from_str(&envelope.encode().unwrap()).unwrap();

        assert_eq!(value["type"], "move_joint");
        assert_eq!(value["messageId"], "msg_1");
        assert_eq!(value["payload"]["joint"], 1);
        assert!(value["timestamp"].as_str().unwrap().contains('T'));
        // 上行不携带 correlationId
        assert!(value.get("correlationId").is_none());
    }

    #[test]
    fn test_decode_inbound_with_correlation() {
        let raw = r#"{
            "type": "execution_result",
            "payload": {"success": true},
            "messageId": "srv_9",
            "timestamp": "2024-05-01T12:00:00.000Z",
            "correlationId": "msg_1"
        }"#;
        let envelope = Envelope::decode(raw).unwrap();
        assert_eq!(envelope.inbound_kind(), Some(InboundKind::ExecutionResult));
        assert_eq!(envelope.correlation_id.as_deref(), Some("msg_1"));
        assert_eq!(envelope.message_id, "srv_9");
    }

    #[test]
    fn test_decode_tolerates_missing_optional_fields() {
        let envelope = Envelope::decode(r#"{"type":"heartbeat_response"}"#).unwrap();
        assert!(envelope.payload.is_none());
        assert!(envelope.message_id.is_empty());
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(
            Envelope::decode("not json"),
            Err(ProtocolError::Malformed(_))
        ));
        assert!(matches!(
            Envelope::decode(r#"{"payload": {}}"#),
            Err(ProtocolError::Malformed(_))
        ));
        assert!(matches!(
            Envelope::decode(r#"{"type": ""}"#),
            Err(ProtocolError::MissingField("type"))
        ));
    }

    #[test]
    fn test_payload_str() {
        let envelope = Envelope::decode(
            r#"{"type":"error","payload":{"type":"robot_error","message":"overheat"}}"#,
        )
        .unwrap();
        assert_eq!(envelope.payload_str("type"), Some("robot_error"));
        assert_eq!(envelope.payload_str("missing"), None);
    }
}
