use serde::{Deserialize, Serialize};

pub const UNKNOWN_STREAM_ID: &str = "Unknown stream id";
pub const UNKNOWN_MESSAGE_TYPE: &str = "Unknown message type";
pub const MALFORMED_MESSAGE: &str = "Malformed message";

/// 订阅者发往中继的控制消息
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ControlMessage {
    Subscribe { topic: String },
    Unsubscribe { topic: String },
}

impl ControlMessage {
    /// 解析控制消息
    ///
    /// 未知的`type`返回`Unknown message type`，无法解析的JSON返回`Malformed message`。
    pub fn parse(text: &str) -> Result<Self, ControlReply> {
        let value: serde_json::Value =
            serde_json::from_str(text).map_err(|_| ControlReply::error(MALFORMED_MESSAGE))?;

        match value.get("type").and_then(|t| t.as_str()) {
            Some("subscribe") | Some("unsubscribe") => serde_json::from_value(value)
                .map_err(|_| ControlReply::error(MALFORMED_MESSAGE)),
            _ => Err(ControlReply::error(UNKNOWN_MESSAGE_TYPE)),
        }
    }

    pub fn topic(&self) -> &str {
        match self {
            ControlMessage::Subscribe { topic } | ControlMessage::Unsubscribe { topic } => topic,
        }
    }
}

/// 中继返回给订阅者的错误负载
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlReply {
    pub error: String,
}

impl ControlReply {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }

    pub fn unknown_stream() -> Self {
        Self::error(UNKNOWN_STREAM_ID)
    }

    pub fn to_json(&self) -> String {
        // 只有一个字符串字段，序列化不会失败
        serde_json::to_string(self).unwrap_or_else(|_| format!("{{\"error\":\"{}\"}}", self.error))
    }
}
