use serde::{Deserialize, Serialize};

use crate::error::WireError;
use crate::types::EncodedSegment;

/// 生产者推送的事件
///
/// 事件通道保证顺序：每个会话恰好一个 `Init`，随后零个或多个 `Frame`，
/// 最后恰好一个 `Stopped`。分片数据以Base64文本传输。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ProducerEvent {
    /// 初始化分片及其编码参数（如 `avc1.64001f`）
    Init { codec: String, data: String },
    /// 媒体分片
    Frame { data: String },
    /// 流结束（正常结束或出错）
    Stopped,
}

impl ProducerEvent {
    pub fn init(codec: impl Into<String>, segment: &EncodedSegment) -> Self {
        ProducerEvent::Init {
            codec: codec.into(),
            data: segment.encode(),
        }
    }

    pub fn frame(segment: &EncodedSegment) -> Self {
        ProducerEvent::Frame {
            data: segment.encode(),
        }
    }

    /// 解析一行JSON事件
    pub fn from_json(line: &str) -> Result<Self, WireError> {
        Ok(serde_json::from_str(line)?)
    }

    pub fn to_json(&self) -> Result<String, WireError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ProducerEvent::Init { .. } => "init",
            ProducerEvent::Frame { .. } => "frame",
            ProducerEvent::Stopped => "stopped",
        }
    }
}
