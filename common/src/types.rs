use base64::{engine::general_purpose, Engine as _};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::error::WireError;

/// 播放会话ID
///
/// 每次发起播放都会生成新的会话ID，生产者回传的所有事件都带有该ID，
/// 控制器据此丢弃已经结束的会话遗留的事件。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 编码后的媒体分片
///
/// 不透明的字节负载，除到达顺序外没有其他标识。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedSegment {
    data: Bytes,
}

impl EncodedSegment {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self { data: data.into() }
    }

    /// 从线上的Base64文本解码
    pub fn decode(text: &str) -> Result<Self, WireError> {
        let data = general_purpose::STANDARD.decode(text.trim())?;
        Ok(Self::new(data))
    }

    /// 编码为线上的Base64文本
    pub fn encode(&self) -> String {
        general_purpose::STANDARD.encode(&self.data)
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn into_bytes(self) -> Bytes {
        self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segment_decode() {
        let segment = EncodedSegment::decode("AAECAw==").unwrap();
        assert_eq!(segment.data().as_ref(), &[0u8, 1, 2, 3]);
        assert_eq!(segment.len(), 4);
        assert_eq!(segment.encode(), "AAECAw==");
    }

    #[test]
    fn test_segment_decode_rejects_garbage() {
        let result = EncodedSegment::decode("not base64!!");
        assert!(matches!(result, Err(WireError::InvalidBase64(_))));
    }

    #[test]
    fn test_session_ids_are_unique() {
        let a = SessionId::new();
        let b = SessionId::new();
        assert_ne!(a, b);
        assert_eq!(a.to_string(), a.as_uuid().to_string());
    }
}
