use serde::{Deserialize, Serialize};
use std::fmt;

/// 会话状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// 空闲，可以发起播放
    Idle,
    /// 已请求生产者打开流，等待初始化分片
    Connecting,
    /// 已创建sink，分片持续追加
    Streaming,
    /// 已请求生产者关闭，等待流结束
    Stopping,
}

impl SessionState {
    /// 是否存在活动会话
    pub fn is_active(&self) -> bool {
        !matches!(self, SessionState::Idle)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::Connecting => "connecting",
            SessionState::Streaming => "streaming",
            SessionState::Stopping => "stopping",
        };
        f.write_str(name)
    }
}
