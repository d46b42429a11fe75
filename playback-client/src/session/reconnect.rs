/// 重连标志
///
/// 由用户的“重连”操作置位，在当前会话完全停止时被消费且只消费一次。
#[derive(Debug, Default)]
pub struct ReconnectPolicy {
    armed: bool,
}

impl ReconnectPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arm(&mut self) {
        self.armed = true;
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    /// 消费标志，返回消费前是否已置位
    pub fn take(&mut self) -> bool {
        std::mem::take(&mut self.armed)
    }
}
