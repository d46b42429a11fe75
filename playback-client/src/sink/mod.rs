// PlayGo 播放客户端 - 播放缓冲抽象
//
// 本模块定义了增量媒体缓冲区（sink）与播放引擎的能力接口。
// 控制器只通过这两个trait访问底层媒体引擎，测试时可以替换为假实现。
//
// # 核心组件
//
// - `PlaybackSink`: 接收分片追加的增量缓冲区，每次只允许一个追加在途
// - `PlaybackEngine`: 创建sink、控制播放、在拆除时复位
// - `SinkNotifier`: sink把异步完成结果送回控制器事件循环的通道
// - `FileEngine`: 把追加的分片按序写入文件的录制引擎

pub mod file_sink;

pub use file_sink::{FileEngine, FileSink};

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::mpsc;
use tracing::trace;
use uuid::Uuid;

use crate::errors::PlaybackError;
use crate::session::events::{ControllerEvent, SinkEvent};
use playgo_common::EncodedSegment;

/// Sink标识
///
/// 每个sink创建时分配，完成事件带着它回到事件循环，
/// 与当前sink不一致的事件会被丢弃。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SinkId(Uuid);

impl SinkId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SinkId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Sink完成通知器
#[derive(Debug, Clone)]
pub struct SinkNotifier {
    sink: SinkId,
    events: mpsc::UnboundedSender<ControllerEvent>,
}

impl SinkNotifier {
    pub fn new(sink: SinkId, events: mpsc::UnboundedSender<ControllerEvent>) -> Self {
        Self { sink, events }
    }

    pub fn sink_id(&self) -> SinkId {
        self.sink
    }

    /// 追加完成，sink空闲
    pub fn idle(&self) {
        self.post(SinkEvent::Idle { sink: self.sink });
    }

    /// 追加在异步阶段失败
    pub fn failed(&self, reason: impl Into<String>) {
        self.post(SinkEvent::Failed {
            sink: self.sink,
            reason: reason.into(),
        });
    }

    fn post(&self, event: SinkEvent) {
        if self.events.send(ControllerEvent::Sink(event)).is_err() {
            trace!("Controller loop gone, dropping sink event for {}", self.sink);
        }
    }
}

/// 增量媒体缓冲区
///
/// `append` 只负责提交：同步拒绝以 `Err` 返回，
/// 提交成功后的完成或失败通过 `SinkNotifier` 异步送回。
pub trait PlaybackSink: Send {
    fn id(&self) -> SinkId;

    fn append(&mut self, segment: EncodedSegment) -> Result<(), PlaybackError>;

    /// 底层缓冲区是否仍在处理上一次追加
    fn is_busy(&self) -> bool;

    fn destroy(&mut self);
}

/// 播放引擎
pub trait PlaybackEngine: Send {
    /// 为指定编码创建sink并把它挂到引擎上
    fn create_sink(
        &mut self,
        codec: &str,
        sink_id: SinkId,
        notifier: SinkNotifier,
    ) -> Result<Box<dyn PlaybackSink>, PlaybackError>;

    fn is_paused(&self) -> bool;

    /// 请求开始或恢复播放
    fn play(&mut self) -> Result<(), PlaybackError>;

    /// 复位播放位置并解除数据源绑定
    fn reset(&mut self);
}
