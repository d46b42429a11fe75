// PlayGo 播放客户端 - 控制器事件
//
// 三个相互独立的事件源（生产者推送、sink完成信号、用户操作）全部汇入同一个
// 单消费者队列，控制器逐个处理，处理函数运行完毕后才取下一个事件。

use serde::Serialize;
use tokio::sync::{broadcast, mpsc};
use tracing::trace;

use super::state::SessionState;
use crate::sink::SinkId;
use playgo_common::{ProducerEvent, SessionId};

/// 用户操作
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserAction {
    /// 播放指定地址
    Play(String),
    /// 停止当前会话
    Stop,
    /// 停止当前会话并在停止后自动以同一地址重新播放
    Reconnect,
}

/// Sink完成事件
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkEvent {
    /// 在途追加完成
    Idle { sink: SinkId },
    /// 在途追加异步失败
    Failed { sink: SinkId, reason: String },
}

impl SinkEvent {
    pub fn sink_id(&self) -> SinkId {
        match self {
            SinkEvent::Idle { sink } | SinkEvent::Failed { sink, .. } => *sink,
        }
    }
}

/// 控制器事件
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControllerEvent {
    User(UserAction),
    /// 生产者对打开请求的应答
    OpenResolved { session: SessionId, accepted: bool },
    /// 生产者推送的事件
    Producer {
        session: SessionId,
        event: ProducerEvent,
    },
    Sink(SinkEvent),
    /// 等待初始化分片超时
    ConnectTimeout { session: SessionId },
    Shutdown,
}

/// 发往UI的通知
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum UiEvent {
    StateChanged { state: SessionState },
    /// 初始化分片追加完成，播放已开始
    ReadyToPlay { session: SessionId },
    /// 拆除完成
    StreamEnded {
        session: SessionId,
        reconnecting: bool,
    },
    /// 生产者拒绝打开
    OpenRejected { session: SessionId, target: String },
}

/// 控制器的对外句柄
#[derive(Debug, Clone)]
pub struct ControllerHandle {
    events: mpsc::UnboundedSender<ControllerEvent>,
    ui: broadcast::Sender<UiEvent>,
}

impl ControllerHandle {
    /// 创建事件队列，返回句柄和控制器使用的接收端
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ControllerEvent>) {
        let (events, events_rx) = mpsc::unbounded_channel();
        let (ui, _) = broadcast::channel(64);
        (Self { events, ui }, events_rx)
    }

    pub fn play(&self, target: impl Into<String>) {
        self.send(ControllerEvent::User(UserAction::Play(target.into())));
    }

    pub fn stop(&self) {
        self.send(ControllerEvent::User(UserAction::Stop));
    }

    pub fn reconnect(&self) {
        self.send(ControllerEvent::User(UserAction::Reconnect));
    }

    pub fn shutdown(&self) {
        self.send(ControllerEvent::Shutdown);
    }

    pub fn subscribe_ui(&self) -> broadcast::Receiver<UiEvent> {
        self.ui.subscribe()
    }

    /// 给生产者和sink使用的事件发送端
    pub fn event_sender(&self) -> mpsc::UnboundedSender<ControllerEvent> {
        self.events.clone()
    }

    pub(crate) fn ui_sender(&self) -> broadcast::Sender<UiEvent> {
        self.ui.clone()
    }

    fn send(&self, event: ControllerEvent) {
        if self.events.send(event).is_err() {
            trace!("Controller loop gone, dropping user action");
        }
    }
}
