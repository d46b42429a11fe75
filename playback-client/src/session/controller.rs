// PlayGo 播放客户端 - 流会话控制器
//
// 本模块实现了客户端缓冲控制器：一个显式的有限状态机
// （Idle / Connecting / Streaming / Stopping），协调三个独立计时的事件源：
//
// - 生产者推送的 Init / Frame / Stopped 事件（没有流控，只保证顺序）
// - 播放引擎sink的异步“追加完成”信号
// - 用户的播放 / 停止 / 重连操作
//
// # 保证
//
// 1. 任意时刻最多一个追加在途
// 2. 追加顺序与生产者发送顺序一致
// 3. 已拆除会话或已销毁sink遗留的事件一律丢弃，不改变当前状态

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

use super::events::{ControllerEvent, ControllerHandle, SinkEvent, UiEvent, UserAction};
use super::queue::FrameQueue;
use super::reconnect::ReconnectPolicy;
use super::state::SessionState;
use super::writer::{BufferWriter, DrainOutcome};
use crate::config::{ClientConfig, QueueConfig, SessionConfig};
use crate::errors::PlaybackError;
use crate::producer::Producer;
use crate::sink::{PlaybackEngine, SinkId, SinkNotifier};
use playgo_common::{EncodedSegment, ProducerEvent, SessionId};

/// 会话统计信息
#[derive(Debug, Clone, Serialize)]
pub struct SessionStats {
    /// 会话开始时间
    pub started_at: DateTime<Utc>,
    /// 已提交的分片数（含初始化分片）
    pub appended_segments: u64,
    /// 已提交的字节数
    pub appended_bytes: u64,
    /// 丢弃的分片数
    pub dropped_segments: u64,
    /// 队列峰值深度
    pub peak_queue_depth: usize,
}

impl SessionStats {
    fn new() -> Self {
        Self {
            started_at: Utc::now(),
            appended_segments: 0,
            appended_bytes: 0,
            dropped_segments: 0,
            peak_queue_depth: 0,
        }
    }

    fn record_append(&mut self, bytes: usize) {
        self.appended_segments += 1;
        self.appended_bytes += bytes as u64;
    }

    fn record_drain(&mut self, outcome: DrainOutcome) {
        if let Some(bytes) = outcome.submitted_bytes {
            self.record_append(bytes);
        }
        self.dropped_segments += outcome.dropped as u64;
    }
}

/// 一次播放会话
///
/// 在发起播放时创建，拆除时销毁，会话之间不共享任何可变状态。
pub struct StreamSession {
    id: SessionId,
    target: String,
    codec: Option<String>,
    queue: FrameQueue,
    writer: BufferWriter,
    init_pending: bool,
    stats: SessionStats,
}

impl StreamSession {
    fn new(target: String, queue: &QueueConfig) -> Self {
        Self {
            id: SessionId::new(),
            target,
            codec: None,
            queue: FrameQueue::new(queue),
            writer: BufferWriter::new(),
            init_pending: false,
            stats: SessionStats::new(),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn codec(&self) -> Option<&str> {
        self.codec.as_deref()
    }

    fn stats_snapshot(&self) -> SessionStats {
        let mut stats = self.stats.clone();
        stats.peak_queue_depth = self.queue.peak_depth();
        stats
    }
}

/// 流会话控制器
///
/// 所有事件通过 [`StreamController::handle`] 逐个处理，处理函数从不阻塞；
/// sink追加、生产者打开/关闭都是异步操作，其结果作为后续事件重新进入队列。
pub struct StreamController {
    state: SessionState,
    session: Option<StreamSession>,
    reconnect: ReconnectPolicy,
    producer: Box<dyn Producer>,
    engine: Box<dyn PlaybackEngine>,
    session_config: SessionConfig,
    queue_config: QueueConfig,
    events: mpsc::UnboundedSender<ControllerEvent>,
    ui: broadcast::Sender<UiEvent>,
}

impl StreamController {
    pub fn new(
        config: &ClientConfig,
        producer: Box<dyn Producer>,
        engine: Box<dyn PlaybackEngine>,
        handle: &ControllerHandle,
    ) -> Self {
        Self {
            state: SessionState::Idle,
            session: None,
            reconnect: ReconnectPolicy::new(),
            producer,
            engine,
            session_config: config.session.clone(),
            queue_config: config.queue.clone(),
            events: handle.event_sender(),
            ui: handle.ui_sender(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn session(&self) -> Option<&StreamSession> {
        self.session.as_ref()
    }

    pub fn session_id(&self) -> Option<SessionId> {
        self.session.as_ref().map(|s| s.id)
    }

    pub fn sink_id(&self) -> Option<SinkId> {
        self.session.as_ref().and_then(|s| s.writer.sink_id())
    }

    pub fn queue_len(&self) -> usize {
        self.session.as_ref().map(|s| s.queue.len()).unwrap_or(0)
    }

    pub fn writer_busy(&self) -> bool {
        self.session
            .as_ref()
            .map(|s| s.writer.is_busy())
            .unwrap_or(false)
    }

    pub fn reconnect_armed(&self) -> bool {
        self.reconnect.is_armed()
    }

    pub fn stats(&self) -> Option<SessionStats> {
        self.session.as_ref().map(|s| s.stats_snapshot())
    }

    /// 事件循环：逐个处理事件，直到收到 `Shutdown`
    pub async fn run(mut self, mut events: mpsc::UnboundedReceiver<ControllerEvent>) {
        info!("Stream controller loop started");

        while let Some(event) = events.recv().await {
            if matches!(event, ControllerEvent::Shutdown) {
                self.shutdown();
                break;
            }
            self.handle(event);
        }

        info!("Stream controller loop exited");
    }

    /// 处理一个事件，运行到完成
    pub fn handle(&mut self, event: ControllerEvent) {
        match event {
            ControllerEvent::User(action) => self.on_user_action(action),
            ControllerEvent::OpenResolved { session, accepted } => {
                self.on_open_resolved(session, accepted)
            }
            ControllerEvent::Producer { session, event } => self.on_producer_event(session, event),
            ControllerEvent::Sink(event) => self.on_sink_event(event),
            ControllerEvent::ConnectTimeout { session } => self.on_connect_timeout(session),
            ControllerEvent::Shutdown => self.shutdown(),
        }
    }

    fn on_user_action(&mut self, action: UserAction) {
        match action {
            UserAction::Play(target) => self.request_play(target),
            UserAction::Stop => self.request_stop(),
            UserAction::Reconnect => self.request_reconnect(),
        }
    }

    // ========== 用户操作 ==========

    fn request_play(&mut self, target: String) {
        if self.state != SessionState::Idle {
            debug!("Play request ignored in state {}", self.state);
            return;
        }

        let target = target.trim().to_string();
        if target.is_empty() {
            warn!("Play request ignored: empty target");
            return;
        }

        let session = StreamSession::new(target.clone(), &self.queue_config);
        let session_id = session.id;
        info!("▶ Session {} opening {}", session_id, target);

        self.session = Some(session);
        self.set_state(SessionState::Connecting);
        self.producer.open_stream(session_id, &target);

        if let Some(timeout) = self.session_config.connect_timeout() {
            self.arm_connect_timer(session_id, timeout);
        }
    }

    fn request_stop(&mut self) {
        match self.state {
            SessionState::Idle | SessionState::Stopping => {
                debug!("Stop request ignored in state {}", self.state);
            }
            SessionState::Connecting | SessionState::Streaming => self.begin_stop(),
        }
    }

    fn request_reconnect(&mut self) {
        if self.state != SessionState::Streaming {
            debug!("Reconnect request ignored in state {}", self.state);
            return;
        }
        info!("Reconnect requested");
        self.reconnect.arm();
        self.begin_stop();
    }

    fn begin_stop(&mut self) {
        let Some(session_id) = self.session_id() else {
            return;
        };
        self.set_state(SessionState::Stopping);
        self.producer.close_stream(session_id);
    }

    /// 致命错误：请求生产者关闭，拆除在收到 `Stopped` 时进行
    fn abort_session(&mut self) {
        if !matches!(
            self.state,
            SessionState::Connecting | SessionState::Streaming
        ) {
            return;
        }
        if let Some(session_id) = self.session_id() {
            warn!("Session {} cannot proceed, stopping", session_id);
        }
        self.begin_stop();
    }

    // ========== 生产者事件 ==========

    fn on_open_resolved(&mut self, session: SessionId, accepted: bool) {
        if !self.is_current(session) {
            debug!("Discarding open result for stale session {}", session);
            return;
        }

        if accepted {
            debug!("Session {} open accepted", session);
            return;
        }

        match self.state {
            SessionState::Connecting => self.reject_open(),
            SessionState::Streaming | SessionState::Stopping => {
                warn!("Session {} open failed after start, tearing down", session);
                self.finish_session();
            }
            SessionState::Idle => {}
        }
    }

    fn reject_open(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };

        warn!(
            "{}",
            PlaybackError::ProducerOpen {
                target: session.target.clone(),
            }
        );
        if self.reconnect.take() {
            debug!("Pending reconnect cleared");
        }

        self.set_state(SessionState::Idle);
        self.emit(UiEvent::OpenRejected {
            session: session.id,
            target: session.target,
        });
    }

    fn on_producer_event(&mut self, session: SessionId, event: ProducerEvent) {
        if !self.is_current(session) {
            debug!(
                "Discarding {} event for stale session {}",
                event.kind(),
                session
            );
            return;
        }

        match event {
            ProducerEvent::Init { codec, data } => self.on_init(codec, &data),
            ProducerEvent::Frame { data } => self.on_frame(&data),
            ProducerEvent::Stopped => self.finish_session(),
        }
    }

    fn on_init(&mut self, codec: String, data: &str) {
        if self.state != SessionState::Connecting {
            warn!("Unexpected init segment in state {}, ignoring", self.state);
            return;
        }

        let init = match EncodedSegment::decode(data) {
            Ok(init) => init,
            Err(e) => {
                error!("Init segment undecodable: {}", PlaybackError::from(e));
                self.abort_session();
                return;
            }
        };

        let Some(session) = self.session.as_mut() else {
            return;
        };

        let sink_id = SinkId::new();
        let notifier = SinkNotifier::new(sink_id, self.events.clone());
        match self.engine.create_sink(&codec, sink_id, notifier) {
            Ok(sink) => session.writer.attach(sink),
            Err(e) => {
                error!("Cannot create sink for {}: {}", codec, e);
                self.abort_session();
                return;
            }
        }

        let init_len = init.len();
        session.codec = Some(codec);
        session.init_pending = true;

        match session.writer.submit(init) {
            Ok(()) => {
                session.stats.record_append(init_len);
                info!(
                    "Session {} streaming ({} init bytes, codec {})",
                    session.id,
                    init_len,
                    session.codec.as_deref().unwrap_or_default()
                );
                self.set_state(SessionState::Streaming);
            }
            Err(e) => {
                error!("Init segment rejected by sink: {}", e);
                self.abort_session();
            }
        }
    }

    fn on_frame(&mut self, data: &str) {
        if self.state != SessionState::Streaming {
            debug!("Dropping frame received in state {}", self.state);
            return;
        }

        let Some(session) = self.session.as_mut() else {
            return;
        };

        let pushed = EncodedSegment::decode(data)
            .map_err(PlaybackError::from)
            .and_then(|segment| session.queue.push(segment));
        if let Err(e) = pushed {
            warn!("Dropping frame: {}", e);
            session.stats.dropped_segments += 1;
        }

        self.drain();
    }

    fn drain(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };

        let outcome = session.writer.drain(&mut session.queue);
        session.stats.record_drain(outcome);

        if let Some(signal) = session.queue.flow_signal() {
            debug!(
                "Session {} flow {:?} at {} queued segments",
                session.id,
                signal,
                session.queue.len()
            );
            self.producer.set_flow_paused(session.id, signal.paused());
        }
    }

    // ========== Sink事件 ==========

    fn on_sink_event(&mut self, event: SinkEvent) {
        let sink = event.sink_id();
        let Some(session) = self.session.as_mut() else {
            debug!("Discarding event for sink {}: no active session", sink);
            return;
        };

        if !session.writer.on_sink_idle(sink) {
            debug!("Discarding event for stale sink {}", sink);
            return;
        }
        let init_completed = std::mem::take(&mut session.init_pending);

        match event {
            SinkEvent::Idle { .. } => {
                if init_completed && self.state != SessionState::Streaming {
                    debug!("Init segment appended after stop requested, not starting playback");
                } else if init_completed {
                    let session_id = session.id;
                    info!("✓ Init segment appended, starting playback ({})", session_id);
                    if let Err(e) = self.engine.play() {
                        warn!("Failed to start playback: {}", e);
                    }
                    self.emit(UiEvent::ReadyToPlay {
                        session: session_id,
                    });
                } else if self.state == SessionState::Streaming && self.engine.is_paused() {
                    if let Err(e) = self.engine.play() {
                        warn!("Failed to resume play: {}", e);
                    }
                }
                self.drain();
            }
            SinkEvent::Failed { reason, .. } => {
                if init_completed {
                    error!("Init segment append failed: {}", reason);
                    self.abort_session();
                    return;
                }
                warn!(
                    "Segment append failed, dropping: {}",
                    PlaybackError::SinkAppend { reason }
                );
                session.stats.dropped_segments += 1;
                self.drain();
            }
        }
    }

    fn on_connect_timeout(&mut self, session: SessionId) {
        if !self.is_current(session) || self.state != SessionState::Connecting {
            debug!("Connect timer for session {} expired after handshake", session);
            return;
        }

        warn!("Session {} timed out waiting for init segment", session);
        self.producer.close_stream(session);
        self.teardown(false);
    }

    // ========== 拆除 ==========

    /// 会话结束：拆除后按需重连
    fn finish_session(&mut self) {
        let reconnect = self.reconnect.take();
        let Some(target) = self.teardown(reconnect) else {
            return;
        };

        if reconnect {
            info!("🔄 Reconnecting to {}", target);
            self.request_play(target);
        }
    }

    /// 清空队列、复位写入器、释放sink、复位播放引擎，然后通知UI
    ///
    /// 会话被取走后再到达的事件都不再匹配当前会话，因此每个会话只拆除一次。
    fn teardown(&mut self, reconnecting: bool) -> Option<String> {
        let mut session = self.session.take()?;

        session.queue.clear();
        session.writer.release();
        self.engine.reset();

        let stats = session.stats_snapshot();
        info!(
            "⏹ Session {} ({}) ended after {}s: {} segments ({} bytes) appended, {} dropped, peak queue {}",
            session.id,
            session.codec().unwrap_or("no codec"),
            (Utc::now() - stats.started_at).num_seconds(),
            stats.appended_segments,
            stats.appended_bytes,
            stats.dropped_segments,
            stats.peak_queue_depth
        );

        self.set_state(SessionState::Idle);
        self.emit(UiEvent::StreamEnded {
            session: session.id,
            reconnecting,
        });

        Some(session.target)
    }

    fn shutdown(&mut self) {
        if let Some(session_id) = self.session_id() {
            info!("Shutting down active session {}", session_id);
            self.producer.close_stream(session_id);
            self.reconnect.take();
            self.teardown(false);
        }
    }

    // ========== 辅助 ==========

    fn is_current(&self, session: SessionId) -> bool {
        self.session
            .as_ref()
            .map(|s| s.id == session)
            .unwrap_or(false)
    }

    fn set_state(&mut self, state: SessionState) {
        if self.state == state {
            return;
        }
        debug!("Session state {} -> {}", self.state, state);
        self.state = state;
        self.emit(UiEvent::StateChanged { state });
    }

    fn emit(&self, event: UiEvent) {
        // 没有订阅者时发送失败，忽略
        let _ = self.ui.send(event);
    }

    fn arm_connect_timer(&self, session: SessionId, timeout: Duration) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("No async runtime, connect timeout disabled for session {}", session);
            return;
        };

        let events = self.events.clone();
        runtime.spawn(async move {
            tokio::time::sleep(timeout).await;
            let _ = events.send(ControllerEvent::ConnectTimeout { session });
        });
    }
}
