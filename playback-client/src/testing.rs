// 测试用的假生产者、假播放引擎以及控制器驱动器

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{broadcast, mpsc};

use crate::config::ClientConfig;
use crate::errors::PlaybackError;
use crate::producer::Producer;
use crate::session::{
    ControllerEvent, ControllerHandle, SinkEvent, StreamController, UiEvent, UserAction,
};
use crate::sink::{PlaybackEngine, PlaybackSink, SinkId, SinkNotifier};
use playgo_common::{EncodedSegment, ProducerEvent, SessionId};

#[derive(Default)]
struct EngineLog {
    appended: HashMap<SinkId, Vec<Vec<u8>>>,
    outstanding: HashMap<SinkId, usize>,
    max_outstanding: usize,
    rejected_payloads: Vec<Vec<u8>>,
    destroyed: Vec<SinkId>,
    created: Vec<(SinkId, String)>,
    fail_creation: bool,
    play_fails: bool,
    paused: bool,
    play_calls: usize,
    resets: usize,
}

/// 记录假引擎和假sink上发生的一切
#[derive(Clone, Default)]
pub(crate) struct EngineProbe(Arc<Mutex<EngineLog>>);

impl EngineProbe {
    fn with<T>(&self, f: impl FnOnce(&mut EngineLog) -> T) -> T {
        f(&mut self.0.lock().unwrap())
    }

    pub fn appended(&self, sink: SinkId) -> Vec<Vec<u8>> {
        self.with(|log| log.appended.get(&sink).cloned().unwrap_or_default())
    }

    pub fn outstanding(&self, sink: SinkId) -> usize {
        self.with(|log| log.outstanding.get(&sink).copied().unwrap_or(0))
    }

    pub fn max_outstanding(&self) -> usize {
        self.with(|log| log.max_outstanding)
    }

    /// 模拟底层完成一次追加
    pub fn finish_append(&self, sink: SinkId) {
        self.with(|log| {
            let count = log.outstanding.entry(sink).or_insert(0);
            assert!(*count > 0, "no append outstanding on sink {}", sink);
            *count -= 1;
        })
    }

    /// 内容等于 `payload` 的分片追加时被同步拒绝
    pub fn reject_payload(&self, payload: &[u8]) {
        self.with(|log| log.rejected_payloads.push(payload.to_vec()))
    }

    pub fn destroyed(&self) -> Vec<SinkId> {
        self.with(|log| log.destroyed.clone())
    }

    pub fn created(&self) -> Vec<(SinkId, String)> {
        self.with(|log| log.created.clone())
    }

    pub fn fail_creation(&self) {
        self.with(|log| log.fail_creation = true)
    }

    pub fn set_play_fails(&self, fails: bool) {
        self.with(|log| log.play_fails = fails)
    }

    pub fn set_paused(&self, paused: bool) {
        self.with(|log| log.paused = paused)
    }

    pub fn play_calls(&self) -> usize {
        self.with(|log| log.play_calls)
    }

    pub fn resets(&self) -> usize {
        self.with(|log| log.resets)
    }
}

pub(crate) struct FakeSink {
    id: SinkId,
    probe: EngineProbe,
}

impl FakeSink {
    pub fn new(id: SinkId, probe: EngineProbe) -> Self {
        Self { id, probe }
    }
}

impl PlaybackSink for FakeSink {
    fn id(&self) -> SinkId {
        self.id
    }

    fn append(&mut self, segment: EncodedSegment) -> Result<(), PlaybackError> {
        let payload = segment.data().to_vec();
        let id = self.id;
        self.probe.with(|log| {
            if log.rejected_payloads.contains(&payload) {
                return Err(PlaybackError::SinkAppend {
                    reason: "rejected".to_string(),
                });
            }
            log.appended.entry(id).or_default().push(payload);
            let count = log.outstanding.entry(id).or_insert(0);
            *count += 1;
            log.max_outstanding = log.max_outstanding.max(*count);
            Ok(())
        })
    }

    fn is_busy(&self) -> bool {
        self.probe.outstanding(self.id) > 0
    }

    fn destroy(&mut self) {
        let id = self.id;
        self.probe.with(|log| log.destroyed.push(id));
    }
}

pub(crate) struct FakeEngine {
    probe: EngineProbe,
}

impl FakeEngine {
    pub fn new(probe: EngineProbe) -> Self {
        Self { probe }
    }
}

impl PlaybackEngine for FakeEngine {
    fn create_sink(
        &mut self,
        codec: &str,
        sink_id: SinkId,
        _notifier: SinkNotifier,
    ) -> Result<Box<dyn PlaybackSink>, PlaybackError> {
        let fail = self.probe.with(|log| {
            log.created.push((sink_id, codec.to_string()));
            log.fail_creation
        });
        if fail {
            return Err(PlaybackError::SinkCreation {
                reason: "engine refused".to_string(),
            });
        }
        Ok(Box::new(FakeSink::new(sink_id, self.probe.clone())))
    }

    fn is_paused(&self) -> bool {
        self.probe.with(|log| log.paused)
    }

    fn play(&mut self) -> Result<(), PlaybackError> {
        self.probe.with(|log| {
            log.play_calls += 1;
            if log.play_fails {
                return Err(PlaybackError::PlaybackResume {
                    reason: "autoplay blocked".to_string(),
                });
            }
            log.paused = false;
            Ok(())
        })
    }

    fn reset(&mut self) {
        self.probe.with(|log| {
            log.resets += 1;
            log.paused = true;
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ProducerCall {
    Open { session: SessionId, target: String },
    Close { session: SessionId },
    Flow { session: SessionId, paused: bool },
}

#[derive(Clone, Default)]
pub(crate) struct ProducerProbe(Arc<Mutex<Vec<ProducerCall>>>);

impl ProducerProbe {
    pub fn calls(&self) -> Vec<ProducerCall> {
        self.0.lock().unwrap().clone()
    }

    pub fn opened_targets(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                ProducerCall::Open { target, .. } => Some(target),
                _ => None,
            })
            .collect()
    }

    pub fn close_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| matches!(call, ProducerCall::Close { .. }))
            .count()
    }

    pub fn flow_requests(&self) -> Vec<bool> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                ProducerCall::Flow { paused, .. } => Some(paused),
                _ => None,
            })
            .collect()
    }
}

pub(crate) struct FakeProducer {
    probe: ProducerProbe,
}

impl FakeProducer {
    pub fn new(probe: ProducerProbe) -> Self {
        Self { probe }
    }
}

impl Producer for FakeProducer {
    fn open_stream(&mut self, session: SessionId, target: &str) {
        self.probe.0.lock().unwrap().push(ProducerCall::Open {
            session,
            target: target.to_string(),
        });
    }

    fn close_stream(&mut self, session: SessionId) {
        self.probe
            .0
            .lock()
            .unwrap()
            .push(ProducerCall::Close { session });
    }

    fn set_flow_paused(&mut self, session: SessionId, paused: bool) {
        self.probe
            .0
            .lock()
            .unwrap()
            .push(ProducerCall::Flow { session, paused });
    }
}

/// 同步驱动控制器，每个事件处理完后检查写入器不变量
pub(crate) struct Harness {
    pub controller: StreamController,
    pub engine: EngineProbe,
    pub producer: ProducerProbe,
    ui: broadcast::Receiver<UiEvent>,
    _events: mpsc::UnboundedReceiver<ControllerEvent>,
}

impl Harness {
    pub fn new() -> Self {
        let mut config = ClientConfig::default();
        config.session.connect_timeout = std::time::Duration::ZERO;
        Self::with_config(config)
    }

    pub fn with_config(config: ClientConfig) -> Self {
        let (handle, events) = ControllerHandle::channel();
        let ui = handle.subscribe_ui();
        let engine = EngineProbe::default();
        let producer = ProducerProbe::default();

        let controller = StreamController::new(
            &config,
            Box::new(FakeProducer::new(producer.clone())),
            Box::new(FakeEngine::new(engine.clone())),
            &handle,
        );

        Self {
            controller,
            engine,
            producer,
            ui,
            _events: events,
        }
    }

    pub fn dispatch(&mut self, event: ControllerEvent) {
        self.controller.handle(event);
        self.assert_writer_invariant();
    }

    pub fn play(&mut self, target: &str) {
        self.dispatch(ControllerEvent::User(UserAction::Play(target.to_string())));
    }

    pub fn stop(&mut self) {
        self.dispatch(ControllerEvent::User(UserAction::Stop));
    }

    pub fn reconnect(&mut self) {
        self.dispatch(ControllerEvent::User(UserAction::Reconnect));
    }

    pub fn session(&self) -> SessionId {
        self.controller.session_id().expect("no active session")
    }

    pub fn open(&mut self, accepted: bool) {
        let session = self.session();
        self.dispatch(ControllerEvent::OpenResolved { session, accepted });
    }

    pub fn send(&mut self, session: SessionId, event: ProducerEvent) {
        self.dispatch(ControllerEvent::Producer { session, event });
    }

    pub fn init(&mut self, codec: &str, payload: &[u8]) {
        let session = self.session();
        self.send(
            session,
            ProducerEvent::init(codec, &EncodedSegment::new(payload.to_vec())),
        );
    }

    pub fn frame(&mut self, payload: &[u8]) {
        let session = self.session();
        self.send(
            session,
            ProducerEvent::frame(&EncodedSegment::new(payload.to_vec())),
        );
    }

    pub fn stopped(&mut self) {
        let session = self.session();
        self.send(session, ProducerEvent::Stopped);
    }

    /// 完成当前sink上在途的追加；没有在途追加时返回false
    pub fn complete(&mut self) -> bool {
        let Some(sink) = self.controller.sink_id() else {
            return false;
        };
        if self.engine.outstanding(sink) == 0 {
            return false;
        }
        self.engine.finish_append(sink);
        self.dispatch(ControllerEvent::Sink(SinkEvent::Idle { sink }));
        true
    }

    /// 当前在途的追加异步失败
    pub fn fail_pending(&mut self, reason: &str) {
        let sink = self.controller.sink_id().expect("no sink attached");
        self.engine.finish_append(sink);
        self.dispatch(ControllerEvent::Sink(SinkEvent::Failed {
            sink,
            reason: reason.to_string(),
        }));
    }

    pub fn complete_all(&mut self) {
        while self.complete() {}
    }

    /// 建立一个已进入Streaming且初始化分片已完成的会话
    pub fn start_streaming(&mut self, target: &str) -> SessionId {
        self.play(target);
        self.open(true);
        self.init("avc1.64001f", b"I");
        self.complete();
        self.session()
    }

    pub fn appended(&self) -> Vec<Vec<u8>> {
        self.controller
            .sink_id()
            .map(|sink| self.engine.appended(sink))
            .unwrap_or_default()
    }

    pub fn ui_events(&mut self) -> Vec<UiEvent> {
        std::iter::from_fn(|| self.ui.try_recv().ok()).collect()
    }

    fn assert_writer_invariant(&self) {
        assert!(
            self.engine.max_outstanding() <= 1,
            "more than one append outstanding"
        );
        let outstanding = self
            .controller
            .sink_id()
            .map(|sink| self.engine.outstanding(sink))
            .unwrap_or(0);
        assert_eq!(
            self.controller.writer_busy(),
            outstanding == 1,
            "writer busy flag out of sync with sink"
        );
    }
}
