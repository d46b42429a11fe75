// PlayGo 播放客户端 - 本地文件生产者
//
// 按播放地址选择数据源并在后台任务中回放：
//
// - `*.jsonl` / `*.ndjson`: 生产者事件记录，逐行回放
// - `*.mp4` / `*.m4s` / `*.fmp4`: 分片MP4，按box切分后回放
//
// 地址可以带 `file://` 前缀，其他协议一律拒绝打开。

use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{EventSource, Fmp4Source, JsonLinesSource, Producer};
use crate::config::ProducerConfig;
use crate::errors::ProducerError;
use crate::session::events::ControllerEvent;
use playgo_common::{ProducerEvent, SessionId};

/// 数据源类型
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceKind {
    /// JSON Lines事件记录
    EventLog(PathBuf),
    /// 分片MP4文件
    Fragmented(PathBuf),
}

impl SourceKind {
    /// 解析播放地址
    pub fn resolve(target: &str) -> Result<Self, ProducerError> {
        let path = target.strip_prefix("file://").unwrap_or(target);
        if path.is_empty() || path.contains("://") {
            return Err(ProducerError::UnsupportedTarget {
                target: target.to_string(),
            });
        }

        let extension = Path::new(path)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());

        match extension.as_deref() {
            Some("jsonl") | Some("ndjson") => Ok(SourceKind::EventLog(PathBuf::from(path))),
            Some("mp4") | Some("m4s") | Some("fmp4") => {
                Ok(SourceKind::Fragmented(PathBuf::from(path)))
            }
            _ => Err(ProducerError::UnsupportedTarget {
                target: target.to_string(),
            }),
        }
    }

    async fn open(&self) -> Result<Box<dyn EventSource>, ProducerError> {
        let source: Box<dyn EventSource> = match self {
            SourceKind::EventLog(path) => Box::new(JsonLinesSource::open(path).await?),
            SourceKind::Fragmented(path) => Box::new(Fmp4Source::open(path).await?),
        };
        Ok(source)
    }
}

/// 正在回放的流
struct ActiveStream {
    session: SessionId,
    cancel: CancellationToken,
    flow: watch::Sender<bool>,
}

/// 本地文件生产者
///
/// 同一时刻只回放一个流；打开新流会取消旧流，旧流的事件带着旧的会话标识，
/// 由控制器丢弃。
pub struct LocalProducer {
    events: mpsc::UnboundedSender<ControllerEvent>,
    config: ProducerConfig,
    active: Option<ActiveStream>,
}

impl LocalProducer {
    pub fn new(events: mpsc::UnboundedSender<ControllerEvent>, config: ProducerConfig) -> Self {
        Self {
            events,
            config,
            active: None,
        }
    }

    /// 当前回放中的会话
    pub fn active_session(&self) -> Option<SessionId> {
        self.active.as_ref().map(|a| a.session)
    }

    fn reject(&self, session: SessionId) {
        let _ = self.events.send(ControllerEvent::OpenResolved {
            session,
            accepted: false,
        });
    }

    fn cancel_active(&mut self) {
        if let Some(active) = self.active.take() {
            debug!("Cancelling replay of session {}", active.session);
            active.cancel.cancel();
        }
    }
}

impl Producer for LocalProducer {
    fn open_stream(&mut self, session: SessionId, target: &str) {
        let kind = match SourceKind::resolve(target) {
            Ok(kind) => kind,
            Err(e) => {
                warn!("Cannot open {}: {}", target, e);
                self.reject(session);
                return;
            }
        };

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("No async runtime, cannot replay {}", target);
            self.reject(session);
            return;
        };

        self.cancel_active();

        let cancel = CancellationToken::new();
        let (flow_tx, flow_rx) = watch::channel(false);
        self.active = Some(ActiveStream {
            session,
            cancel: cancel.clone(),
            flow: flow_tx,
        });

        info!("🎬 Replaying {:?} for session {}", kind, session);
        runtime.spawn(replay(
            session,
            kind,
            self.events.clone(),
            cancel,
            flow_rx,
            self.config.frame_interval,
        ));
    }

    fn close_stream(&mut self, session: SessionId) {
        match &self.active {
            Some(active) if active.session == session => self.cancel_active(),
            _ => debug!("Close request for inactive session {}", session),
        }
    }

    fn set_flow_paused(&mut self, session: SessionId, paused: bool) {
        match &self.active {
            Some(active) if active.session == session => {
                debug!(
                    "Session {} replay {}",
                    session,
                    if paused { "paused" } else { "resumed" }
                );
                active.flow.send_replace(paused);
            }
            _ => debug!("Flow request for inactive session {}", session),
        }
    }
}

impl Drop for LocalProducer {
    fn drop(&mut self) {
        self.cancel_active();
    }
}

/// 回放任务：打开数据源、按序推送事件，结束时发送且只发送一个 `Stopped`
async fn replay(
    session: SessionId,
    kind: SourceKind,
    events: mpsc::UnboundedSender<ControllerEvent>,
    cancel: CancellationToken,
    mut flow: watch::Receiver<bool>,
    frame_interval: Duration,
) {
    let mut source = match kind.open().await {
        Ok(source) => source,
        Err(e) => {
            warn!("Failed to open {:?}: {}", kind, e);
            let _ = events.send(ControllerEvent::OpenResolved {
                session,
                accepted: false,
            });
            return;
        }
    };

    if events
        .send(ControllerEvent::OpenResolved {
            session,
            accepted: true,
        })
        .is_err()
    {
        return;
    }

    let mut forwarded = 0u64;
    'replay: loop {
        // 流控暂停时等待恢复
        while *flow.borrow_and_update() {
            tokio::select! {
                _ = cancel.cancelled() => break 'replay,
                changed = flow.changed() => {
                    if changed.is_err() {
                        break 'replay;
                    }
                }
            }
        }

        let next = tokio::select! {
            _ = cancel.cancelled() => break,
            next = source.next_event() => next,
        };

        match next {
            Ok(Some(ProducerEvent::Stopped)) | Ok(None) => break,
            Ok(Some(event)) => {
                if events
                    .send(ControllerEvent::Producer { session, event })
                    .is_err()
                {
                    return;
                }
                forwarded += 1;
            }
            Err(e) => {
                warn!("Replay of session {} failed: {}", session, e);
                break;
            }
        }

        if !frame_interval.is_zero() {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(frame_interval) => {}
            }
        }
    }

    info!("✓ Session {} replay finished after {} events", session, forwarded);
    let _ = events.send(ControllerEvent::Producer {
        session,
        event: ProducerEvent::Stopped,
    });
}
