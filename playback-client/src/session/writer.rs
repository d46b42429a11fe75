use tracing::{debug, warn};

use super::queue::FrameQueue;
use crate::errors::PlaybackError;
use crate::sink::{PlaybackSink, SinkId};
use playgo_common::EncodedSegment;

/// 一次排空尝试的结果
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainOutcome {
    /// 成功提交的分片字节数（未提交时为None）
    pub submitted_bytes: Option<usize>,
    /// 被sink同步拒绝而丢弃的分片数
    pub dropped: usize,
}

/// 串行写入器
///
/// 持有当前sink和忙标志。`busy == true` 当且仅当有且只有一个追加在途，
/// 写入器在忙时不会再提交。
pub struct BufferWriter {
    sink: Option<Box<dyn PlaybackSink>>,
    busy: bool,
}

impl BufferWriter {
    pub fn new() -> Self {
        Self {
            sink: None,
            busy: false,
        }
    }

    pub fn attach(&mut self, sink: Box<dyn PlaybackSink>) {
        debug!("Writer attached to sink {}", sink.id());
        self.sink = Some(sink);
        self.busy = false;
    }

    pub fn sink_id(&self) -> Option<SinkId> {
        self.sink.as_ref().map(|s| s.id())
    }

    pub fn is_busy(&self) -> bool {
        self.busy
    }

    /// 写入器空闲且sink存在并且底层不忙
    pub fn can_submit(&self) -> bool {
        match &self.sink {
            Some(sink) => !self.busy && !sink.is_busy(),
            None => false,
        }
    }

    /// 提交一个分片；同步拒绝时忙标志立即复位
    pub fn submit(&mut self, segment: EncodedSegment) -> Result<(), PlaybackError> {
        let sink = self.sink.as_mut().ok_or(PlaybackError::NoSink)?;
        if self.busy {
            return Err(PlaybackError::SinkAppend {
                reason: "writer busy".to_string(),
            });
        }

        self.busy = true;
        if let Err(e) = sink.append(segment) {
            self.busy = false;
            return Err(e);
        }
        Ok(())
    }

    /// 从队首取分片提交，直到成功提交一个或无法继续
    ///
    /// 同步失败的分片被丢弃，随后立即尝试下一个，
    /// 失败不能让队列停下来等待下一次外部事件。
    pub fn drain(&mut self, queue: &mut FrameQueue) -> DrainOutcome {
        let mut outcome = DrainOutcome::default();

        while self.can_submit() {
            let Some(segment) = queue.pop() else {
                break;
            };
            let len = segment.len();

            match self.submit(segment) {
                Ok(()) => {
                    outcome.submitted_bytes = Some(len);
                    break;
                }
                Err(e) => {
                    warn!("Failed to append segment ({} bytes), dropping: {}", len, e);
                    outcome.dropped += 1;
                }
            }
        }

        outcome
    }

    /// 处理完成事件；事件不属于当前sink时返回false且不改变状态
    pub fn on_sink_idle(&mut self, sink: SinkId) -> bool {
        if self.sink_id() != Some(sink) {
            return false;
        }
        self.busy = false;
        true
    }

    /// 释放sink
    pub fn release(&mut self) {
        self.busy = false;
        if let Some(mut sink) = self.sink.take() {
            sink.destroy();
        }
    }
}

impl Default for BufferWriter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::QueueConfig;
    use crate::testing::{EngineProbe, FakeSink};

    fn queue_with(payloads: &[&[u8]]) -> FrameQueue {
        let mut queue = FrameQueue::new(&QueueConfig::default());
        for payload in payloads {
            queue.push(EncodedSegment::new(payload.to_vec())).unwrap();
        }
        queue
    }

    #[test]
    fn test_drain_without_sink_is_noop() {
        let mut writer = BufferWriter::new();
        let mut queue = queue_with(&[b"a"]);

        assert_eq!(writer.drain(&mut queue), DrainOutcome::default());
        assert_eq!(queue.len(), 1);
        assert!(!writer.is_busy());
    }

    #[test]
    fn test_drain_submits_one_segment_at_a_time() {
        let probe = EngineProbe::default();
        let mut writer = BufferWriter::new();
        let sink = FakeSink::new(SinkId::new(), probe.clone());
        let sink_id = sink.id();
        writer.attach(Box::new(sink));

        let mut queue = queue_with(&[b"a", b"bb"]);
        let outcome = writer.drain(&mut queue);
        assert_eq!(outcome.submitted_bytes, Some(1));
        assert!(writer.is_busy());
        assert_eq!(queue.len(), 1);

        // 忙时不再提交
        assert_eq!(writer.drain(&mut queue), DrainOutcome::default());
        assert_eq!(probe.outstanding(sink_id), 1);

        probe.finish_append(sink_id);
        assert!(writer.on_sink_idle(sink_id));
        let outcome = writer.drain(&mut queue);
        assert_eq!(outcome.submitted_bytes, Some(2));
        assert_eq!(probe.appended(sink_id), vec![b"a".to_vec(), b"bb".to_vec()]);
    }

    #[test]
    fn test_sync_failure_moves_to_next_segment() {
        let probe = EngineProbe::default();
        probe.reject_payload(b"b1");
        let mut writer = BufferWriter::new();
        let sink = FakeSink::new(SinkId::new(), probe.clone());
        let sink_id = sink.id();
        writer.attach(Box::new(sink));

        let mut queue = queue_with(&[b"b1", b"b2"]);
        let outcome = writer.drain(&mut queue);

        assert_eq!(outcome.dropped, 1);
        assert_eq!(outcome.submitted_bytes, Some(2));
        assert!(writer.is_busy());
        assert!(queue.is_empty());
        assert_eq!(probe.appended(sink_id), vec![b"b2".to_vec()]);
    }

    #[test]
    fn test_stale_completion_is_ignored() {
        let probe = EngineProbe::default();
        let mut writer = BufferWriter::new();
        writer.attach(Box::new(FakeSink::new(SinkId::new(), probe.clone())));

        let mut queue = queue_with(&[b"a"]);
        writer.drain(&mut queue);
        assert!(writer.is_busy());

        assert!(!writer.on_sink_idle(SinkId::new()));
        assert!(writer.is_busy());
    }

    #[test]
    fn test_release_destroys_sink() {
        let probe = EngineProbe::default();
        let mut writer = BufferWriter::new();
        let sink = FakeSink::new(SinkId::new(), probe.clone());
        let sink_id = sink.id();
        writer.attach(Box::new(sink));
        writer.drain(&mut queue_with(&[b"a"]));

        writer.release();
        assert!(!writer.is_busy());
        assert_eq!(writer.sink_id(), None);
        assert_eq!(probe.destroyed(), vec![sink_id]);
    }
}
