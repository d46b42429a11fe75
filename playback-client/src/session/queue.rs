use std::collections::VecDeque;
use tracing::debug;

use crate::config::QueueConfig;
use crate::errors::PlaybackError;
use playgo_common::EncodedSegment;

/// 流控信号
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowSignal {
    /// 队列越过高水位，请求生产者暂停
    Pause,
    /// 队列回落到低水位，请求生产者恢复
    Resume,
}

impl FlowSignal {
    pub fn paused(&self) -> bool {
        matches!(self, FlowSignal::Pause)
    }
}

/// 待追加分片队列
///
/// 先进先出：出队顺序 == 生产者发送顺序 == sink追加顺序。
/// 队列有硬上限，并在高/低水位之间产生一次性的流控信号。
#[derive(Debug)]
pub struct FrameQueue {
    segments: VecDeque<EncodedSegment>,
    capacity: usize,
    high_watermark: usize,
    low_watermark: usize,
    throttled: bool,
    peak_depth: usize,
}

impl FrameQueue {
    pub fn new(config: &QueueConfig) -> Self {
        Self {
            segments: VecDeque::new(),
            capacity: config.capacity,
            high_watermark: config.high_watermark,
            low_watermark: config.low_watermark,
            throttled: false,
            peak_depth: 0,
        }
    }

    /// 追加到队尾
    pub fn push(&mut self, segment: EncodedSegment) -> Result<(), PlaybackError> {
        if self.segments.len() >= self.capacity {
            return Err(PlaybackError::QueueOverflow {
                capacity: self.capacity,
            });
        }
        self.segments.push_back(segment);
        self.peak_depth = self.peak_depth.max(self.segments.len());
        Ok(())
    }

    pub fn pop(&mut self) -> Option<EncodedSegment> {
        self.segments.pop_front()
    }

    /// 根据当前深度计算流控信号，每次跨越水位只返回一次
    pub fn flow_signal(&mut self) -> Option<FlowSignal> {
        let depth = self.segments.len();
        if !self.throttled && depth >= self.high_watermark {
            self.throttled = true;
            debug!("Frame queue reached high watermark ({} segments)", depth);
            Some(FlowSignal::Pause)
        } else if self.throttled && depth <= self.low_watermark {
            self.throttled = false;
            debug!("Frame queue drained to low watermark ({} segments)", depth);
            Some(FlowSignal::Resume)
        } else {
            None
        }
    }

    pub fn clear(&mut self) {
        self.segments.clear();
        self.throttled = false;
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn is_throttled(&self) -> bool {
        self.throttled
    }

    pub fn peak_depth(&self) -> usize {
        self.peak_depth
    }
}
