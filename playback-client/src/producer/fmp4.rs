// PlayGo 播放客户端 - 分片MP4数据源
//
// 把一个分片MP4文件切分成生产者事件：
//
// - 初始化分片：文件开头直到 moov box 结束（ftyp + moov）
// - 媒体分片：每个 mdat 连同它前面的 styp/sidx/prft/moof 组成一个分片
//
// 编码参数从 moov/trak/mdia/minf/stbl/stsd 的第一个样本描述读取，
// H.264 输出 `avc1.PPCCLL` 形式，其他格式退化为样本描述的fourcc。

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::VecDeque;
use std::ops::Range;
use std::path::Path;
use tracing::{debug, info};

use super::EventSource;
use crate::errors::ProducerError;
use playgo_common::{EncodedSegment, ProducerEvent};

const MOOV: [u8; 4] = *b"moov";
const MDAT: [u8; 4] = *b"mdat";
const TRAK: [u8; 4] = *b"trak";
const MDIA: [u8; 4] = *b"mdia";
const MINF: [u8; 4] = *b"minf";
const STBL: [u8; 4] = *b"stbl";
const STSD: [u8; 4] = *b"stsd";
const AVCC: [u8; 4] = *b"avcC";

/// VisualSampleEntry 在子box之前的固定字段长度
const VISUAL_SAMPLE_ENTRY_LEN: usize = 78;

/// 一个顶层或嵌套box的位置
#[derive(Debug, Clone, PartialEq, Eq)]
struct BoxHeader {
    kind: [u8; 4],
    /// 整个box（含头部）在缓冲区中的范围
    range: Range<usize>,
    /// 负载起始位置
    payload_start: usize,
}

impl BoxHeader {
    fn payload(&self) -> Range<usize> {
        self.payload_start..self.range.end
    }
}

/// 分片MP4数据源
pub struct Fmp4Source {
    pending: VecDeque<ProducerEvent>,
}

impl Fmp4Source {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, ProducerError> {
        let path = path.as_ref();
        let data = tokio::fs::read(path).await?;
        info!("✓ Loaded fragmented MP4 {:?}: {} bytes", path, data.len());
        Self::from_bytes(Bytes::from(data))
    }

    pub fn from_bytes(data: Bytes) -> Result<Self, ProducerError> {
        let boxes = parse_boxes(&data, 0..data.len())?;

        let moov = boxes
            .iter()
            .position(|b| b.kind == MOOV)
            .ok_or_else(|| invalid("missing moov box"))?;
        let init_end = boxes[moov].range.end;
        let codec = detect_codec(&data, &boxes[moov])?;

        let mut pending = VecDeque::new();
        pending.push_back(ProducerEvent::init(
            codec.clone(),
            &EncodedSegment::new(data.slice(0..init_end)),
        ));

        let mut fragment_start = init_end;
        for header in &boxes[moov + 1..] {
            if header.kind == MDAT {
                let fragment = EncodedSegment::new(data.slice(fragment_start..header.range.end));
                pending.push_back(ProducerEvent::frame(&fragment));
                fragment_start = header.range.end;
            }
        }

        if fragment_start < data.len() {
            debug!(
                "Ignoring {} trailing bytes after last media fragment",
                data.len() - fragment_start
            );
        }
        debug!(
            "Split fragmented MP4: codec {}, {} media fragments",
            codec,
            pending.len() - 1
        );

        Ok(Self { pending })
    }

    /// 剩余事件数（含初始化分片）
    pub fn remaining(&self) -> usize {
        self.pending.len()
    }
}

#[async_trait]
impl EventSource for Fmp4Source {
    async fn next_event(&mut self) -> Result<Option<ProducerEvent>, ProducerError> {
        Ok(self.pending.pop_front())
    }
}

fn invalid(reason: impl Into<String>) -> ProducerError {
    ProducerError::InvalidContainer {
        reason: reason.into(),
    }
}

fn read_u32(data: &[u8], at: usize) -> Option<u32> {
    let bytes = data.get(at..at + 4)?;
    Some(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

fn read_u64(data: &[u8], at: usize) -> Option<u64> {
    let bytes = data.get(at..at + 8)?;
    let mut buf = [0u8; 8];
    buf.copy_from_slice(bytes);
    Some(u64::from_be_bytes(buf))
}

/// 解析 `within` 范围内连续排列的box
fn parse_boxes(data: &[u8], within: Range<usize>) -> Result<Vec<BoxHeader>, ProducerError> {
    let mut boxes = Vec::new();
    let mut offset = within.start;

    while offset < within.end {
        let size = read_u32(data, offset).ok_or_else(|| invalid("truncated box header"))?;
        let mut kind = [0u8; 4];
        kind.copy_from_slice(
            data.get(offset + 4..offset + 8)
                .ok_or_else(|| invalid("truncated box header"))?,
        );

        let (len, header_len) = match size {
            0 => ((within.end - offset) as u64, 8),
            1 => (
                read_u64(data, offset + 8).ok_or_else(|| invalid("truncated largesize"))?,
                16,
            ),
            n => (n as u64, 8),
        };

        if len < header_len as u64 {
            return Err(invalid(format!(
                "box {} shorter than its header",
                String::from_utf8_lossy(&kind)
            )));
        }
        let end = (offset as u64)
            .checked_add(len)
            .filter(|end| *end <= within.end as u64)
            .ok_or_else(|| {
                invalid(format!(
                    "box {} overruns its container",
                    String::from_utf8_lossy(&kind)
                ))
            })? as usize;

        boxes.push(BoxHeader {
            kind,
            range: offset..end,
            payload_start: offset + header_len,
        });
        offset = end;
    }

    Ok(boxes)
}

fn find_child(
    data: &[u8],
    parent: Range<usize>,
    kind: [u8; 4],
) -> Result<Option<BoxHeader>, ProducerError> {
    Ok(parse_boxes(data, parent)?
        .into_iter()
        .find(|b| b.kind == kind))
}

fn detect_codec(data: &[u8], moov: &BoxHeader) -> Result<String, ProducerError> {
    for trak in parse_boxes(data, moov.payload())?
        .into_iter()
        .filter(|b| b.kind == TRAK)
    {
        let mut node = trak;
        let mut found = true;
        for kind in [MDIA, MINF, STBL, STSD] {
            match find_child(data, node.payload(), kind)? {
                Some(child) => node = child,
                None => {
                    found = false;
                    break;
                }
            }
        }
        if found {
            return codec_from_stsd(data, &node);
        }
    }

    Err(invalid("no sample description in moov"))
}

fn codec_from_stsd(data: &[u8], stsd: &BoxHeader) -> Result<String, ProducerError> {
    // version/flags + entry_count
    let entries_start = stsd.payload_start + 8;
    if entries_start > stsd.range.end {
        return Err(invalid("truncated stsd box"));
    }

    let entry = parse_boxes(data, entries_start..stsd.range.end)?
        .into_iter()
        .next()
        .ok_or_else(|| invalid("empty stsd box"))?;
    let fourcc = String::from_utf8_lossy(&entry.kind).into_owned();

    if !matches!(&entry.kind, b"avc1" | b"avc3") {
        return Ok(fourcc);
    }

    let children_start = entry.payload_start + VISUAL_SAMPLE_ENTRY_LEN;
    if children_start > entry.range.end {
        return Err(invalid("truncated visual sample entry"));
    }
    let avcc = find_child(data, children_start..entry.range.end, AVCC)?
        .ok_or_else(|| invalid("avc sample entry without avcC"))?;

    // configurationVersion, AVCProfileIndication, profile_compatibility, AVCLevelIndication
    let config = data
        .get(avcc.payload_start..avcc.payload_start + 4)
        .filter(|_| avcc.payload_start + 4 <= avcc.range.end)
        .ok_or_else(|| invalid("truncated avcC box"))?;

    Ok(format!(
        "{}.{:02x}{:02x}{:02x}",
        fourcc, config[1], config[2], config[3]
    ))
}
