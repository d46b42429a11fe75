// PlayGo 播放客户端 - 文件录制引擎
//
// 把初始化分片和后续分片按追加顺序写入同一个文件。
// 初始化分片（ftyp+moov）加上依次追加的 moof+mdat 本身就是可播放的分片MP4，
// 因此该引擎既可用于录制，也可用于端到端校验。
//
// 写入在tokio任务中异步完成，完成后通过 `SinkNotifier` 回到控制器，
// 与浏览器中 SourceBuffer 的 updateend 语义一致：同一时刻只允许一次写入在途。

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{PlaybackEngine, PlaybackSink, SinkId, SinkNotifier};
use crate::config::SinkConfig;
use crate::errors::PlaybackError;
use playgo_common::EncodedSegment;

/// 当前挂在引擎上的sink
#[derive(Debug)]
struct Attachment {
    sink_id: SinkId,
    path: PathBuf,
    written: Arc<AtomicU64>,
}

/// 文件录制引擎
pub struct FileEngine {
    config: SinkConfig,
    attachment: Option<Attachment>,
    playing: bool,
}

impl FileEngine {
    pub fn new(config: SinkConfig) -> Self {
        debug!("Creating FileEngine writing to {:?}", config.output_dir);
        Self {
            config,
            attachment: None,
            playing: false,
        }
    }

    /// 检查编码字符串是否受支持
    ///
    /// 编码字符串可以包含多个以逗号分隔的编码（如 `avc1.64001f, mp4a.40.2`），
    /// 每个编码的族名（点号之前的部分）都必须在配置中。
    pub fn is_type_supported(&self, codec: &str) -> bool {
        let mut codecs = codec
            .split(',')
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .peekable();

        if codecs.peek().is_none() {
            return false;
        }

        codecs.all(|c| {
            let family = c.split('.').next().unwrap_or(c);
            self.config
                .supported_codecs
                .iter()
                .any(|supported| supported.eq_ignore_ascii_case(family))
        })
    }

    /// 当前录制文件路径
    pub fn recorded_path(&self) -> Option<&Path> {
        self.attachment.as_ref().map(|a| a.path.as_path())
    }

    /// 已写入的字节数
    pub fn buffered_bytes(&self) -> u64 {
        self.attachment
            .as_ref()
            .map(|a| a.written.load(Ordering::Acquire))
            .unwrap_or(0)
    }
}

impl PlaybackEngine for FileEngine {
    fn create_sink(
        &mut self,
        codec: &str,
        sink_id: SinkId,
        notifier: SinkNotifier,
    ) -> Result<Box<dyn PlaybackSink>, PlaybackError> {
        if let Some(existing) = &self.attachment {
            return Err(PlaybackError::SinkCreation {
                reason: format!("sink {} is still attached", existing.sink_id),
            });
        }

        if !self.is_type_supported(codec) {
            return Err(PlaybackError::UnsupportedCodec {
                codec: codec.to_string(),
            });
        }

        // 文件在第一次追加的写入任务中创建，控制器线程不做文件IO
        let path = self.config.output_dir.join(format!("{}.mp4", sink_id));

        let written = Arc::new(AtomicU64::new(0));
        let sink = FileSink {
            id: sink_id,
            path: path.clone(),
            file: Arc::new(Mutex::new(None)),
            busy: Arc::new(AtomicBool::new(false)),
            destroyed: false,
            written: written.clone(),
            notifier,
            task: None,
        };

        info!("✓ Sink {} attached for codec {} -> {:?}", sink_id, codec, path);
        self.attachment = Some(Attachment {
            sink_id,
            path,
            written,
        });

        Ok(Box::new(sink))
    }

    fn is_paused(&self) -> bool {
        !self.playing
    }

    fn play(&mut self) -> Result<(), PlaybackError> {
        match &self.attachment {
            Some(attachment) => {
                if !self.playing {
                    debug!("Playback started on sink {}", attachment.sink_id);
                }
                self.playing = true;
                Ok(())
            }
            None => Err(PlaybackError::PlaybackResume {
                reason: "no source attached".to_string(),
            }),
        }
    }

    fn reset(&mut self) {
        self.playing = false;
        if let Some(attachment) = self.attachment.take() {
            info!(
                "Recording closed: {:?} ({} bytes)",
                attachment.path,
                attachment.written.load(Ordering::Acquire)
            );
        }
    }
}

/// 文件sink
pub struct FileSink {
    id: SinkId,
    path: PathBuf,
    file: Arc<Mutex<Option<tokio::fs::File>>>,
    busy: Arc<AtomicBool>,
    destroyed: bool,
    written: Arc<AtomicU64>,
    notifier: SinkNotifier,
    task: Option<JoinHandle<()>>,
}

impl PlaybackSink for FileSink {
    fn id(&self) -> SinkId {
        self.id
    }

    fn append(&mut self, segment: EncodedSegment) -> Result<(), PlaybackError> {
        if self.destroyed {
            return Err(PlaybackError::SinkAppend {
                reason: "sink destroyed".to_string(),
            });
        }
        if self.busy.load(Ordering::Acquire) {
            return Err(PlaybackError::SinkAppend {
                reason: "append already in progress".to_string(),
            });
        }
        if segment.is_empty() {
            return Err(PlaybackError::SinkAppend {
                reason: "empty segment".to_string(),
            });
        }

        self.busy.store(true, Ordering::Release);

        let file = self.file.clone();
        let path = self.path.clone();
        let busy = self.busy.clone();
        let written = self.written.clone();
        let notifier = self.notifier.clone();
        let data = segment.into_bytes();

        self.task = Some(tokio::spawn(async move {
            let result = {
                let mut file = file.lock().await;
                write_segment(&mut file, &path, &data).await
            };

            // 先清除忙标志再通知，与 updateend 前 updating 变为 false 一致
            busy.store(false, Ordering::Release);

            match result {
                Ok(()) => {
                    written.fetch_add(data.len() as u64, Ordering::AcqRel);
                    notifier.idle();
                }
                Err(e) => {
                    warn!("Write to sink {} failed: {}", notifier.sink_id(), e);
                    notifier.failed(e.to_string());
                }
            }
        }));

        Ok(())
    }

    fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.destroyed = true;
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.busy.store(false, Ordering::Release);
        debug!("Sink {} destroyed", self.id);
    }
}

/// 首次写入时创建录制文件（及其目录），之后追加写入
async fn write_segment(
    file: &mut Option<tokio::fs::File>,
    path: &Path,
    data: &[u8],
) -> std::io::Result<()> {
    if file.is_none() {
        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }
        *file = Some(tokio::fs::File::create(path).await?);
    }

    match file.as_mut() {
        Some(file) => {
            file.write_all(data).await?;
            file.flush().await
        }
        None => Ok(()),
    }
}

impl Drop for FileSink {
    fn drop(&mut self) {
        self.destroy();
    }
}
