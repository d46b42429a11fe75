use async_trait::async_trait;
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};
use tracing::debug;

use super::EventSource;
use crate::errors::ProducerError;
use playgo_common::ProducerEvent;

/// JSON Lines事件记录回放
///
/// 每行一个事件，格式与生产者协议一致，例如
/// `{"type":"frame","data":"3q2+7w=="}`。空行被跳过。
pub struct JsonLinesSource<R> {
    lines: Lines<R>,
    line_no: usize,
}

impl JsonLinesSource<BufReader<File>> {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, ProducerError> {
        let path = path.as_ref();
        let file = File::open(path).await?;
        debug!("Opened event log {:?}", path);
        Ok(Self::new(BufReader::new(file)))
    }
}

impl<R: AsyncBufRead + Unpin> JsonLinesSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            line_no: 0,
        }
    }
}

#[async_trait]
impl<R: AsyncBufRead + Unpin + Send> EventSource for JsonLinesSource<R> {
    async fn next_event(&mut self) -> Result<Option<ProducerEvent>, ProducerError> {
        while let Some(line) = self.lines.next_line().await? {
            self.line_no += 1;
            if line.trim().is_empty() {
                continue;
            }

            let event =
                ProducerEvent::from_json(&line).map_err(|e| ProducerError::MalformedEvent {
                    line: self.line_no,
                    reason: e.to_string(),
                })?;
            return Ok(Some(event));
        }
        Ok(None)
    }
}
