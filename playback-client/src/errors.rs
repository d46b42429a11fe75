use playgo_common::WireError;
use std::io;
use thiserror::Error;

/// 播放链路上的错误
///
/// 打开失败、编码不支持以及初始化分片上的任何错误会结束会话，
/// 媒体分片上的错误记录日志后丢弃该分片，继续后续播放。
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlaybackError {
    #[error("Unsupported codec: {codec}")]
    UnsupportedCodec { codec: String },

    #[error("Failed to create sink: {reason}")]
    SinkCreation { reason: String },

    #[error("Sink rejected append: {reason}")]
    SinkAppend { reason: String },

    #[error("No sink attached")]
    NoSink,

    #[error("Failed to decode segment: {0}")]
    Decode(#[from] WireError),

    #[error("Playback engine rejected resume: {reason}")]
    PlaybackResume { reason: String },

    #[error("Producer rejected open request for {target}")]
    ProducerOpen { target: String },

    #[error("Frame queue full (capacity {capacity})")]
    QueueOverflow { capacity: usize },
}

#[derive(Error, Debug)]
pub enum ProducerError {
    #[error("Unsupported protocol: {target}")]
    UnsupportedTarget { target: String },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Malformed event at line {line}: {reason}")]
    MalformedEvent { line: usize, reason: String },

    #[error("Invalid container: {reason}")]
    InvalidContainer { reason: String },
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Read(#[source] io::Error),

    #[error("Failed to write config file: {0}")]
    Write(#[source] io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid configuration: {message}")]
    Invalid { message: String },
}
