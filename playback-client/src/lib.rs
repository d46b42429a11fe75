pub mod config;
pub mod errors;
pub mod producer;
pub mod serde_helpers;
pub mod session;
pub mod sink;

#[cfg(test)]
mod testing;

pub use config::ClientConfig;
pub use errors::{ConfigError, PlaybackError, ProducerError};
pub use session::{ControllerHandle, SessionState, StreamController};
