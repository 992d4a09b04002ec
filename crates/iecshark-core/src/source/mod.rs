mod capture;
mod channel;
mod edges;

pub use capture::open_capture;
pub use channel::{ChannelReader, Level, ReaderError};
pub use edges::{EdgeChannel, EdgeCursor, EdgeError};

use thiserror::Error;

/// Identifier of a captured channel (logic analyzer probe number).
pub type ChannelId = u16;

/// A finished capture: a sample rate and a set of synchronous channels.
#[derive(Debug, Clone)]
pub struct Capture {
    pub sample_rate_hz: u32,
    /// Number of samples in every channel.
    pub samples: u64,
    pub channels: Vec<CaptureChannel>,
}

#[derive(Debug, Clone)]
pub struct CaptureChannel {
    pub id: ChannelId,
    pub name: String,
    pub edges: EdgeChannel,
}

impl Capture {
    pub fn channel(&self, id: ChannelId) -> Option<&CaptureChannel> {
        self.channels.iter().find(|channel| channel.id == id)
    }

    /// Look a channel up by name, ignoring ASCII case.
    pub fn channel_named(&self, name: &str) -> Option<&CaptureChannel> {
        self.channels
            .iter()
            .find(|channel| channel.name.eq_ignore_ascii_case(name))
    }
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("capture parse error: {0}")]
    Capture(String),
    #[error("unsupported capture format '{0}'")]
    UnsupportedFormat(String),
}

impl From<capture::error::CaptureError> for SourceError {
    fn from(value: capture::error::CaptureError) -> Self {
        match value {
            capture::error::CaptureError::Io(err) => SourceError::Io(err),
            capture::error::CaptureError::Parse { context, message } => {
                SourceError::Capture(format!("{context}: {message}"))
            }
        }
    }
}
