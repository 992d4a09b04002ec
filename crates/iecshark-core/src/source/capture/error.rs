use thiserror::Error;

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("capture parse error ({context}): {message}")]
    Parse {
        context: &'static str,
        message: String,
    },
}

impl CaptureError {
    pub(crate) fn parse(context: &'static str, message: impl Into<String>) -> Self {
        CaptureError::Parse {
            context,
            message: message.into(),
        }
    }
}
