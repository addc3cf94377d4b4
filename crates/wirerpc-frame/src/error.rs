/// Errors raised while framing or unframing payloads.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// A declared or outbound payload length is above the configured limit.
    #[error("frame of {size} bytes exceeds the {max} byte limit")]
    PayloadTooLarge { size: usize, max: usize },

    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The channel ended with a partial frame still buffered.
    #[error("channel closed mid-frame")]
    ConnectionClosed,
}

pub type Result<T> = std::result::Result<T, FrameError>;
