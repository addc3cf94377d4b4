use std::time::Duration;

use crate::failure::FailureError;

/// Errors that can occur in provider, transport and connection operations.
#[derive(Debug, thiserror::Error)]
pub enum PeerError {
    /// Channel-level error.
    #[error("channel error: {0}")]
    Channel(#[from] wirerpc_channel::ChannelError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] wirerpc_frame::FrameError),

    /// Outbound value has no wire form.
    #[error("encode error: {0}")]
    Encode(#[from] wirerpc_codec::EncodeError),

    /// Method name falls in the reserved namespace.
    #[error("\"{0}\" is a reserved method name")]
    ReservedMethod(String),

    /// Method name is empty.
    #[error("method name must not be empty")]
    EmptyMethodName,

    /// The provider has nowhere to send outbound messages.
    #[error("no dispatcher attached")]
    NoDispatcher,

    /// The transport has no bound channel.
    #[error("transport is not connected")]
    NotConnected,
}

pub type Result<T> = std::result::Result<T, PeerError>;

/// Terminal outcome of an outbound request that did not succeed.
#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    /// The remote answered with a failure.
    #[error("remote failure: {0}")]
    Failure(FailureError),

    /// No response arrived before the deadline.
    #[error("request {id} timed out after {after:?}")]
    Timeout { id: u64, after: Duration },

    /// The request could not be handed to the dispatcher.
    #[error("request {id} could not be sent: {source}")]
    Dispatch {
        id: u64,
        #[source]
        source: PeerError,
    },

    /// The provider was dropped while the request was pending.
    #[error("request {id} abandoned")]
    Abandoned { id: u64 },
}

impl RequestError {
    /// The remote failure, if that is what this is.
    pub fn failure(&self) -> Option<&FailureError> {
        match self {
            RequestError::Failure(error) => Some(error),
            _ => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, RequestError::Timeout { .. })
    }
}

impl From<FailureError> for RequestError {
    fn from(error: FailureError) -> Self {
        RequestError::Failure(error)
    }
}
