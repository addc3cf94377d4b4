/// Errors raised while turning a [`Value`](crate::Value) into payload bytes.
///
/// These are caller errors: the value handed to the framer has no wire form.
#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    /// A custom value whose type has no registered codec.
    #[error("no codec registered for type {0}")]
    UnregisteredType(&'static str),

    /// A registered codec refused to encode its value.
    #[error("codec '{name}' failed to encode: {message}")]
    Codec { name: String, message: String },

    /// The underlying serializer failed.
    #[error("serialization failed: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors raised while turning payload bytes back into a [`Value`](crate::Value).
///
/// Kept apart from protocol failures: no request id can be recovered from
/// bytes that do not decode.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// The payload is not well-formed.
    #[error("malformed payload: {0}")]
    Json(#[from] serde_json::Error),

    /// A tagged custom value could not be rebuilt by its codec.
    #[error("codec '{name}' failed to decode: {message}")]
    Codec { name: String, message: String },

    /// A structural value could not be converted into the requested type.
    #[error("value does not match the expected shape: {0}")]
    Shape(String),
}

pub type EncodeResult<T> = std::result::Result<T, EncodeError>;
pub type DecodeResult<T> = std::result::Result<T, DecodeError>;
