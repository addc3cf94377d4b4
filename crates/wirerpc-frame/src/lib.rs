//! Length-prefixed message framing for wirerpc.
//!
//! Every message travels as a 4-byte little-endian length followed by that
//! many payload bytes. No magic, no checksum: the channel below is assumed
//! to be reliable and ordered.
//!
//! - [`LengthPrefixParser`] reassembles payloads from arbitrarily chunked input.
//! - [`LengthPrefixCodec`] plugs the same format into `tokio_util::codec`.

pub mod codec;
pub mod error;
pub mod parser;

pub use codec::{
    decode_frame, encode_frame, peek_length, LengthPrefixCodec, DEFAULT_MAX_PAYLOAD, HEADER_SIZE,
};
pub use error::{FrameError, Result};
pub use parser::{LengthPrefixParser, ParserConfig, DEFAULT_GROW_RATIO, DEFAULT_INITIAL_SIZE};
