//! Payload encoding for wirerpc.
//!
//! Messages carry [`Value`]s: JSON-shaped data plus instances of application
//! types. A [`Framer`] turns values into payload bytes and back; the bundled
//! [`JsonFramer`] writes registered types as tagged wrappers so the receiving
//! side can rebuild them.

pub mod error;
pub mod framer;
pub mod registry;
pub mod value;

pub use error::{DecodeError, DecodeResult, EncodeError, EncodeResult};
pub use framer::{Framer, JsonFramer, CLASS_TAG, PROPS_TAG};
pub use registry::{Codec, CodecRegistry};
pub use value::{Custom, CustomValue, Map, Value};
