//! Byte channel contract for wirerpc.
//!
//! A channel is any ordered byte stream: TCP and Unix domain sockets,
//! in-process pipes, subprocess stdio. This is the lowest layer of wirerpc;
//! it carries no framing and no message semantics.

pub mod endpoint;
pub mod error;
pub mod traits;

#[cfg(unix)]
pub mod uds;

pub use endpoint::{connect, ChannelListener, Endpoint};
pub use error::{ChannelError, Result};
pub use traits::{pipe, pipe_with_capacity, Channel, ChannelStream, DEFAULT_PIPE_CAPACITY};

#[cfg(unix)]
pub use uds::UnixDomainSocket;
