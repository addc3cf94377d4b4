use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, DuplexStream, ReadBuf};

/// An ordered, bidirectional byte channel.
///
/// Anything that can be read from and written to asynchronously qualifies:
/// sockets, in-process pipes, subprocess stdio pairs. Inbound bytes arrive in
/// arbitrary chunk boundaries; EOF or a read error is the termination event;
/// `shutdown` is the close operation.
pub trait Channel: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

impl<T> Channel for T where T: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

/// Default buffer capacity for in-process pipes.
pub const DEFAULT_PIPE_CAPACITY: usize = 64 * 1024;

/// Create a connected pair of in-process channels.
pub fn pipe() -> (DuplexStream, DuplexStream) {
    pipe_with_capacity(DEFAULT_PIPE_CAPACITY)
}

/// Create a connected pair of in-process channels with an explicit buffer size.
pub fn pipe_with_capacity(capacity: usize) -> (DuplexStream, DuplexStream) {
    tokio::io::duplex(capacity)
}

/// A connected socket channel returned by listeners and connectors.
pub struct ChannelStream {
    inner: ChannelStreamInner,
}

enum ChannelStreamInner {
    Tcp(tokio::net::TcpStream),
    #[cfg(unix)]
    Unix(tokio::net::UnixStream),
}

impl ChannelStream {
    pub(crate) fn from_tcp(stream: tokio::net::TcpStream) -> Self {
        Self {
            inner: ChannelStreamInner::Tcp(stream),
        }
    }

    #[cfg(unix)]
    pub(crate) fn from_unix(stream: tokio::net::UnixStream) -> Self {
        Self {
            inner: ChannelStreamInner::Unix(stream),
        }
    }

    /// Short transport name for diagnostics.
    pub fn kind(&self) -> &'static str {
        match &self.inner {
            ChannelStreamInner::Tcp(_) => "tcp",
            #[cfg(unix)]
            ChannelStreamInner::Unix(_) => "unix",
        }
    }

    /// Human-readable address of the remote end, when the platform exposes one.
    pub fn peer_addr(&self) -> Option<String> {
        match &self.inner {
            ChannelStreamInner::Tcp(stream) => stream.peer_addr().ok().map(|a| a.to_string()),
            #[cfg(unix)]
            ChannelStreamInner::Unix(stream) => stream
                .peer_addr()
                .ok()
                .and_then(|a| a.as_pathname().map(|p| p.display().to_string())),
        }
    }
}

impl AsyncRead for ChannelStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match &mut self.get_mut().inner {
            ChannelStreamInner::Tcp(stream) => Pin::new(stream).poll_read(cx, buf),
            #[cfg(unix)]
            ChannelStreamInner::Unix(stream) => Pin::new(stream).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for ChannelStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match &mut self.get_mut().inner {
            ChannelStreamInner::Tcp(stream) => Pin::new(stream).poll_write(cx, buf),
            #[cfg(unix)]
            ChannelStreamInner::Unix(stream) => Pin::new(stream).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match &mut self.get_mut().inner {
            ChannelStreamInner::Tcp(stream) => Pin::new(stream).poll_flush(cx),
            #[cfg(unix)]
            ChannelStreamInner::Unix(stream) => Pin::new(stream).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match &mut self.get_mut().inner {
            ChannelStreamInner::Tcp(stream) => Pin::new(stream).poll_shutdown(cx),
            #[cfg(unix)]
            ChannelStreamInner::Unix(stream) => Pin::new(stream).poll_shutdown(cx),
        }
    }
}

impl std::fmt::Debug for ChannelStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelStream")
            .field("type", &self.kind())
            .finish()
    }
}
