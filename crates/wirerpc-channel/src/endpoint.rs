use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use tokio::net::TcpListener;
use tracing::{debug, info};

use crate::error::{ChannelError, Result};
use crate::traits::ChannelStream;
#[cfg(unix)]
use crate::uds::UnixDomainSocket;

/// Where a channel listens or connects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// `host:port`, optionally written as `tcp://host:port`.
    Tcp(String),
    /// Filesystem socket path, optionally written as `unix:///path`.
    Unix(PathBuf),
}

impl FromStr for Endpoint {
    type Err = ChannelError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(ChannelError::InvalidEndpoint(s.to_string()));
        }
        if let Some(addr) = s.strip_prefix("tcp://") {
            return parse_host_port(addr).map(Endpoint::Tcp);
        }
        if let Some(path) = s.strip_prefix("unix://") {
            if path.is_empty() {
                return Err(ChannelError::InvalidEndpoint(s.to_string()));
            }
            return Ok(Endpoint::Unix(PathBuf::from(path)));
        }
        if s.starts_with('/') || s.starts_with('.') {
            return Ok(Endpoint::Unix(PathBuf::from(s)));
        }
        parse_host_port(s).map(Endpoint::Tcp)
    }
}

fn parse_host_port(s: &str) -> Result<String> {
    match s.rsplit_once(':') {
        Some((host, port)) if !host.is_empty() && port.parse::<u16>().is_ok() => Ok(s.to_string()),
        _ => Err(ChannelError::InvalidEndpoint(s.to_string())),
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Tcp(addr) => write!(f, "tcp://{addr}"),
            Endpoint::Unix(path) => write!(f, "unix://{}", path.display()),
        }
    }
}

/// Connect to an endpoint.
pub async fn connect(endpoint: &Endpoint) -> Result<ChannelStream> {
    match endpoint {
        Endpoint::Tcp(addr) => {
            let stream = tokio::net::TcpStream::connect(addr.as_str())
                .await
                .map_err(|source| ChannelError::Connect {
                    endpoint: endpoint.to_string(),
                    source,
                })?;
            stream.set_nodelay(true)?;
            debug!(%endpoint, "connected");
            Ok(ChannelStream::from_tcp(stream))
        }
        #[cfg(unix)]
        Endpoint::Unix(path) => UnixDomainSocket::connect(path).await,
        #[cfg(not(unix))]
        Endpoint::Unix(_) => Err(ChannelError::Connect {
            endpoint: endpoint.to_string(),
            source: std::io::Error::new(
                std::io::ErrorKind::Unsupported,
                "unix domain sockets are not available on this platform",
            ),
        }),
    }
}

/// A bound listener for either endpoint kind.
pub struct ChannelListener {
    inner: ListenerInner,
}

enum ListenerInner {
    Tcp(TcpListener),
    #[cfg(unix)]
    Unix(UnixDomainSocket),
}

impl ChannelListener {
    /// Bind a listener on the endpoint.
    pub async fn bind(endpoint: &Endpoint) -> Result<Self> {
        let inner = match endpoint {
            Endpoint::Tcp(addr) => {
                let listener = TcpListener::bind(addr.as_str()).await.map_err(|source| {
                    ChannelError::Bind {
                        endpoint: endpoint.to_string(),
                        source,
                    }
                })?;
                info!(addr = ?listener.local_addr().ok(), "listening on tcp");
                ListenerInner::Tcp(listener)
            }
            #[cfg(unix)]
            Endpoint::Unix(path) => ListenerInner::Unix(UnixDomainSocket::bind(path)?),
            #[cfg(not(unix))]
            Endpoint::Unix(_) => {
                return Err(ChannelError::Bind {
                    endpoint: endpoint.to_string(),
                    source: std::io::Error::new(
                        std::io::ErrorKind::Unsupported,
                        "unix domain sockets are not available on this platform",
                    ),
                })
            }
        };
        Ok(Self { inner })
    }

    /// Accept the next connection.
    pub async fn accept(&self) -> Result<ChannelStream> {
        match &self.inner {
            ListenerInner::Tcp(listener) => {
                let (stream, addr) = listener.accept().await.map_err(ChannelError::Accept)?;
                stream.set_nodelay(true)?;
                debug!(%addr, "accepted tcp connection");
                Ok(ChannelStream::from_tcp(stream))
            }
            #[cfg(unix)]
            ListenerInner::Unix(listener) => listener.accept().await,
        }
    }

    /// The endpoint actually bound (resolves port 0 for TCP).
    pub fn local_endpoint(&self) -> Result<Endpoint> {
        match &self.inner {
            ListenerInner::Tcp(listener) => Ok(Endpoint::Tcp(listener.local_addr()?.to_string())),
            #[cfg(unix)]
            ListenerInner::Unix(listener) => Ok(Endpoint::Unix(listener.path().to_path_buf())),
        }
    }
}
