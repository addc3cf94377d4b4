use std::io;
use std::os::unix::fs::{FileTypeExt, MetadataExt, PermissionsExt};
use std::path::{Path, PathBuf};

use tokio::net::{UnixListener, UnixStream};
use tracing::{debug, info};

use crate::error::{ChannelError, Result};
use crate::traits::ChannelStream;

#[cfg(target_os = "linux")]
const SUN_PATH_MAX: usize = 108;
#[cfg(not(target_os = "linux"))]
const SUN_PATH_MAX: usize = 104;

/// Device and inode of a socket file, used to tell our socket apart from
/// whatever may later occupy the same path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SocketIdentity {
    dev: u64,
    ino: u64,
}

impl SocketIdentity {
    fn of(path: &Path) -> io::Result<Option<Self>> {
        let metadata = std::fs::symlink_metadata(path)?;
        Ok(metadata.file_type().is_socket().then(|| Self {
            dev: metadata.dev(),
            ino: metadata.ino(),
        }))
    }
}

/// Listener on a filesystem-path Unix domain socket.
///
/// The socket file is removed on drop as long as the path still names the
/// socket this listener created.
pub struct UnixDomainSocket {
    listener: UnixListener,
    path: PathBuf,
    identity: Option<SocketIdentity>,
}

impl UnixDomainSocket {
    /// Owner-only access.
    pub const DEFAULT_SOCKET_MODE: u32 = 0o600;

    /// Bind with [`DEFAULT_SOCKET_MODE`](Self::DEFAULT_SOCKET_MODE).
    ///
    /// A stale socket left at `path` is replaced; any other file there is an
    /// error.
    pub fn bind(path: impl AsRef<Path>) -> Result<Self> {
        Self::bind_with_mode(path, Self::DEFAULT_SOCKET_MODE)
    }

    pub fn bind_with_mode(path: impl AsRef<Path>, mode: u32) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let len = path.as_os_str().len();
        if len >= SUN_PATH_MAX {
            return Err(ChannelError::PathTooLong {
                path,
                len,
                max: SUN_PATH_MAX,
            });
        }

        let bind_err = |source: io::Error| ChannelError::Bind {
            endpoint: path.display().to_string(),
            source,
        };

        clear_stale(&path).map_err(bind_err)?;
        let listener = UnixListener::bind(&path).map_err(bind_err)?;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(mode))
            .map_err(bind_err)?;
        let identity = SocketIdentity::of(&path).map_err(bind_err)?;

        info!(?path, mode = %format!("{mode:o}"), "listening on unix socket");
        Ok(Self {
            listener,
            path,
            identity,
        })
    }

    pub async fn accept(&self) -> Result<ChannelStream> {
        let (stream, _) = self
            .listener
            .accept()
            .await
            .map_err(ChannelError::Accept)?;
        debug!(path = ?self.path, "accepted unix connection");
        Ok(ChannelStream::from_unix(stream))
    }

    pub async fn connect(path: impl AsRef<Path>) -> Result<ChannelStream> {
        let path = path.as_ref();
        let stream = UnixStream::connect(path)
            .await
            .map_err(|source| ChannelError::Connect {
                endpoint: path.display().to_string(),
                source,
            })?;
        debug!(?path, "connected to unix socket");
        Ok(ChannelStream::from_unix(stream))
    }

    /// The path this socket is bound to.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn clear_stale(path: &Path) -> io::Result<()> {
    match std::fs::symlink_metadata(path) {
        Ok(metadata) if metadata.file_type().is_socket() => {
            debug!(?path, "removing stale socket");
            std::fs::remove_file(path)
        }
        Ok(_) => Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            "existing path is not a unix socket",
        )),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err),
    }
}

impl Drop for UnixDomainSocket {
    fn drop(&mut self) {
        let Some(identity) = self.identity else {
            return;
        };
        match SocketIdentity::of(&self.path) {
            Ok(Some(current)) if current == identity => {
                debug!(path = ?self.path, "removing socket file");
                let _ = std::fs::remove_file(&self.path);
            }
            Ok(_) => debug!(path = ?self.path, "socket path was replaced; leaving it"),
            Err(_) => {}
        }
    }
}
