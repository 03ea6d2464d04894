use std::os::unix::fs::{FileTypeExt, MetadataExt, PermissionsExt};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};

use icmp_frame::FrameReader;
use tracing::{debug, info};

use crate::error::{LinkError, Result};
use crate::stream::StreamLink;

/// Transmit and receive halves of one socket connection.
pub type UnixLinkPair = (StreamLink<UnixStream>, FrameReader<UnixStream>);

/// Unix domain socket standing in for the inter-board UART on a host.
///
/// The listening side plays one board, the connecting side the other. Each
/// connection is split into a [`StreamLink`] for the dispatcher and a
/// [`FrameReader`] for the receive pump.
pub struct UnixLinkListener {
    listener: UnixListener,
    path: PathBuf,
    created_inode: Option<(u64, u64)>,
}

impl UnixLinkListener {
    /// Default permission mode for created socket paths.
    pub const DEFAULT_SOCKET_MODE: u32 = 0o600;
    /// Maximum socket path length.
    /// Unix `sockaddr_un.sun_path` is typically 108 bytes on Linux, 104 on macOS.
    #[cfg(target_os = "linux")]
    const MAX_PATH_LEN: usize = 108;
    #[cfg(not(target_os = "linux"))]
    const MAX_PATH_LEN: usize = 104;

    /// Bind and listen on a filesystem-path Unix domain socket.
    ///
    /// If the path already exists and is a socket, it is removed first
    /// (stale socket cleanup). Any other existing file is left alone and
    /// binding fails.
    pub fn bind(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let path_bytes = path.as_os_str().len();
        if path_bytes >= Self::MAX_PATH_LEN {
            return Err(LinkError::PathTooLong {
                path,
                len: path_bytes,
                max: Self::MAX_PATH_LEN,
            });
        }

        if path.exists() {
            let metadata = std::fs::symlink_metadata(&path).map_err(|e| LinkError::Bind {
                path: path.clone(),
                source: e,
            })?;
            if metadata.file_type().is_socket() {
                debug!(?path, "removing stale socket");
                std::fs::remove_file(&path).map_err(|e| LinkError::Bind {
                    path: path.clone(),
                    source: e,
                })?;
            } else {
                return Err(LinkError::Bind {
                    path: path.clone(),
                    source: std::io::Error::new(
                        std::io::ErrorKind::AlreadyExists,
                        "existing path is not a unix socket",
                    ),
                });
            }
        }

        let listener = UnixListener::bind(&path).map_err(|e| LinkError::Bind {
            path: path.clone(),
            source: e,
        })?;

        std::fs::set_permissions(
            &path,
            std::fs::Permissions::from_mode(Self::DEFAULT_SOCKET_MODE),
        )
        .map_err(|e| LinkError::Bind {
            path: path.clone(),
            source: e,
        })?;
        let created = std::fs::symlink_metadata(&path).map_err(|e| LinkError::Bind {
            path: path.clone(),
            source: e,
        })?;

        info!(?path, "link listening on unix domain socket");

        Ok(Self {
            listener,
            path,
            created_inode: Some((created.dev(), created.ino())),
        })
    }

    /// Accept the peer board (blocking).
    pub fn accept(&self) -> Result<UnixLinkPair> {
        let (stream, _addr) = self.listener.accept().map_err(LinkError::Accept)?;
        debug!("peer connected");
        split(stream)
    }

    /// The path this socket is bound to.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for UnixLinkListener {
    fn drop(&mut self) {
        if let Some((expected_dev, expected_ino)) = self.created_inode {
            if let Ok(metadata) = std::fs::symlink_metadata(&self.path) {
                if metadata.file_type().is_socket()
                    && metadata.dev() == expected_dev
                    && metadata.ino() == expected_ino
                {
                    debug!(path = ?self.path, "cleaning up socket file");
                    let _ = std::fs::remove_file(&self.path);
                } else {
                    debug!(
                        path = ?self.path,
                        "socket path identity changed; skipping cleanup"
                    );
                }
            }
        }
    }
}

/// Connect to a listening peer board (blocking).
pub fn connect(path: impl AsRef<Path>) -> Result<UnixLinkPair> {
    let path = path.as_ref();
    let stream = UnixStream::connect(path).map_err(|e| LinkError::Connect {
        path: path.to_path_buf(),
        source: e,
    })?;
    debug!(?path, "connected to unix domain socket");
    split(stream)
}

/// Split a connected stream into transmit and receive halves.
pub fn split(stream: UnixStream) -> Result<UnixLinkPair> {
    let rx = stream.try_clone()?;
    Ok((
        StreamLink::with_name(stream, "unix-domain-socket"),
        FrameReader::new(rx),
    ))
}
