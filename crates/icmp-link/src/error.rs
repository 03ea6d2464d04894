use std::path::PathBuf;

/// Errors that can occur on a link.
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    /// Failed to bind to the specified address.
    #[error("failed to bind to {path}: {source}")]
    Bind {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to connect to the specified address.
    #[error("failed to connect to {path}: {source}")]
    Connect {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to accept an incoming connection.
    #[error("failed to accept connection: {0}")]
    Accept(std::io::Error),

    /// An I/O error occurred on the underlying byte stream.
    #[error("link I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The socket path is too long for the platform.
    #[error("socket path too long ({len} bytes, max {max}): {path}")]
    PathTooLong {
        path: PathBuf,
        len: usize,
        max: usize,
    },

    /// The peer end of the link has gone away.
    #[error("link closed")]
    Closed,

    /// The link refused the frame.
    #[error("send rejected: {0}")]
    Rejected(String),
}

pub type Result<T> = std::result::Result<T, LinkError>;
