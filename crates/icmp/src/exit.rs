use std::fmt;
use std::io;

use icmp_engine::{EngineError, ErrorKind};
use icmp_frame::FrameError;
use icmp_link::LinkError;

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::ConnectionRefused
        | io::ErrorKind::NotFound
        | io::ErrorKind::BrokenPipe
        | io::ErrorKind::ConnectionReset => TRANSPORT_ERROR,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn link_error(context: &str, err: LinkError) -> CliError {
    match err {
        LinkError::Bind { source, .. }
        | LinkError::Connect { source, .. }
        | LinkError::Accept(source)
        | LinkError::Io(source) => io_error(context, source),
        LinkError::PathTooLong { .. } => CliError::new(USAGE, format!("{context}: {err}")),
        other => CliError::new(TRANSPORT_ERROR, format!("{context}: {other}")),
    }
}

pub fn frame_error(context: &str, err: FrameError) -> CliError {
    match err {
        FrameError::Io(source) => io_error(context, source),
        FrameError::ConnectionClosed => {
            CliError::new(TRANSPORT_ERROR, format!("{context}: {err}"))
        }
        FrameError::PoolExhausted { .. } => CliError::new(FAILURE, format!("{context}: {err}")),
        other => CliError::new(DATA_INVALID, format!("{context}: {other}")),
    }
}

pub fn engine_error(context: &str, err: EngineError) -> CliError {
    match err {
        EngineError::Link(err) => link_error(context, err),
        EngineError::Frame(err) => frame_error(context, err),
        other => {
            let code = match other.kind() {
                ErrorKind::InvalidArgument => USAGE,
                ErrorKind::InvalidFrame => DATA_INVALID,
                ErrorKind::ResourceExhausted => FAILURE,
                ErrorKind::WouldBlock => TIMEOUT,
                ErrorKind::Io => INTERNAL,
            };
            CliError::new(code, format!("{context}: {other}"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codec_errors_are_data_invalid() {
        let err = frame_error(
            "decode failed",
            FrameError::ChecksumMismatch {
                received: 0x1234,
                computed: 0x4321,
            },
        );
        assert_eq!(err.code, DATA_INVALID);
        assert!(err.message.starts_with("decode failed: checksum mismatch"));
    }

    #[test]
    fn engine_errors_follow_kind() {
        let err = engine_error(
            "notify failed",
            EngineError::PayloadTooLarge { size: 65, max: 64 },
        );
        assert_eq!(err.code, USAGE);

        let err = engine_error(
            "command failed",
            EngineError::Timeout(std::time::Duration::from_secs(1)),
        );
        assert_eq!(err.code, TIMEOUT);

        let err = engine_error(
            "connect failed",
            EngineError::Link(LinkError::Connect {
                path: "/tmp/missing.sock".into(),
                source: io::Error::from(io::ErrorKind::NotFound),
            }),
        );
        assert_eq!(err.code, TRANSPORT_ERROR);
    }
}
