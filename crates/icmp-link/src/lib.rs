//! Link abstraction for the inter-core messaging protocol.
//!
//! The protocol core never touches hardware. It hands packed frames to a
//! [`Link`] and receives frames that something else has already unpacked.
//! This crate provides the trait plus the links used in practice:
//! - [`StreamLink`] over any `Write` byte sink (a UART, a pipe, a socket)
//! - [`MemoryLink`] for tests and host tools
//! - Unix domain sockets standing in for the inter-board UART on a host

pub mod error;
pub mod memory;
pub mod stream;
pub mod traits;

#[cfg(unix)]
pub mod uds;

pub use error::{LinkError, Result};
pub use memory::{MemoryLink, MemoryLinkHandle};
pub use stream::StreamLink;
pub use traits::Link;

#[cfg(unix)]
pub use uds::{UnixLinkListener, UnixLinkPair};
