//! IO abstraction layer for the debugger transport
//!
//! The core trait [`DebugTransport`] allows plugging in different IO
//! implementations: TCP sockets in production and in-memory channels in
//! tests.
//!
//! # Examples
//!
//! ## Using TCP Transport
//!
//! ```no_run
//! use transport::io::TcpTransport;
//!
//! let transport = TcpTransport::connect("127.0.0.1:24242")?;
//! let (reader, writer) = transport::connect(transport)?;
//! # Ok::<(), eyre::Error>(())
//! ```
//!
//! ## Using In-Memory Transport for Testing
//!
//! ```
//! use transport::io::InMemoryTransport;
//!
//! let (controller, server) = InMemoryTransport::pair();
//! let (reader, writer) = transport::connect(controller)?;
//! # Ok::<(), eyre::Error>(())
//! ```

use std::io::{self, Read, Write};

mod memory;
mod tcp;

pub use memory::InMemoryTransport;
pub use tcp::TcpTransport;

/// Writer half of a transport
///
/// On top of [`Write`], the writer can close the connection so that the
/// peer observes end of stream.
pub trait OutputStream: Write + Send + 'static {
    fn close(&mut self) -> io::Result<()>;
}

/// Trait for bidirectional debugger message transport
///
/// Implementations must provide a way to split the transport into separate
/// reader and writer halves. The reader is moved into a background thread
/// that forwards raw bytes; the writer stays with the protocol owner.
///
/// Readers should return `WouldBlock` or `TimedOut` when no data arrives
/// within a short period so that the background thread can notice shutdown.
pub trait DebugTransport: Send + 'static {
    /// The reader type
    type Reader: Read + Send + 'static;

    /// The writer type
    type Writer: OutputStream;

    /// Split the transport into separate reader and writer halves
    ///
    /// # Errors
    ///
    /// Returns an error if the transport cannot be split (e.g., socket cloning fails)
    fn split(self) -> eyre::Result<(Self::Reader, Self::Writer)>;
}
