//! TCP-based transport implementation

use std::io;
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::time::Duration;

use eyre::{Context, Result};

use super::{DebugTransport, OutputStream};

/// How long the background reader blocks before checking for shutdown
const READ_TIMEOUT: Duration = Duration::from_millis(250);

/// TCP-based debugger transport
///
/// # Timeout Behavior
///
/// The reader is configured with a short read timeout so that the
/// background thread forwarding bytes can periodically check for shutdown.
///
/// ```no_run
/// use std::net::TcpStream;
/// use transport::io::TcpTransport;
///
/// let stream = TcpStream::connect("127.0.0.1:24242")?;
/// let transport = TcpTransport::new(stream)?;
/// # Ok::<(), eyre::Error>(())
/// ```
pub struct TcpTransport {
    stream: TcpStream,
}

impl TcpTransport {
    /// Create a new TCP transport from an existing stream
    ///
    /// # Errors
    ///
    /// Returns an error if configuring the socket fails
    pub fn new(stream: TcpStream) -> Result<Self> {
        stream
            .set_read_timeout(Some(READ_TIMEOUT))
            .context("setting read timeout on TCP stream")?;
        // messages are small and latency matters while stepping
        stream
            .set_nodelay(true)
            .context("disabling Nagle's algorithm")?;
        Ok(Self { stream })
    }

    /// Connect to a debug server at the given address
    pub fn connect(addr: impl ToSocketAddrs) -> Result<Self> {
        let stream = TcpStream::connect(addr).context("connecting to debug server")?;
        Self::new(stream)
    }
}

impl DebugTransport for TcpTransport {
    type Reader = TcpStream;
    type Writer = TcpStream;

    fn split(self) -> Result<(Self::Reader, Self::Writer)> {
        // Clone stream for reader, keep original for writer
        let input = self
            .stream
            .try_clone()
            .context("cloning TCP stream for reader")?;
        Ok((input, self.stream))
    }
}

impl OutputStream for TcpStream {
    fn close(&mut self) -> io::Result<()> {
        // also wakes our own reader, which sees end of stream
        match self.shutdown(Shutdown::Both) {
            Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
            other => other,
        }
    }
}
