use std::io::{ErrorKind, Read, Write};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};
use eyre::{Result, WrapErr};
use serde_json::Value;

use crate::codec::WireMessage;
use crate::framer::StreamFramer;
use crate::io::{DebugTransport, OutputStream};

/// Delay before retrying a reader that had nothing to offer
const IDLE_BACKOFF: Duration = Duration::from_millis(10);

/// Result of a timeout-aware poll operation
#[derive(Debug, PartialEq)]
pub enum PollResult<T> {
    /// A complete message was received
    Message(T),
    /// The connection was closed and every buffered message has been taken
    Closed,
    /// The timeout expired before a complete message was received
    Timeout,
}

enum Chunk {
    Data(Vec<u8>),
    Closed,
}

/// Split a transport and start forwarding its incoming bytes
///
/// A background thread moves raw bytes from the transport reader into a
/// channel. Framing happens on whichever thread owns the returned
/// [`MessageReader`], so protocol state is never shared between threads.
pub fn connect<T>(transport: T) -> Result<(MessageReader, MessageWriter)>
where
    T: DebugTransport,
{
    let (input, output) = transport.split().wrap_err("splitting transport")?;
    let (tx, rx) = crossbeam_channel::unbounded();
    let (shutdown_tx, shutdown_rx) = oneshot::channel();

    thread::Builder::new()
        .name("debug transport reader".to_string())
        .spawn(move || forward_bytes(input, tx, shutdown_rx))
        .wrap_err("spawning transport reader thread")?;

    let reader = MessageReader {
        rx,
        framer: StreamFramer::new(),
        closed: false,
        exit: Some(shutdown_tx),
    };
    let writer = MessageWriter {
        output: Box::new(output),
        closed: false,
    };
    Ok((reader, writer))
}

fn forward_bytes<R: Read>(mut input: R, tx: Sender<Chunk>, shutdown: oneshot::Receiver<()>) {
    let mut buf = vec![0u8; 8192];
    loop {
        match shutdown.try_recv() {
            Ok(_) | Err(oneshot::TryRecvError::Disconnected) => {
                tracing::trace!("transport reader shutting down");
                return;
            }
            Err(oneshot::TryRecvError::Empty) => {}
        }

        match input.read(&mut buf) {
            Ok(0) => {
                tracing::debug!("peer closed the connection");
                let _ = tx.send(Chunk::Closed);
                return;
            }
            Ok(n) => {
                tracing::trace!(bytes = n, "received bytes");
                if tx.send(Chunk::Data(buf[..n].to_vec())).is_err() {
                    return;
                }
            }
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                thread::sleep(IDLE_BACKOFF);
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => {
                tracing::warn!(error = %e, "reading from transport");
                let _ = tx.send(Chunk::Closed);
                return;
            }
        }
    }
}

/// Receiving half of a connection
///
/// Yields complete JSON values in the order the peer sent them.
pub struct MessageReader {
    rx: Receiver<Chunk>,
    framer: StreamFramer,
    closed: bool,

    // Option because of drop and take
    exit: Option<oneshot::Sender<()>>,
}

impl MessageReader {
    fn accept(&mut self, chunk: Chunk) {
        match chunk {
            Chunk::Data(bytes) => self.framer.write(&bytes),
            Chunk::Closed => self.closed = true,
        }
    }

    /// Move whatever bytes already arrived into the framer without blocking
    pub fn fill(&mut self) {
        while !self.closed {
            match self.rx.try_recv() {
                Ok(chunk) => self.accept(chunk),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => self.closed = true,
            }
        }
    }

    /// The next complete value, if one has already arrived
    pub fn try_next(&mut self) -> Option<Value> {
        self.fill();
        self.framer.pop()
    }

    /// Wait up to `timeout` for the next complete value
    pub fn next_timeout(&mut self, timeout: Duration) -> PollResult<Value> {
        let deadline = Instant::now() + timeout;
        loop {
            self.fill();
            if let Some(value) = self.framer.pop() {
                return PollResult::Message(value);
            }
            if self.closed {
                return PollResult::Closed;
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return PollResult::Timeout;
            }
            match self.rx.recv_timeout(remaining) {
                Ok(chunk) => self.accept(chunk),
                Err(RecvTimeoutError::Timeout) => return PollResult::Timeout,
                Err(RecvTimeoutError::Disconnected) => self.closed = true,
            }
        }
    }

    /// Wait for the next value and decode it as `M`
    ///
    /// Values that fail to decode are logged and skipped.
    pub fn next_message<M: WireMessage>(
        &mut self,
        timeout: Duration,
        mode: crate::DecodeMode,
    ) -> PollResult<M> {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.next_timeout(remaining) {
                PollResult::Message(value) => match M::decode(value, mode) {
                    Ok(message) => return PollResult::Message(message),
                    Err(e) => tracing::warn!(error = %e, "dropping undecodable message"),
                },
                PollResult::Closed => return PollResult::Closed,
                PollResult::Timeout => return PollResult::Timeout,
            }
        }
    }

    /// Whether the peer has gone away
    ///
    /// Values framed before the close may still be waiting.
    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Drop for MessageReader {
    fn drop(&mut self) {
        if let Some(exit) = self.exit.take() {
            let _ = exit.send(());
        }
    }
}

/// Sending half of a connection
pub struct MessageWriter {
    output: Box<dyn OutputStream>,
    closed: bool,
}

impl MessageWriter {
    /// Encode and write a single message
    #[tracing::instrument(skip(self, message), level = "debug", fields(kind = message.kind_name()))]
    pub fn send<M: WireMessage>(&mut self, message: &M) -> Result<()> {
        eyre::ensure!(!self.closed, "connection already closed");
        let bytes = message.encode().wrap_err("encoding message")?;
        tracing::debug!(content = %String::from_utf8_lossy(&bytes), "sending message");
        self.output
            .write_all(&bytes)
            .wrap_err("writing message to output buffer")?;
        self.output.flush().wrap_err("flushing output buffer")?;
        Ok(())
    }

    /// Close the connection, the peer sees end of stream
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.output.close().wrap_err("closing connection")
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}
