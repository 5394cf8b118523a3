//! Interpreter side of a debugger connection
use std::collections::VecDeque;
use std::net::{SocketAddr, TcpListener};
use std::time::Duration;

use config::ServerConfig;
use eyre::WrapErr;
use transport::{
    DebugTransport, DecodeMode, MessageReader, MessageWriter, Notification, PollResult, Request,
    TcpTransport, WireMessage,
};

/// Outcome of [`DebugSession::wait_for_request`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitResult {
    /// At least one request is queued
    Ready,
    Timeout,
    /// The controller went away and nothing is left in the queue
    Disconnected,
}

/// Listening socket waiting for the single controller of this process
pub struct DebugListener {
    listener: TcpListener,
    mode: DecodeMode,
}

impl DebugListener {
    pub fn bind(config: &ServerConfig) -> eyre::Result<Self> {
        let listener = TcpListener::bind((config.host.as_str(), config.port))
            .wrap_err_with(|| format!("binding debug port {}:{}", config.host, config.port))?;
        Ok(Self {
            listener,
            mode: decode_mode(config),
        })
    }

    pub fn local_addr(&self) -> eyre::Result<SocketAddr> {
        self.listener.local_addr().wrap_err("reading listener address")
    }

    /// Block until a controller connects
    ///
    /// The listener is consumed so no second controller can connect.
    #[tracing::instrument(skip(self))]
    pub fn accept(self) -> eyre::Result<DebugSession> {
        tracing::info!(addr = ?self.listener.local_addr().ok(), "waiting for debugger controller");
        let (stream, peer) = self
            .listener
            .accept()
            .wrap_err("accepting controller connection")?;
        tracing::info!(%peer, "controller connected");
        DebugSession::with_transport(TcpTransport::new(stream)?, self.mode)
    }
}

pub fn decode_mode(config: &ServerConfig) -> DecodeMode {
    if config.strict_decoding {
        DecodeMode::Strict
    } else {
        DecodeMode::Permissive
    }
}

/// A connected controller plus the requests it sent that nobody handled yet
pub struct DebugSession {
    reader: MessageReader,
    writer: MessageWriter,
    pending: VecDeque<Request>,
    mode: DecodeMode,
}

impl DebugSession {
    pub fn with_transport<T>(transport: T, mode: DecodeMode) -> eyre::Result<Self>
    where
        T: DebugTransport,
    {
        let (reader, writer) = transport::connect(transport)?;
        Ok(Self {
            reader,
            writer,
            pending: VecDeque::new(),
            mode,
        })
    }

    /// Decode everything that already arrived, never blocks
    ///
    /// Returns the number of requests queued by this call.
    pub fn poll(&mut self) -> usize {
        let mut queued = 0;
        while let Some(value) = self.reader.try_next() {
            if self.enqueue(value) {
                queued += 1;
            }
        }
        queued
    }

    fn enqueue(&mut self, value: serde_json::Value) -> bool {
        match Request::decode(value, self.mode) {
            Ok(request) => {
                tracing::debug!(?request, "received request");
                self.pending.push_back(request);
                true
            }
            Err(e) => {
                tracing::warn!(error = %e, "dropping request");
                false
            }
        }
    }

    /// The oldest queued request
    pub fn next_request(&mut self) -> Option<Request> {
        self.pending.pop_front()
    }

    /// Poll, then take the oldest queued request
    pub fn receive(&mut self) -> Option<Request> {
        self.poll();
        self.next_request()
    }

    /// Block for up to `timeout` until a request is queued
    pub fn wait_for_request(&mut self, timeout: Duration) -> WaitResult {
        self.poll();
        if !self.pending.is_empty() {
            return WaitResult::Ready;
        }
        match self.reader.next_message::<Request>(timeout, self.mode) {
            PollResult::Message(request) => {
                tracing::debug!(?request, "received request");
                self.pending.push_back(request);
                self.poll();
                WaitResult::Ready
            }
            PollResult::Timeout => WaitResult::Timeout,
            PollResult::Closed => WaitResult::Disconnected,
        }
    }

    pub fn send(&mut self, notification: &Notification) -> eyre::Result<()> {
        self.writer.send(notification)
    }

    /// Whether the controller can still receive notifications
    pub fn is_connected(&self) -> bool {
        !self.reader.is_closed() && !self.writer.is_closed()
    }

    /// Say goodbye and close the connection
    #[tracing::instrument(skip(self))]
    pub fn close(&mut self) -> eyre::Result<()> {
        if self.writer.is_closed() {
            return Ok(());
        }
        if !self.reader.is_closed() {
            if let Err(e) = self.writer.send(&Notification::Goodbye) {
                tracing::warn!(error = %e, "sending goodbye");
            }
        }
        self.writer.close()
    }
}
