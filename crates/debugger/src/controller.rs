use std::{
    io,
    net::{TcpStream, ToSocketAddrs},
    sync::{Arc, Mutex},
    thread,
    time::{Duration, Instant},
};

use config::ClientConfig;
use eyre::WrapErr;
use retry::retry;
use transport::{
    DebugTransport, DecodeMode, MessageReader, MessageWriter, Notification, PollResult, Request,
    TcpTransport,
    types::BreakpointId,
};

use crate::{
    internals::ControllerInternals,
    state::{ConnectionState, Event},
};

/// How long the reader thread waits before checking whether it should stop
const POLL_TIMEOUT: Duration = Duration::from_millis(50);

/// Delays between connection attempts, doubling from `connect_backoff_ms`
fn retry_scale(config: &ClientConfig) -> impl Iterator<Item = Duration> + use<> {
    let base = config.connect_backoff_ms;
    let attempts = config.connect_attempts.max(1);
    (0..attempts - 1).map(move |n| Duration::from_millis(base.saturating_mul(1 << n.min(16))))
}

fn reliable_tcp_stream<A>(
    addr: A,
    delays: impl Iterator<Item = Duration>,
) -> Result<TcpStream, retry::Error<io::Error>>
where
    A: ToSocketAddrs + Clone,
{
    retry(delays, || {
        tracing::debug!("trying to make connection");
        match TcpStream::connect(addr.clone()) {
            Ok(stream) => {
                tracing::debug!("connection made");
                Ok(stream)
            }
            Err(e) => {
                tracing::debug!(error = %e, "error making connection");
                Err(e)
            }
        }
    })
}

/// Remote control for a script running under the debug server
///
/// Notifications from the server arrive as [`Event`]s on the channel
/// returned by [`ControllerClient::events`]. The action methods only send
/// requests; their effect shows up later as events.
pub struct ControllerClient {
    internals: Arc<Mutex<ControllerInternals>>,
    rx: crossbeam_channel::Receiver<Event>,
}

impl Default for ControllerClient {
    fn default() -> Self {
        Self::new()
    }
}

impl ControllerClient {
    /// A client that is not connected yet
    pub fn new() -> Self {
        let (tx, rx) = crossbeam_channel::unbounded();
        Self {
            internals: Arc::new(Mutex::new(ControllerInternals::new(tx))),
            rx,
        }
    }

    /// Connect over TCP, retrying with exponential backoff
    ///
    /// A failure is reported both as the returned error and as a
    /// [`Event::ConnectionFailed`].
    #[tracing::instrument(skip(self, config), fields(host = %config.host, port = config.port))]
    pub fn connect(&self, config: &ClientConfig) -> eyre::Result<()> {
        let addr = format!("{}:{}", config.host, config.port);
        let delays = retry_scale(config);
        self.establish(move || {
            let stream = reliable_tcp_stream(addr.clone(), delays)
                .map_err(|e| eyre::eyre!("could not connect to {addr}: {e}"))?;
            transport::connect(TcpTransport::new(stream)?)
        })
    }

    /// Connect over an already established transport
    pub fn connect_with<T>(&self, transport: T) -> eyre::Result<()>
    where
        T: DebugTransport,
    {
        self.establish(move || transport::connect(transport))
    }

    fn establish<F>(&self, open: F) -> eyre::Result<()>
    where
        F: FnOnce() -> eyre::Result<(MessageReader, MessageWriter)>,
    {
        self.with_internals(|internals| internals.begin_connecting())?;

        let (reader, writer) = match open() {
            Ok(halves) => halves,
            Err(e) => {
                tracing::warn!(error = %e, "connection failed");
                self.with_internals(|internals| {
                    internals.on_closed();
                    Ok(())
                })?;
                return Err(e);
            }
        };

        let (stop_tx, stop_rx) = crossbeam_channel::bounded(0);
        let generation =
            self.with_internals(|internals| Ok(internals.attach(writer, stop_tx)))?;

        let background_internals = Arc::clone(&self.internals);
        thread::Builder::new()
            .name("debugger controller reader".to_string())
            .spawn(move || Self::reader_loop(reader, background_internals, generation, stop_rx))
            .wrap_err("spawning controller reader thread")?;
        Ok(())
    }

    fn reader_loop(
        mut reader: MessageReader,
        internals: Arc<Mutex<ControllerInternals>>,
        generation: u64,
        stop: crossbeam_channel::Receiver<()>,
    ) {
        loop {
            if let Err(crossbeam_channel::TryRecvError::Disconnected) = stop.try_recv() {
                tracing::debug!("controller reader stopping");
                break;
            }

            let closed = match reader.next_message::<Notification>(POLL_TIMEOUT, DecodeMode::Strict) {
                PollResult::Message(notification) => {
                    tracing::debug!(?notification, "received notification");
                    let Ok(mut guard) = internals.lock() else {
                        tracing::error!("controller internals poisoned");
                        break;
                    };
                    if guard.generation != generation {
                        break;
                    }
                    guard.on_notification(notification);
                    false
                }
                PollResult::Closed => true,
                PollResult::Timeout => false,
            };

            if closed {
                tracing::debug!("server closed the connection");
                if let Ok(mut guard) = internals.lock() {
                    if guard.generation == generation {
                        guard.on_closed();
                    }
                }
                break;
            }
        }
        tracing::debug!("controller reader terminated");
    }

    /// Return a [`crossbeam_channel::Receiver<Event>`] to subscribe to controller events
    pub fn events(&self) -> crossbeam_channel::Receiver<Event> {
        self.rx.clone()
    }

    pub fn state(&self) -> ConnectionState {
        self.with_internals(|internals| Ok(internals.state()))
            .unwrap_or(ConnectionState::Disconnected)
    }

    /// Wait up to `timeout` for an event matching `pred`, dropping the
    /// events before it
    pub fn wait_for_event<F>(&self, pred: F, timeout: Duration) -> Option<Event>
    where
        F: Fn(&Event) -> bool,
    {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let evt = self.rx.recv_timeout(remaining).ok()?;
            if pred(&evt) {
                tracing::debug!(event = ?evt, "received expected event");
                return Some(evt);
            }
            tracing::trace!(event = ?evt, "non-matching event");
        }
    }

    /// Close the connection
    ///
    /// Fires [`Event::ConnectionLost`] unless the script already finished.
    #[tracing::instrument(skip(self))]
    pub fn disconnect(&self) -> eyre::Result<()> {
        self.with_internals(|internals| {
            internals.disconnect();
            Ok(())
        })
    }

    pub fn pause(&self) -> eyre::Result<()> {
        self.send(Request::Pause)
    }

    pub fn run(&self) -> eyre::Result<()> {
        self.send(Request::Run)
    }

    pub fn step_into(&self) -> eyre::Result<()> {
        self.send(Request::StepInto)
    }

    pub fn step_over(&self) -> eyre::Result<()> {
        self.send(Request::StepOver)
    }

    pub fn step_out(&self) -> eyre::Result<()> {
        self.send(Request::StepOut)
    }

    pub fn add_breakpoint(&self, path: impl Into<String>, line: i64) -> eyre::Result<()> {
        self.send(Request::AddBreakpoint {
            path: path.into(),
            line,
        })
    }

    pub fn remove_breakpoint(&self, id: BreakpointId) -> eyre::Result<()> {
        self.send(Request::remove_breakpoint(id))
    }

    pub fn remove_breakpoint_at(&self, path: impl Into<String>, line: i64) -> eyre::Result<()> {
        self.send(Request::remove_breakpoint_at(path, line))
    }

    /// Request the source of `path`, or of the current script if empty
    pub fn get_source(&self, path: impl Into<String>) -> eyre::Result<()> {
        self.send(Request::GetSourceCode { path: path.into() })
    }

    pub fn get_breakpoints(&self) -> eyre::Result<()> {
        self.send(Request::GetBreakpointList)
    }

    pub fn get_callstack(&self) -> eyre::Result<()> {
        self.send(Request::GetCallStack)
    }

    /// Request the variables of the frame at `depth`, 0 or -1 for the innermost
    pub fn get_variables(&self, depth: i64) -> eyre::Result<()> {
        self.send(Request::GetVariables { depth })
    }

    #[tracing::instrument(skip(self), level = "debug")]
    fn send(&self, request: Request) -> eyre::Result<()> {
        self.with_internals(|internals| internals.send(&request))
            .wrap_err_with(|| format!("sending {} request", request.kind()))
    }

    #[tracing::instrument(skip_all, level = "trace")]
    fn with_internals<F, T>(&self, f: F) -> eyre::Result<T>
    where
        F: FnOnce(&mut ControllerInternals) -> eyre::Result<T>,
    {
        tracing::trace!(poisoned = %self.internals.is_poisoned(), "trying to lock internals");
        let mut internals = self
            .internals
            .lock()
            .map_err(|e| eyre::eyre!("controller mutex poisoned: {}", e))?;
        tracing::trace!("executing operation");
        let res = f(&mut internals);
        drop(internals);
        tracing::trace!("unlocked internals");
        res
    }
}

impl Drop for ControllerClient {
    fn drop(&mut self) {
        tracing::debug!("dropping controller");
        if let Err(e) = self.disconnect() {
            tracing::warn!(error = %e, "failed to disconnect during drop");
        }
    }
}
