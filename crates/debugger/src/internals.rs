use transport::{MessageWriter, Notification, Request};

use crate::state::{ConnectionState, Event};

/// State shared between the action senders and the reader thread
pub(crate) struct ControllerInternals {
    state: ConnectionState,
    publisher: crossbeam_channel::Sender<Event>,
    writer: Option<MessageWriter>,

    /// Dropped to stop the reader thread of the current connection
    stop: Option<crossbeam_channel::Sender<()>>,

    /// Bumped per connection so a lingering reader thread cannot touch a
    /// newer connection
    pub(crate) generation: u64,
}

impl ControllerInternals {
    pub(crate) fn new(publisher: crossbeam_channel::Sender<Event>) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            publisher,
            writer: None,
            stop: None,
            generation: 0,
        }
    }

    pub(crate) fn state(&self) -> ConnectionState {
        self.state
    }

    pub(crate) fn emit(&mut self, event: Event) {
        let _ = self.publisher.send(event);
    }

    /// Move to `new_state`, returns false if the transition was ignored
    #[tracing::instrument(skip(self), level = "trace")]
    pub(crate) fn set_state(&mut self, new_state: ConnectionState) -> bool {
        if self.state == ConnectionState::DebuggerFinished {
            tracing::trace!("debugger finished, ignoring state change");
            return false;
        }
        if self.state == new_state {
            return false;
        }

        let previous = std::mem::replace(&mut self.state, new_state);
        tracing::debug!(%previous, state = %new_state, "connection state changed");
        self.emit(Event::StateChanged {
            state: new_state,
            previous,
        });
        true
    }

    pub(crate) fn begin_connecting(&mut self) -> eyre::Result<()> {
        eyre::ensure!(
            self.state == ConnectionState::Disconnected,
            "cannot connect while {}",
            self.state
        );
        self.set_state(ConnectionState::Connecting);
        Ok(())
    }

    /// Install a freshly connected writer, returns the connection generation
    pub(crate) fn attach(
        &mut self,
        writer: MessageWriter,
        stop: crossbeam_channel::Sender<()>,
    ) -> u64 {
        self.generation += 1;
        self.writer = Some(writer);
        self.stop = Some(stop);
        self.generation
    }

    pub(crate) fn send(&mut self, request: &Request) -> eyre::Result<()> {
        eyre::ensure!(self.state.is_connected(), "not connected ({})", self.state);
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| eyre::eyre!("no connection"))?;
        writer.send(request)
    }

    #[tracing::instrument(skip(self), level = "debug")]
    pub(crate) fn on_notification(&mut self, notification: Notification) {
        match notification {
            Notification::Run => {
                self.enter_session_state(ConnectionState::DebuggerRunning, Event::DebuggerRunning)
            }
            Notification::Break => {
                self.enter_session_state(ConnectionState::DebuggerPaused, Event::DebuggerPaused)
            }
            Notification::Goodbye => {
                if self.set_state(ConnectionState::DebuggerFinished) {
                    self.emit(Event::DebuggerFinished);
                }
            }
            Notification::SourceCode { path, text, ast } => {
                self.emit(Event::SourceCode { path, text, ast })
            }
            Notification::BreakpointList { entries } => self.emit(Event::Breakpoints(entries)),
            Notification::Callstack { frames } => self.emit(Event::Callstack(frames)),
            Notification::VariableList { depth, variables } => {
                self.emit(Event::Variables { depth, variables })
            }
        }
    }

    fn enter_session_state(&mut self, state: ConnectionState, event: Event) {
        let was_connecting = self.state == ConnectionState::Connecting;
        if self.set_state(state) {
            if was_connecting {
                self.emit(Event::ConnectionEstablished);
            }
            self.emit(event);
        }
    }

    /// The connection is gone, either end closed it
    pub(crate) fn on_closed(&mut self) {
        self.stop.take();
        if let Some(mut writer) = self.writer.take() {
            if let Err(e) = writer.close() {
                tracing::debug!(error = %e, "closing writer");
            }
        }

        match self.state {
            ConnectionState::Connecting => {
                self.set_state(ConnectionState::Disconnected);
                self.emit(Event::ConnectionFailed);
            }
            ConnectionState::DebuggerRunning | ConnectionState::DebuggerPaused => {
                tracing::warn!("connection to debugger lost");
                self.set_state(ConnectionState::Disconnected);
                self.emit(Event::ConnectionLost);
            }
            ConnectionState::Disconnected | ConnectionState::DebuggerFinished => {}
        }
    }

    /// Close the connection from this side
    pub(crate) fn disconnect(&mut self) {
        self.generation += 1;
        self.on_closed();
    }
}
