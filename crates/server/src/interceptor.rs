//! Run, pause and step state machine driven by the interpreter
//!
//! The interpreter calls [`BreakpointInterceptor::interrupt`] before every
//! instrumented statement. Most calls return straight away. When the script
//! has to stop, the call blocks on the interpreter thread and answers
//! controller requests until one of them resumes execution.
use std::time::{Duration, Instant};

use config::{DisconnectPolicy, InitialState, ServerConfig};
use transport::types::{INNERMOST_FRAME, UNKNOWN_BREAKPOINT_ID};
use transport::{Notification, Request};

use crate::breakpoints::BreakpointRegistry;
use crate::interpreter::{DebugHook, FramePosition, Interpreter, LocationId};
use crate::session::{DebugSession, WaitResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum InterceptorState {
    Running = 0,
    StepInto = 1,
    StepOver = 2,
    StepOut = 3,
    Break,
}

impl From<InitialState> for InterceptorState {
    fn from(value: InitialState) -> Self {
        match value {
            InitialState::StepInto => InterceptorState::StepInto,
            InitialState::Running => InterceptorState::Running,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum InterceptError {
    /// The script should stop: the controller vanished or a pause lasted
    /// too long and the abort policy is in effect
    #[error("debugging session aborted")]
    Aborted,
}

#[derive(Debug, Clone)]
pub struct InterceptorOptions {
    pub initial_state: InterceptorState,
    pub poll_interval: Duration,
    pub pause_timeout: Option<Duration>,
    pub on_disconnect: DisconnectPolicy,
}

impl Default for InterceptorOptions {
    fn default() -> Self {
        Self::from(&ServerConfig::default())
    }
}

impl From<&ServerConfig> for InterceptorOptions {
    fn from(config: &ServerConfig) -> Self {
        Self {
            initial_state: config.initial_state.into(),
            poll_interval: config.poll_interval(),
            pause_timeout: config.pause_timeout(),
            on_disconnect: config.on_disconnect,
        }
    }
}

/// Whether the statement at `depth` stops the script
pub fn should_break(
    state: InterceptorState,
    recorded_depth: usize,
    depth: usize,
    location_enabled: bool,
) -> bool {
    location_enabled
        || match state {
            InterceptorState::StepInto => true,
            InterceptorState::StepOver => depth == recorded_depth,
            InterceptorState::StepOut => depth < recorded_depth,
            InterceptorState::Running | InterceptorState::Break => false,
        }
}

pub struct BreakpointInterceptor {
    session: DebugSession,
    state: InterceptorState,
    recorded_depth: usize,
    registry: BreakpointRegistry,
    options: InterceptorOptions,
    detached: bool,
}

impl BreakpointInterceptor {
    pub fn new(session: DebugSession, options: InterceptorOptions) -> Self {
        tracing::debug!(?options, "creating interceptor");
        Self {
            session,
            state: options.initial_state,
            recorded_depth: 0,
            registry: BreakpointRegistry::new(),
            options,
            detached: false,
        }
    }

    pub fn state(&self) -> InterceptorState {
        self.state
    }

    pub fn breakpoints(&self) -> &BreakpointRegistry {
        &self.registry
    }

    /// Whether the controller is gone and the script runs on unobserved
    pub fn is_detached(&self) -> bool {
        self.detached
    }

    /// Called by the interpreter before an instrumented statement
    #[tracing::instrument(
        skip(self, interpreter, frame),
        level = "trace",
        fields(depth = frame.depth, line = frame.line)
    )]
    pub fn interrupt(
        &mut self,
        interpreter: &mut dyn Interpreter,
        frame: &FramePosition,
        location: Option<LocationId>,
    ) -> Result<(), InterceptError> {
        if self.detached {
            return Ok(());
        }

        let location_enabled = location
            .and_then(|id| interpreter.location(id))
            .is_some_and(|location| location.enabled);
        if should_break(self.state, self.recorded_depth, frame.depth, location_enabled) {
            return self.do_break(interpreter, frame);
        }

        while let Some(request) = self.session.receive() {
            self.process(interpreter, frame, request);
        }
        if !self.session.is_connected() {
            tracing::warn!("controller disconnected, continuing without debugger");
            self.detach();
        }
        Ok(())
    }

    #[tracing::instrument(skip(self, interpreter, frame), fields(path = %frame.script_path, line = frame.line))]
    fn do_break(
        &mut self,
        interpreter: &mut dyn Interpreter,
        frame: &FramePosition,
    ) -> Result<(), InterceptError> {
        self.state = InterceptorState::Break;
        self.recorded_depth = frame.depth;
        self.notify(&Notification::Break);

        let mut last_activity = Instant::now();
        while self.state == InterceptorState::Break {
            match self.session.wait_for_request(self.options.poll_interval) {
                WaitResult::Ready => {
                    last_activity = Instant::now();
                    while let Some(request) = self.session.next_request() {
                        self.process(interpreter, frame, request);
                    }
                }
                WaitResult::Timeout => {
                    let Some(limit) = self.options.pause_timeout else {
                        continue;
                    };
                    if last_activity.elapsed() >= limit {
                        tracing::warn!(?limit, "no controller activity while paused");
                        self.state = InterceptorState::Running;
                        if self.options.on_disconnect == DisconnectPolicy::Abort {
                            self.detach();
                            return Err(InterceptError::Aborted);
                        }
                    }
                }
                WaitResult::Disconnected => {
                    tracing::warn!(policy = ?self.options.on_disconnect, "controller disconnected while paused");
                    self.state = InterceptorState::Running;
                    self.detach();
                    if self.options.on_disconnect == DisconnectPolicy::Abort {
                        return Err(InterceptError::Aborted);
                    }
                    return Ok(());
                }
            }
        }

        self.notify(&Notification::Run);
        Ok(())
    }

    fn process(&mut self, interpreter: &mut dyn Interpreter, frame: &FramePosition, request: Request) {
        tracing::debug!(?request, state = ?self.state, "processing request");
        match request {
            Request::Run => self.state = InterceptorState::Running,
            Request::Pause | Request::StepInto => self.state = InterceptorState::StepInto,
            Request::StepOver => {
                self.state = InterceptorState::StepOver;
                self.recorded_depth = frame.depth;
            }
            Request::StepOut => {
                self.state = InterceptorState::StepOut;
                self.recorded_depth = frame.depth;
            }
            Request::GetSourceCode { path } => {
                let path = if path.is_empty() {
                    frame.script_path.clone()
                } else {
                    path
                };
                let notification = match interpreter.source(&path) {
                    Some(source) => Notification::SourceCode {
                        path,
                        text: source.text,
                        ast: source.ast,
                    },
                    None => {
                        tracing::debug!(%path, "source not available");
                        Notification::SourceCode {
                            path,
                            text: String::new(),
                            ast: serde_json::Value::Object(Default::default()),
                        }
                    }
                };
                self.notify(&notification);
            }
            Request::GetBreakpointList => {
                let entries = self.registry.entries(interpreter);
                self.notify(&Notification::BreakpointList { entries });
            }
            Request::GetCallStack => {
                let frames = interpreter.call_stack();
                self.notify(&Notification::Callstack { frames });
            }
            Request::GetVariables { depth } => {
                let index = match depth {
                    INNERMOST_FRAME => Some(0),
                    depth => usize::try_from(depth).ok(),
                };
                let variables = index
                    .and_then(|index| interpreter.variables(index))
                    .unwrap_or_default();
                self.notify(&Notification::VariableList { depth, variables });
            }
            Request::AddBreakpoint { path, line } => {
                self.registry.add(interpreter, &path, line);
            }
            Request::RemoveBreakpoint { id, path, line } => {
                if id == UNKNOWN_BREAKPOINT_ID {
                    let path = path.unwrap_or_default();
                    self.registry
                        .remove_at(interpreter, &path, line.unwrap_or_default());
                } else {
                    self.registry.remove(interpreter, id);
                }
            }
        }
    }

    fn notify(&mut self, notification: &Notification) {
        if self.detached {
            return;
        }
        if let Err(e) = self.session.send(notification) {
            tracing::warn!(error = %e, kind = notification.kind(), "sending notification");
        }
    }

    fn detach(&mut self) {
        self.detached = true;
        if let Err(e) = self.session.close() {
            tracing::debug!(error = %e, "closing session");
        }
    }

    /// The script completed: say goodbye and close the connection
    #[tracing::instrument(skip(self))]
    pub fn finish(&mut self) -> eyre::Result<()> {
        if self.detached {
            return Ok(());
        }
        self.detached = true;
        self.session.close()
    }
}

impl DebugHook for BreakpointInterceptor {
    fn on_statement(
        &mut self,
        interpreter: &mut dyn Interpreter,
        frame: &FramePosition,
        location: Option<LocationId>,
    ) -> Result<(), InterceptError> {
        self.interrupt(interpreter, frame, location)
    }

    fn on_finished(&mut self) {
        if let Err(e) = self.finish() {
            tracing::warn!(error = %e, "closing debug session");
        }
    }
}
