//! End to end tests of the interceptor against a scripted interpreter
//!
//! The tests play the controller by hand, sending requests and checking
//! the notifications the interceptor answers with.
use std::thread::{self, JoinHandle};
use std::time::Duration;

use config::{DisconnectPolicy, ServerConfig};
use serde::{Deserialize, Serialize};
use serde_json::json;
use server::testing::{ScriptedInterpreter, Step};
use server::{
    BreakpointInterceptor, DebugListener, DebugSession, InterceptError, InterceptorOptions,
    InterceptorState,
};
use transport::types::{BreakpointEntry, CallstackFrame, Variable};
use transport::{
    DebugTransport, DecodeMode, InMemoryTransport, MessageReader, MessageWriter, Notification,
    PollResult, Request, TcpTransport, WireMessage, bindings::get_random_tcp_port,
};

const TIMEOUT: Duration = Duration::from_secs(5);

#[ctor::ctor]
fn init() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();

    // error traces
    let _ = color_eyre::install();
}

struct Controller {
    reader: MessageReader,
    writer: MessageWriter,
}

impl Controller {
    fn new(transport: impl DebugTransport) -> Self {
        let (reader, writer) = transport::connect(transport).unwrap();
        Self { reader, writer }
    }

    fn send(&mut self, request: Request) {
        self.writer.send(&request).unwrap();
    }

    fn expect(&mut self) -> Notification {
        match self.reader.next_message(TIMEOUT, DecodeMode::Strict) {
            PollResult::Message(notification) => notification,
            other => panic!("expected a notification, got {other:?}"),
        }
    }

    fn expect_closed(&mut self) {
        assert_eq!(
            self.reader.next_message::<Notification>(TIMEOUT, DecodeMode::Strict),
            PollResult::Closed
        );
    }

    fn callstack(&mut self) -> Vec<CallstackFrame> {
        self.send(Request::GetCallStack);
        match self.expect() {
            Notification::Callstack { frames } => frames,
            other => panic!("expected callstack, got {other:?}"),
        }
    }

    fn current_line(&mut self) -> i64 {
        self.callstack()[0].line
    }

    fn breakpoints(&mut self) -> Vec<BreakpointEntry> {
        self.send(Request::GetBreakpointList);
        match self.expect() {
            Notification::BreakpointList { entries } => entries,
            other => panic!("expected breakpoints, got {other:?}"),
        }
    }

    /// Resume and wait for the interceptor to confirm
    fn resume(&mut self, request: Request) {
        self.send(request);
        assert_eq!(self.expect(), Notification::Run);
    }
}

type Outcome = (
    ScriptedInterpreter,
    BreakpointInterceptor,
    Result<(), InterceptError>,
);

fn spawn_script(
    mut interpreter: ScriptedInterpreter,
    session: DebugSession,
    options: InterceptorOptions,
) -> JoinHandle<Outcome> {
    thread::spawn(move || {
        let mut interceptor = BreakpointInterceptor::new(session, options);
        let result = interpreter.run(&mut interceptor);
        (interpreter, interceptor, result)
    })
}

fn start(interpreter: ScriptedInterpreter, options: InterceptorOptions) -> (Controller, JoinHandle<Outcome>) {
    let (controller, server) = InMemoryTransport::pair();
    let session = DebugSession::with_transport(server, DecodeMode::Permissive).unwrap();
    (
        Controller::new(controller),
        spawn_script(interpreter, session, options),
    )
}

fn main_only() -> ScriptedInterpreter {
    ScriptedInterpreter::new(vec![
        Step::enter("main", "a.gnk"),
        Step::line(3),
        Step::line(4),
        Step::Leave,
    ])
}

/// main calls helper on line 2, helper runs lines 10 and 11
fn nested() -> ScriptedInterpreter {
    ScriptedInterpreter::new(vec![
        Step::enter("main", "a.gnk"),
        Step::line(1),
        Step::line(2),
        Step::enter("helper", "a.gnk"),
        Step::line(10),
        Step::line(11),
        Step::Leave,
        Step::line(3),
        Step::Leave,
    ])
    .with_location("a.gnk", 1, "main")
    .with_location("a.gnk", 10, "helper")
}

#[test]
fn test_scenario_wire_format() {
    let (mut controller, handle) = start(main_only(), InterceptorOptions::default());

    assert_eq!(
        controller.reader.next_timeout(TIMEOUT),
        PollResult::Message(json!({"type": "break"}))
    );
    controller.send(Request::GetCallStack);
    assert_eq!(
        controller.reader.next_timeout(TIMEOUT),
        PollResult::Message(json!({
            "type": "callstack",
            "stack": [{"function": "main", "path": "a.gnk", "line": 3}],
        }))
    );
    controller.send(Request::Run);
    assert_eq!(
        controller.reader.next_timeout(TIMEOUT),
        PollResult::Message(json!({"type": "run"}))
    );
    assert_eq!(
        controller.reader.next_timeout(TIMEOUT),
        PollResult::Message(json!({"type": "goodbye"}))
    );
    assert_eq!(controller.reader.next_timeout(TIMEOUT), PollResult::Closed);

    let (interpreter, _, result) = handle.join().unwrap();
    result.unwrap();
    let lines: Vec<_> = interpreter.executed().iter().map(|p| p.line).collect();
    assert_eq!(lines, vec![3, 4]);
}

#[test]
fn test_scenario_over_tcp() -> eyre::Result<()> {
    let config = ServerConfig {
        port: get_random_tcp_port()?,
        ..Default::default()
    };
    let listener = DebugListener::bind(&config)?;
    let addr = listener.local_addr()?;

    let handle = thread::spawn(move || {
        let session = listener.accept().unwrap();
        let mut interceptor = BreakpointInterceptor::new(session, InterceptorOptions::from(&config));
        let mut interpreter = main_only();
        let result = interpreter.run(&mut interceptor);
        (interpreter, interceptor, result)
    });

    let mut controller = Controller::new(TcpTransport::connect(addr)?);
    assert_eq!(controller.expect(), Notification::Break);
    assert_eq!(
        controller.callstack(),
        vec![CallstackFrame {
            function_name: "main".to_string(),
            path: "a.gnk".to_string(),
            line: 3,
        }]
    );
    controller.resume(Request::Run);
    assert_eq!(controller.expect(), Notification::Goodbye);
    controller.expect_closed();

    let (_, interceptor, result) = handle.join().unwrap();
    result?;
    assert!(interceptor.is_detached());
    Ok(())
}

#[test]
fn test_step_over_skips_deeper_frames() {
    let (mut controller, handle) = start(nested(), InterceptorOptions::default());

    assert_eq!(controller.expect(), Notification::Break);
    assert_eq!(controller.current_line(), 1);

    controller.resume(Request::StepOver);
    assert_eq!(controller.expect(), Notification::Break);
    assert_eq!(controller.current_line(), 2);

    // lines 10 and 11 run one frame deeper
    controller.resume(Request::StepOver);
    assert_eq!(controller.expect(), Notification::Break);
    assert_eq!(controller.current_line(), 3);

    controller.resume(Request::Run);
    assert_eq!(controller.expect(), Notification::Goodbye);

    let (interpreter, _, result) = handle.join().unwrap();
    result.unwrap();
    assert_eq!(interpreter.executed().len(), 5);
}

#[test]
fn test_step_into_then_step_out() {
    let (mut controller, handle) = start(nested(), InterceptorOptions::default());

    assert_eq!(controller.expect(), Notification::Break);
    controller.resume(Request::StepInto);
    assert_eq!(controller.expect(), Notification::Break);
    controller.resume(Request::StepInto);
    assert_eq!(controller.expect(), Notification::Break);

    let stack = controller.callstack();
    assert_eq!(stack.len(), 2);
    assert_eq!(stack[0].function_name, "helper");
    assert_eq!(stack[0].line, 10);
    assert_eq!(stack[1].function_name, "main");
    assert_eq!(stack[1].line, 2);

    // line 11 is still inside helper
    controller.resume(Request::StepOut);
    assert_eq!(controller.expect(), Notification::Break);
    assert_eq!(controller.current_line(), 3);

    controller.resume(Request::Run);
    assert_eq!(controller.expect(), Notification::Goodbye);
    handle.join().unwrap().2.unwrap();
}

#[test]
fn test_breakpoint_toggling() {
    let (mut controller, handle) = start(nested(), InterceptorOptions::default());
    assert_eq!(controller.expect(), Notification::Break);

    controller.send(Request::AddBreakpoint {
        path: "a.gnk".to_string(),
        line: 10,
    });
    let entries = controller.breakpoints();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].line, 10);
    assert_eq!(entries[0].function_name, "helper");
    assert_eq!(entries[0].path, "a.gnk");

    controller.send(Request::remove_breakpoint(entries[0].id));
    assert!(controller.breakpoints().is_empty());

    // no instrumented location on line 7
    controller.send(Request::AddBreakpoint {
        path: "a.gnk".to_string(),
        line: 7,
    });
    assert!(controller.breakpoints().is_empty());

    controller.resume(Request::Run);
    assert_eq!(controller.expect(), Notification::Goodbye);
    let (_, interceptor, result) = handle.join().unwrap();
    result.unwrap();
    assert!(interceptor.breakpoints().is_empty());
}

#[test]
fn test_running_stops_at_breakpoint() {
    let (mut controller, handle) = start(nested(), InterceptorOptions::default());
    assert_eq!(controller.expect(), Notification::Break);

    controller.send(Request::AddBreakpoint {
        path: "a.gnk".to_string(),
        line: 10,
    });
    assert_eq!(controller.breakpoints()[0].id, 1);
    controller.resume(Request::Run);

    assert_eq!(controller.expect(), Notification::Break);
    assert_eq!(controller.current_line(), 10);

    controller.send(Request::remove_breakpoint_at("a.gnk", 10));
    assert!(controller.breakpoints().is_empty());
    controller.resume(Request::Run);
    assert_eq!(controller.expect(), Notification::Goodbye);
    handle.join().unwrap().2.unwrap();
}

#[test]
fn test_pause_while_running() {
    let mut steps = vec![Step::enter("main", "a.gnk")];
    for line in 0..200 {
        steps.push(Step::line(line));
        steps.push(Step::Wait(Duration::from_millis(5)));
    }
    steps.push(Step::Leave);
    let options = InterceptorOptions {
        initial_state: InterceptorState::Running,
        ..Default::default()
    };
    let (mut controller, handle) = start(ScriptedInterpreter::new(steps), options);

    controller.send(Request::Pause);
    assert_eq!(controller.expect(), Notification::Break);
    let paused_at = controller.current_line();
    assert!((0..200).contains(&paused_at));

    controller.resume(Request::Run);
    assert_eq!(controller.expect(), Notification::Goodbye);
    let (interpreter, _, result) = handle.join().unwrap();
    result.unwrap();
    assert_eq!(interpreter.executed().len(), 200);
}

/// A request from a newer controller this server has never heard of
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum NewerRequest {
    Evaluate { expression: String },
}

impl WireMessage for NewerRequest {
    const KINDS: &'static [&'static str] = &["evaluate"];

    fn fallback() -> Option<Self> {
        None
    }

    fn kind_name(&self) -> &'static str {
        "evaluate"
    }
}

#[test]
fn test_unknown_request_resumes() {
    let (mut controller, handle) = start(main_only(), InterceptorOptions::default());
    assert_eq!(controller.expect(), Notification::Break);

    controller
        .writer
        .send(&NewerRequest::Evaluate {
            expression: "1 + 1".to_string(),
        })
        .unwrap();
    assert_eq!(controller.expect(), Notification::Run);
    assert_eq!(controller.expect(), Notification::Goodbye);
    handle.join().unwrap().2.unwrap();
}

#[test]
fn test_variables_and_source() {
    let interpreter = ScriptedInterpreter::new(vec![
        Step::enter("main", "a.gnk"),
        Step::set("count", "int", "3"),
        Step::line(1),
        Step::native("map"),
        Step::enter("callback", "lib/b.gnk"),
        Step::Set(
            Variable::scalar("pos", "Vec2", "").with_members(vec![
                Variable::scalar("x", "float", "1.5").with_offset(0),
                Variable::scalar("y", "float", "2").with_offset(4),
            ]),
        ),
        Step::line(5),
        Step::Leave,
        Step::Leave,
        Step::Leave,
    ])
    .with_location("lib/b.gnk", 5, "callback")
    .with_source("lib/b.gnk", "fn callback(pos) {}\n", json!({"kind": "module"}));
    let (mut controller, handle) = start(interpreter, InterceptorOptions::default());
    assert_eq!(controller.expect(), Notification::Break);

    controller.send(Request::AddBreakpoint {
        path: "lib/b.gnk".to_string(),
        line: 5,
    });
    assert_eq!(controller.breakpoints().len(), 1);
    controller.resume(Request::Run);
    assert_eq!(controller.expect(), Notification::Break);

    let stack = controller.callstack();
    let functions: Vec<_> = stack.iter().map(|f| f.function_name.as_str()).collect();
    assert_eq!(functions, vec!["callback", "map", "main"]);
    assert!(stack[1].is_native());

    let cases = [
        (0, vec!["pos"]),
        (-1, vec!["pos"]),
        (2, vec!["count"]),
        (1, vec![]),
        (9, vec![]),
        (-5, vec![]),
    ];
    for (depth, expected) in cases {
        controller.send(Request::GetVariables { depth });
        match controller.expect() {
            Notification::VariableList { depth: echoed, variables } => {
                assert_eq!(echoed, depth);
                let names: Vec<_> = variables.iter().map(|v| v.name.as_str()).collect();
                assert_eq!(names, expected);
            }
            other => panic!("expected variables, got {other:?}"),
        }
    }

    controller.send(Request::GetSourceCode {
        path: String::new(),
    });
    assert_eq!(
        controller.expect(),
        Notification::SourceCode {
            path: "lib/b.gnk".to_string(),
            text: "fn callback(pos) {}\n".to_string(),
            ast: json!({"kind": "module"}),
        }
    );
    controller.send(Request::GetSourceCode {
        path: "missing.gnk".to_string(),
    });
    assert_eq!(
        controller.expect(),
        Notification::SourceCode {
            path: "missing.gnk".to_string(),
            text: String::new(),
            ast: json!({}),
        }
    );

    controller.resume(Request::Run);
    assert_eq!(controller.expect(), Notification::Goodbye);
    handle.join().unwrap().2.unwrap();
}

#[test]
fn test_disconnect_while_paused_resumes() {
    let (mut controller, handle) = start(nested(), InterceptorOptions::default());
    assert_eq!(controller.expect(), Notification::Break);
    drop(controller);

    let (interpreter, interceptor, result) = handle.join().unwrap();
    result.unwrap();
    assert!(interceptor.is_detached());
    assert_eq!(interceptor.state(), InterceptorState::Running);
    assert_eq!(interpreter.executed().len(), 5);
}

#[test]
fn test_disconnect_while_paused_aborts() {
    let options = InterceptorOptions {
        on_disconnect: DisconnectPolicy::Abort,
        ..Default::default()
    };
    let (mut controller, handle) = start(nested(), options);
    assert_eq!(controller.expect(), Notification::Break);
    drop(controller);

    let (interpreter, _, result) = handle.join().unwrap();
    assert!(matches!(result, Err(InterceptError::Aborted)));
    assert_eq!(interpreter.executed().len(), 1);
}

#[test]
fn test_pause_timeout_resumes() {
    let options = InterceptorOptions {
        poll_interval: Duration::from_millis(10),
        pause_timeout: Some(Duration::from_millis(100)),
        ..Default::default()
    };
    let (mut controller, handle) = start(main_only(), options);

    assert_eq!(controller.expect(), Notification::Break);
    // nobody answers, the interceptor gives up on its own
    assert_eq!(controller.expect(), Notification::Run);
    assert_eq!(controller.expect(), Notification::Goodbye);
    controller.expect_closed();
    handle.join().unwrap().2.unwrap();
}

#[test]
fn test_pause_timeout_aborts() {
    let options = InterceptorOptions {
        poll_interval: Duration::from_millis(10),
        pause_timeout: Some(Duration::from_millis(100)),
        on_disconnect: DisconnectPolicy::Abort,
        ..Default::default()
    };
    let (mut controller, handle) = start(main_only(), options);

    assert_eq!(controller.expect(), Notification::Break);
    assert_eq!(controller.expect(), Notification::Goodbye);
    controller.expect_closed();
    let (_, _, result) = handle.join().unwrap();
    assert!(matches!(result, Err(InterceptError::Aborted)));
}

#[test]
fn test_pause_timeout_counts_from_last_request() {
    let options = InterceptorOptions {
        poll_interval: Duration::from_millis(10),
        pause_timeout: Some(Duration::from_millis(200)),
        ..Default::default()
    };
    let (mut controller, handle) = start(main_only(), options);
    assert_eq!(controller.expect(), Notification::Break);

    // keep inspecting for well past the timeout
    let started = std::time::Instant::now();
    while started.elapsed() < Duration::from_millis(600) {
        assert_eq!(controller.current_line(), 3);
        thread::sleep(Duration::from_millis(40));
    }

    controller.resume(Request::StepInto);
    assert_eq!(controller.expect(), Notification::Break);
    assert_eq!(controller.current_line(), 4);
    controller.resume(Request::Run);
    assert_eq!(controller.expect(), Notification::Goodbye);
    handle.join().unwrap().2.unwrap();
}
