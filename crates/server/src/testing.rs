//! A tiny scripted interpreter for exercising debug hooks
//!
//! A script is a flat list of [`Step`]s: entering and leaving functions and
//! executing lines. Running it calls the hook before every line with the
//! position and, if one was registered, the breakpoint location of that
//! line.
use std::collections::HashMap;
use std::time::Duration;

use serde_json::Value;
use transport::types::{CallstackFrame, NATIVE_LINE, Variable};

use crate::InterceptError;
use crate::interpreter::{
    BreakpointLocation, DebugHook, FramePosition, Interpreter, LocationId, SourceFile,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Call a script function
    Enter { function: String, path: String },
    /// Call a native function, visible on the stack but never stopped in
    EnterNative { function: String },
    /// Return from the innermost function
    Leave,
    /// Execute the statement at this line of the innermost function
    Line(i64),
    /// Assign a variable in the innermost frame
    Set(Variable),
    /// Simulate slow work between statements
    Wait(Duration),
}

impl Step {
    pub fn enter(function: impl Into<String>, path: impl Into<String>) -> Self {
        Step::Enter {
            function: function.into(),
            path: path.into(),
        }
    }

    pub fn native(function: impl Into<String>) -> Self {
        Step::EnterNative {
            function: function.into(),
        }
    }

    pub fn line(line: i64) -> Self {
        Step::Line(line)
    }

    pub fn set(name: &str, type_name: &str, value: &str) -> Self {
        Step::Set(Variable::scalar(name, type_name, value))
    }
}

#[derive(Debug, Clone)]
struct Frame {
    function: String,
    path: String,
    line: i64,
    variables: Vec<Variable>,
}

#[derive(Debug, Default)]
pub struct ScriptedInterpreter {
    steps: Vec<Step>,
    frames: Vec<Frame>,
    locations: Vec<BreakpointLocation>,
    sources: HashMap<String, SourceFile>,
    executed: Vec<FramePosition>,
}

impl ScriptedInterpreter {
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            steps,
            ..Default::default()
        }
    }

    /// Register an instrumented location, initially disabled
    pub fn with_location(mut self, path: &str, line: i64, function: &str) -> Self {
        self.locations.push(BreakpointLocation {
            script_path: path.to_string(),
            line,
            function_name: function.to_string(),
            enabled: false,
        });
        self
    }

    pub fn with_source(mut self, path: &str, text: &str, ast: Value) -> Self {
        self.sources.insert(
            path.to_string(),
            SourceFile {
                text: text.to_string(),
                ast,
            },
        );
        self
    }

    /// Every statement that ran, in order
    pub fn executed(&self) -> &[FramePosition] {
        &self.executed
    }

    /// Run the whole script, stopping early if the hook asks to
    pub fn run(&mut self, hook: &mut dyn DebugHook) -> Result<(), InterceptError> {
        let steps = std::mem::take(&mut self.steps);
        for step in &steps {
            match step {
                Step::Enter { function, path } => self.frames.push(Frame {
                    function: function.clone(),
                    path: path.clone(),
                    line: 0,
                    variables: Vec::new(),
                }),
                Step::EnterNative { function } => self.frames.push(Frame {
                    function: function.clone(),
                    path: String::new(),
                    line: NATIVE_LINE,
                    variables: Vec::new(),
                }),
                Step::Leave => {
                    self.frames.pop();
                }
                Step::Set(variable) => {
                    if let Some(frame) = self.frames.last_mut() {
                        frame.variables.retain(|v| v.name != variable.name);
                        frame.variables.push(variable.clone());
                    }
                }
                Step::Wait(duration) => std::thread::sleep(*duration),
                Step::Line(line) => self.execute(*line, hook)?,
            }
        }
        hook.on_finished();
        Ok(())
    }

    fn execute(&mut self, line: i64, hook: &mut dyn DebugHook) -> Result<(), InterceptError> {
        let depth = self.frames.len();
        let Some(frame) = self.frames.last_mut() else {
            return Ok(());
        };
        frame.line = line;
        let position = FramePosition {
            depth,
            script_path: frame.path.clone(),
            line,
            function_name: frame.function.clone(),
        };
        let location = self
            .locations
            .iter()
            .position(|l| {
                l.script_path == position.script_path
                    && l.line == line
                    && l.function_name == position.function_name
            })
            .or_else(|| {
                self.locations
                    .iter()
                    .position(|l| l.script_path == position.script_path && l.line == line)
            })
            .map(LocationId);

        let result = hook.on_statement(self, &position, location);
        self.executed.push(position);
        result
    }
}

impl Interpreter for ScriptedInterpreter {
    fn call_stack(&self) -> Vec<CallstackFrame> {
        self.frames
            .iter()
            .rev()
            .map(|frame| CallstackFrame {
                function_name: frame.function.clone(),
                path: frame.path.clone(),
                line: frame.line,
            })
            .collect()
    }

    fn variables(&self, depth: usize) -> Option<Vec<Variable>> {
        let index = self.frames.len().checked_sub(depth + 1)?;
        self.frames.get(index).map(|frame| frame.variables.clone())
    }

    fn source(&self, path: &str) -> Option<SourceFile> {
        self.sources.get(path).cloned()
    }

    fn locations_at(&self, path: &str, line: i64) -> Vec<LocationId> {
        self.locations
            .iter()
            .enumerate()
            .filter(|(_, l)| l.script_path == path && l.line == line)
            .map(|(i, _)| LocationId(i))
            .collect()
    }

    fn location(&self, id: LocationId) -> Option<&BreakpointLocation> {
        self.locations.get(id.0)
    }

    fn set_location_enabled(&mut self, id: LocationId, enabled: bool) {
        if let Some(location) = self.locations.get_mut(id.0) {
            location.enabled = enabled;
        }
    }
}
