//! The boundary between the debugger and the script interpreter
//!
//! The interpreter itself lives elsewhere. It calls a [`DebugHook`] before
//! every instrumented statement and answers introspection queries through
//! [`Interpreter`].
use serde_json::Value;
use transport::types::{CallstackFrame, Variable};

use crate::InterceptError;

/// Identifies one instrumented breakpoint location in compiled code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LocationId(pub usize);

/// A concrete point in compiled code where a breakpoint can trigger
///
/// One source line may compile to several locations, for example when a
/// function is duplicated for different argument types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakpointLocation {
    pub script_path: String,
    /// 0-based
    pub line: i64,
    pub function_name: String,
    pub enabled: bool,
}

/// The statement the interpreter is about to execute
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FramePosition {
    /// Number of frames on the call stack, the outermost frame has depth 1
    pub depth: usize,
    pub script_path: String,
    pub line: i64,
    pub function_name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SourceFile {
    pub text: String,
    pub ast: Value,
}

/// Introspection the interpreter offers while it is suspended
pub trait Interpreter {
    /// The call stack, innermost frame first
    fn call_stack(&self) -> Vec<CallstackFrame>;

    /// Variables of the frame at `depth` (0 is innermost), `None` if there
    /// is no such frame
    fn variables(&self, depth: usize) -> Option<Vec<Variable>>;

    fn source(&self, path: &str) -> Option<SourceFile>;

    /// Every instrumented location compiled from `path` at `line`
    fn locations_at(&self, path: &str, line: i64) -> Vec<LocationId>;

    fn location(&self, id: LocationId) -> Option<&BreakpointLocation>;

    fn set_location_enabled(&mut self, id: LocationId, enabled: bool);
}

/// Suspend point called by the interpreter before each instrumented statement
///
/// The call may block for an arbitrary time while a controller inspects the
/// paused script. An error asks the interpreter to stop running the script.
pub trait DebugHook {
    fn on_statement(
        &mut self,
        interpreter: &mut dyn Interpreter,
        frame: &FramePosition,
        location: Option<LocationId>,
    ) -> Result<(), InterceptError>;

    /// The script ran to completion
    fn on_finished(&mut self) {}
}
