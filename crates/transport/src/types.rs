//! Payload types shared by requests and notifications
use serde::{Deserialize, Serialize};

/// Server assigned breakpoint identifier
pub type BreakpointId = i64;

/// Sentinel id asking the server to find a breakpoint by path and line
pub const UNKNOWN_BREAKPOINT_ID: BreakpointId = -1;

/// Line number reported for native frames that have no script source
pub const NATIVE_LINE: i64 = -1;

/// `GetVariables` depth naming the innermost frame
pub const INNERMOST_FRAME: i64 = -1;

/// One entry of a `breakpoints` notification
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakpointEntry {
    pub id: BreakpointId,
    pub line: i64,
    #[serde(rename = "function")]
    pub function_name: String,
    pub path: String,
}

/// One frame of a `callstack` notification
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CallstackFrame {
    #[serde(rename = "function")]
    pub function_name: String,
    pub path: String,
    pub line: i64,
}

impl CallstackFrame {
    /// Native frames cannot be selected or stepped through
    pub fn is_native(&self) -> bool {
        self.line == NATIVE_LINE
    }
}

/// A variable and, for structs and objects, its members
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Variable {
    pub offset: i64,
    #[serde(rename = "type")]
    pub type_name: String,
    pub name: String,
    pub value: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub members: Vec<Variable>,
}

impl Default for Variable {
    fn default() -> Self {
        Self {
            offset: -1,
            type_name: String::new(),
            name: String::new(),
            value: String::new(),
            members: Vec::new(),
        }
    }
}

impl Variable {
    pub fn scalar(
        name: impl Into<String>,
        type_name: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            value: value.into(),
            ..Default::default()
        }
    }

    pub fn with_offset(mut self, offset: i64) -> Self {
        self.offset = offset;
        self
    }

    pub fn with_members(mut self, members: Vec<Variable>) -> Self {
        self.members = members;
        self
    }
}
