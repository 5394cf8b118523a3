//! Requests sent by the controller to the debug server
use serde::{Deserialize, Serialize};

use crate::types::{BreakpointId, UNKNOWN_BREAKPOINT_ID};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Request {
    Pause,
    Run,
    StepInto,
    StepOver,
    StepOut,
    /// An empty path means the script of the current frame
    #[serde(rename = "getsource")]
    GetSourceCode {
        #[serde(default)]
        path: String,
    },
    #[serde(rename = "getbreakpoints")]
    GetBreakpointList,
    GetCallStack,
    /// `depth` indexes the call stack innermost first, -1 is the innermost frame
    GetVariables {
        #[serde(default)]
        depth: i64,
    },
    AddBreakpoint {
        #[serde(default)]
        path: String,
        #[serde(default)]
        line: i64,
    },
    /// When `id` is [`UNKNOWN_BREAKPOINT_ID`] the breakpoint is found by path and line
    RemoveBreakpoint {
        #[serde(default)]
        id: BreakpointId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        path: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        line: Option<i64>,
    },
}

impl Request {
    pub fn remove_breakpoint(id: BreakpointId) -> Self {
        Self::RemoveBreakpoint {
            id,
            path: None,
            line: None,
        }
    }

    pub fn remove_breakpoint_at(path: impl Into<String>, line: i64) -> Self {
        Self::RemoveBreakpoint {
            id: UNKNOWN_BREAKPOINT_ID,
            path: Some(path.into()),
            line: Some(line),
        }
    }

    /// The `type` discriminator this request is sent with
    pub fn kind(&self) -> &'static str {
        match self {
            Request::Pause => "pause",
            Request::Run => "run",
            Request::StepInto => "stepinto",
            Request::StepOver => "stepover",
            Request::StepOut => "stepout",
            Request::GetSourceCode { .. } => "getsource",
            Request::GetBreakpointList => "getbreakpoints",
            Request::GetCallStack => "getcallstack",
            Request::GetVariables { .. } => "getvariables",
            Request::AddBreakpoint { .. } => "addbreakpoint",
            Request::RemoveBreakpoint { .. } => "removebreakpoint",
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::Request;

    #[test]
    fn wire_names() {
        let cases = [
            (Request::Pause, json!({"type": "pause"})),
            (Request::StepInto, json!({"type": "stepinto"})),
            (Request::StepOver, json!({"type": "stepover"})),
            (Request::StepOut, json!({"type": "stepout"})),
            (
                Request::GetSourceCode {
                    path: "a.gnk".to_string(),
                },
                json!({"type": "getsource", "path": "a.gnk"}),
            ),
            (Request::GetBreakpointList, json!({"type": "getbreakpoints"})),
            (Request::GetCallStack, json!({"type": "getcallstack"})),
            (
                Request::GetVariables { depth: -1 },
                json!({"type": "getvariables", "depth": -1}),
            ),
            (
                Request::AddBreakpoint {
                    path: "a.gnk".to_string(),
                    line: 10,
                },
                json!({"type": "addbreakpoint", "path": "a.gnk", "line": 10}),
            ),
            (
                Request::remove_breakpoint(4),
                json!({"type": "removebreakpoint", "id": 4}),
            ),
            (
                Request::remove_breakpoint_at("a.gnk", 10),
                json!({"type": "removebreakpoint", "id": -1, "path": "a.gnk", "line": 10}),
            ),
        ];

        for (request, expected) in cases {
            assert_eq!(serde_json::to_value(&request).unwrap(), expected);
            assert_eq!(request.kind(), expected["type"]);
        }
    }

    #[test]
    fn extra_fields_on_unit_requests_are_ignored() {
        let request: Request =
            serde_json::from_value(json!({"type": "run", "seq": 3})).unwrap();
        assert_eq!(request, Request::Run);
    }
}
