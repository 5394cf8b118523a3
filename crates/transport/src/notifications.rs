//! Notifications sent by the debug server to the controller
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{BreakpointEntry, CallstackFrame, Variable};

fn empty_ast() -> Value {
    Value::Object(Default::default())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Notification {
    /// The interpreter resumed
    Run,
    /// The interpreter is suspended and accepting requests
    Break,
    /// The script finished, the connection is about to close
    Goodbye,
    SourceCode {
        #[serde(default)]
        path: String,
        #[serde(default)]
        text: String,
        #[serde(default = "empty_ast")]
        ast: Value,
    },
    #[serde(rename = "breakpoints")]
    BreakpointList {
        #[serde(rename = "list", default)]
        entries: Vec<BreakpointEntry>,
    },
    Callstack {
        #[serde(rename = "stack", default)]
        frames: Vec<CallstackFrame>,
    },
    #[serde(rename = "variables")]
    VariableList {
        #[serde(default)]
        depth: i64,
        #[serde(default)]
        variables: Vec<Variable>,
    },
}

impl Notification {
    /// The `type` discriminator this notification is sent with
    pub fn kind(&self) -> &'static str {
        match self {
            Notification::Run => "run",
            Notification::Break => "break",
            Notification::Goodbye => "goodbye",
            Notification::SourceCode { .. } => "sourcecode",
            Notification::BreakpointList { .. } => "breakpoints",
            Notification::Callstack { .. } => "callstack",
            Notification::VariableList { .. } => "variables",
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn callstack_wire_format() {
        let notification = Notification::Callstack {
            frames: vec![CallstackFrame {
                function_name: "main".to_string(),
                path: "a.gnk".to_string(),
                line: 3,
            }],
        };

        assert_eq!(
            serde_json::to_value(&notification).unwrap(),
            json!({"type": "callstack", "stack": [{"function": "main", "path": "a.gnk", "line": 3}]})
        );
    }

    #[test]
    fn breakpoints_wire_format() {
        let notification = Notification::BreakpointList {
            entries: vec![BreakpointEntry {
                id: 1,
                line: 10,
                function_name: "main".to_string(),
                path: "a.gnk".to_string(),
            }],
        };

        assert_eq!(
            serde_json::to_value(&notification).unwrap(),
            json!({"type": "breakpoints", "list": [{"id": 1, "line": 10, "function": "main", "path": "a.gnk"}]})
        );
    }

    #[test]
    fn source_without_ast_gets_empty_object() {
        let notification: Notification =
            serde_json::from_value(json!({"type": "sourcecode", "path": "a.gnk"})).unwrap();

        assert_eq!(
            notification,
            Notification::SourceCode {
                path: "a.gnk".to_string(),
                text: String::new(),
                ast: json!({}),
            }
        );
    }
}
