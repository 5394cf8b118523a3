//! Conversion between framed JSON values and typed messages
//!
//! Every message is a JSON object whose `"type"` string selects the
//! variant. Decoding is structural: fields the variant does not define are
//! ignored and missing ones take their zero value.
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;

use crate::{Notification, Request};

/// How to treat a `"type"` nobody knows about
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DecodeMode {
    /// Fall back to the message's default variant where it has one
    #[default]
    Permissive,
    /// Reject the message
    Strict,
}

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// The value is not an object, or has no string `"type"` field and
    /// nothing to fall back to
    #[error("message has no type field")]
    MissingType,

    #[error("unknown message type {0:?}")]
    UnknownType(String),

    /// A known message carried a field of the wrong shape
    #[error("invalid {kind} message: {source}")]
    Invalid {
        kind: String,
        #[source]
        source: serde_json::Error,
    },
}

/// A message that travels as a `"type"`-tagged JSON object
pub trait WireMessage: Serialize + DeserializeOwned + std::fmt::Debug {
    /// Every discriminator the message type understands
    const KINDS: &'static [&'static str];

    /// What a permissive decoder produces for an unknown discriminator
    fn fallback() -> Option<Self>;

    /// The discriminator this message is sent with
    fn kind_name(&self) -> &'static str;

    fn decode(value: Value, mode: DecodeMode) -> Result<Self, DecodeError> {
        if !value.is_object() {
            return Err(DecodeError::MissingType);
        }

        // a missing or non-string discriminator counts as unknown
        let kind = value.get("type").and_then(Value::as_str).map(str::to_owned);
        match kind {
            Some(kind) if Self::KINDS.contains(&kind.as_str()) => serde_json::from_value(value)
                .map_err(|source| DecodeError::Invalid { kind, source }),
            kind => match (mode, Self::fallback()) {
                (DecodeMode::Permissive, Some(fallback)) => {
                    tracing::warn!(?kind, ?fallback, "unknown message type, using fallback");
                    Ok(fallback)
                }
                _ => Err(kind.map_or(DecodeError::MissingType, DecodeError::UnknownType)),
            },
        }
    }

    fn encode(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }
}

impl WireMessage for Request {
    const KINDS: &'static [&'static str] = &[
        "pause",
        "run",
        "stepinto",
        "stepover",
        "stepout",
        "getsource",
        "getbreakpoints",
        "getcallstack",
        "getvariables",
        "addbreakpoint",
        "removebreakpoint",
    ];

    // Existing controllers rely on unknown requests resuming the script.
    fn fallback() -> Option<Self> {
        Some(Request::Run)
    }

    fn kind_name(&self) -> &'static str {
        self.kind()
    }
}

impl WireMessage for Notification {
    const KINDS: &'static [&'static str] = &[
        "run",
        "break",
        "goodbye",
        "sourcecode",
        "breakpoints",
        "callstack",
        "variables",
    ];

    fn fallback() -> Option<Self> {
        None
    }

    fn kind_name(&self) -> &'static str {
        self.kind()
    }
}
