//! gnk debugger wire protocol
//!
//! This crate contains everything both ends of a debugger connection share:
//! the incremental JSON framer, the typed request/notification schema and
//! the transports that carry the bytes.
pub mod bindings;
pub mod codec;
mod connection;
pub mod framer;
pub mod io;
pub mod notifications;
pub mod requests;
pub mod types;

pub use codec::{DecodeError, DecodeMode, WireMessage};
pub use connection::{MessageReader, MessageWriter, PollResult, connect};
pub use framer::StreamFramer;
pub use io::{DebugTransport, InMemoryTransport, TcpTransport};
pub use notifications::Notification;
pub use requests::Request;

/// The default port the debug server listens on
pub const DEFAULT_DEBUG_PORT: u16 = 24242;

/// The debug server only ever binds the loopback interface
pub const DEFAULT_DEBUG_HOST: &str = "127.0.0.1";
