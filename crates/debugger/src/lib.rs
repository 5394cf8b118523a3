//! Controller side of the gnk script debugger
//!
//! A [`ControllerClient`] connects to the debug server embedded in the
//! interpreter, mirrors its run/pause state as a [`ConnectionState`] and
//! publishes everything it learns as [`Event`]s.
mod controller;
mod internals;
pub mod state;

pub use controller::ControllerClient;
pub use state::{ConnectionState, Event};
