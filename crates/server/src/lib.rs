//! Debug server embedded in the gnk script interpreter
//!
//! The interpreter owns a [`BreakpointInterceptor`] and calls it, through
//! the [`DebugHook`] trait, before each instrumented statement. The
//! interceptor talks to exactly one remote controller over a
//! [`DebugSession`].
//!
//! ```no_run
//! # fn run_script(hook: &mut dyn server::DebugHook) {}
//! let config = config::Config::load()?;
//! let mut hook = server::attach(&config.server)?;
//! run_script(&mut hook);
//! hook.finish()?;
//! # Ok::<(), eyre::Error>(())
//! ```
pub mod breakpoints;
pub mod interceptor;
pub mod interpreter;
pub mod session;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use breakpoints::{BreakpointRecord, BreakpointRegistry};
pub use interceptor::{BreakpointInterceptor, InterceptError, InterceptorOptions, InterceptorState};
pub use interpreter::{
    BreakpointLocation, DebugHook, FramePosition, Interpreter, LocationId, SourceFile,
};
pub use session::{DebugListener, DebugSession, WaitResult};

/// Listen on the configured port and wait for the controller to connect
pub fn attach(config: &config::ServerConfig) -> eyre::Result<BreakpointInterceptor> {
    let session = DebugListener::bind(config)?.accept()?;
    Ok(BreakpointInterceptor::new(
        session,
        InterceptorOptions::from(config),
    ))
}
