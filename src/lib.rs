//! Debug-engine core for a GDB/MI-driven remote debugger.
//!
//! The crate sits between a debugger frontend and a GDB backend speaking a
//! compact line notation. Backend notifications flow through a background
//! dispatch loop into typed handlers that drive the execution state
//! machine and surface stops through a [`sink::DebugEventSink`]. Frontend
//! commands go through the [`coordinator::Coordinator`], which interrupts
//! a running target around breakpoint mutations and resumes it afterward.
//!
//! ```no_run
//! use gdb_mi_engine::breakpoint::{BreakpointLocation, BreakpointRegistry, BreakpointRequest};
//! use gdb_mi_engine::channel::GdbProcess;
//! use gdb_mi_engine::coordinator::Coordinator;
//! use gdb_mi_engine::dispatch::Dispatcher;
//! use gdb_mi_engine::session::SessionContext;
//! use std::sync::Arc;
//!
//! # fn run(sink: Arc<dyn gdb_mi_engine::sink::DebugEventSink>) -> anyhow::Result<()> {
//! let process = GdbProcess::spawn("gdb", &["--interpreter=mi2"])?;
//! let coordinator = Arc::new(Coordinator::new(
//!     Arc::new(SessionContext::new()),
//!     Arc::new(BreakpointRegistry::new()),
//!     process.channel(),
//!     sink,
//! ));
//! let dispatcher = Dispatcher::spawn(Arc::clone(&coordinator));
//!
//! let request = BreakpointRequest::new(BreakpointLocation::file_line("main.c", "/src/main.c", 68));
//! coordinator.set_breakpoint(request)?;
//! coordinator.continue_execution()?;
//! # dispatcher.join();
//! # Ok(())
//! # }
//! ```

pub mod breakpoint;
pub mod channel;
pub mod commands;
pub mod coordinator;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod handlers;
pub mod session;
pub mod sink;

pub use breakpoint::{
    BoundBreakpoint, BreakpointLocation, BreakpointRegistry, BreakpointRequest, ConditionPolicy,
    PassCount, PassCountStyle,
};
pub use channel::{GdbChannel, GdbProcess, PipeChannel};
pub use coordinator::{Coordinator, StepKind};
pub use dispatch::Dispatcher;
pub use error::{EngineError, Result};
pub use events::{DebugEvent, EventParser};
pub use session::{ExecutionState, SessionContext, TargetIntent, ThreadRecord};
pub use sink::{DebugEventSink, SessionFault};
