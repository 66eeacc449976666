//! Per-category event handlers invoked by the dispatch loop.

pub mod breakpoint;
pub mod execution;
pub mod output;

pub use breakpoint::BreakpointHandler;
pub use execution::ExecutionHandler;
pub use output::OutputHandler;
