//! Callback boundary toward the frontend.
//!
//! The engine never talks to a UI directly; everything the frontend needs
//! to hear arrives through [`DebugEventSink`]. Implementations must be
//! cheap and non-blocking, since most callbacks fire on the dispatch
//! thread.

use crate::breakpoint::BoundBreakpoint;
use crate::session::ThreadRecord;
use std::fmt;
use std::sync::Arc;

/// Session-level faults the frontend should surface to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionFault {
    /// The command channel to the backend broke.
    CommunicationLost,
    /// The backend reported an internal assertion.
    BackendCrash { detail: String },
    /// Repeated quit signals with no intervening activity.
    SignalStorm,
    /// The target hit a segmentation fault. Fatal when the target already
    /// exited because of it.
    SegmentationFault { fatal: bool },
}

impl fmt::Display for SessionFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionFault::CommunicationLost => {
                write!(f, "Lost communication with the debugger backend. Debugging has stopped.")
            }
            SessionFault::BackendCrash { detail } => {
                write!(f, "The debugger backend failed: {detail}. Debugging has stopped.")
            }
            SessionFault::SignalStorm => {
                write!(f, "The debugged program is being flooded with quit signals. Debugging has stopped.")
            }
            SessionFault::SegmentationFault { fatal: true } => {
                write!(f, "The program exited after a segmentation fault.")
            }
            SessionFault::SegmentationFault { fatal: false } => {
                write!(f, "Segmentation fault. The program is suspended at the faulting location.")
            }
        }
    }
}

/// Receives engine events. Default no-op bodies are provided for the
/// notifications a minimal frontend can ignore.
pub trait DebugEventSink: Send + Sync {
    /// A breakpoint request was accepted and bound by the backend.
    fn on_breakpoint_bound(&self, _breakpoint: &Arc<BoundBreakpoint>) {}

    /// Execution suspended at one or more breakpoints.
    fn on_breakpoint(&self, thread: Option<&ThreadRecord>, hits: &[Arc<BoundBreakpoint>]);

    /// An asynchronous break requested by the frontend completed.
    fn on_async_break_complete(&self, thread: Option<&ThreadRecord>);

    /// A step operation completed.
    fn on_step_complete(&self, file: Option<&str>, line: Option<u32>);

    /// A target thread was created.
    fn on_thread_start(&self, thread_id: i64);

    /// A target thread exited.
    fn on_thread_exit(&self, thread_id: i64);

    /// The target process is gone and the session is over.
    fn on_program_destroy(&self, exit_code: u32);

    /// Console or target output text.
    fn on_output(&self, text: &str);

    /// A module was loaded into the target.
    fn on_module_load(&self, _name: &str) {}

    /// A session-level fault. Fired at most once per fault condition.
    fn on_session_fault(&self, fault: &SessionFault);
}
