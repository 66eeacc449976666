//! Process and execution-control events: thread lifecycle, stops, steps,
//! exits, and the fatal backend conditions that end the session.

use crate::coordinator::{Coordinator, StepKind};
use crate::events::{ExecutionEvent, StopSite};
use crate::session::{ExecutionState, TargetIntent, ThreadRecord};
use crate::sink::SessionFault;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Backend message marking a step attempt in code without symbols.
const NO_FUNCTION_BOUNDS: &str = "Cannot find bounds of current function";

pub struct ExecutionHandler {
    coordinator: Arc<Coordinator>,
}

impl ExecutionHandler {
    pub fn new(coordinator: Arc<Coordinator>) -> Self {
        Self { coordinator }
    }

    pub fn handle(&self, event: ExecutionEvent) {
        let session = self.coordinator.session();
        match event {
            ExecutionEvent::ThreadCreated { thread_id, .. } => {
                session.set_gdb_run_mode(true);
                session.insert_thread(ThreadRecord::new(thread_id));
                session.mark_threads_stale();
                self.coordinator.sink().on_thread_start(thread_id);
            }
            ExecutionEvent::Running { .. } => {
                session.set_gdb_run_mode(true);
            }
            ExecutionEvent::ExitedNormally => {
                info!("target exited normally");
                self.coordinator.end_debug_session(0);
            }
            ExecutionEvent::ExitedWithCode { code } => {
                info!("target exited with code {code}");
                self.coordinator.end_debug_session(code);
            }
            ExecutionEvent::Killed => {
                self.coordinator.end_debug_session(0);
            }
            ExecutionEvent::Interrupted(site) => {
                self.on_stop(&site, site.in_unknown_code());
                self.on_interrupt(&site);
                session.signal_interrupt();
            }
            ExecutionEvent::SteppingRangeEnded(site)
            | ExecutionEvent::FunctionFinished(site) => {
                self.on_stop(&site, site.file.is_none());
                step_completed(
                    &self.coordinator,
                    site.file.as_deref(),
                    site.line,
                );
            }
            ExecutionEvent::InterruptDone { thread_id } => {
                session.set_gdb_run_mode(false);
                if session.execution_state() != ExecutionState::BreakMode {
                    self.on_interrupt(&StopSite {
                        thread_id: Some(thread_id),
                        ..Default::default()
                    });
                }
                session.signal_interrupt();
            }
            ExecutionEvent::StepError { message } => {
                warn!("step failed: {message}");
                if message == NO_FUNCTION_BOUNDS {
                    // No symbols here; stepping further in is impossible.
                    // Return out of the frame instead.
                    session.set_unknown_code(true);
                    if let Err(err) = self.coordinator.step(StepKind::Out) {
                        warn!("step-out fallback failed: {err}");
                    }
                }
            }
            ExecutionEvent::QuitSignal => {
                let count = session.bump_sigint();
                debug!("quit-signal tick {count}");
                if count >= 5 && self.coordinator.end_debug_session(0) {
                    self.coordinator
                        .sink()
                        .on_session_fault(&SessionFault::SignalStorm);
                }
            }
            ExecutionEvent::ThreadExited { thread_id } => {
                session.remove_thread(thread_id);
                session.mark_threads_stale();
                self.coordinator.sink().on_thread_exit(thread_id);
            }
            ExecutionEvent::BackendAssertion { detail } => {
                if self.coordinator.end_debug_session(1) {
                    self.coordinator
                        .sink()
                        .on_session_fault(&SessionFault::BackendCrash { detail });
                }
            }
            ExecutionEvent::CommunicationLost => {
                if self.coordinator.end_debug_session(1) {
                    self.coordinator
                        .sink()
                        .on_session_fault(&SessionFault::CommunicationLost);
                }
            }
            ExecutionEvent::SegmentationFault(site) => {
                // The target survives the fault suspended; the session
                // stays up for post-mortem inspection.
                self.coordinator
                    .sink()
                    .on_session_fault(&SessionFault::SegmentationFault { fatal: false });
                self.on_stop(&site, site.in_unknown_code());
                self.on_interrupt(&site);
            }
            ExecutionEvent::ExitedSignalled {
                signal, meaning, ..
            } => {
                info!("target exited on {signal} ({meaning})");
                let fatal_segv = meaning.contains("Segmentation fault");
                if self.coordinator.end_debug_session(1) && fatal_segv {
                    self.coordinator
                        .sink()
                        .on_session_fault(&SessionFault::SegmentationFault { fatal: true });
                }
            }
        }
    }

    /// Common bookkeeping for any confirmed stop.
    fn on_stop(&self, site: &StopSite, unknown_code: bool) {
        let session = self.coordinator.session();
        self.coordinator.clear_eval_cache();
        session.set_gdb_run_mode(false);
        session.set_unknown_code(unknown_code);

        if session.take_threads_stale() {
            self.coordinator.refresh_threads();
        }
        if let Some(thread_id) = site.thread_id {
            if thread_id > 0 {
                if !unknown_code && site.file.is_some() {
                    session.update_thread_location(thread_id, site.file.clone(), site.line);
                }
                session.set_current_thread(thread_id);
            }
        }
    }

    /// The target suspended outside a breakpoint or step. When the
    /// suspension is transient (a breakpoint edit asked for it) nothing
    /// surfaces; otherwise the frontend hears the break-all completion.
    fn on_interrupt(&self, site: &StopSite) {
        let session = self.coordinator.session();
        let pending_resume = session.target_intent() == TargetIntent::RunningPendingResume;
        session.set_execution_state(ExecutionState::BreakMode);
        if !pending_resume {
            session.set_target_intent(TargetIntent::Stopped);
            let thread = site.thread_id.and_then(|id| session.thread(id));
            self.coordinator
                .sink()
                .on_async_break_complete(thread.as_ref());
        }
    }
}

/// A stop arrived that could complete a step. Only an armed step turns it
/// into a step completion; anything else (a stray stepping-range stop when
/// no step is in flight) changes nothing.
pub(crate) fn step_completed(coordinator: &Arc<Coordinator>, file: Option<&str>, line: Option<u32>) {
    let session = coordinator.session();
    if session.execution_state() != ExecutionState::StepMode {
        debug!("stop without an armed step, ignoring");
        return;
    }
    session.set_execution_state(ExecutionState::BreakMode);
    session.set_target_intent(TargetIntent::Stopped);
    coordinator.sink().on_step_complete(file, line);
}
