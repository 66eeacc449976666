//! Breakpoint-category events, chiefly the hit decision procedure.
//!
//! A hit notification does not automatically surface to the frontend. The
//! handler arbitrates per-breakpoint block flags against concurrent edits,
//! evaluates condition-changed policies, and either reports the stop or
//! silently resumes the target.

use crate::breakpoint::{BoundBreakpoint, BreakpointState, PassCountStyle};
use crate::coordinator::Coordinator;
use crate::events::BreakpointEvent;
use crate::handlers::execution;
use crate::session::{ExecutionState, TargetIntent};
use std::sync::Arc;
use tracing::{debug, warn};

pub struct BreakpointHandler {
    coordinator: Arc<Coordinator>,
}

impl BreakpointHandler {
    pub fn new(coordinator: Arc<Coordinator>) -> Self {
        Self { coordinator }
    }

    pub fn handle(&self, event: BreakpointEvent) {
        match event {
            BreakpointEvent::Modified(info) => {
                if let Some(bp) = self.coordinator.breakpoints().find(info.id) {
                    bp.update(|s| {
                        // Condition-changed breakpoints count their own
                        // qualifying hits; the backend's total is noise.
                        if !s.break_when_cond_changed {
                            s.hit_count = info.hits;
                        }
                    });
                }
            }
            BreakpointEvent::Hit {
                id,
                file,
                line,
                thread_id,
            } => self.on_hit(id, file, line, thread_id),
            BreakpointEvent::TemporaryDeleted { id } => {
                self.coordinator.breakpoints().remove(id);
            }
            // Lifecycle confirmations are consumed synchronously by the
            // command that caused them; one leaking here means its command
            // timed out first.
            other => debug!("unconsumed breakpoint confirmation: {:?}", other),
        }
    }

    /// The target stopped on a breakpoint.
    fn on_hit(&self, id: u32, file: String, line: u32, thread_id: i64) {
        let session = self.coordinator.session();
        self.coordinator.clear_eval_cache();
        session.set_gdb_run_mode(false);
        session.set_unknown_code(false);

        if session.take_threads_stale() {
            self.coordinator.refresh_threads();
        }
        session.update_thread_location(thread_id, Some(file.clone()), Some(line));
        session.set_current_thread(thread_id);

        // A breakpoint can end a step (the step landed on it). The step
        // completion wins; the hit is not separately reported.
        if session.execution_state() == ExecutionState::StepMode {
            execution::step_completed(&self.coordinator, Some(&file), Some(line));
            return;
        }
        self.breakpoint_hit(id, thread_id);
    }

    fn breakpoint_hit(&self, id: u32, thread_id: i64) {
        let session = self.coordinator.session();
        let Some(breakpoint) = self.coordinator.breakpoints().find(id) else {
            // Not one of ours (backend-internal or already deleted). With
            // no step in flight there is nothing to report; the thread
            // bookkeeping above already happened.
            warn!("stop on unknown breakpoint {id}, ignoring");
            return;
        };

        if breakpoint.try_block(true, true) {
            session.acquire_critical_region();

            let snapshot = breakpoint.snapshot();
            let mut break_execution = true;

            if snapshot.break_when_cond_changed {
                break_execution = self.condition_changed_qualifies(&breakpoint, &snapshot);
            } else {
                breakpoint.update(|s| s.hit_count += 1);
            }

            if break_execution {
                session.set_execution_state(ExecutionState::BreakMode);
                session.set_target_intent(TargetIntent::Stopped);
                let thread = session.thread(thread_id);
                self.coordinator
                    .sink()
                    .on_breakpoint(thread.as_ref(), &[Arc::clone(&breakpoint)]);

                // Stopping consumed the backend ignore count; re-arm it so
                // the policy keeps holding on later hits.
                let after = breakpoint.snapshot();
                if !after.break_when_cond_changed {
                    if after.is_hit_count_equal {
                        // Equal fired; never stop here again.
                        let _ = self.coordinator.ignore_hit_count(id, i64::from(i32::MAX));
                    } else if after.hit_count_multiple != 0 {
                        let next = after.hit_count_multiple
                            - (after.hit_count % after.hit_count_multiple);
                        let _ = self.coordinator.ignore_hit_count(id, i64::from(next));
                    }
                }
            } else {
                self.coordinator.resume_if_was_running();
            }

            session.release_critical_region();
            breakpoint.release_block(true, true);
        } else {
            // The breakpoint is mid-edit (or a duplicate notification is
            // already being served). Resume without re-evaluation.
            session.acquire_critical_region();
            self.coordinator.resume_if_was_running();
            session.release_critical_region();
        }
    }

    /// Condition-changed arbitration: a hit qualifies when the expression's
    /// value differs from the last one seen. Qualifying hits advance the
    /// count; the pass-count policy decides which counts stop the target.
    fn condition_changed_qualifies(
        &self,
        breakpoint: &Arc<BoundBreakpoint>,
        snapshot: &BreakpointState,
    ) -> bool {
        let Some(expr) = snapshot.condition.changed_expression() else {
            return true;
        };
        let value = match self.coordinator.evaluate_expression(expr) {
            Ok(value) => value,
            Err(err) => {
                debug!("condition evaluation failed, resuming: {err}");
                return false;
            }
        };
        if value == snapshot.previous_cond_evaluation {
            return false;
        }

        let new_count = breakpoint.update(|s| {
            s.hit_count += 1;
            s.previous_cond_evaluation = value.clone();
            s.hit_count
        });
        match snapshot.pass_count.style {
            PassCountStyle::None => true,
            PassCountStyle::Equal => new_count == snapshot.pass_count.count,
            PassCountStyle::EqualOrGreater => new_count >= snapshot.pass_count.count,
            PassCountStyle::Mod => {
                snapshot.pass_count.count != 0 && new_count % snapshot.pass_count.count == 0
            }
        }
    }
}
