//! Command-side engine operations.
//!
//! The coordinator owns every mutation the frontend can ask for:
//! breakpoint management, execution control, stepping, expression
//! evaluation, and session teardown. Mutations that require a suspended
//! backend are wrapped in the interrupt envelope
//! ([`Coordinator::prepare_to_modify_breakpoint`] /
//! [`Coordinator::resume_from_interrupt`]) so callers can issue them
//! while the target runs.

use crate::breakpoint::{
    BoundBreakpoint, BreakpointLocation, BreakpointRegistry, BreakpointRequest, ConditionPolicy,
    PassCount, PassCountStyle,
};
use crate::channel::GdbChannel;
use crate::commands;
use crate::error::{EngineError, Result};
use crate::events::{BreakpointEvent, BreakpointInfo, DebugEvent, EventParser};
use crate::session::{ExecutionState, SessionContext, TargetIntent, ThreadRecord};
use crate::sink::DebugEventSink;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Step granularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    Into,
    Over,
    Out,
}

/// How long to wait for an interrupt confirmation before re-sending.
const INTERRUPT_RETRY: Duration = Duration::from_secs(1);

pub struct Coordinator {
    session: Arc<SessionContext>,
    breakpoints: Arc<BreakpointRegistry>,
    channel: Arc<dyn GdbChannel>,
    sink: Arc<dyn DebugEventSink>,
    parser: EventParser,
    /// Expression values observed since the last stop. Invalidated on
    /// every resume-stop transition.
    eval_cache: Mutex<HashMap<String, String>>,
}

impl Coordinator {
    pub fn new(
        session: Arc<SessionContext>,
        breakpoints: Arc<BreakpointRegistry>,
        channel: Arc<dyn GdbChannel>,
        sink: Arc<dyn DebugEventSink>,
    ) -> Self {
        Self {
            session,
            breakpoints,
            channel,
            sink,
            parser: EventParser::new(),
            eval_cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn session(&self) -> &Arc<SessionContext> {
        &self.session
    }

    pub fn breakpoints(&self) -> &Arc<BreakpointRegistry> {
        &self.breakpoints
    }

    pub fn sink(&self) -> &Arc<dyn DebugEventSink> {
        &self.sink
    }

    pub fn channel(&self) -> &Arc<dyn GdbChannel> {
        &self.channel
    }

    pub(crate) fn parser(&self) -> &EventParser {
        &self.parser
    }

    // ------------------------------------------------------------------
    // Breakpoint management
    // ------------------------------------------------------------------

    /// Insert a breakpoint, suspending the target first if it is running.
    /// Non-default pass count and condition from the request are applied
    /// before the target resumes.
    pub fn set_breakpoint(&self, request: BreakpointRequest) -> Result<Arc<BoundBreakpoint>> {
        if !self.session.is_active() {
            return Err(EngineError::SessionInactive);
        }
        self.prepare_to_modify_breakpoint()?;

        let info = match self.insert_backend(&request.location) {
            Ok(info) => info,
            Err(err) => {
                self.resume_from_interrupt();
                return Err(err);
            }
        };

        let pass_count = request.pass_count;
        let condition = request.condition.clone();
        let breakpoint = Arc::new(BoundBreakpoint::new(request, &info));
        self.breakpoints.insert(Arc::clone(&breakpoint));
        info!("breakpoint {} bound", info.id);

        let applied = self.apply_request_policies(&breakpoint, pass_count, condition);
        if let Err(err) = applied {
            self.resume_from_interrupt();
            return Err(err);
        }

        self.sink.on_breakpoint_bound(&breakpoint);
        self.resume_from_interrupt();
        Ok(breakpoint)
    }

    fn apply_request_policies(
        &self,
        breakpoint: &Arc<BoundBreakpoint>,
        pass_count: PassCount,
        condition: ConditionPolicy,
    ) -> Result<()> {
        if pass_count != PassCount::default() {
            self.set_pass_count(breakpoint, pass_count)?;
        }
        if condition != ConditionPolicy::None {
            self.set_condition(breakpoint, condition)?;
        }
        Ok(())
    }

    /// Send the insert command and classify the confirmation. A pending
    /// full-path location is retried with the bare filename.
    fn insert_backend(&self, location: &BreakpointLocation) -> Result<BreakpointInfo> {
        let command = match location {
            BreakpointLocation::FileLine {
                full_path, line, ..
            } => commands::break_insert_file(full_path, *line),
            BreakpointLocation::Function { name } => commands::break_insert_function(name),
        };
        let mut response = self
            .channel
            .execute(&command)
            .ok_or(EngineError::ChannelClosed)?;

        if response.contains("<PENDING>") {
            if let BreakpointLocation::FileLine { file, line, .. } = location {
                debug!("full path unresolved, retrying insert with {file}:{line}");
                response = self
                    .channel
                    .execute(&commands::break_insert_file(file, *line))
                    .ok_or(EngineError::ChannelClosed)?;
            }
        }
        if response.len() < 2 {
            return Err(EngineError::EmptyResponse);
        }
        match self.parser.parse(&response) {
            Some(DebugEvent::Breakpoint(BreakpointEvent::Inserted(info))) => Ok(info),
            _ => Err(EngineError::MalformedResponse(response)),
        }
    }

    /// Delete a breakpoint and drop it from the registry.
    pub fn delete_breakpoint(&self, gdb_id: u32) -> Result<()> {
        if !self.session.is_active() {
            return Err(EngineError::SessionInactive);
        }
        self.prepare_to_modify_breakpoint()?;
        let result = self.delete_backend(gdb_id);
        if result.is_ok() {
            self.breakpoints.remove(gdb_id);
        }
        self.resume_from_interrupt();
        result
    }

    fn delete_backend(&self, gdb_id: u32) -> Result<()> {
        let response = self
            .channel
            .execute(&commands::break_delete(gdb_id))
            .ok_or(EngineError::ChannelClosed)?;
        let returned = match self.parser.parse(&response) {
            Some(DebugEvent::Breakpoint(BreakpointEvent::Deleted { id })) => id,
            Some(DebugEvent::Breakpoint(BreakpointEvent::TemporaryDeleted { id })) => Some(id),
            _ => return Err(EngineError::MalformedResponse(response)),
        };
        match returned {
            Some(id) if id != gdb_id => Err(EngineError::ConfirmationMismatch {
                requested: gdb_id,
                returned: id,
            }),
            _ => Ok(()),
        }
    }

    /// Enable or disable a bound breakpoint.
    pub fn enable_breakpoint(&self, breakpoint: &Arc<BoundBreakpoint>, enable: bool) -> Result<()> {
        if !self.session.is_active() {
            return Err(EngineError::SessionInactive);
        }
        let gdb_id = breakpoint.gdb_id();
        self.prepare_to_modify_breakpoint()?;

        let result = (|| {
            let command = if enable {
                commands::break_enable(gdb_id)
            } else {
                commands::break_disable(gdb_id)
            };
            let response = self
                .channel
                .execute(&command)
                .ok_or(EngineError::ChannelClosed)?;
            let returned = match self.parser.parse(&response) {
                Some(DebugEvent::Breakpoint(BreakpointEvent::Enabled { id })) if enable => id,
                Some(DebugEvent::Breakpoint(BreakpointEvent::Disabled { id })) if !enable => id,
                _ => return Err(EngineError::MalformedResponse(response)),
            };
            if let Some(id) = returned {
                if id != gdb_id {
                    return Err(EngineError::ConfirmationMismatch {
                        requested: gdb_id,
                        returned: id,
                    });
                }
            }
            breakpoint.update(|s| s.enabled = enable);
            Ok(())
        })();

        self.resume_from_interrupt();
        result
    }

    /// Raw backend condition. `None` clears any previous condition.
    fn set_backend_condition(&self, gdb_id: u32, condition: Option<&str>) -> Result<()> {
        let response = self
            .channel
            .execute(&commands::break_condition(gdb_id, condition))
            .ok_or(EngineError::ChannelClosed)?;
        match self.parser.parse(&response) {
            Some(DebugEvent::Breakpoint(BreakpointEvent::ConditionSet { id, .. })) => {
                if id != gdb_id {
                    return Err(EngineError::ConfirmationMismatch {
                        requested: gdb_id,
                        returned: id,
                    });
                }
                Ok(())
            }
            Some(DebugEvent::Breakpoint(BreakpointEvent::ConditionError)) => Err(
                EngineError::EvaluationFailed(condition.unwrap_or("").to_string()),
            ),
            _ => Err(EngineError::MalformedResponse(response)),
        }
    }

    /// Ignore-count change as a standalone frontend operation, wrapped in
    /// the interrupt envelope.
    pub fn set_ignore_count(&self, gdb_id: u32, count: i64) -> Result<()> {
        if !self.session.is_active() {
            return Err(EngineError::SessionInactive);
        }
        self.prepare_to_modify_breakpoint()?;
        let result = self.ignore_hit_count(gdb_id, count);
        self.resume_from_interrupt();
        result
    }

    /// Tell the backend to skip the next `count - 1` hits, so the target
    /// next stops on the `count`-th. A non-positive count disables
    /// stopping for any practically reachable hit count.
    pub(crate) fn ignore_hit_count(&self, gdb_id: u32, count: i64) -> Result<()> {
        let mut ignore = count - 1;
        if ignore < 0 {
            ignore = i64::from(i32::MAX);
        }
        let response = self
            .channel
            .execute(&commands::break_after(gdb_id, ignore))
            .ok_or(EngineError::ChannelClosed)?;
        match self.parser.parse(&response) {
            Some(DebugEvent::Breakpoint(BreakpointEvent::IgnoreCountSet { id, .. })) => {
                if id != gdb_id {
                    return Err(EngineError::ConfirmationMismatch {
                        requested: gdb_id,
                        returned: id,
                    });
                }
                Ok(())
            }
            _ => Err(EngineError::MalformedResponse(response)),
        }
    }

    /// Apply a pass-count policy. For plain (non-condition-changed)
    /// breakpoints the policy is pushed down to the backend as an ignore
    /// count relative to the hits already taken.
    ///
    /// The interrupt, if one is needed, happens before the critical region
    /// is taken: its confirmation is delivered by the dispatch thread,
    /// which must stay free to run.
    pub fn set_pass_count(&self, breakpoint: &Arc<BoundBreakpoint>, pass: PassCount) -> Result<()> {
        if !self.session.is_active() {
            return Err(EngineError::SessionInactive);
        }
        while !breakpoint.try_block(true, false) {
            std::thread::yield_now();
        }

        let was_running =
            self.session.execution_state() == ExecutionState::RunMode && self.session.gdb_run_mode();
        if was_running {
            self.session
                .set_target_intent(TargetIntent::RunningPendingResume);
            if let Err(err) = self.cause_break() {
                breakpoint.release_block(true, false);
                return Err(err);
            }
        }

        self.session.acquire_critical_region();
        let result = self.set_pass_count_locked(breakpoint, pass);
        self.session.release_critical_region();

        if was_running {
            self.resume_from_interrupt();
        }
        breakpoint.release_block(true, false);
        result
    }

    fn set_pass_count_locked(
        &self,
        breakpoint: &Arc<BoundBreakpoint>,
        pass: PassCount,
    ) -> Result<()> {
        let (gdb_id, hit_count, cond_changed) = breakpoint.update(|s| {
            s.pass_count = pass;
            s.is_hit_count_equal = pass.style == PassCountStyle::Equal;
            s.hit_count_multiple = if pass.style == PassCountStyle::Mod {
                pass.count
            } else {
                0
            };
            (s.gdb_id, s.hit_count, s.break_when_cond_changed)
        });

        // Condition-changed breakpoints stop on every hit; the engine
        // arbitrates the pass count itself.
        if !cond_changed {
            let target = match pass.style {
                PassCountStyle::EqualOrGreater => {
                    let diff = i64::from(pass.count) - i64::from(hit_count);
                    if diff >= 0 {
                        diff
                    } else {
                        1
                    }
                }
                PassCountStyle::Equal => i64::from(pass.count) - i64::from(hit_count),
                // A zero modulus degenerates to stopping on every hit.
                PassCountStyle::Mod if pass.count == 0 => 1,
                PassCountStyle::Mod => {
                    i64::from(pass.count) - i64::from(hit_count % pass.count)
                }
                PassCountStyle::None => 1,
            };
            self.ignore_hit_count(gdb_id, target)?;
        }
        Ok(())
    }

    /// Apply a condition policy. A when-changed policy is not expressible
    /// on the backend, so the breakpoint is made to stop on every hit and
    /// the decision moves to the hit handler.
    pub fn set_condition(
        &self,
        breakpoint: &Arc<BoundBreakpoint>,
        policy: ConditionPolicy,
    ) -> Result<()> {
        if !self.session.is_active() {
            return Err(EngineError::SessionInactive);
        }
        while !breakpoint.try_block(false, true) {
            std::thread::yield_now();
        }

        // A condition change restarts the count from zero.
        if breakpoint.hit_count() != 0 {
            if let Err(err) = self.reset_hit_count(breakpoint, false) {
                warn!("hit-count reset before condition change failed: {err}");
            }
        }

        let was_running =
            self.session.execution_state() == ExecutionState::RunMode && self.session.gdb_run_mode();
        if was_running {
            self.session
                .set_target_intent(TargetIntent::RunningPendingResume);
            if let Err(err) = self.cause_break() {
                breakpoint.release_block(false, true);
                return Err(err);
            }
            self.session.set_execution_state(ExecutionState::BreakMode);
        }

        self.session.acquire_critical_region();
        let gdb_id = breakpoint.gdb_id();
        let result = match &policy {
            ConditionPolicy::WhenTrue(expr) => {
                breakpoint.update(|s| {
                    s.break_when_cond_changed = false;
                    s.condition = policy.clone();
                });
                self.set_backend_condition(gdb_id, Some(expr))
            }
            ConditionPolicy::WhenChanged(expr) => {
                breakpoint.update(|s| {
                    s.break_when_cond_changed = true;
                    s.previous_cond_evaluation = expr.clone();
                    s.condition = policy.clone();
                });
                self.ignore_hit_count(gdb_id, 1)
                    .and_then(|_| self.set_backend_condition(gdb_id, None))
            }
            ConditionPolicy::None => {
                breakpoint.update(|s| {
                    s.break_when_cond_changed = false;
                    s.condition = ConditionPolicy::None;
                });
                self.set_backend_condition(gdb_id, None)
            }
        };

        self.session.release_critical_region();
        breakpoint.release_block(false, true);

        // The backend resets its ignore bookkeeping when a condition
        // changes; re-derive it from the pass count.
        if result.is_ok() && !matches!(policy, ConditionPolicy::WhenChanged(_)) {
            let pass = breakpoint.snapshot().pass_count;
            if pass != PassCount::default() {
                self.set_pass_count(breakpoint, pass)?;
            }
        }

        if was_running {
            self.session.set_execution_state(ExecutionState::RunMode);
            self.resume_from_interrupt();
        }
        result
    }

    /// The backend has no hit-count reset primitive; the breakpoint is
    /// recreated and its policies re-applied. The old backend id is
    /// retired and the registry rebinds the same [`BoundBreakpoint`] to
    /// the new one.
    pub fn reset_hit_count(
        &self,
        breakpoint: &Arc<BoundBreakpoint>,
        and_condition: bool,
    ) -> Result<()> {
        if !self.session.is_active() {
            return Err(EngineError::SessionInactive);
        }
        let snapshot = breakpoint.snapshot();
        self.delete_breakpoint(snapshot.gdb_id)?;

        self.prepare_to_modify_breakpoint()?;
        let info = match self.insert_backend(&snapshot.location) {
            Ok(info) => info,
            Err(err) => {
                self.resume_from_interrupt();
                return Err(err);
            }
        };
        breakpoint.update(|s| {
            s.gdb_id = info.id;
            s.hit_count = 0;
            s.address = info.address;
            s.function = info.function.clone();
            s.file = info.file.clone();
            s.line = info.line;
        });
        self.breakpoints.insert(Arc::clone(breakpoint));
        self.resume_from_interrupt();

        self.set_pass_count(breakpoint, snapshot.pass_count)?;
        if and_condition && snapshot.condition != ConditionPolicy::None {
            self.set_condition(breakpoint, snapshot.condition)?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Execution control
    // ------------------------------------------------------------------

    /// Resume the target unless it is already meant to run. Returns
    /// whether a continue was actually issued.
    pub fn continue_execution(&self) -> Result<bool> {
        if !self.session.is_active() {
            return Err(EngineError::SessionInactive);
        }
        if self.session.target_intent() == TargetIntent::Running {
            return Ok(false);
        }
        self.send_continue();
        Ok(true)
    }

    fn send_continue(&self) {
        self.session.set_execution_state(ExecutionState::RunMode);
        self.session.set_gdb_run_mode(true);
        self.session.set_target_intent(TargetIntent::Running);
        self.channel.post(&commands::exec_continue());
    }

    /// Resume after a silent stop if the intent is still to run. Used by
    /// the hit handler when a stop must not surface to the frontend.
    pub(crate) fn resume_if_was_running(&self) -> bool {
        if self.session.target_intent() != TargetIntent::Running {
            return false;
        }
        self.session.set_execution_state(ExecutionState::RunMode);
        self.session.set_gdb_run_mode(true);
        self.channel.post(&commands::exec_continue());
        true
    }

    /// Suspend the target and wait for the backend to confirm. The
    /// interrupt is re-sent every second until the confirmation arrives,
    /// since a backend busy in a system call can drop it.
    pub fn cause_break(&self) -> Result<()> {
        if !self.session.gdb_run_mode() {
            return Ok(());
        }
        self.session.clear_interrupt();
        loop {
            if !self.channel.post(&commands::exec_interrupt()) {
                return Err(EngineError::ChannelClosed);
            }
            if self.session.wait_interrupt(INTERRUPT_RETRY) {
                break;
            }
            if !self.session.is_active() {
                return Err(EngineError::SessionInactive);
            }
            warn!("no interrupt confirmation yet, re-sending");
        }
        self.session.clear_interrupt();
        Ok(())
    }

    /// Open the interrupt envelope: if the target is running, suspend it
    /// and mark the suspension as transient so the matching
    /// [`Coordinator::resume_from_interrupt`] resumes it.
    pub fn prepare_to_modify_breakpoint(&self) -> Result<()> {
        let state = self.session.execution_state();
        if state != ExecutionState::DesignMode && state != ExecutionState::BreakMode {
            self.session
                .set_target_intent(TargetIntent::RunningPendingResume);
            self.cause_break()?;
        }
        Ok(())
    }

    /// Close the interrupt envelope.
    pub fn resume_from_interrupt(&self) {
        if self.session.target_intent() == TargetIntent::RunningPendingResume {
            self.send_continue();
        }
    }

    /// Step the current thread. In code without symbols a source-level
    /// step is meaningless; the target is resumed with the step mode
    /// armed so the next stop completes it.
    pub fn step(&self, kind: StepKind) -> Result<()> {
        if !self.session.is_active() {
            return Err(EngineError::SessionInactive);
        }
        let thread_id = self.session.current_thread_id().unwrap_or(1);

        if self.session.unknown_code() {
            self.session.set_gdb_run_mode(true);
            self.session.set_target_intent(TargetIntent::Running);
            self.session.set_execution_state(ExecutionState::StepMode);
            if !self.channel.post(&commands::exec_continue()) {
                return Err(EngineError::ChannelClosed);
            }
            return Ok(());
        }

        let command = match kind {
            StepKind::Into => commands::exec_step(thread_id),
            StepKind::Over => commands::exec_next(thread_id),
            StepKind::Out => {
                if self.stack_depth(thread_id)? > 1 {
                    commands::exec_finish(thread_id)
                } else {
                    // Nothing to return out of; degrade to a source step.
                    commands::exec_next(thread_id)
                }
            }
        };
        self.session.set_execution_state(ExecutionState::StepMode);
        self.session.set_gdb_run_mode(true);
        if !self.channel.post(&command) {
            return Err(EngineError::ChannelClosed);
        }
        Ok(())
    }

    pub fn stack_depth(&self, thread_id: i64) -> Result<u32> {
        let response = self
            .channel
            .execute(&commands::stack_info_depth(thread_id))
            .ok_or(EngineError::ChannelClosed)?;
        response
            .trim()
            .parse()
            .map_err(|_| EngineError::MalformedResponse(response))
    }

    /// Kill the target outright.
    pub fn kill_target(&self) -> Result<()> {
        if !self.channel.post(&commands::kill()) {
            return Err(EngineError::ChannelClosed);
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Inspection
    // ------------------------------------------------------------------

    /// Evaluate an expression in the current frame, with per-stop caching.
    pub fn evaluate_expression(&self, expr: &str) -> Result<String> {
        if !self.session.is_active() {
            return Err(EngineError::SessionInactive);
        }
        if let Some(value) = self.eval_cache.lock().unwrap().get(expr) {
            return Ok(value.clone());
        }
        let response = self
            .channel
            .execute(&commands::data_evaluate_expression(expr))
            .ok_or(EngineError::ChannelClosed)?;
        if response.is_empty() || response.contains("ERROR") {
            return Err(EngineError::EvaluationFailed(expr.to_string()));
        }
        self.eval_cache
            .lock()
            .unwrap()
            .insert(expr.to_string(), response.clone());
        Ok(response)
    }

    /// Drop cached expression values. Called whenever the target moves.
    pub(crate) fn clear_eval_cache(&self) {
        self.eval_cache.lock().unwrap().clear();
    }

    pub fn create_variable(&self, name: &str) -> Result<String> {
        let response = self
            .channel
            .execute(&commands::var_create(name))
            .ok_or(EngineError::ChannelClosed)?;
        if response.is_empty() || response.contains("ERROR") {
            return Err(EngineError::EvaluationFailed(name.to_string()));
        }
        Ok(response)
    }

    pub fn delete_variable(&self, name: &str) -> Result<()> {
        self.channel
            .execute(&commands::var_delete(name))
            .ok_or(EngineError::ChannelClosed)?;
        Ok(())
    }

    pub fn list_children(&self, name: &str) -> Result<String> {
        self.channel
            .execute(&commands::var_list_children(name))
            .ok_or(EngineError::ChannelClosed)
    }

    pub fn select_thread(&self, thread_id: i64) -> Result<()> {
        self.channel
            .execute(&commands::thread_select(thread_id))
            .ok_or(EngineError::ChannelClosed)?;
        self.session.set_current_thread(thread_id);
        Ok(())
    }

    pub fn stack_frames(&self, thread_id: i64) -> Result<String> {
        self.channel
            .execute(&commands::stack_list_frames(thread_id))
            .ok_or(EngineError::ChannelClosed)
    }

    pub fn variables_for_frame(&self, thread_id: i64, frame: u32) -> Result<String> {
        self.channel
            .execute(&commands::stack_list_variables(thread_id, frame))
            .ok_or(EngineError::ChannelClosed)
    }

    /// Re-query the backend thread list. Invoked when a stop arrives
    /// after thread creation or exit made the table stale.
    pub(crate) fn refresh_threads(&self) {
        let Some(response) = self.channel.execute(&commands::thread_list_ids()) else {
            return;
        };
        for id in response.split(';').filter_map(|s| s.trim().parse::<i64>().ok()) {
            if self.session.thread(id).is_none() {
                self.session.insert_thread(ThreadRecord::new(id));
            }
        }
    }

    // ------------------------------------------------------------------
    // Teardown
    // ------------------------------------------------------------------

    /// Tear the session down. Idempotent: only the first caller runs the
    /// teardown and gets `true`, so exit paths that race (a kill command
    /// against an exit notification) fire the frontend callbacks once.
    pub fn end_debug_session(&self, exit_code: u32) -> bool {
        if !self.session.swap_active(false) {
            return false;
        }
        info!("ending debug session, exit code {exit_code}");
        self.session.set_dispatching(false);
        self.session.set_execution_state(ExecutionState::DesignMode);
        self.session.set_target_intent(TargetIntent::Stopped);
        self.session.set_gdb_run_mode(false);

        for id in self.session.thread_ids() {
            self.sink.on_thread_exit(id);
            self.session.remove_thread(id);
        }
        self.sink.on_program_destroy(exit_code);
        self.channel.close();
        true
    }
}
