//! Shared session state: execution mode, target intent, thread table,
//! the critical region, and the interrupt rendezvous.
//!
//! Everything here is shared between the dispatch thread and frontend
//! command threads. Coarse state lives behind one mutex; hot one-word
//! flags are atomics.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Condvar, Mutex};
use std::time::Duration;

/// Coarse execution mode of the debugged target, as the frontend sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionState {
    /// No target attached yet, or the session has ended.
    DesignMode,
    /// Target is running.
    RunMode,
    /// Target is suspended at a stop the frontend knows about.
    BreakMode,
    /// A step operation is in flight.
    StepMode,
}

/// What the engine wants the target to be doing. Distinct from
/// [`ExecutionState`]: during an interrupt-edit-resume envelope the target
/// is briefly suspended while the intent is still to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetIntent {
    Stopped,
    Running,
    /// Suspended only to service a command; resume once it completes.
    RunningPendingResume,
}

/// A thread the backend has announced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreadRecord {
    pub id: i64,
    pub file: Option<String>,
    pub line: Option<u32>,
}

impl ThreadRecord {
    pub fn new(id: i64) -> Self {
        Self {
            id,
            file: None,
            line: None,
        }
    }
}

#[derive(Debug)]
struct SessionInner {
    execution: ExecutionState,
    intent: TargetIntent,
    /// What the backend itself last reported (running vs stopped). Can
    /// disagree with `execution` while a transition is being dispatched.
    gdb_run_mode: bool,
    /// Last stop landed in code without symbols.
    unknown_code: bool,
    threads: HashMap<i64, ThreadRecord>,
    current_thread: Option<i64>,
    threads_stale: bool,
}

/// Shared per-session state.
#[derive(Debug)]
pub struct SessionContext {
    inner: Mutex<SessionInner>,
    critical_region: AtomicBool,
    active: AtomicBool,
    dispatching: AtomicBool,
    sigint_count: AtomicU32,
    interrupt_seen: Mutex<bool>,
    interrupt_cv: Condvar,
}

impl Default for SessionContext {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionContext {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(SessionInner {
                execution: ExecutionState::DesignMode,
                intent: TargetIntent::Stopped,
                gdb_run_mode: false,
                unknown_code: false,
                threads: HashMap::new(),
                current_thread: None,
                threads_stale: false,
            }),
            critical_region: AtomicBool::new(false),
            active: AtomicBool::new(true),
            dispatching: AtomicBool::new(true),
            sigint_count: AtomicU32::new(0),
            interrupt_seen: Mutex::new(false),
            interrupt_cv: Condvar::new(),
        }
    }

    pub fn execution_state(&self) -> ExecutionState {
        self.inner.lock().unwrap().execution
    }

    pub fn set_execution_state(&self, state: ExecutionState) {
        self.inner.lock().unwrap().execution = state;
    }

    pub fn target_intent(&self) -> TargetIntent {
        self.inner.lock().unwrap().intent
    }

    pub fn set_target_intent(&self, intent: TargetIntent) {
        self.inner.lock().unwrap().intent = intent;
    }

    pub fn gdb_run_mode(&self) -> bool {
        self.inner.lock().unwrap().gdb_run_mode
    }

    pub fn set_gdb_run_mode(&self, running: bool) {
        self.inner.lock().unwrap().gdb_run_mode = running;
    }

    pub fn unknown_code(&self) -> bool {
        self.inner.lock().unwrap().unknown_code
    }

    pub fn set_unknown_code(&self, unknown: bool) {
        self.inner.lock().unwrap().unknown_code = unknown;
    }

    // Critical region. Non-blocking entry for the dispatch thread,
    // spinning entry for command threads. Never held across a wait.

    /// Try to enter the critical region without blocking.
    pub fn enter_critical_region(&self) -> bool {
        self.critical_region
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Enter the critical region, yielding until it is free.
    pub fn acquire_critical_region(&self) {
        while !self.enter_critical_region() {
            std::thread::yield_now();
        }
    }

    pub fn release_critical_region(&self) {
        self.critical_region.store(false, Ordering::Release);
    }

    // Session lifetime flags.

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Flip the active flag, returning the previous value. Teardown runs
    /// only for the caller that observes the true-to-false transition.
    pub fn swap_active(&self, active: bool) -> bool {
        self.active.swap(active, Ordering::AcqRel)
    }

    pub fn dispatching(&self) -> bool {
        self.dispatching.load(Ordering::Acquire)
    }

    pub fn set_dispatching(&self, on: bool) {
        self.dispatching.store(on, Ordering::Release);
    }

    // Quit-signal storm counter.

    pub fn bump_sigint(&self) -> u32 {
        self.sigint_count.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub fn reset_sigint(&self) {
        self.sigint_count.store(0, Ordering::Release);
    }

    pub fn sigint_count(&self) -> u32 {
        self.sigint_count.load(Ordering::Acquire)
    }

    // Interrupt rendezvous. The dispatch thread signals when the backend
    // confirms a suspension; a command thread waits with a timeout so it
    // can re-send the interrupt if the confirmation is lost.

    pub fn signal_interrupt(&self) {
        let mut seen = self.interrupt_seen.lock().unwrap();
        *seen = true;
        self.interrupt_cv.notify_all();
    }

    pub fn clear_interrupt(&self) {
        *self.interrupt_seen.lock().unwrap() = false;
    }

    /// Wait until an interrupt confirmation arrives or `timeout` elapses.
    /// Returns true if the confirmation was seen.
    pub fn wait_interrupt(&self, timeout: Duration) -> bool {
        let seen = self.interrupt_seen.lock().unwrap();
        let (seen, _) = self
            .interrupt_cv
            .wait_timeout_while(seen, timeout, |seen| !*seen)
            .unwrap();
        *seen
    }

    // Thread table.

    pub fn insert_thread(&self, record: ThreadRecord) {
        let mut inner = self.inner.lock().unwrap();
        inner.threads.insert(record.id, record);
    }

    pub fn update_thread_location(&self, id: i64, file: Option<String>, line: Option<u32>) {
        let mut inner = self.inner.lock().unwrap();
        let record = inner.threads.entry(id).or_insert_with(|| ThreadRecord::new(id));
        record.file = file;
        record.line = line;
    }

    pub fn remove_thread(&self, id: i64) {
        let mut inner = self.inner.lock().unwrap();
        inner.threads.remove(&id);
        if inner.current_thread == Some(id) {
            inner.current_thread = None;
        }
    }

    pub fn thread(&self, id: i64) -> Option<ThreadRecord> {
        self.inner.lock().unwrap().threads.get(&id).cloned()
    }

    pub fn thread_ids(&self) -> Vec<i64> {
        let inner = self.inner.lock().unwrap();
        let mut ids: Vec<i64> = inner.threads.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn set_current_thread(&self, id: i64) {
        self.inner.lock().unwrap().current_thread = Some(id);
    }

    pub fn current_thread(&self) -> Option<ThreadRecord> {
        let inner = self.inner.lock().unwrap();
        inner
            .current_thread
            .and_then(|id| inner.threads.get(&id).cloned())
    }

    pub fn current_thread_id(&self) -> Option<i64> {
        self.inner.lock().unwrap().current_thread
    }

    pub fn mark_threads_stale(&self) {
        self.inner.lock().unwrap().threads_stale = true;
    }

    /// Consume the stale flag, returning whether it was set.
    pub fn take_threads_stale(&self) -> bool {
        let mut inner = self.inner.lock().unwrap();
        std::mem::replace(&mut inner.threads_stale, false)
    }
}
