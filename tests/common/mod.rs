//! Scripted transport and recording sink shared by the scenario tests.

use gdb_mi_engine::breakpoint::BoundBreakpoint;
use gdb_mi_engine::channel::GdbChannel;
use gdb_mi_engine::session::ThreadRecord;
use gdb_mi_engine::sink::{DebugEventSink, SessionFault};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Poll until `cond` holds or the timeout expires.
pub fn wait_until(cond: impl Fn() -> bool, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    cond()
}

/// A channel that replays scripted confirmations and lets the test feed
/// asynchronous events. Posting `-exec-interrupt` feeds the configured
/// interrupt notification back, imitating a backend that suspends on
/// request.
#[derive(Default)]
pub struct ScriptedChannel {
    responses: Mutex<VecDeque<String>>,
    events: Mutex<VecDeque<String>>,
    sent: Mutex<Vec<String>>,
    interrupt_reply: Mutex<Option<String>>,
}

impl ScriptedChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_response(&self, line: &str) {
        self.responses.lock().unwrap().push_back(line.to_string());
    }

    pub fn push_event(&self, line: &str) {
        self.events.lock().unwrap().push_back(line.to_string());
    }

    pub fn set_interrupt_reply(&self, line: &str) {
        *self.interrupt_reply.lock().unwrap() = Some(line.to_string());
    }

    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_count(&self, prefix: &str) -> usize {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }
}

impl GdbChannel for ScriptedChannel {
    fn execute(&self, command: &str) -> Option<String> {
        self.sent.lock().unwrap().push(command.to_string());
        self.responses.lock().unwrap().pop_front()
    }

    fn post(&self, command: &str) -> bool {
        self.sent.lock().unwrap().push(command.to_string());
        if command == "-exec-interrupt" {
            let reply = self.interrupt_reply.lock().unwrap().clone();
            if let Some(reply) = reply {
                self.push_event(&reply);
            }
        }
        true
    }

    fn poll_event(&self) -> Option<String> {
        self.events.lock().unwrap().pop_front()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SinkEvent {
    Bound(u32),
    Breakpoint { thread: Option<i64>, ids: Vec<u32> },
    AsyncBreak(Option<i64>),
    StepComplete { file: Option<String>, line: Option<u32> },
    ThreadStart(i64),
    ThreadExit(i64),
    ProgramDestroy(u32),
    Output(String),
    Fault(SessionFault),
}

#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<SinkEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<SinkEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn count(&self, matches: impl Fn(&SinkEvent) -> bool) -> usize {
        self.events.lock().unwrap().iter().filter(|e| matches(e)).count()
    }

    fn record(&self, event: SinkEvent) {
        self.events.lock().unwrap().push(event);
    }
}

impl DebugEventSink for RecordingSink {
    fn on_breakpoint_bound(&self, breakpoint: &Arc<BoundBreakpoint>) {
        self.record(SinkEvent::Bound(breakpoint.gdb_id()));
    }

    fn on_breakpoint(&self, thread: Option<&ThreadRecord>, hits: &[Arc<BoundBreakpoint>]) {
        self.record(SinkEvent::Breakpoint {
            thread: thread.map(|t| t.id),
            ids: hits.iter().map(|b| b.gdb_id()).collect(),
        });
    }

    fn on_async_break_complete(&self, thread: Option<&ThreadRecord>) {
        self.record(SinkEvent::AsyncBreak(thread.map(|t| t.id)));
    }

    fn on_step_complete(&self, file: Option<&str>, line: Option<u32>) {
        self.record(SinkEvent::StepComplete {
            file: file.map(|f| f.to_string()),
            line,
        });
    }

    fn on_thread_start(&self, thread_id: i64) {
        self.record(SinkEvent::ThreadStart(thread_id));
    }

    fn on_thread_exit(&self, thread_id: i64) {
        self.record(SinkEvent::ThreadExit(thread_id));
    }

    fn on_program_destroy(&self, exit_code: u32) {
        self.record(SinkEvent::ProgramDestroy(exit_code));
    }

    fn on_output(&self, text: &str) {
        self.record(SinkEvent::Output(text.to_string()));
    }

    fn on_session_fault(&self, fault: &SessionFault) {
        self.record(SinkEvent::Fault(fault.clone()));
    }
}
