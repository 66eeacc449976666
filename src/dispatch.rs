//! Background dispatch loop.
//!
//! One thread drains the channel's event queue, splits batches into
//! lines, and routes each classified event to its handler. Unknown lines
//! are skipped; an unhandled notification type must never kill the loop.

use crate::coordinator::Coordinator;
use crate::events::DebugEvent;
use crate::handlers::{BreakpointHandler, ExecutionHandler, OutputHandler};
use crate::session::SessionContext;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::debug;

const IDLE_POLL: Duration = Duration::from_millis(1);

pub struct Dispatcher {
    handle: Option<JoinHandle<()>>,
    session: Arc<SessionContext>,
}

impl Dispatcher {
    /// Spawn the dispatch thread. It runs until the session's dispatching
    /// flag is cleared (by [`Dispatcher::stop`] or by session teardown).
    pub fn spawn(coordinator: Arc<Coordinator>) -> Self {
        let session = Arc::clone(coordinator.session());
        let handle = thread::Builder::new()
            .name("gdb-dispatch".to_string())
            .spawn(move || run_loop(coordinator))
            .expect("spawn gdb-dispatch thread");
        Self {
            handle: Some(handle),
            session,
        }
    }

    pub fn stop(&self) {
        self.session.set_dispatching(false);
    }

    /// Stop and wait for the thread to drain.
    pub fn join(mut self) {
        self.stop();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn run_loop(coordinator: Arc<Coordinator>) {
    let session = Arc::clone(coordinator.session());
    let breakpoints = BreakpointHandler::new(Arc::clone(&coordinator));
    let execution = ExecutionHandler::new(Arc::clone(&coordinator));
    let output = OutputHandler::new(Arc::clone(&coordinator));

    debug!("dispatch loop started");
    while session.dispatching() {
        let Some(batch) = coordinator.channel().poll_event() else {
            thread::sleep(IDLE_POLL);
            continue;
        };

        // A batch can carry several newline-separated notifications.
        let batch = batch.replace("\r\n", "\n");
        for ev in batch.split('\n') {
            if !session.dispatching() {
                break;
            }
            if ev.len() < 2 {
                continue;
            }

            // Any activity other than the quit-signal storm itself (or
            // interleaved output text) proves the backend is healthy.
            if session.sigint_count() > 0 && !ev.starts_with("50") && !ev.starts_with("80") {
                session.reset_sigint();
            }

            match coordinator.parser().parse(ev) {
                Some(DebugEvent::Breakpoint(event)) => breakpoints.handle(event),
                Some(DebugEvent::Execution(event)) => execution.handle(event),
                Some(DebugEvent::Output(event)) => output.handle(event),
                None => {}
            }
        }
    }
    debug!("dispatch loop ended");
}
