//! Output-category events: backend console text and target stdout.

use crate::coordinator::Coordinator;
use crate::events::OutputEvent;
use std::sync::Arc;

pub struct OutputHandler {
    coordinator: Arc<Coordinator>,
}

impl OutputHandler {
    pub fn new(coordinator: Arc<Coordinator>) -> Self {
        Self { coordinator }
    }

    pub fn handle(&self, event: OutputEvent) {
        match event {
            OutputEvent::Console(text) | OutputEvent::Stdout(text) => {
                self.coordinator.sink().on_output(&text);
            }
        }
    }
}
