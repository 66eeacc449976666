//! Backend transport.
//!
//! [`GdbChannel`] is the seam between the engine and whatever carries the
//! wire protocol. [`PipeChannel`] is the production implementation: a
//! writer guarded by a mutex, a background reader thread, and a
//! single-slot waiter so synchronous commands receive their confirmation
//! by strict ordering while everything else flows to the event queue.

use std::collections::VecDeque;
use std::io::{BufRead, BufReader, Read, Write};
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, warn};

/// Transport to the debugger backend.
///
/// `execute` sends a command and blocks for its confirmation line; `post`
/// sends without waiting. Event lines arrive through `poll_event`.
pub trait GdbChannel: Send + Sync {
    /// Send a command and wait for its confirmation. `None` means the
    /// confirmation never arrived (timeout or channel closed).
    fn execute(&self, command: &str) -> Option<String>;

    /// Send a command without waiting for a confirmation. Returns false
    /// if the command could not be written.
    fn post(&self, command: &str) -> bool;

    /// Take the next queued asynchronous event line, if any.
    fn poll_event(&self) -> Option<String>;

    /// Shut the transport down. Idempotent.
    fn close(&self) {}
}

struct PendingResponse {
    tx: Sender<String>,
    /// Leading notification codes that satisfy this command. Empty means
    /// the next line of any shape is the response (raw-text confirmations
    /// such as expression values).
    prefixes: &'static [&'static str],
}

/// Pipe-backed channel with a background reader thread.
pub struct PipeChannel {
    writer: Mutex<Box<dyn Write + Send>>,
    events: Arc<Mutex<VecDeque<String>>>,
    waiter: Arc<Mutex<Option<PendingResponse>>>,
    /// Serializes execute calls so two commands never race for the waiter
    /// slot.
    command_gate: Mutex<()>,
    running: Arc<AtomicBool>,
    reader_handle: Mutex<Option<JoinHandle<()>>>,
    timeout: Duration,
}

impl PipeChannel {
    pub fn new(writer: Box<dyn Write + Send>) -> Self {
        Self {
            writer: Mutex::new(writer),
            events: Arc::new(Mutex::new(VecDeque::new())),
            waiter: Arc::new(Mutex::new(None)),
            command_gate: Mutex::new(()),
            running: Arc::new(AtomicBool::new(true)),
            reader_handle: Mutex::new(None),
            timeout: Duration::from_secs(5),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Spawn the reader thread over the backend's output stream. Lines
    /// matching an outstanding waiter's expectation are routed to it;
    /// everything else is queued as an event.
    pub fn attach_reader(&self, reader: Box<dyn Read + Send>) {
        let events = Arc::clone(&self.events);
        let waiter = Arc::clone(&self.waiter);
        let running = Arc::clone(&self.running);

        let handle = thread::Builder::new()
            .name("gdb-reader".to_string())
            .spawn(move || {
                let reader = BufReader::new(reader);
                for line in reader.lines() {
                    let line = match line {
                        Ok(line) => line,
                        Err(err) => {
                            warn!("backend read error: {err}");
                            break;
                        }
                    };
                    if line.is_empty() {
                        continue;
                    }
                    debug!("backend: {line}");

                    let mut slot = waiter.lock().unwrap();
                    let matches = match slot.as_ref() {
                        Some(pending) => {
                            pending.prefixes.is_empty()
                                || pending.prefixes.iter().any(|p| line.starts_with(p))
                        }
                        None => false,
                    };
                    if matches {
                        let pending = slot.take().unwrap();
                        drop(slot);
                        let _ = pending.tx.send(line);
                    } else {
                        drop(slot);
                        events.lock().unwrap().push_back(line);
                    }
                }
                debug!("backend stream ended");
                running.store(false, Ordering::Release);
            })
            .expect("spawn gdb-reader thread");
        *self.reader_handle.lock().unwrap() = Some(handle);
    }

    fn write_line(&self, command: &str) -> bool {
        let mut writer = self.writer.lock().unwrap();
        if let Err(err) = writeln!(writer, "{command}").and_then(|_| writer.flush()) {
            error!("failed to send command: {err}");
            return false;
        }
        true
    }

    /// Which notification codes confirm a given command. Commands without
    /// a compact confirmation fall back to strict next-line ordering.
    fn response_prefixes(command: &str) -> &'static [&'static str] {
        if command.starts_with("-break-insert") {
            &["20"]
        } else if command.starts_with("-break-after") {
            &["26"]
        } else if command.starts_with("-break-condition") {
            &["28", "29"]
        } else if command.starts_with("-break-delete") {
            &["25", "22"]
        } else if command.starts_with("-break-enable") {
            &["23"]
        } else if command.starts_with("-break-disable") {
            &["24"]
        } else {
            &[]
        }
    }
}

impl GdbChannel for PipeChannel {
    fn execute(&self, command: &str) -> Option<String> {
        let _gate = self.command_gate.lock().unwrap();
        if !self.running.load(Ordering::Acquire) {
            return None;
        }

        let (tx, rx): (Sender<String>, Receiver<String>) = mpsc::channel();
        *self.waiter.lock().unwrap() = Some(PendingResponse {
            tx,
            prefixes: Self::response_prefixes(command),
        });

        if !self.write_line(command) {
            self.waiter.lock().unwrap().take();
            return None;
        }

        match rx.recv_timeout(self.timeout) {
            Ok(line) => Some(line),
            Err(_) => {
                // Clear the stale slot so the response, if it ever comes,
                // is treated as an event rather than answering a later
                // command.
                self.waiter.lock().unwrap().take();
                warn!("no confirmation for command: {command}");
                None
            }
        }
    }

    fn post(&self, command: &str) -> bool {
        if !self.running.load(Ordering::Acquire) {
            return false;
        }
        self.write_line(command)
    }

    fn poll_event(&self) -> Option<String> {
        self.events.lock().unwrap().pop_front()
    }

    fn close(&self) {
        self.running.store(false, Ordering::Release);
    }
}

/// Spawned backend process wired to a [`PipeChannel`].
pub struct GdbProcess {
    process: Child,
    channel: Arc<PipeChannel>,
}

impl GdbProcess {
    /// Spawn the backend and attach the channel to its pipes.
    pub fn spawn(program: &str, args: &[&str]) -> anyhow::Result<Self> {
        let mut process = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()?;

        let stdin = process
            .stdin
            .take()
            .ok_or_else(|| anyhow::anyhow!("failed to capture backend stdin"))?;
        let stdout = process
            .stdout
            .take()
            .ok_or_else(|| anyhow::anyhow!("failed to capture backend stdout"))?;

        let channel = Arc::new(PipeChannel::new(Box::new(stdin)));
        channel.attach_reader(Box::new(stdout));

        Ok(Self { process, channel })
    }

    pub fn channel(&self) -> Arc<PipeChannel> {
        Arc::clone(&self.channel)
    }

    /// Close the channel and reap the process.
    pub fn shutdown(mut self) -> anyhow::Result<()> {
        self.channel.close();
        if self.process.try_wait()?.is_none() {
            self.process.kill()?;
            self.process.wait()?;
        }
        Ok(())
    }
}
