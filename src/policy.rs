//! Policies that decide what happens when a worker dies.
//!
//! A panic escaping a user task is contained inside the worker loop and the
//! worker keeps running. A panic escaping the worker's own management code
//! is fatal to that worker: the captured payload is handed to the pool's
//! policy exactly once, after the worker has deregistered itself.

use std::{
    any::Any,
    fmt,
    io::{self, Write},
    process,
    sync::Arc,
};

use crate::sync::Mutex;

/// Receives the captured payload of a worker that died outside a task.
pub trait PanicPolicy: Send + Sync {
    /// Handle a worker-fatal panic payload.
    ///
    /// Called at most once per worker, never for a panic that a task itself
    /// produced.
    fn handle(&self, payload: Box<dyn Any + Send>);
}

/// Treat a dead worker as unrecoverable: report the payload and abort the
/// process.
///
/// This is the default policy. Re-raising the panic would only take down the
/// one detached worker thread, silently shrinking the pool, so the process
/// is brought down instead.
#[derive(Clone, Copy, Debug, Default)]
pub struct Rethrow;

impl PanicPolicy for Rethrow {
    fn handle(&self, payload: Box<dyn Any + Send>) {
        eprintln!("fatal panic in pool worker: {}", payload_message(&*payload));
        process::abort();
    }
}

/// Write a human-readable form of the payload to a shared sink and carry on.
///
/// The sink is shared behind a mutex so reports from concurrently dying
/// workers do not interleave. Write failures and a poisoned sink are
/// swallowed; this policy never propagates.
pub struct TryLog<W: Write + Send = io::Stderr> {
    sink: Arc<Mutex<W>>,
}

impl<W: Write + Send> TryLog<W> {
    /// Create a policy writing to its own exclusive sink.
    pub fn new(sink: W) -> Self {
        Self::shared(Arc::new(Mutex::new(sink)))
    }

    /// Create a policy writing to a sink shared with other parts of the
    /// program.
    pub fn shared(sink: Arc<Mutex<W>>) -> Self {
        Self { sink }
    }
}

impl Default for TryLog<io::Stderr> {
    fn default() -> Self {
        Self::new(io::stderr())
    }
}

impl<W: Write + Send> Clone for TryLog<W> {
    fn clone(&self) -> Self {
        Self {
            sink: self.sink.clone(),
        }
    }
}

impl<W: Write + Send> PanicPolicy for TryLog<W> {
    fn handle(&self, payload: Box<dyn Any + Send>) {
        let mut sink = self.sink.lock();
        let _ = writeln!(
            &mut *sink,
            "panic in pool worker: {}",
            payload_message(&*payload)
        );
    }
}

impl<W: Write + Send> fmt::Debug for TryLog<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("TryLog")
    }
}

/// Best-effort extraction of the message carried by a panic payload.
fn payload_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "unrecognized panic payload"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn capture(payload: Box<dyn Any + Send>) -> String {
        let sink = Arc::new(Mutex::new(Vec::new()));
        TryLog::shared(sink.clone()).handle(payload);

        let bytes = sink.lock();
        String::from_utf8(bytes.clone()).unwrap()
    }

    #[test]
    fn try_log_writes_str_payloads() {
        let report = capture(Box::new("queue exploded"));
        assert_eq!(report, "panic in pool worker: queue exploded\n");
    }

    #[test]
    fn try_log_writes_string_payloads() {
        let report = capture(Box::new(String::from("index 4 out of bounds")));
        assert!(report.contains("index 4 out of bounds"));
    }

    #[test]
    fn try_log_tolerates_opaque_payloads() {
        let report = capture(Box::new(17_u64));
        assert!(report.contains("unrecognized panic payload"));
    }

    #[test]
    fn cloned_policies_share_the_sink() {
        let sink = Arc::new(Mutex::new(Vec::new()));
        let policy = TryLog::shared(sink.clone());
        let clone = policy.clone();

        policy.handle(Box::new("first"));
        clone.handle(Box::new("second"));

        let bytes = sink.lock();
        let report = String::from_utf8(bytes.clone()).unwrap();
        assert!(report.contains("first"));
        assert!(report.contains("second"));
    }
}
