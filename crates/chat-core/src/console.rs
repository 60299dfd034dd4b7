//! Non-blocking console input for polling loops.
//!
//! Reading a line from stdin blocks the calling thread until the user presses
//! Enter, which a polling loop cannot afford.  The relay splits the work:
//!
//! ```text
//! reader thread (blocks)            event loop (never blocks)
//! ──────────────────────            ─────────────────────────
//! read_until() ─► trim ──► push ──► PendingInput ──► try_dequeue()
//! ```
//!
//! The queue lock is held only for the push/pop itself, never across the
//! blocking read.  There is exactly one producer and one consumer.
//!
//! The standard library offers no portable way to interrupt a thread parked
//! in a blocking read.  When the application shuts down while the reader is
//! blocked, the process ends through [`crate::shutdown::hard_stop`].

use std::collections::VecDeque;
use std::io::BufRead;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;

use tracing::{debug, info, warn};

use crate::shutdown::ShutdownSignal;

/// FIFO of console lines shared between the reader thread and the event loop.
#[derive(Debug, Clone, Default)]
pub struct PendingInput {
    lines: Arc<Mutex<VecDeque<String>>>,
}

impl PendingInput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Trims `raw` and appends it to the back of the queue.
    ///
    /// Blank lines are stored too; [`PendingInput::try_dequeue`] discards them.
    pub fn enqueue_line(&self, raw: &str) {
        let line = raw.trim().to_string();
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(line);
    }

    /// Pops the oldest non-blank line, discarding any blank lines in front of
    /// it.  Returns `None` when the queue holds nothing else.
    pub fn try_dequeue(&self) -> Option<String> {
        let mut lines = self.lines.lock().unwrap_or_else(PoisonError::into_inner);
        while let Some(line) = lines.pop_front() {
            let trimmed = line.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
        None
    }

    /// Number of queued entries, blank ones included.
    pub fn len(&self) -> usize {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Spawns the dedicated reader thread that feeds `queue` from `source`.
///
/// The thread stops when:
/// - `shutdown` is observed set after a read completes, or
/// - the source reaches end-of-stream or fails.  In that case it triggers
///   `shutdown` itself, unless shutdown was already under way, where a failed
///   read is expected and is not reported as an error.
///
/// # Errors
///
/// Returns the OS error if the thread cannot be spawned.
pub fn spawn_line_reader<R>(
    source: R,
    queue: PendingInput,
    shutdown: ShutdownSignal,
) -> std::io::Result<JoinHandle<()>>
where
    R: BufRead + Send + 'static,
{
    std::thread::Builder::new()
        .name("console-input".to_string())
        .spawn(move || read_lines(source, &queue, &shutdown))
}

fn read_lines<R: BufRead>(mut source: R, queue: &PendingInput, shutdown: &ShutdownSignal) {
    // Invalid UTF-8 is decoded lossily; only EOF or an I/O error ends input.
    let mut line = Vec::new();
    while !shutdown.is_triggered() {
        line.clear();
        match source.read_until(b'\n', &mut line) {
            Ok(0) => {
                if shutdown.trigger() {
                    info!("end of console input, quitting");
                } else {
                    debug!("console input closed during shutdown");
                }
                return;
            }
            Ok(_) => queue.enqueue_line(&String::from_utf8_lossy(&line)),
            Err(e) => {
                if shutdown.trigger() {
                    warn!("failed to read console input, quitting: {e}");
                } else {
                    debug!("console read failed during shutdown: {e}");
                }
                return;
            }
        }
    }
}
