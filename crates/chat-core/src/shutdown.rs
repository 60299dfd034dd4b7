//! Process-wide shutdown signal and the hard-stop escape hatch.
//!
//! # Why a shared signal? (for beginners)
//!
//! Several independent loops need to agree on "we are quitting now": the main
//! event loop, the console reader thread, and the Ctrl-C handler.  Instead of
//! a global `static mut` flag, each of them holds a clone of one
//! [`ShutdownSignal`].  Cloning is cheap (`Arc` under the hood) and every clone
//! observes the same flag.
//!
//! The flag only ever goes from "running" to "shutting down".  There is no
//! way to reset it.

use std::io::Write;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

/// One-way cooperative cancellation flag shared across threads and tasks.
#[derive(Debug, Clone, Default)]
pub struct ShutdownSignal {
    triggered: Arc<AtomicBool>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests shutdown.
    ///
    /// Returns `true` if this call flipped the flag, `false` if shutdown had
    /// already been requested by someone else.
    pub fn trigger(&self) -> bool {
        !self.triggered.swap(true, Ordering::SeqCst)
    }

    /// Returns `true` once any clone has called [`ShutdownSignal::trigger`].
    pub fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::SeqCst)
    }
}

/// Terminates the process immediately with `code`.
///
/// Used when a thread is parked in a blocking read (stdin) that the standard
/// library gives us no portable way to interrupt.  Buffered stdout/stderr are
/// flushed first so the final log lines are not lost.  Destructors of other
/// threads do not run.
pub fn hard_stop(code: i32) -> ! {
    let _ = std::io::stdout().flush();
    let _ = std::io::stderr().flush();
    std::process::exit(code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_signal_is_not_triggered() {
        assert!(!ShutdownSignal::new().is_triggered());
    }

    #[test]
    fn test_first_trigger_reports_transition() {
        // Arrange
        let signal = ShutdownSignal::new();

        // Act
        let first = signal.trigger();
        let second = signal.trigger();

        // Assert
        assert!(first, "first trigger must flip the flag");
        assert!(!second, "second trigger must report it was already set");
        assert!(signal.is_triggered());
    }

    #[test]
    fn test_clones_share_the_same_flag() {
        let signal = ShutdownSignal::new();
        let clone = signal.clone();
        clone.trigger();
        assert!(signal.is_triggered());
    }

    #[test]
    fn test_trigger_is_visible_across_threads() {
        let signal = ShutdownSignal::new();
        let remote = signal.clone();
        std::thread::spawn(move || {
            remote.trigger();
        })
        .join()
        .expect("thread panicked");
        assert!(signal.is_triggered());
    }
}
