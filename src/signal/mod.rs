//! Interrupt handling (SIGINT, Ctrl-C)
//!
//! The compiler child shares our process group, so it receives the same
//! signal and exits on its own. We only record that the interrupt happened:
//! 1. First signal: mark the invocation interrupted. The orchestrator waits
//!    for the child, commits nothing, and exits with code 130.
//! 2. Second signal: exit immediately with code 130. Staging directories left
//!    behind are removed later by housekeeping.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;

/// Exit code reported for an interrupted invocation
pub const EXIT_CODE_INTERRUPTED: i32 = 130;

/// Interrupt state shared between the handler and the orchestrator
#[derive(Debug, Default)]
pub struct SignalState {
    interrupted: AtomicBool,
    signal_count: AtomicU8,
}

impl SignalState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether an interrupt has been received
    pub fn is_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::SeqCst)
    }

    /// Number of signals received so far (saturating)
    pub fn signal_count(&self) -> u8 {
        self.signal_count.load(Ordering::SeqCst)
    }

    /// Record a signal and decide what to do about it
    pub fn handle_signal(&self) -> SignalAction {
        let previous = self
            .signal_count
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| Some(n.saturating_add(1)))
            .unwrap_or(u8::MAX);
        self.interrupted.store(true, Ordering::SeqCst);

        if previous == 0 {
            SignalAction::RecordInterrupt
        } else {
            SignalAction::ImmediateExit
        }
    }
}

/// Action to take after receiving a signal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalAction {
    /// Let the child finish, then skip the commit
    RecordInterrupt,
    /// Give up at once
    ImmediateExit,
}

/// Installs the process-wide handler
#[derive(Debug, Default)]
pub struct SignalHandler {
    state: Arc<SignalState>,
}

impl SignalHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(state: Arc<SignalState>) -> Self {
        Self { state }
    }

    pub fn state(&self) -> Arc<SignalState> {
        Arc::clone(&self.state)
    }

    /// Install the handler. Must be called at most once per process.
    pub fn install(&self) -> Result<(), ctrlc::Error> {
        let state = Arc::clone(&self.state);
        ctrlc::set_handler(move || {
            if state.handle_signal() == SignalAction::ImmediateExit {
                std::process::exit(EXIT_CODE_INTERRUPTED);
            }
        })
    }
}
