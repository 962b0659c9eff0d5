use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

const IDLE: u64 = 0;
/// Reported between the start of a pass and its first finished region.
const STARTED: u64 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressState {
    Idle,
    /// Number of regions visited so far (at least 1).
    Running(u64),
}

/// Single-flight guard and progress counter for one kind of pass.
///
/// `0` means idle; any other value is the progress of the running pass. The
/// idle-to-running transition is a single compare-and-set, so two callers can
/// never both start.
#[derive(Debug, Default)]
pub struct ProgressGuard {
    state: AtomicU64,
}

impl ProgressGuard {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn state(&self) -> ProgressState {
        match self.state.load(Ordering::Acquire) {
            IDLE => ProgressState::Idle,
            n => ProgressState::Running(n),
        }
    }

    /// Progress readout: `0` when idle.
    pub fn progress(&self) -> u64 {
        self.state.load(Ordering::Acquire)
    }

    /// Claim the guard. `None` when a pass is already running.
    pub fn try_start(self: &Arc<Self>) -> Option<PassTicket> {
        self.state
            .compare_exchange(IDLE, STARTED, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| PassTicket {
                guard: Arc::clone(self),
            })
    }
}

/// Proof of a running pass. Dropping it returns the guard to idle, including
/// when the pass task panics.
#[derive(Debug)]
pub struct PassTicket {
    guard: Arc<ProgressGuard>,
}

impl PassTicket {
    /// Record that the region at loop `index` has been visited.
    pub fn advance(&self, index: usize) {
        let visited = (index as u64).saturating_add(1).max(STARTED);
        self.guard.state.fetch_max(visited, Ordering::AcqRel);
    }
}

impl Drop for PassTicket {
    fn drop(&mut self) {
        self.guard.state.store(IDLE, Ordering::Release);
    }
}
