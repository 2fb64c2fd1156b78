//! Wall-clock watchdog for blocking FFmpeg calls.
//!
//! FFmpeg polls an interrupt callback while it blocks inside demuxer I/O.
//! [`Watchdog`] is the state behind that callback: a session arms it with a
//! budget right before a blocking open or read, and the callback asks FFmpeg
//! to abort once the elapsed time exceeds the budget. The aborted call then
//! returns an error that the session reports as
//! [`FrameSeekError::Timeout`](crate::FrameSeekError::Timeout).
//!
//! The watchdog lives in a `Box` owned by the session so its address stays
//! stable for as long as the format context that points at it.

use std::os::raw::{c_int, c_void};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use ffmpeg_sys_next::AVIOInterruptCB;

/// Default budget for opening a source.
pub const DEFAULT_OPEN_TIMEOUT: Duration = Duration::from_millis(30_000);
/// Default budget for a single `grab`.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(30_000);

/// Deadline state polled by FFmpeg's interrupt callback.
#[derive(Debug)]
pub struct Watchdog {
    epoch: Instant,
    /// Nanoseconds since `epoch` at which the current budget started.
    armed_at: AtomicU64,
    /// Budget in milliseconds; zero means disarmed.
    budget_ms: AtomicU64,
    fired: AtomicBool,
}

impl Default for Watchdog {
    fn default() -> Self {
        Self::new()
    }
}

impl Watchdog {
    /// Create a disarmed watchdog.
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
            armed_at: AtomicU64::new(0),
            budget_ms: AtomicU64::new(0),
            fired: AtomicBool::new(false),
        }
    }

    /// Start a new budget from now. A zero budget disarms the watchdog.
    pub fn arm(&self, budget: Duration) {
        let now = self.epoch.elapsed().as_nanos() as u64;
        self.armed_at.store(now, Ordering::Release);
        self.fired.store(false, Ordering::Release);
        self.budget_ms
            .store(budget.as_millis() as u64, Ordering::Release);
    }

    /// Stop polling; a fired flag stays set until the next [`arm`](Self::arm).
    pub fn disarm(&self) {
        self.budget_ms.store(0, Ordering::Release);
    }

    /// The budget currently armed, in milliseconds (zero when disarmed).
    pub fn budget_ms(&self) -> u64 {
        self.budget_ms.load(Ordering::Acquire)
    }

    /// Whether the current budget has been exceeded at least once.
    pub fn has_fired(&self) -> bool {
        self.fired.load(Ordering::Acquire)
    }

    /// Poll the deadline, latching the fired flag when it has passed.
    pub fn check(&self) -> bool {
        let budget_ms = self.budget_ms.load(Ordering::Acquire);
        if budget_ms == 0 {
            return false;
        }
        let armed_at = self.armed_at.load(Ordering::Acquire);
        let now = self.epoch.elapsed().as_nanos() as u64;
        let elapsed_ms = now.saturating_sub(armed_at) / 1_000_000;
        if elapsed_ms > budget_ms {
            self.fired.store(true, Ordering::Release);
            return true;
        }
        false
    }

    /// Build the FFmpeg callback descriptor pointing at this watchdog.
    ///
    /// The watchdog must outlive every format context the descriptor is
    /// installed on.
    pub(crate) fn callback(&self) -> AVIOInterruptCB {
        AVIOInterruptCB {
            callback: Some(interrupt_callback),
            opaque: self as *const Watchdog as *mut c_void,
        }
    }
}

unsafe extern "C" fn interrupt_callback(opaque: *mut c_void) -> c_int {
    if opaque.is_null() {
        return 0;
    }
    // SAFETY: `opaque` was produced by `Watchdog::callback` and the owning
    // session keeps the boxed watchdog alive longer than the format context.
    let watchdog = unsafe { &*(opaque as *const Watchdog) };
    if watchdog.check() { 1 } else { 0 }
}
