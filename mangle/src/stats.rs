use std::sync::atomic::{AtomicU64, Ordering};

/// Statistics for a driver.
/// These are shared between the driver task and its owner.
#[derive(Debug, Default)]
pub struct DriverStats {
    /// Control commands applied successfully
    commands: AtomicU64,
    /// Control commands that failed to parse or apply
    failed_commands: AtomicU64,
    /// Frames received from links
    frames: AtomicU64,
    /// Frames forwarded by a route
    forwarded: AtomicU64,
}

impl DriverStats {
    #[inline]
    pub(crate) fn increment_commands(&self) {
        self.commands.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn increment_failed_commands(&self) {
        self.failed_commands.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn increment_frames(&self, forwarded: bool) {
        self.frames.fetch_add(1, Ordering::Relaxed);
        if forwarded {
            self.forwarded.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[inline]
    pub fn commands(&self) -> u64 {
        self.commands.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn failed_commands(&self) -> u64 {
        self.failed_commands.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn frames(&self) -> u64 {
        self.frames.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn forwarded(&self) -> u64 {
        self.forwarded.load(Ordering::Relaxed)
    }
}
