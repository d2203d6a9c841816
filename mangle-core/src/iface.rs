use std::{
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use mangle_link::Link;

use crate::{registry::Named, Error};

/// Per-interface packet counters.
#[derive(Debug, Default)]
pub struct IfaceStats {
    /// Ingress frames received
    rx: AtomicU64,
    /// Ingress bytes received
    rx_bytes: AtomicU64,
    /// Frames sent
    tx: AtomicU64,
    /// Bytes sent
    tx_bytes: AtomicU64,
    /// Ingress frames that were not forwarded
    dropped: AtomicU64,
    /// Egress frames observed (never dispatched)
    egress: AtomicU64,
}

impl IfaceStats {
    #[inline]
    pub(crate) fn increment_rx(&self, bytes: usize) {
        self.rx.fetch_add(1, Ordering::Relaxed);
        self.rx_bytes.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn increment_tx(&self, bytes: usize) {
        self.tx.fetch_add(1, Ordering::Relaxed);
        self.tx_bytes.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn increment_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn increment_egress(&self) {
        self.egress.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn rx(&self) -> u64 {
        self.rx.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn rx_bytes(&self) -> u64 {
        self.rx_bytes.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn tx(&self) -> u64 {
        self.tx.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn tx_bytes(&self) -> u64 {
        self.tx_bytes.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn egress(&self) -> u64 {
        self.egress.load(Ordering::Relaxed)
    }
}

/// A named handle to a network interface.
pub struct Interface {
    name: String,
    link: Arc<dyn Link>,
    stats: IfaceStats,
}

impl fmt::Debug for Interface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Interface").field("name", &self.name).field("stats", &self.stats).finish()
    }
}

impl Interface {
    pub fn new(name: impl Into<String>, link: Arc<dyn Link>) -> Self {
        Self { name: name.into(), link, stats: IfaceStats::default() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stats(&self) -> &IfaceStats {
        &self.stats
    }

    /// Sends a frame out of this interface.
    pub fn send(&self, frame: &[u8]) -> Result<(), Error> {
        self.link.send(frame)?;
        self.stats.increment_tx(frame.len());
        Ok(())
    }
}

impl Named for Interface {
    fn name(&self) -> &str {
        &self.name
    }
}
