use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Weak,
};

use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHashSet};
use tokio::sync::mpsc;
use tracing::debug;

use crate::{Binder, Direction, Frame, Link, LinkError};

/// In-memory links. Frames are injected and inspected through the binder's [`MemHub`].
#[derive(Debug)]
pub struct MemBinder {
    hub: MemHub,
    /// If set, only these interface names can be opened.
    allowed: Option<FxHashSet<String>>,
}

impl MemBinder {
    pub fn new(to_engine: mpsc::Sender<Frame>) -> Self {
        Self {
            hub: MemHub { ports: Arc::new(Mutex::new(FxHashMap::default())), to_engine },
            allowed: None,
        }
    }

    /// Restricts the interfaces that can be opened to `names`.
    pub fn only<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed = Some(names.into_iter().map(Into::into).collect());
        self
    }

    /// Returns a handle for injecting and inspecting frames.
    pub fn hub(&self) -> MemHub {
        self.hub.clone()
    }
}

impl Binder for MemBinder {
    fn open(&mut self, name: &str) -> Result<Arc<dyn Link>, LinkError> {
        if let Some(ref allowed) = self.allowed {
            if !allowed.contains(name) {
                return Err(LinkError::NoSuchInterface(name.to_string()));
            }
        }

        let port = Arc::clone(self.hub.ports.lock().entry(name.to_string()).or_default());
        let link = Arc::new(MemLink { name: name.to_string(), port: Arc::clone(&port) });
        *port.open.lock() = Arc::downgrade(&link);

        debug!(iface = %name, "opened memory link");

        Ok(link)
    }
}

#[derive(Debug, Default)]
struct Port {
    sent: Mutex<Vec<Bytes>>,
    down: AtomicBool,
    open: Mutex<Weak<MemLink>>,
}

/// Shared view over the memory links of a [`MemBinder`].
#[derive(Debug, Clone)]
pub struct MemHub {
    ports: Arc<Mutex<FxHashMap<String, Arc<Port>>>>,
    to_engine: mpsc::Sender<Frame>,
}

impl MemHub {
    fn port(&self, iface: &str) -> Option<Arc<Port>> {
        self.ports.lock().get(iface).cloned()
    }

    /// Delivers a frame to the engine as if it had been observed on `iface`.
    pub fn inject(&self, iface: &str, direction: Direction, data: &[u8]) -> Result<(), LinkError> {
        if !self.is_open(iface) {
            return Err(LinkError::Closed);
        }

        self.to_engine
            .try_send(Frame::new(Arc::from(iface), direction, BytesMut::from(data)))
            .map_err(|_| LinkError::BufferFull)
    }

    /// Returns the frames sent on `iface` so far.
    pub fn sent(&self, iface: &str) -> Vec<Bytes> {
        self.port(iface).map(|port| port.sent.lock().clone()).unwrap_or_default()
    }

    /// Returns and clears the frames sent on `iface` so far.
    pub fn take_sent(&self, iface: &str) -> Vec<Bytes> {
        self.port(iface).map(|port| std::mem::take(&mut *port.sent.lock())).unwrap_or_default()
    }

    /// Makes sends on `iface` fail while `down` is set.
    pub fn set_down(&self, iface: &str, down: bool) {
        if let Some(port) = self.port(iface) {
            port.down.store(down, Ordering::Relaxed);
        }
    }

    /// Returns `true` while a link for `iface` is held open.
    pub fn is_open(&self, iface: &str) -> bool {
        self.port(iface).map_or(false, |port| port.open.lock().strong_count() > 0)
    }
}

#[derive(Debug)]
struct MemLink {
    name: String,
    port: Arc<Port>,
}

impl Link for MemLink {
    fn name(&self) -> &str {
        &self.name
    }

    fn send(&self, frame: &[u8]) -> Result<(), LinkError> {
        if self.port.down.load(Ordering::Relaxed) {
            return Err(LinkError::Closed);
        }

        self.port.sent.lock().push(Bytes::copy_from_slice(frame));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn inject_and_send() {
        let _ = tracing_subscriber::fmt::try_init();
        let (tx, mut rx) = mpsc::channel(8);
        let mut binder = MemBinder::new(tx);
        let hub = binder.hub();

        assert!(hub.inject("eth0", Direction::Ingress, &[1, 2, 3]).is_err());

        let link = binder.open("eth0").unwrap();
        hub.inject("eth0", Direction::Ingress, &[1, 2, 3]).unwrap();

        let frame = rx.recv().await.unwrap();
        assert_eq!(&*frame.iface, "eth0");
        assert_eq!(frame.direction, Direction::Ingress);
        assert_eq!(&frame.data[..], &[1, 2, 3]);

        link.send(&[4, 5]).unwrap();
        assert_eq!(hub.sent("eth0"), vec![Bytes::from_static(&[4, 5])]);

        hub.set_down("eth0", true);
        assert!(link.send(&[6]).is_err());
        assert_eq!(hub.take_sent("eth0").len(), 1);
        assert!(hub.sent("eth0").is_empty());

        drop(link);
        assert!(!hub.is_open("eth0"));
    }

    #[test]
    fn restricted_names() {
        let (tx, _rx) = mpsc::channel(8);
        let mut binder = MemBinder::new(tx).only(["eth0"]);

        assert!(binder.open("eth0").is_ok());
        assert!(matches!(binder.open("eth1"), Err(LinkError::NoSuchInterface(_))));
    }
}
