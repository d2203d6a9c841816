#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

//! The packet I/O boundary of the engine.
//!
//! A [`Binder`] opens [`Link`]s by interface name. Frames received on an open link are delivered
//! to the engine over the channel the binder was created with, tagged with the interface name and
//! the [`Direction`] they were observed in.

use std::{fmt, io, sync::Arc};

use bytes::BytesMut;
use thiserror::Error;

pub mod mem;
#[cfg(target_os = "linux")]
pub mod raw;

pub use mem::{MemBinder, MemHub};
#[cfg(target_os = "linux")]
pub use raw::RawBinder;

/// The default capacity of the frame channel between links and the engine.
pub const DEFAULT_QUEUE_SIZE: usize = 1024;

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("IO error: {0:?}")]
    Io(#[from] io::Error),
    #[error("No such interface: {0}")]
    NoSuchInterface(String),
    #[error("Send buffer full")]
    BufferFull,
    #[error("Link closed")]
    Closed,
}

/// Whether a frame was received by the interface or observed leaving it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Ingress,
    Egress,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ingress => f.write_str("ingress"),
            Self::Egress => f.write_str("egress"),
        }
    }
}

/// A frame delivered by a link.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Name of the interface the frame was observed on.
    pub iface: Arc<str>,
    pub direction: Direction,
    /// The raw frame, starting at the link-layer header.
    pub data: BytesMut,
}

impl Frame {
    pub fn new(iface: Arc<str>, direction: Direction, data: BytesMut) -> Self {
        Self { iface, direction, data }
    }
}

/// An open handle to a network interface.
///
/// Dropping the last handle closes the interface and stops its receiver.
pub trait Link: Send + Sync + fmt::Debug + 'static {
    /// The interface name.
    fn name(&self) -> &str;

    /// Sends a single frame out of the interface.
    fn send(&self, frame: &[u8]) -> Result<(), LinkError>;
}

/// Opens links by interface name.
pub trait Binder: Send + fmt::Debug + 'static {
    fn open(&mut self, name: &str) -> Result<Arc<dyn Link>, LinkError>;
}
