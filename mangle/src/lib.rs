#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

//! Userspace packet inspection and mangling.
//!
//! Frames received on the interfaces registered with the [`Engine`] are matched against the
//! rules of the process bound to their input interface and, on the first match, rewritten and
//! forwarded. The [`Driver`] runs the engine on a single task, interleaving control commands
//! and frames.

use std::io;

use thiserror::Error;

mod driver;
mod exec;
mod stats;

pub use driver::{Driver, DriverOptions};
pub use exec::execute;
pub use stats::DriverStats;

pub use mangle_common::{num, value, ValueError};
pub use mangle_core::*;
pub use mangle_link::{Binder, Frame, Link, LinkError, MemBinder, MemHub, DEFAULT_QUEUE_SIZE};
#[cfg(target_os = "linux")]
pub use mangle_link::RawBinder;
pub use mangle_wire::{Command, ControlCodec, Reply, ReplyCodec, Request, WireError, DEFAULT_MAX_LINE_LENGTH};

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("IO error: {0:?}")]
    Io(#[from] io::Error),
    #[error("Wire error: {0}")]
    Wire(#[from] WireError),
}
