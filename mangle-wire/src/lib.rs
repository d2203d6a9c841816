#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

//! The textual control protocol.
//!
//! [`ControlCodec`] decodes one command per line, [`ReplyCodec`] encodes acknowledgements and
//! errors as YAML sequence items, one per line, each holding a JSON flow mapping.

use std::io;

use thiserror::Error;

mod command;
mod control;
mod lex;
mod reply;

pub use command::{Command, Target};
pub use control::{ControlCodec, Request, DEFAULT_MAX_LINE_LENGTH};
pub use reply::{Reply, ReplyCodec};

#[derive(Debug, Error)]
pub enum WireError {
    #[error("IO error: {0:?}")]
    Io(#[from] io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("line {line}: {reason}")]
    Malformed { line: usize, reason: String },
}
