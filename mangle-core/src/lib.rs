#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

//! The object graph and operation engine.
//!
//! User declarations are compiled into shared, reference counted objects:
//! [`Field`]s and [`Interface`]s are the named base resources, [`Operation`]s bind fields to
//! packet bytes, literals or named [`State`], [`Rule`]s group operations, and a [`Process`]
//! attaches an ordered list of [`Route`]s to an input interface. The [`Engine`] owns every
//! registry and runs the dispatcher for each received frame.

use std::fmt;

use serde::Serialize;

mod ack;
mod dispatch;
mod engine;
mod error;
mod field;
mod iface;
mod memref;
mod op;
mod process;
mod registry;
mod rule;

pub use ack::{Ack, AckValue, Mode};
pub use dispatch::{DropReason, Verdict};
pub use engine::{Engine, EngineOptions, Leak, Redefine, ShutdownReport};
pub use error::{Error, ErrorKind};
pub use field::{Field, DEFAULT_MASK};
pub use iface::{IfaceStats, Interface};
pub use memref::{MemRef, State, StateTable, Value};
pub use op::{Binding, OpSpec, Operand, OperandSpec, Operation};
pub use process::{Process, Route};
pub use rule::Rule;

pub use mangle_link::Direction;

/// The kinds of named objects managed by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Entity {
    Field,
    Iface,
    Rule,
    Process,
    State,
}

impl Entity {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Field => "field",
            Self::Iface => "iface",
            Self::Rule => "rule",
            Self::Process => "process",
            Self::State => "state",
        }
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
