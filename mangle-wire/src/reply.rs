use bytes::{BufMut, BytesMut};
use mangle_core::{Ack, ErrorKind};
use serde::{ser::SerializeMap, Serialize, Serializer};
use tokio_util::codec::Encoder;

use crate::WireError;

/// A reply to one control command.
///
/// Serializes as a single entry map from the mode (or `error`) to the record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Ack(Ack),
    Error {
        kind: ErrorKind,
        /// The command line that failed.
        cmd: String,
        msg: String,
    },
}

impl From<Ack> for Reply {
    fn from(ack: Ack) -> Self {
        Self::Ack(ack)
    }
}

#[derive(Serialize)]
struct ErrorRecord<'a> {
    kind: ErrorKind,
    cmd: &'a str,
    msg: &'a str,
}

impl Serialize for Reply {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        match self {
            Self::Ack(ack) => map.serialize_entry(&ack.mode, ack)?,
            Self::Error { kind, cmd, msg } => {
                map.serialize_entry("error", &ErrorRecord { kind: *kind, cmd, msg })?
            }
        }
        map.end()
    }
}

impl Reply {
    /// Renders the reply as a single sequence item, without line terminator.
    ///
    /// The record is emitted as a JSON object, which is also a YAML flow mapping, so every
    /// name and message stays a string for YAML readers.
    pub fn render(&self) -> Result<String, WireError> {
        Ok(format!("- {}", serde_json::to_string(self)?))
    }
}

/// Encodes [`Reply`]s as newline terminated sequence items.
#[derive(Debug, Default)]
pub struct ReplyCodec;

impl ReplyCodec {
    pub fn new() -> Self {
        Self
    }
}

impl Encoder<Reply> for ReplyCodec {
    type Error = WireError;

    fn encode(&mut self, item: Reply, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.reserve(64);
        dst.put_slice(b"- ");
        serde_json::to_writer(BufMut::writer(&mut *dst), &item)?;
        dst.put_u8(b'\n');
        Ok(())
    }
}
