use std::{fmt, ops::Deref, sync::Arc};

use mangle_common::ValueError;
use parking_lot::{MappedRwLockReadGuard, RwLockReadGuard};

use crate::{Error, Field, MemRef};

/// What an operand's field is applied to, as declared by the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Binding {
    /// The packet bytes at the field's offset.
    Packet,
    /// A literal, parsed to the field's length.
    Value(String),
    /// A named shared state.
    State(String),
}

/// The declaration of one side of an operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperandSpec {
    pub field: String,
    pub binding: Binding,
}

impl OperandSpec {
    pub fn packet(field: impl Into<String>) -> Self {
        Self { field: field.into(), binding: Binding::Packet }
    }

    pub fn value(field: impl Into<String>, text: impl Into<String>) -> Self {
        Self { field: field.into(), binding: Binding::Value(text.into()) }
    }

    pub fn state(field: impl Into<String>, name: impl Into<String>) -> Self {
        Self { field: field.into(), binding: Binding::State(name.into()) }
    }
}

impl fmt::Display for OperandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.binding {
            Binding::Packet => write!(f, "{}", self.field),
            Binding::Value(text) => write!(f, "{}:{}", self.field, text),
            Binding::State(name) => write!(f, "{}@{}", self.field, name),
        }
    }
}

/// The declaration of an operation: `dest=source`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpSpec {
    pub dest: OperandSpec,
    pub source: OperandSpec,
}

impl OpSpec {
    pub const fn new(dest: OperandSpec, source: OperandSpec) -> Self {
        Self { dest, source }
    }
}

impl fmt::Display for OpSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.dest, self.source)
    }
}

/// One compiled side of an operation. Without a [`MemRef`] the operand addresses the packet.
#[derive(Debug)]
pub struct Operand {
    field: Arc<Field>,
    mem: Option<MemRef>,
}

impl Operand {
    pub const fn new(field: Arc<Field>, mem: Option<MemRef>) -> Self {
        Self { field, mem }
    }

    pub fn field(&self) -> &Arc<Field> {
        &self.field
    }

    pub const fn mem(&self) -> Option<&MemRef> {
        self.mem.as_ref()
    }

    /// Resolves `len` bytes of this operand.
    fn resolve<'a>(&'a self, packet: &'a [u8], len: usize) -> Option<Resolved<'a>> {
        match &self.mem {
            None => self.field.span(packet.len(), len).map(|range| Resolved::Slice(&packet[range])),
            Some(MemRef::Value(value)) => value.bytes().get(..len).map(Resolved::Slice),
            Some(MemRef::State(state)) => {
                RwLockReadGuard::try_map(state.buf.read_recursive(), |buf| buf.get(..len))
                    .ok()
                    .map(Resolved::State)
            }
        }
    }

    fn out_of_bounds(&self, len: usize, plen: usize) -> Error {
        Error::OutOfBounds {
            field: self.field.name().to_string(),
            offset: self.field.offset(),
            len,
            plen,
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.mem {
            None => write!(f, "{}", self.field.name()),
            Some(MemRef::Value(value)) => write!(f, "{}:{}", self.field.name(), value.input()),
            Some(MemRef::State(state)) => write!(f, "{}@{}", self.field.name(), state.name()),
        }
    }
}

enum Resolved<'a> {
    Slice(&'a [u8]),
    State(MappedRwLockReadGuard<'a, [u8]>),
}

impl Deref for Resolved<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match self {
            Self::Slice(slice) => slice,
            Self::State(guard) => &**guard,
        }
    }
}

/// A compiled `(destination, source)` pair.
///
/// Both executions work on `len` bytes: all bytes but the last are compared or copied exactly,
/// the last byte is qualified by the field masks. `len` is zero if either field is empty, which
/// makes the operation a vacuous match and a no-op write.
#[derive(Debug)]
pub struct Operation {
    dest: Operand,
    source: Operand,
    len: usize,
}

impl Operation {
    /// Compiles an operation.
    ///
    /// Bound states are grown to the effective length; a bound literal shorter than the
    /// effective length is rejected.
    pub fn new(dest: Operand, source: Operand) -> Result<Self, Error> {
        let len = match (dest.field.len(), source.field.len()) {
            (0, _) | (_, 0) => 0,
            (d, s) => d.max(s),
        };

        for operand in [&dest, &source] {
            match &operand.mem {
                Some(MemRef::Value(value)) if value.bytes().len() < len => {
                    return Err(ValueError::LengthMismatch {
                        text: value.input().to_string(),
                        expected: len,
                        actual: value.bytes().len(),
                    }
                    .into());
                }
                Some(MemRef::State(state)) => state.grow(len),
                _ => {}
            }
        }

        Ok(Self { dest, source, len })
    }

    pub const fn dest(&self) -> &Operand {
        &self.dest
    }

    pub const fn source(&self) -> &Operand {
        &self.source
    }

    /// The number of bytes this operation compares or copies.
    pub const fn len(&self) -> usize {
        self.len
    }

    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Compares destination and source. Fails closed: an operand that can't be resolved in
    /// `packet` is a mismatch.
    pub fn matches(&self, packet: &[u8]) -> bool {
        if self.len == 0 {
            return true;
        }

        let (Some(dest), Some(source)) =
            (self.dest.resolve(packet, self.len), self.source.resolve(packet, self.len))
        else {
            return false;
        };

        let last = self.len - 1;
        dest[..last] == source[..last] &&
            dest[last] & self.dest.field.mask() == source[last] & self.source.field.mask()
    }

    /// Copies the source into the destination.
    ///
    /// The last byte keeps the destination bits outside the destination mask and takes the
    /// source bits enabled by both masks. `scratch` holds a copy of the source so that
    /// overlapping ranges and shared states behave as if read before writing.
    pub fn write(&self, packet: &mut [u8], scratch: &mut Vec<u8>) -> Result<(), Error> {
        if self.len == 0 {
            return Ok(());
        }

        let plen = packet.len();
        scratch.clear();
        {
            let source = self
                .source
                .resolve(packet, self.len)
                .ok_or_else(|| self.source.out_of_bounds(self.len, plen))?;
            scratch.extend_from_slice(&source);
        }

        let dmask = self.dest.field.mask();
        let smask = self.source.field.mask();

        match &self.dest.mem {
            None => {
                let range = self
                    .dest
                    .field
                    .span(plen, self.len)
                    .ok_or_else(|| self.dest.out_of_bounds(self.len, plen))?;
                apply(&mut packet[range], scratch, dmask, smask);
            }
            Some(MemRef::State(state)) => {
                let mut buf = state.buf.write();
                let dest =
                    buf.get_mut(..self.len).ok_or_else(|| self.dest.out_of_bounds(self.len, plen))?;
                apply(dest, scratch, dmask, smask);
            }
            Some(MemRef::Value(value)) => {
                return Err(Error::Malformed(format!(
                    "cannot write to literal {}:{}",
                    self.dest.field.name(),
                    value.input()
                )));
            }
        }

        Ok(())
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.dest, self.source)
    }
}

fn apply(dest: &mut [u8], source: &[u8], dmask: u8, smask: u8) {
    let last = dest.len() - 1;
    dest[..last].copy_from_slice(&source[..last]);
    dest[last] = (dest[last] & !dmask) | (source[last] & dmask & smask);
}
