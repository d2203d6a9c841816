use std::ops::Range;

use crate::registry::Named;

/// The trailing-byte mask of a field declared without one.
pub const DEFAULT_MASK: u8 = 0xff;

/// A named byte range within a packet.
///
/// Negative offsets count from the end of the packet. Only the last byte of the range is
/// subject to `mask`; a zero mask is normalized to [`DEFAULT_MASK`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    name: String,
    offset: i32,
    len: u16,
    mask: u8,
}

impl Field {
    pub fn new(name: impl Into<String>, offset: i32, len: u16, mask: u8) -> Self {
        let mask = if mask == 0 { DEFAULT_MASK } else { mask };
        Self { name: name.into(), offset, len, mask }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub const fn offset(&self) -> i32 {
        self.offset
    }

    pub const fn len(&self) -> usize {
        self.len as usize
    }

    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub const fn mask(&self) -> u8 {
        self.mask
    }

    /// Returns `true` if `other` describes the same range and mask.
    pub fn same_shape(&self, other: &Self) -> bool {
        self.offset == other.offset && self.len == other.len && self.mask == other.mask
    }

    /// Resolves `len` bytes at this field's offset within a packet of `plen` bytes.
    ///
    /// Returns `None` if the range starts before the packet or runs past its end.
    pub fn span(&self, plen: usize, len: usize) -> Option<Range<usize>> {
        let plen = i64::try_from(plen).ok()?;
        let start = if self.offset < 0 { plen + i64::from(self.offset) } else { i64::from(self.offset) };
        let end = start.checked_add(i64::try_from(len).ok()?)?;

        if start < 0 || end > plen {
            return None;
        }

        Some(start as usize..end as usize)
    }
}

impl Named for Field {
    fn name(&self) -> &str {
        &self.name
    }
}
