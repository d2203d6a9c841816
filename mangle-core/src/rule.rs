use crate::{registry::Named, Error, Operation};

/// A named, ordered set of match operations (all must hold) and write operations (applied in
/// order).
#[derive(Debug)]
pub struct Rule {
    name: String,
    matches: Vec<Operation>,
    writes: Vec<Operation>,
}

impl Rule {
    pub fn new(name: impl Into<String>, matches: Vec<Operation>, writes: Vec<Operation>) -> Self {
        Self { name: name.into(), matches, writes }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn match_ops(&self) -> &[Operation] {
        &self.matches
    }

    pub fn write_ops(&self) -> &[Operation] {
        &self.writes
    }

    /// Returns `true` if every match operation holds. Stops at the first one that doesn't.
    pub fn matches(&self, packet: &[u8]) -> bool {
        self.matches.iter().all(|op| op.matches(packet))
    }

    /// Runs the write operations in order, stopping at the first failure.
    ///
    /// On failure the packet may already be partially rewritten.
    pub fn apply(&self, packet: &mut [u8], scratch: &mut Vec<u8>) -> Result<(), Error> {
        for op in &self.writes {
            op.write(packet, scratch)?;
        }

        Ok(())
    }
}

impl Named for Rule {
    fn name(&self) -> &str {
        &self.name
    }
}
