use std::{
    fmt,
    sync::{Arc, Weak},
};

use mangle_common::{value, ValueError};
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use tracing::debug;

use crate::Field;

/// A byte buffer an operand is bound to instead of the packet.
#[derive(Debug)]
pub enum MemRef {
    /// A private literal, parsed once.
    Value(Value),
    /// A named buffer shared by every operand bound to the same state name.
    State(Arc<State>),
}

impl MemRef {
    pub fn len(&self) -> usize {
        match self {
            Self::Value(value) => value.bytes().len(),
            Self::State(state) => state.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A literal value, sized by the field it was parsed for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Value {
    /// The text as given by the user.
    input: String,
    /// Canonical hex rendering of `bytes`.
    rendered: String,
    bytes: Box<[u8]>,
}

impl Value {
    /// Parses `text` into a buffer of `field.len()` bytes.
    pub fn new(field: &Field, text: &str) -> Result<Self, ValueError> {
        let bytes = value::parse(text, field.len())?;
        Ok(Self { input: text.to_string(), rendered: value::render(&bytes), bytes: bytes.into() })
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn rendered(&self) -> &str {
        &self.rendered
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}

/// Named mutable state.
///
/// Holders share the same buffer, so a write through one operand is observed by every other
/// operand bound to the same name. The buffer only ever grows.
pub struct State {
    name: String,
    pub(crate) buf: RwLock<Vec<u8>>,
}

impl fmt::Debug for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("State").field("name", &self.name).field("len", &self.len()).finish()
    }
}

impl State {
    fn new(name: &str, len: usize) -> Self {
        Self { name: name.to_string(), buf: RwLock::new(vec![0; len]) }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.buf.read_recursive().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns a copy of the current contents.
    pub fn snapshot(&self) -> Vec<u8> {
        self.buf.read_recursive().clone()
    }

    /// Grows the buffer to at least `len` bytes, zero filling the new tail.
    pub fn grow(&self, len: usize) {
        let mut buf = self.buf.write();
        if buf.len() < len {
            debug!(state = %self.name, from = buf.len(), to = len, "growing state");
            buf.resize(len, 0);
        }
    }
}

/// The global table of named states.
///
/// Entries are weak: a state is deregistered and freed as soon as its last holder releases it.
#[derive(Debug, Default)]
pub struct StateTable {
    states: FxHashMap<String, Weak<State>>,
}

impl StateTable {
    /// Returns the state `name` with a buffer of at least `len` bytes, creating it if needed.
    pub fn acquire(&mut self, name: &str, len: usize) -> Arc<State> {
        if let Some(state) = self.states.get(name).and_then(Weak::upgrade) {
            state.grow(len);
            return state;
        }

        debug!(state = %name, len, "creating state");
        let state = Arc::new(State::new(name, len));
        self.states.insert(name.to_string(), Arc::downgrade(&state));
        state
    }

    /// Looks up a live state. The returned handle counts as a reference while held.
    pub fn get(&self, name: &str) -> Option<Arc<State>> {
        self.states.get(name).and_then(Weak::upgrade)
    }

    /// Drops the entries of released states.
    pub fn purge(&mut self) {
        self.states.retain(|_, state| state.strong_count() > 0);
    }

    /// All live states, sorted by name.
    pub fn live(&self) -> Vec<Arc<State>> {
        let mut states: Vec<_> = self.states.values().filter_map(Weak::upgrade).collect();
        states.sort_by(|a, b| a.name.cmp(&b.name));
        states
    }

    /// Number of registered entries, including released ones that haven't been purged yet.
    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub(crate) fn clear(&mut self) {
        self.states.clear();
    }
}
