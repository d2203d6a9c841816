use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use crate::{Interface, Rule};

/// A `(rule, output interface)` pair of a [`Process`].
#[derive(Debug)]
pub struct Route {
    rule: Arc<Rule>,
    output: Arc<Interface>,
    hits: AtomicU64,
}

impl Route {
    pub fn new(rule: Arc<Rule>, output: Arc<Interface>) -> Self {
        Self { rule, output, hits: AtomicU64::new(0) }
    }

    pub fn rule(&self) -> &Arc<Rule> {
        &self.rule
    }

    pub fn output(&self) -> &Arc<Interface> {
        &self.output
    }

    /// Number of packets whose match operations selected this route.
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    #[inline]
    pub(crate) fn increment_hits(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }
}

/// The dispatch program of one input interface: an ordered list of [`Route`]s.
#[derive(Debug)]
pub struct Process {
    input: Arc<Interface>,
    routes: Vec<Route>,
}

impl Process {
    pub fn new(input: Arc<Interface>, routes: Vec<Route>) -> Self {
        Self { input, routes }
    }

    pub fn input(&self) -> &Arc<Interface> {
        &self.input
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }
}
