use std::fmt;

use tracing::{debug, warn};

use crate::Process;

/// Why a packet was not forwarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DropReason {
    /// The frame arrived on an interface that is not registered (anymore).
    UnknownInterface,
    /// Egress frames are counted but never dispatched.
    Egress,
    /// No process is registered on the input interface.
    NoProcess,
    /// No route's rule matched.
    NoMatch,
    /// A write operation of the matching rule failed, the packet may be partially rewritten.
    WriteFailed,
    /// The output interface failed to send.
    SendFailed,
}

impl DropReason {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::UnknownInterface => "unknown_interface",
            Self::Egress => "egress",
            Self::NoProcess => "no_process",
            Self::NoMatch => "no_match",
            Self::WriteFailed => "write_failed",
            Self::SendFailed => "send_failed",
        }
    }
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The outcome of dispatching one packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Forwarded through the route at this index of the process.
    Forwarded { route: usize },
    Dropped(DropReason),
}

impl Verdict {
    pub const fn is_forwarded(&self) -> bool {
        matches!(self, Self::Forwarded { .. })
    }
}

impl Process {
    /// Runs this process against `packet`.
    ///
    /// Routes are evaluated in declaration order and the first route whose rule matches wins:
    /// its writes are applied and the packet is sent to its output. A failed write drops the
    /// packet without considering later routes.
    pub fn dispatch(&self, packet: &mut [u8], scratch: &mut Vec<u8>) -> Verdict {
        for (index, route) in self.routes().iter().enumerate() {
            let rule = route.rule();
            if !rule.matches(packet) {
                continue;
            }

            route.increment_hits();

            if let Err(e) = rule.apply(packet, scratch) {
                warn!(rule = %rule.name(), input = %self.input().name(), "write failed, dropping packet: {}", e);
                return Verdict::Dropped(DropReason::WriteFailed);
            }

            let output = route.output();
            if let Err(e) = output.send(packet) {
                warn!(rule = %rule.name(), output = %output.name(), "send failed, dropping packet: {}", e);
                return Verdict::Dropped(DropReason::SendFailed);
            }

            debug!(rule = %rule.name(), output = %output.name(), len = packet.len(), "forwarded");
            return Verdict::Forwarded { route: index };
        }

        Verdict::Dropped(DropReason::NoMatch)
    }
}
