//! Lifecycle events and hook return status.

use bitflags::bitflags;

bitflags! {
    /// Bitmask of lifecycle events a hook may be dispatched for.
    ///
    /// A single dispatch call always carries exactly one primary event
    /// (`INIT`, `READ`, `WRITE`, or `CLOSE`); `TIMEOUT` and `SHUTDOWN` are
    /// modifier bits set alongside `CLOSE` to explain why the connection is
    /// closing.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Event: u8 {
        const INIT     = 0b0000_0001;
        const READ     = 0b0000_0010;
        const WRITE    = 0b0000_0100;
        const CLOSE    = 0b0000_1000;
        const TIMEOUT  = 0b0001_0000;
        const SHUTDOWN = 0b0010_0000;
    }
}

/// The outcome of a single hook invocation, and of a full dispatch chain.
///
/// Ordered by precedence: `Ok < Takeover < Done < Close`. Adopting a new
/// status after a dispatch never downgrades away from `Close`, and a fresh
/// `Done` never overwrites an already-recorded `Close`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Status {
    /// Continue to the next hook; if this is the last hook, the chain is
    /// considered fully handled for this event.
    Ok,
    /// This hook needs more bytes (or more time) before it can make
    /// progress. Short-circuits the rest of the current dispatch chain for
    /// this event only; does not affect subsequent events.
    Takeover,
    /// This hook considers the request complete. Triggers a pipelining
    /// reset (if enabled) or a drain-and-close.
    Done,
    /// This hook wants the connection closed. Highest precedence; never
    /// downgraded by a later status in the same event's dispatch.
    Close,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_precedence_ladder() {
        assert!(Status::Ok < Status::Takeover);
        assert!(Status::Takeover < Status::Done);
        assert!(Status::Done < Status::Close);
    }

    #[test]
    fn close_modifier_bits_compose() {
        let ev = Event::CLOSE | Event::TIMEOUT;
        assert!(ev.contains(Event::CLOSE));
        assert!(ev.contains(Event::TIMEOUT));
        assert!(!ev.contains(Event::SHUTDOWN));
    }
}
