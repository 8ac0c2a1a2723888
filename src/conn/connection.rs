//! Per-connection state: status, method, and the two user-data slots.

use crate::conn::io::ConnIo;
use crate::event::Status;
use std::any::Any;

/// Number of user-data slots a connection carries. Slot 0 is reserved for
/// the application; slot 1 is reserved for the protocol handler (the HTTP
/// parser hook attaches its request/response state there).
pub(crate) const NUM_USERDATA: usize = 2;

pub(crate) const SLOT_APP: usize = 0;
pub(crate) const SLOT_PROTOCOL: usize = 1;

type ReleaseFn = Box<dyn FnOnce(Box<dyn Any + Send>) + Send>;

struct Slot {
    data: Box<dyn Any + Send>,
    release: Option<ReleaseFn>,
}

/// One accepted connection, as seen by hooks.
pub struct Connection {
    pub(crate) io: ConnIo,
    pub(crate) status: Status,
    method: Option<String>,
    slots: [Option<Slot>; NUM_USERDATA],
}

impl Connection {
    pub(crate) fn new(io: ConnIo) -> Self {
        Connection {
            io,
            status: Status::Ok,
            method: None,
            slots: [None, None],
        }
    }

    pub fn method(&self) -> Option<&str> {
        self.method.as_deref()
    }

    pub fn set_method(&mut self, method: impl Into<String>) {
        self.method = Some(method.into());
    }

    pub fn clear_method(&mut self) {
        self.method = None;
    }

    pub fn status(&self) -> Status {
        self.status
    }

    /// Appends bytes to the connection's output buffer; the lifecycle
    /// engine flushes them to the wire at the next write opportunity.
    pub fn queue_output(&mut self, bytes: &[u8]) {
        self.io.queue_output(bytes);
    }

    /// Attaches typed application data to slot 0, replacing (and releasing)
    /// whatever was there before. `release`, if given, runs when the slot is
    /// cleared by [`Connection::reset`] or connection teardown. This is the
    /// only user-data slot application hooks may address directly; slot 1 is
    /// reserved for the protocol handler and reachable only through
    /// [`Connection::protocol_data`]/[`Connection::protocol_data_mut`].
    pub fn set_userdata(&mut self, data: Box<dyn Any + Send>, release: Option<ReleaseFn>) {
        self.set_userdata_at(SLOT_APP, data, release);
    }

    pub fn userdata(&self) -> Option<&(dyn Any + Send)> {
        self.userdata_at(SLOT_APP)
    }

    pub fn userdata_mut(&mut self) -> Option<&mut (dyn Any + Send)> {
        self.userdata_mut_at(SLOT_APP)
    }

    /// Reads the protocol handler's typed state (slot 1), e.g. the HTTP
    /// parser/response builder `http_hook` attaches. Returns `None` if
    /// nothing is attached or `T` doesn't match the attached type.
    pub fn protocol_data<T: Any>(&self) -> Option<&T> {
        self.userdata_at(SLOT_PROTOCOL).and_then(|d| d.downcast_ref::<T>())
    }

    /// Mutable counterpart to [`Connection::protocol_data`], used by
    /// application hooks to drive the response builder the protocol handler
    /// attached.
    pub fn protocol_data_mut<T: Any>(&mut self) -> Option<&mut T> {
        self.userdata_mut_at(SLOT_PROTOCOL).and_then(|d| d.downcast_mut::<T>())
    }

    pub(crate) fn set_userdata_at(
        &mut self,
        slot: usize,
        data: Box<dyn Any + Send>,
        release: Option<ReleaseFn>,
    ) {
        self.release_slot(slot);
        self.slots[slot] = Some(Slot { data, release });
    }

    pub(crate) fn userdata_at(&self, slot: usize) -> Option<&(dyn Any + Send)> {
        self.slots[slot].as_ref().map(|s| &*s.data)
    }

    pub(crate) fn userdata_mut_at(&mut self, slot: usize) -> Option<&mut (dyn Any + Send)> {
        self.slots[slot].as_mut().map(|s| &mut *s.data)
    }

    fn release_slot(&mut self, slot: usize) {
        if let Some(occupied) = self.slots[slot].take() {
            if let Some(release) = occupied.release {
                release(occupied.data);
            }
        }
    }

    /// Releases both user-data slots and clears the method, in preparation
    /// for a pipelining reset (back to a fresh `INIT`).
    pub(crate) fn reset(&mut self) {
        self.release_slot(SLOT_APP);
        self.release_slot(SLOT_PROTOCOL);
        self.method = None;
        self.status = Status::Ok;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conn::io::ConnIo;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    fn test_connection() -> Connection {
        Connection::new(ConnIo::for_test())
    }

    #[test]
    fn release_callback_runs_on_replace_and_reset() {
        let released = Arc::new(AtomicBool::new(false));
        let mut conn = test_connection();
        let flag = released.clone();
        conn.set_userdata(
            Box::new(42i32),
            Some(Box::new(move |_| flag.store(true, Ordering::SeqCst))),
        );
        assert!(!released.load(Ordering::SeqCst));
        conn.reset();
        assert!(released.load(Ordering::SeqCst));
        assert!(conn.userdata().is_none());
    }

    #[test]
    fn method_roundtrip() {
        let mut conn = test_connection();
        assert_eq!(conn.method(), None);
        conn.set_method("GET");
        assert_eq!(conn.method(), Some("GET"));
        conn.reset();
        assert_eq!(conn.method(), None);
    }
}
