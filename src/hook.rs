//! The ordered hook list and its dispatcher.

use crate::conn::connection::Connection;
use crate::event::{Event, Status};
use std::sync::Arc;

/// A single registered callback, with an optional method filter.
pub struct Hook {
    method_filter: Option<String>,
    callback: Arc<dyn Fn(Event, &mut Connection) -> Status + Send + Sync>,
}

impl Hook {
    pub fn new(callback: impl Fn(Event, &mut Connection) -> Status + Send + Sync + 'static) -> Self {
        Hook {
            method_filter: None,
            callback: Arc::new(callback),
        }
    }

    pub fn new_for_method(
        method: impl Into<String>,
        callback: impl Fn(Event, &mut Connection) -> Status + Send + Sync + 'static,
    ) -> Self {
        Hook {
            method_filter: Some(method.into()),
            callback: Arc::new(callback),
        }
    }

    fn applies_to(&self, conn: &Connection) -> bool {
        match (&self.method_filter, conn.method()) {
            (Some(filter), Some(method)) => filter == method,
            _ => true,
        }
    }
}

impl Clone for Hook {
    fn clone(&self) -> Self {
        Hook {
            method_filter: self.method_filter.clone(),
            callback: self.callback.clone(),
        }
    }
}

/// An ordered, append-only list of hooks, dispatched in registration order.
#[derive(Clone, Default)]
pub struct HookList {
    hooks: Vec<Hook>,
}

impl HookList {
    pub fn new() -> Self {
        HookList { hooks: Vec::new() }
    }

    pub fn register(&mut self, hook: Hook) {
        self.hooks.push(hook);
    }

    /// Runs every applicable hook for `event` against `conn` in order,
    /// short-circuiting on the first non-`Ok` return.
    pub(crate) fn dispatch(&self, event: Event, conn: &mut Connection) -> Status {
        for hook in &self.hooks {
            if !hook.applies_to(conn) {
                continue;
            }
            let status = (hook.callback)(event, conn);
            if status != Status::Ok {
                return status;
            }
        }
        Status::Ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conn::io::ConnIo;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn test_connection() -> Connection {
        Connection::new(ConnIo::for_test())
    }

    #[test]
    fn short_circuits_on_first_non_ok() {
        let calls = std::sync::Arc::new(AtomicUsize::new(0));
        let mut list = HookList::new();
        let c1 = calls.clone();
        list.register(Hook::new(move |_, _| {
            c1.fetch_add(1, Ordering::SeqCst);
            Status::Takeover
        }));
        let c2 = calls.clone();
        list.register(Hook::new(move |_, _| {
            c2.fetch_add(1, Ordering::SeqCst);
            Status::Ok
        }));
        let mut conn = test_connection();
        let status = list.dispatch(Event::READ, &mut conn);
        assert_eq!(status, Status::Takeover);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn method_filter_skips_non_matching_hooks() {
        let mut list = HookList::new();
        list.register(Hook::new_for_method("POST", |_, _| Status::Close));
        list.register(Hook::new(|_, _| Status::Ok));
        let mut conn = test_connection();
        conn.set_method("GET");
        let status = list.dispatch(Event::READ, &mut conn);
        assert_eq!(status, Status::Ok);
    }

    #[test]
    fn method_filter_applies_when_method_unset() {
        let mut list = HookList::new();
        list.register(Hook::new_for_method("POST", |_, _| Status::Close));
        let mut conn = test_connection();
        let status = list.dispatch(Event::READ, &mut conn);
        assert_eq!(status, Status::Close);
    }
}
