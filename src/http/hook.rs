//! Wires the HTTP/1.x parser and response builder into the hook pipeline
//! as the protocol handler for slot 1.
//!
//! Ported from `ad_http_handler.c`'s `ad_http_handler`: on `INIT` it
//! attaches fresh parser/builder state; on `READ` it feeds newly-arrived
//! bytes to the parser and, once the parser is done, sets `conn.method()`
//! so later method-filtered hooks can match.

use crate::conn::connection::{Connection, SLOT_PROTOCOL};
use crate::event::{Event, Status};
use crate::hook::Hook;
use crate::http::request::RequestParser;
use crate::http::response::ResponseBuilder;

/// The combined per-request HTTP state attached to a connection's
/// protocol slot.
pub struct HttpState {
    pub request: RequestParser,
    pub response: ResponseBuilder,
}

impl HttpState {
    fn new() -> Self {
        HttpState {
            request: RequestParser::new(),
            response: ResponseBuilder::new(),
        }
    }
}

/// Returns a [`Hook`] that parses HTTP/1.x requests. Register it first so
/// later, method-filtered hooks see `conn.method()` already populated.
pub fn http_hook() -> Hook {
    Hook::new(|event, conn| http_handler(event, conn))
}

fn http_handler(event: Event, conn: &mut Connection) -> Status {
    if event.contains(Event::INIT) {
        conn.set_userdata_at(SLOT_PROTOCOL, Box::new(HttpState::new()), None);
        return Status::Ok;
    }

    if event.contains(Event::READ) {
        let pending = std::mem::take(&mut conn.io.in_buf);
        let (status, leftover) = {
            let state = match conn.userdata_mut_at(SLOT_PROTOCOL).and_then(|d| d.downcast_mut::<HttpState>()) {
                Some(state) => state,
                None => return Status::Close,
            };
            let status = state.request.feed(&pending);
            let leftover = if status == Status::Ok {
                Some(state.request.take_leftover())
            } else {
                None
            };
            (status, leftover)
        };
        if let Some(leftover) = leftover {
            // Anything fed past the end of this request belongs to the
            // next pipelined request; hand it back to the connection
            // buffer so a fresh parser picks it up after reset.
            conn.io.in_buf = leftover;
        }
        if status == Status::Ok && conn.method().is_none() {
            if let Some(state) = conn.userdata_at(SLOT_PROTOCOL).and_then(|d| d.downcast_ref::<HttpState>()) {
                if let Some(method) = state.request.method() {
                    conn.set_method(method.to_string());
                }
            }
        }
        return status;
    }

    Status::Ok
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conn::io::ConnIo;

    #[test]
    fn init_attaches_state_and_read_sets_method() {
        let mut conn = Connection::new(ConnIo::for_test());
        assert_eq!(http_handler(Event::INIT, &mut conn), Status::Ok);
        assert!(conn.protocol_data::<HttpState>().is_some());

        conn.io.in_buf.extend_from_slice(b"GET /x HTTP/1.1\r\n\r\n");
        let status = http_handler(Event::READ, &mut conn);
        assert_eq!(status, Status::Ok);
        assert_eq!(conn.method(), Some("GET"));
    }

    #[test]
    fn read_takes_over_on_partial_request() {
        let mut conn = Connection::new(ConnIo::for_test());
        http_handler(Event::INIT, &mut conn);
        conn.io.in_buf.extend_from_slice(b"GET /x HTTP/1.1\r\n");
        let status = http_handler(Event::READ, &mut conn);
        assert_eq!(status, Status::Takeover);
        assert_eq!(conn.method(), None);
    }
}
