//! The per-connection state machine: event dispatch, status adoption,
//! pipelining reset, and buffered close.

use crate::conn::connection::Connection;
use crate::conn::io::{ConnIo, IoEvent};
use crate::event::{Event, Status};
use crate::hook::HookList;
use std::time::Duration;
use tracing::{debug, error, trace, warn};

/// Combines a freshly-returned chain status with the connection's current
/// status without ever downgrading away from `Close`, and without letting a
/// new `Done` overwrite an already-recorded `Close`.
///
/// Ported from `ad_server.c`'s `conn_cb`:
/// `if (!(conn->status == AD_CLOSE || (conn->status == AD_DONE && conn->status >= status))) conn->status = status;`
fn adopt_status(current: Status, dispatched: Status) -> Status {
    if current == Status::Close || (current == Status::Done && current >= dispatched) {
        current
    } else {
        dispatched
    }
}

/// Runs one accepted connection to completion: `INIT`, then an alternating
/// read/write loop until a terminal condition sets `CLOSE`, with an
/// optional pipelining reset back to `INIT` in between requests.
pub(crate) async fn run(
    io: ConnIo,
    hooks: HookList,
    read_timeout: Option<Duration>,
    request_pipelining: bool,
    tls_enabled: bool,
) {
    let mut conn = Connection::new(io);
    conn.io.set_read_timeout(read_timeout);

    let init_event = if tls_enabled {
        Event::INIT | Event::WRITE
    } else {
        Event::INIT
    };
    dispatch(&mut conn, init_event, &hooks).await;

    'outer: loop {
        // Flush whatever is queued so far (by INIT, or by the previous
        // iteration's READ dispatch) and react to any terminal status before
        // waiting on the socket for more bytes. A hook that pre-queues
        // output on INIT (e.g. after a TLS handshake) must not have that
        // output wait on the peer speaking first, and one socket read may
        // contain more than one pipelined request, so this loop also keeps
        // answering requests already fully buffered before going back to
        // `poll_read`.
        loop {
            if !flush_and_dispatch_write(&mut conn, &hooks).await {
                close(&mut conn, &hooks, Event::empty(), tls_enabled).await;
                break 'outer;
            }

            match conn.status {
                Status::Done if request_pipelining => {
                    debug!("pipelining: resetting connection for next request");
                    let _ = hooks.dispatch(Event::CLOSE, &mut conn);
                    conn.reset();
                    dispatch(&mut conn, init_event, &hooks).await;
                    if conn.io.in_buf.is_empty() {
                        break;
                    }
                    dispatch(&mut conn, Event::READ, &hooks).await;
                    continue;
                }
                Status::Done => {
                    conn.status = Status::Close;
                    close(&mut conn, &hooks, Event::empty(), tls_enabled).await;
                    break 'outer;
                }
                Status::Close => {
                    close(&mut conn, &hooks, Event::empty(), tls_enabled).await;
                    break 'outer;
                }
                Status::Ok | Status::Takeover => break,
            }
        }

        match conn.io.poll_read().await {
            Ok(IoEvent::Readable(n)) => {
                trace!(bytes = n, "readable");
                dispatch(&mut conn, Event::READ, &hooks).await;
            }
            Ok(IoEvent::Eof) => {
                conn.status = Status::Close;
                close(&mut conn, &hooks, Event::empty(), tls_enabled).await;
                break;
            }
            Ok(IoEvent::TimedOut) => {
                conn.status = Status::Close;
                close(&mut conn, &hooks, Event::TIMEOUT, tls_enabled).await;
                break;
            }
            Err(e) => {
                warn!(error = %e, "connection read error");
                conn.status = Status::Close;
                close(&mut conn, &hooks, Event::empty(), tls_enabled).await;
                break;
            }
        }
    }
}

async fn dispatch(conn: &mut Connection, event: Event, hooks: &HookList) {
    if conn.status == Status::Ok || conn.status == Status::Takeover {
        let result = hooks.dispatch(event, conn);
        conn.status = adopt_status(conn.status, result);
    }
}

/// Flushes any queued output and, if something was written, dispatches a
/// gated `WRITE` event. Returns `false` on a write failure (caller should
/// treat the connection as closed).
async fn flush_and_dispatch_write(conn: &mut Connection, hooks: &HookList) -> bool {
    if conn.io.output_pending() {
        if let Err(e) = conn.io.flush_write().await {
            warn!(error = %e, "connection write error");
            conn.status = Status::Close;
            return false;
        }
        dispatch(conn, Event::WRITE, hooks).await;
    }
    true
}

/// Drains any remaining output once, fires the final `CLOSE` dispatch
/// (with whatever modifier bits explain the reason), releases both
/// user-data slots, reports a pending TLS error if any, and shuts the
/// stream down. Mirrors `ad_server.c`'s `conn_free`, which calls the
/// release callbacks and fetches the OpenSSL error at the same point.
async fn close(conn: &mut Connection, hooks: &HookList, extra: Event, tls_enabled: bool) {
    if conn.io.output_pending() {
        if let Err(e) = conn.io.flush_write().await {
            warn!(error = %e, "error draining connection on close");
        }
    }
    let _ = hooks.dispatch(Event::CLOSE | extra, conn);
    conn.reset();
    if tls_enabled {
        if let Some(err) = conn.io.take_last_error() {
            error!(error = %err, "TLS error pending at connection close");
        }
    }
    conn.io.shutdown().await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_adoption_never_downgrades_close() {
        assert_eq!(adopt_status(Status::Close, Status::Ok), Status::Close);
        assert_eq!(adopt_status(Status::Close, Status::Done), Status::Close);
    }

    #[test]
    fn status_adoption_keeps_done_over_lower_precedence() {
        assert_eq!(adopt_status(Status::Done, Status::Ok), Status::Done);
        assert_eq!(adopt_status(Status::Done, Status::Takeover), Status::Done);
    }

    #[test]
    fn status_adoption_lets_close_override_done() {
        assert_eq!(adopt_status(Status::Done, Status::Close), Status::Close);
    }

    #[test]
    fn status_adoption_takes_higher_fresh_status() {
        assert_eq!(adopt_status(Status::Ok, Status::Takeover), Status::Takeover);
        assert_eq!(adopt_status(Status::Takeover, Status::Done), Status::Done);
    }

    #[tokio::test]
    async fn full_request_response_cycle_over_duplex() {
        use crate::event::Event as Ev;
        use crate::hook::Hook;
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let (mut client, server) = tokio::io::duplex(4096);
        let io = ConnIo::new(server);

        let mut hooks = HookList::new();
        hooks.register(Hook::new(|event, conn| {
            if event.contains(Ev::READ) {
                conn.io.out_buf.extend_from_slice(b"HTTP/1.1 200 OK\r\n\r\n");
                return crate::event::Status::Done;
            }
            crate::event::Status::Ok
        }));

        let handle = tokio::spawn(run(io, hooks, None, false, false));

        client.write_all(b"GET / HTTP/1.1\r\n\r\n").await.unwrap();
        let mut buf = [0u8; 256];
        let n = client.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"HTTP/1.1 200 OK\r\n\r\n");

        drop(client);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn pipelined_requests_answered_without_extra_socket_reads() {
        use crate::hook::Hook;
        use crate::http::{http_hook, HttpState};
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let (mut client, server) = tokio::io::duplex(4096);
        let io = ConnIo::new(server);

        let mut hooks = HookList::new();
        hooks.register(http_hook());
        hooks.register(Hook::new(|event, conn| {
            if !event.contains(Event::READ) {
                return Status::Ok;
            }
            let done = conn
                .protocol_data::<HttpState>()
                .map(|s| s.request.is_done())
                .unwrap_or(false);
            if !done {
                return Status::Ok;
            }
            let mut out = Vec::new();
            let state = conn.protocol_data_mut::<HttpState>().unwrap();
            state.response.response(&mut out, 200, b"ok", true);
            conn.queue_output(&out);
            Status::Done
        }));

        let handle = tokio::spawn(run(io, hooks, None, true, false));

        client
            .write_all(b"GET /one HTTP/1.1\r\nContent-Length: 0\r\n\r\nGET /two HTTP/1.1\r\nContent-Length: 0\r\n\r\n")
            .await
            .unwrap();

        let mut received = Vec::new();
        let mut chunk = [0u8; 256];
        loop {
            let rendered = String::from_utf8_lossy(&received);
            if rendered.matches("HTTP/1.1 200 OK").count() >= 2 {
                break;
            }
            let n = client.read(&mut chunk).await.unwrap();
            assert!(n > 0, "connection closed before both responses arrived");
            received.extend_from_slice(&chunk[..n]);
        }

        drop(client);
        handle.await.unwrap();
    }
}
