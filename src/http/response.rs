//! The HTTP response builder: header table, freeze discipline, and
//! content-length/chunked framing.
//!
//! Ported from `ad_http_handler.c`'s `ad_http_set_response_*`,
//! `ad_http_send_header`, `ad_http_send_data`, `ad_http_send_chunk`, and the
//! composite `ad_http_response`.

use crate::http::reason::reason_phrase;
use std::fmt::Write as _;

/// How the response body is framed on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Framing {
    /// `Content-Length: N`; body capped at `N` bytes.
    Fixed(u64),
    /// `Transfer-Encoding: chunked`.
    Chunked,
    /// Neither has been chosen yet.
    Unset,
}

pub struct ResponseBuilder {
    code: u16,
    headers: Vec<(String, String)>,
    framing: Framing,
    header_sent: bool,
    body_bytes_sent: u64,
}

impl ResponseBuilder {
    pub(crate) fn new() -> Self {
        ResponseBuilder {
            code: 200,
            headers: Vec::new(),
            framing: Framing::Unset,
            header_sent: false,
            body_bytes_sent: 0,
        }
    }

    pub fn set_response_code(&mut self, code: u16) {
        self.code = code;
    }

    /// Sets or removes (`value = None`) a response header. No-op once the
    /// header has already been sent on the wire.
    pub fn set_response_header(&mut self, name: &str, value: Option<&str>) -> bool {
        if self.header_sent {
            tracing::warn!(header = name, "attempted to mutate frozen response header");
            return false;
        }
        match value {
            None => {
                self.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
            }
            Some(v) => {
                if let Some(entry) = self.headers.iter_mut().find(|(k, _)| k.eq_ignore_ascii_case(name)) {
                    entry.1 = v.to_string();
                } else {
                    self.headers.push((name.to_string(), v.to_string()));
                }
            }
        }
        true
    }

    /// `size >= 0` installs a fixed `Content-Length` framing; `size < 0`
    /// installs chunked framing.
    pub fn set_response_content(&mut self, size: i64) {
        if size >= 0 {
            self.framing = Framing::Fixed(size as u64);
            self.set_response_header("Content-Length", Some(&size.to_string()));
        } else {
            self.framing = Framing::Chunked;
            self.set_response_header("Transfer-Encoding", Some("chunked"));
        }
    }

    pub fn is_header_sent(&self) -> bool {
        self.header_sent
    }

    /// Freezes the header table and renders the status line + headers into
    /// `out`.
    pub fn send_header(&mut self, out: &mut Vec<u8>) {
        if self.header_sent {
            return;
        }
        self.header_sent = true;
        let reason = reason_phrase(self.code);
        let mut status_line = String::new();
        let _ = write!(status_line, "HTTP/1.1 {} {}\r\n", self.code, reason);
        out.extend_from_slice(status_line.as_bytes());
        for (name, value) in &self.headers {
            out.extend_from_slice(name.as_bytes());
            out.extend_from_slice(b": ");
            out.extend_from_slice(value.as_bytes());
            out.extend_from_slice(b"\r\n");
        }
        out.extend_from_slice(b"\r\n");
    }

    /// Appends body bytes under fixed-length framing. Rejects writes that
    /// would exceed the declared `Content-Length`.
    pub fn send_data(&mut self, out: &mut Vec<u8>, data: &[u8]) -> bool {
        if let Framing::Fixed(limit) = self.framing {
            if self.body_bytes_sent + data.len() as u64 > limit {
                tracing::warn!("response body exceeds declared Content-Length");
                return false;
            }
        }
        out.extend_from_slice(data);
        self.body_bytes_sent += data.len() as u64;
        true
    }

    /// Appends one chunk under chunked framing. An empty slice emits the
    /// terminating `0\r\n\r\n` chunk.
    pub fn send_chunk(&mut self, out: &mut Vec<u8>, data: &[u8]) {
        let mut size_line = String::new();
        let _ = write!(size_line, "{:x}\r\n", data.len());
        out.extend_from_slice(size_line.as_bytes());
        out.extend_from_slice(data);
        out.extend_from_slice(b"\r\n");
        if data.is_empty() {
            out.extend_from_slice(b"\r\n");
        }
        self.body_bytes_sent += data.len() as u64;
    }

    /// Composite helper: decides the `Connection` header (if unset) from
    /// `keepalive`, sends the status line and headers, then the full body
    /// under whatever framing was configured.
    pub fn response(&mut self, out: &mut Vec<u8>, code: u16, body: &[u8], keepalive: bool) {
        self.set_response_code(code);
        if self.headers.iter().find(|(k, _)| k.eq_ignore_ascii_case("Connection")).is_none() {
            self.set_response_header(
                "Connection",
                Some(if keepalive { "Keep-Alive" } else { "close" }),
            );
        }
        if self.framing == Framing::Unset {
            self.set_response_content(body.len() as i64);
        }
        self.send_header(out);
        match self.framing {
            Framing::Chunked => {
                if !body.is_empty() {
                    self.send_chunk(out, body);
                }
                self.send_chunk(out, &[]);
            }
            _ => {
                self.send_data(out, body);
            }
        }
    }
}
