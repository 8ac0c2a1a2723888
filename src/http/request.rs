//! The streaming HTTP/1.x request parser.
//!
//! Ported from `ad_http_handler.c`'s `http_parser`, `parse_requestline`,
//! `parse_headers`, `parse_body`, and `parse_chunked_body`. Operates
//! incrementally over whatever bytes have arrived so far, returning
//! `Status::Takeover` whenever a stage needs more bytes than are currently
//! buffered.

use crate::event::Status;
use bytes::{Buf, BytesMut};

const MAX_PATHNAME_LEN: usize = 2048;
const MAX_SEGMENT_LEN: usize = 255;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ParseState {
    Init,
    RequestLineDone,
    HeaderDone,
    Done,
    Error,
}

/// Parsed request-line and header state, built incrementally.
pub struct RequestParser {
    pub(crate) state: ParseState,
    inbuf: BytesMut,
    method: Option<String>,
    httpver: Option<String>,
    uri: Option<String>,
    path: Option<String>,
    query: Option<String>,
    headers: Vec<(String, String)>,
    content_length: i64,
    is_chunked: bool,
    body: BytesMut,
    error_message: Option<&'static str>,
}

impl RequestParser {
    pub(crate) fn new() -> Self {
        RequestParser {
            state: ParseState::Init,
            inbuf: BytesMut::new(),
            method: None,
            httpver: None,
            uri: None,
            path: None,
            query: None,
            headers: Vec::new(),
            content_length: -1,
            is_chunked: false,
            body: BytesMut::new(),
            error_message: None,
        }
    }

    /// Feeds newly-arrived bytes and drives the state machine as far as
    /// possible. Returns the resulting hook status: `Takeover` if more
    /// bytes are needed, `Ok` once the whole request has been parsed,
    /// `Close` on a malformed request.
    pub(crate) fn feed(&mut self, bytes: &[u8]) -> Status {
        self.inbuf.extend_from_slice(bytes);
        loop {
            match self.state {
                ParseState::Init => match self.try_parse_request_line() {
                    Ok(true) => self.state = ParseState::RequestLineDone,
                    Ok(false) => return Status::Takeover,
                    Err(msg) => return self.fail(msg),
                },
                ParseState::RequestLineDone => match self.try_parse_headers() {
                    Ok(true) => self.state = ParseState::HeaderDone,
                    Ok(false) => return Status::Takeover,
                    Err(msg) => return self.fail(msg),
                },
                ParseState::HeaderDone => match self.try_parse_body() {
                    Ok(true) => {
                        self.state = ParseState::Done;
                        return Status::Ok;
                    }
                    Ok(false) => return Status::Takeover,
                    Err(msg) => return self.fail(msg),
                },
                ParseState::Done => return Status::Ok,
                ParseState::Error => return Status::Close,
            }
        }
    }

    fn fail(&mut self, msg: &'static str) -> Status {
        self.state = ParseState::Error;
        self.error_message = Some(msg);
        Status::Close
    }

    fn try_parse_request_line(&mut self) -> Result<bool, &'static str> {
        let line = match take_line(&mut self.inbuf) {
            Some(line) => line,
            None => return Ok(false),
        };
        let mut parts = line.split(' ').filter(|s| !s.is_empty());
        let method = parts.next().ok_or("empty request line")?.to_uppercase();
        let uri = parts.next().ok_or("missing request URI")?.to_string();
        let httpver = parts.next().ok_or("missing HTTP version")?.to_uppercase();
        if parts.next().is_some() {
            return Err("too many tokens in request line");
        }
        if !matches!(httpver.as_str(), "HTTP/0.9" | "HTTP/1.0" | "HTTP/1.1") {
            return Err("unsupported HTTP version");
        }

        let (host, rest) = split_uri(&uri)?;
        let (path_raw, query) = match rest.find('?') {
            Some(idx) => (&rest[..idx], Some(rest[idx + 1..].to_string())),
            None => (rest.as_str(), None),
        };
        let decoded = percent_decode(path_raw)?;
        if !is_valid_pathname(&decoded) {
            return Err("invalid request path");
        }
        let path = correct_pathname(&decoded);

        if let Some(host) = host {
            self.headers.push(("Host".to_string(), host));
        }
        self.method = Some(method);
        self.httpver = Some(httpver);
        self.uri = Some(uri);
        self.path = Some(path);
        self.query = query;
        Ok(true)
    }

    fn try_parse_headers(&mut self) -> Result<bool, &'static str> {
        loop {
            let line = match take_line(&mut self.inbuf) {
                Some(line) => line,
                None => return Ok(false),
            };
            if line.is_empty() {
                self.content_length = header_get(&self.headers, "Content-Length")
                    .and_then(|v| v.trim().parse::<i64>().ok())
                    .unwrap_or(-1);
                self.is_chunked = header_get(&self.headers, "Transfer-Encoding")
                    .map(|v| v.eq_ignore_ascii_case("chunked"))
                    .unwrap_or(false);
                return Ok(true);
            }
            let colon = line.find(':').ok_or("malformed header line")?;
            let name = line[..colon].trim().to_string();
            let value = line[colon + 1..].trim().to_string();
            if name.is_empty() {
                return Err("empty header name");
            }
            header_set(&mut self.headers, name, value);
        }
    }

    fn try_parse_body(&mut self) -> Result<bool, &'static str> {
        if self.content_length == 0 {
            return Ok(true);
        }
        if self.content_length > 0 {
            let want = self.content_length as usize;
            if self.inbuf.len() < want {
                return Ok(false);
            }
            self.body.extend_from_slice(&self.inbuf[..want]);
            self.inbuf.advance(want);
            return Ok(true);
        }
        // content_length < 0: unknown length.
        if self.is_chunked {
            loop {
                match take_chunk(&mut self.inbuf)? {
                    Some(chunk) if chunk.is_empty() => return Ok(true),
                    Some(chunk) => self.body.extend_from_slice(&chunk),
                    None => return Ok(false),
                }
            }
        }
        // No Content-Length and not chunked: treat as no body.
        Ok(true)
    }

    pub fn method(&self) -> Option<&str> {
        self.method.as_deref()
    }

    pub fn http_version(&self) -> Option<&str> {
        self.httpver.as_deref()
    }

    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        header_get(&self.headers, name)
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn content_length(&self) -> i64 {
        self.content_length
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn is_done(&self) -> bool {
        self.state == ParseState::Done
    }

    /// Once `Done`, hands back any bytes fed past the end of this request
    /// (the start of the next pipelined request, if any) so the caller can
    /// carry them over to a fresh parser.
    pub(crate) fn take_leftover(&mut self) -> BytesMut {
        std::mem::take(&mut self.inbuf)
    }

    /// Keep-alive rule: HTTP/1.1 defaults on unless `Connection: close`;
    /// HTTP/1.0 and earlier default off unless `Connection: Keep-Alive` or
    /// `Connection: TE`. Compared case-sensitively, matching the original
    /// implementation's exact-string check.
    pub fn is_keepalive_request(&self) -> bool {
        let connection = self.header("Connection");
        match self.httpver.as_deref() {
            Some("HTTP/1.1") => connection != Some("close"),
            _ => matches!(connection, Some("Keep-Alive") | Some("TE")),
        }
    }
}

fn header_get<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

fn header_set(headers: &mut Vec<(String, String)>, name: String, value: String) {
    if let Some(entry) = headers.iter_mut().find(|(k, _)| k.eq_ignore_ascii_case(&name)) {
        entry.1 = value;
    } else {
        headers.push((name, value));
    }
}

/// Pulls one CRLF-terminated line out of `buf`, without the terminator.
/// Returns `None` if no full line is buffered yet.
fn take_line(buf: &mut BytesMut) -> Option<String> {
    let pos = buf.windows(2).position(|w| w == b"\r\n")?;
    let line = buf.split_to(pos);
    buf.advance(2);
    String::from_utf8(line.to_vec()).ok()
}

/// Splits an absolute-form URI (`scheme://host/path`) into `(Some(host),
/// path)`, or returns `(None, uri)` unchanged for origin-form (`/path`).
fn split_uri(uri: &str) -> Result<(Option<String>, String), &'static str> {
    if uri.starts_with('/') {
        return Ok((None, uri.to_string()));
    }
    if let Some(idx) = uri.find("://") {
        let rest = &uri[idx + 3..];
        let slash = rest.find('/').unwrap_or(rest.len());
        let host = rest[..slash].to_string();
        let path = if slash < rest.len() {
            rest[slash..].to_string()
        } else {
            "/".to_string()
        };
        return Ok((Some(host), path));
    }
    Err("request URI must be origin-form or absolute-form")
}

fn percent_decode(input: &str) -> Result<String, &'static str> {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'%' => {
                let hex = bytes
                    .get(i + 1..i + 3)
                    .ok_or("truncated percent-encoding")?;
                let hex_str = std::str::from_utf8(hex).map_err(|_| "invalid percent-encoding")?;
                let byte = u8::from_str_radix(hex_str, 16).map_err(|_| "invalid percent-encoding")?;
                out.push(byte);
                i += 3;
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    String::from_utf8(out).map_err(|_| "non-UTF-8 path after decoding")
}

fn is_valid_pathname(path: &str) -> bool {
    if path.is_empty() || path.len() > MAX_PATHNAME_LEN || !path.starts_with('/') {
        return false;
    }
    if path.bytes().any(|b| b < 0x20 || matches!(b, b'\\' | b':' | b'*' | b'?' | b'"' | b'<' | b'>' | b'|')) {
        return false;
    }
    path.split('/').all(|segment| segment.len() <= MAX_SEGMENT_LEN)
}

/// Collapses repeated slashes and strips a single trailing slash (unless
/// the whole path is just `/`).
fn correct_pathname(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    let mut prev_slash = false;
    for ch in path.chars() {
        if ch == '/' {
            if prev_slash {
                continue;
            }
            prev_slash = true;
        } else {
            prev_slash = false;
        }
        out.push(ch);
    }
    if out.len() > 1 && out.ends_with('/') {
        out.pop();
    }
    out
}

/// Parses and consumes one chunk (size line + data + trailing CRLF) out of
/// `buf`. Returns `Ok(Some(bytes))` on a complete chunk (an empty `Vec`
/// marks the zero-size terminator chunk), `Ok(None)` if not enough data is
/// buffered yet — in which case `buf` is left untouched so the caller can
/// retry once more bytes arrive.
fn take_chunk(buf: &mut BytesMut) -> Result<Option<Vec<u8>>, &'static str> {
    let size_line_end = match buf.windows(2).position(|w| w == b"\r\n") {
        Some(pos) => pos,
        None => return Ok(None),
    };
    let size_line = std::str::from_utf8(&buf[..size_line_end]).map_err(|_| "invalid chunk size")?;
    let size_str = size_line.split(';').next().unwrap_or("").trim();
    let size = usize::from_str_radix(size_str, 16).map_err(|_| "invalid chunk size")?;

    let needed = size_line_end + 2 + size + 2;
    if buf.len() < needed {
        return Ok(None);
    }

    buf.advance(size_line_end + 2);
    if &buf[size..size + 2] != b"\r\n" {
        return Err("malformed chunk terminator");
    }
    let chunk = buf[..size].to_vec();
    buf.advance(size + 2);
    Ok(Some(chunk))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_get_with_no_body() {
        let mut parser = RequestParser::new();
        let status = parser.feed(b"GET /hello HTTP/1.1\r\nHost: example.com\r\n\r\n");
        assert_eq!(status, Status::Ok);
        assert_eq!(parser.method(), Some("GET"));
        assert_eq!(parser.path(), Some("/hello"));
        assert!(parser.body().is_empty());
    }

    #[test]
    fn takes_over_on_partial_request_line() {
        let mut parser = RequestParser::new();
        let status = parser.feed(b"GET /hello HTTP/1.1\r\n");
        assert_eq!(status, Status::Takeover);
    }

    #[test]
    fn parses_content_length_body_incrementally() {
        let mut parser = RequestParser::new();
        let status = parser.feed(b"POST /submit HTTP/1.1\r\nContent-Length: 5\r\n\r\nhe");
        assert_eq!(status, Status::Takeover);
        let status = parser.feed(b"llo");
        assert_eq!(status, Status::Ok);
        assert_eq!(parser.body(), b"hello");
    }

    #[test]
    fn rejects_invalid_http_version() {
        let mut parser = RequestParser::new();
        let status = parser.feed(b"GET / HTTP/9.9\r\n\r\n");
        assert_eq!(status, Status::Close);
    }

    #[test]
    fn splits_absolute_uri_into_host_header() {
        let mut parser = RequestParser::new();
        let status = parser.feed(b"GET http://example.com/a/b HTTP/1.1\r\n\r\n");
        assert_eq!(status, Status::Ok);
        assert_eq!(parser.path(), Some("/a/b"));
        assert_eq!(parser.header("Host"), Some("example.com"));
    }

    #[test]
    fn collapses_double_slashes_and_trims_trailing_slash() {
        let mut parser = RequestParser::new();
        let status = parser.feed(b"GET //a//b/ HTTP/1.1\r\n\r\n");
        assert_eq!(status, Status::Ok);
        assert_eq!(parser.path(), Some("/a/b"));
    }

    #[test]
    fn parses_chunked_body_across_multiple_chunks() {
        let mut parser = RequestParser::new();
        let status = parser.feed(
            b"POST /up HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n\
4\r\nWiki\r\n5\r\npedia\r\n0\r\n\r\n",
        );
        assert_eq!(status, Status::Ok);
        assert_eq!(parser.body(), b"Wikipedia");
    }

    #[test]
    fn chunked_body_takes_over_when_incomplete() {
        let mut parser = RequestParser::new();
        let status = parser.feed(
            b"POST /up HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n4\r\nWik",
        );
        assert_eq!(status, Status::Takeover);
    }

    #[test]
    fn keepalive_defaults_for_http11_and_http10() {
        let mut http11 = RequestParser::new();
        http11.feed(b"GET / HTTP/1.1\r\n\r\n");
        assert!(http11.is_keepalive_request());

        let mut http10 = RequestParser::new();
        http10.feed(b"GET / HTTP/1.0\r\n\r\n");
        assert!(!http10.is_keepalive_request());
    }
}
