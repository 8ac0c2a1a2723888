//! The `Error` type for this crate.

use std::error::Error as StdError;
use std::fmt;

/// A generic "error" for this crate's operations.
pub struct Error {
    inner: Box<ErrorImpl>,
}

struct ErrorImpl {
    kind: Kind,
    cause: Option<Box<dyn StdError + Send + Sync>>,
}

#[derive(Debug)]
pub(crate) enum Kind {
    /// An error configuring or starting a server (bad option, bind failure).
    Config,
    /// An error accepting a new connection.
    Accept,
    /// A per-connection transport error (read/write/timeout).
    Io,
    /// A protocol parsing error (malformed request line, header, body).
    Parse,
    /// A TLS setup or handshake error.
    Tls,
    /// An application contract violation (not fatal, logged by caller).
    Contract,
}

pub(crate) fn new(kind: Kind) -> Error {
    Error {
        inner: Box::new(ErrorImpl { kind, cause: None }),
    }
}

impl Error {
    pub(crate) fn new_config(cause: impl Into<Box<dyn StdError + Send + Sync>>) -> Error {
        new(Kind::Config).with(cause)
    }

    pub(crate) fn new_accept(cause: impl Into<Box<dyn StdError + Send + Sync>>) -> Error {
        new(Kind::Accept).with(cause)
    }

    pub(crate) fn new_io(cause: std::io::Error) -> Error {
        new(Kind::Io).with(cause)
    }

    pub(crate) fn new_parse(msg: &'static str) -> Error {
        new(Kind::Parse).with(msg)
    }

    pub(crate) fn new_tls(cause: impl Into<Box<dyn StdError + Send + Sync>>) -> Error {
        new(Kind::Tls).with(cause)
    }

    pub(crate) fn new_contract(msg: &'static str) -> Error {
        new(Kind::Contract).with(msg)
    }

    pub(crate) fn with<C: Into<Box<dyn StdError + Send + Sync>>>(mut self, cause: C) -> Error {
        self.inner.cause = Some(cause.into());
        self
    }

    fn description(&self) -> &str {
        match self.inner.kind {
            Kind::Config => "server configuration error",
            Kind::Accept => "error accepting connection",
            Kind::Io => "connection I/O error",
            Kind::Parse => "protocol parse error",
            Kind::Tls => "TLS error",
            Kind::Contract => "application contract violation",
        }
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut f = f.debug_struct("Error");
        f.field("kind", &self.inner.kind);
        if let Some(ref cause) = self.inner.cause {
            f.field("cause", cause);
        }
        f.finish()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())?;
        if let Some(ref cause) = self.inner.cause {
            write!(f, ": {}", cause)?;
        }
        Ok(())
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.inner
            .cause
            .as_ref()
            .map(|cause| &**cause as &(dyn StdError + 'static))
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Error {
        Error::new_io(err)
    }
}

/// A specialized `Result` type for this crate's fallible operations.
pub type Result<T> = std::result::Result<T, Error>;
