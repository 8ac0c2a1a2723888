//! An embeddable async TCP server framework built around a pluggable hook
//! pipeline, with a streaming HTTP/1.x parser and response builder
//! supplied as an ordinary hook.
//!
//! The core programming model: register one or more hooks on a [`Server`],
//! `start` it, and every connection's lifecycle events (`INIT`, `READ`,
//! `WRITE`, `CLOSE`) are dispatched through the hook chain in registration
//! order. A hook returns a [`event::Status`] that drives the connection's
//! state machine — keep going, ask for more bytes, finish the request, or
//! tear the connection down. [`http::http_hook`] is the HTTP/1.x parser
//! wired up as exactly such a hook; nothing about the lifecycle engine
//! knows it is there.

pub mod conn;
pub mod error;
pub mod event;
pub mod hook;
pub mod http;
pub mod options;
pub mod server;
pub mod stats;

pub use conn::Connection;
pub use error::{Error, Result};
pub use event::{Event, Status};
pub use hook::{Hook, HookList};
pub use options::ServerOptions;
pub use server::Server;
pub use stats::Stats;
