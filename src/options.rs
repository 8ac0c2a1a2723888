//! The server options map and its defaults.
//!
//! Mirrors the `AD_SERVER_OPTIONS` default table: every key the server
//! consults has a built-in default, applied once at `start` for any key
//! the embedder didn't already set.

use std::collections::HashMap;

/// Default `server.*` options, applied by [`ServerOptions::apply_defaults`]
/// for any key not already present.
const DEFAULTS: &[(&str, &str)] = &[
    ("server.port", "8888"),
    ("server.addr", "0.0.0.0"),
    ("server.backlog", "128"),
    ("server.timeout", "0"),
    ("server.enable_ssl", "0"),
    ("server.ssl_cert", ""),
    ("server.ssl_pkey", ""),
    ("server.request_pipelining", "1"),
    ("server.thread", "0"),
    ("server.free_on_stop", "1"),
];

/// A flat string-to-string configuration map.
///
/// The embedder builds this (from env vars, a config file, CLI flags, or
/// literals) and hands it to [`crate::Server::new`]; this crate never reads
/// environment variables or files itself.
#[derive(Debug, Clone, Default)]
pub struct ServerOptions {
    values: HashMap<String, String>,
}

impl ServerOptions {
    pub fn new() -> Self {
        ServerOptions {
            values: HashMap::new(),
        }
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(|s| s.as_str())
    }

    /// Parses the option as an integer, falling back to `default` if unset
    /// or unparseable. Unparseable values are not an error here; they are
    /// a configuration contract violation logged by the caller.
    pub fn get_int(&self, key: &str, default: i64) -> i64 {
        self.get(key)
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(default)
    }

    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        self.get(key)
            .map(|v| v != "0" && !v.eq_ignore_ascii_case("false") && !v.is_empty())
            .unwrap_or(default)
    }

    /// Fills in every default-table key not already present. Called once
    /// from `Server::start`.
    pub(crate) fn apply_defaults(&mut self) {
        for (key, value) in DEFAULTS {
            self.values
                .entry((*key).to_string())
                .or_insert_with(|| (*value).to_string());
        }
    }
}
