//! The server container: options, hooks, stats, listener, optional TLS,
//! and the accept loop.
//!
//! Ported from `ad_server.c`'s `ad_server_new`/`ad_server_start`/
//! `ad_server_stop`/`ad_server_free`: default-option application, address
//! family resolution (Unix path / IPv6 / IPv4), optional TLS context
//! construction, and the accept loop that hands each new connection off to
//! the lifecycle engine on its own task.

mod tls;

use crate::conn::io::ConnIo;
use crate::conn::lifecycle;
use crate::error::{Error, Result};
use crate::hook::{Hook, HookList};
use crate::options::ServerOptions;
use crate::stats::Stats;
use std::time::Duration;
use tokio::net::{TcpListener, UnixListener};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_rustls::TlsAcceptor;
use tracing::{debug, error, info, warn};

enum Listener {
    Tcp(TcpListener),
    Unix(UnixListener),
}

/// An embeddable async TCP server: an options map, an ordered hook list, a
/// stats map, and (after [`Server::start`]) a bound listener.
pub struct Server {
    options: ServerOptions,
    hooks: HookList,
    stats: Stats,
    shutdown: std::sync::Arc<Notify>,
    worker: Option<JoinHandle<()>>,
    local_addr: Option<std::net::SocketAddr>,
}

impl Server {
    pub fn new() -> Self {
        Server {
            options: ServerOptions::new(),
            hooks: HookList::new(),
            stats: Stats::new(),
            shutdown: std::sync::Arc::new(Notify::new()),
            worker: None,
            local_addr: None,
        }
    }

    /// The bound TCP address, available once [`Server::start`] has bound
    /// its listener. `None` for Unix-socket servers.
    pub fn local_addr(&self) -> Option<std::net::SocketAddr> {
        self.local_addr
    }

    pub fn set_option(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.options.set(key, value);
    }

    pub fn get_option(&self, key: &str) -> Option<&str> {
        self.options.get(key)
    }

    pub fn get_option_int(&self, key: &str, default: i64) -> i64 {
        self.options.get_int(key, default)
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    pub fn register_hook(&mut self, callback: impl Fn(crate::event::Event, &mut crate::conn::Connection) -> crate::event::Status + Send + Sync + 'static) {
        self.hooks.register(Hook::new(callback));
    }

    pub fn register_hook_on_method(
        &mut self,
        method: impl Into<String>,
        callback: impl Fn(crate::event::Event, &mut crate::conn::Connection) -> crate::event::Status + Send + Sync + 'static,
    ) {
        self.hooks.register(Hook::new_for_method(method, callback));
    }

    pub fn register_raw_hook(&mut self, hook: Hook) {
        self.hooks.register(hook);
    }

    /// Applies default options, binds the listener, and either runs the
    /// accept loop in the background (`server.thread != 0`) or inline,
    /// blocking the caller until [`Server::stop`] is called.
    pub async fn start(&mut self) -> Result<()> {
        self.options.apply_defaults();

        let addr = self.options.get("server.addr").unwrap_or("0.0.0.0").to_string();
        let port = self.options.get_int("server.port", 8888);
        let backlog = self.options.get_int("server.backlog", 128) as u32;
        let timeout_secs = self.options.get_int("server.timeout", 0);
        let read_timeout = if timeout_secs > 0 {
            Some(Duration::from_secs(timeout_secs as u64))
        } else {
            None
        };
        let request_pipelining = self.options.get_bool("server.request_pipelining", false);
        let use_thread = self.options.get_bool("server.thread", false);
        let enable_ssl = self.options.get_bool("server.enable_ssl", false);

        let listener = bind_listener(&addr, port, backlog).await?;
        self.local_addr = match &listener {
            Listener::Tcp(l) => l.local_addr().ok(),
            Listener::Unix(_) => None,
        };

        let tls_acceptor = if enable_ssl {
            let cert = self.options.get("server.ssl_cert").unwrap_or("").to_string();
            let key = self.options.get("server.ssl_pkey").unwrap_or("").to_string();
            if cert.is_empty() || key.is_empty() {
                return Err(Error::new_config(
                    "server.enable_ssl=1 requires server.ssl_cert and server.ssl_pkey",
                ));
            }
            Some(tls::build_acceptor(&cert, &key)?)
        } else {
            None
        };

        info!(addr = %addr, port, ssl = enable_ssl, "server starting");

        let hooks = self.hooks.clone();
        let stats = self.stats.clone();
        let shutdown = self.shutdown.clone();

        let accept_fut = accept_loop(
            listener,
            hooks,
            stats,
            shutdown,
            read_timeout,
            request_pipelining,
            enable_ssl,
            tls_acceptor,
        );

        if use_thread {
            self.worker = Some(tokio::spawn(accept_fut));
            Ok(())
        } else {
            accept_fut.await;
            Ok(())
        }
    }

    /// Signals the accept loop to exit at its next await point.
    pub fn stop(&self) {
        debug!("server stop requested");
        self.shutdown.notify_waiters();
    }

    /// Waits for a background-threaded server's accept loop to exit.
    pub async fn join(&mut self) {
        if let Some(handle) = self.worker.take() {
            let _ = handle.await;
        }
    }
}

impl Default for Server {
    fn default() -> Self {
        Server::new()
    }
}

async fn bind_listener(addr: &str, port: i64, backlog: u32) -> Result<Listener> {
    if addr.starts_with('/') {
        let _ = std::fs::remove_file(addr);
        let listener = UnixListener::bind(addr).map_err(Error::new_accept)?;
        return Ok(Listener::Unix(listener));
    }

    let bind_addr = if addr.contains(':') && !addr.starts_with('[') {
        format!("[{}]:{}", addr, port)
    } else {
        format!("{}:{}", addr, port)
    };

    let socket_addr: std::net::SocketAddr = bind_addr.parse().map_err(|e| {
        Error::new_config(format!("invalid server.addr/server.port: {}", e))
    })?;

    let socket = if socket_addr.is_ipv6() {
        tokio::net::TcpSocket::new_v6().map_err(Error::new_accept)?
    } else {
        tokio::net::TcpSocket::new_v4().map_err(Error::new_accept)?
    };
    socket.set_reuseaddr(true).map_err(Error::new_accept)?;
    socket.bind(socket_addr).map_err(Error::new_accept)?;
    let listener = socket.listen(backlog).map_err(Error::new_accept)?;
    Ok(Listener::Tcp(listener))
}

#[allow(clippy::too_many_arguments)]
async fn accept_loop(
    listener: Listener,
    hooks: HookList,
    stats: Stats,
    shutdown: std::sync::Arc<Notify>,
    read_timeout: Option<Duration>,
    request_pipelining: bool,
    tls_enabled: bool,
    tls_acceptor: Option<TlsAcceptor>,
) {
    loop {
        let accepted = tokio::select! {
            biased;
            _ = shutdown.notified() => {
                debug!("accept loop shutting down");
                break;
            }
            accepted = accept_one(&listener) => accepted,
        };

        let (io, peer) = match accepted {
            Ok(pair) => pair,
            Err(e) => {
                error!(error = %e, "accept failed");
                continue;
            }
        };

        stats.incr("conns.accepted", 1);
        debug!(peer = %peer, "accepted connection");

        let hooks = hooks.clone();
        let stats = stats.clone();
        let tls_acceptor = tls_acceptor.clone();

        tokio::spawn(async move {
            let conn_io = match tls_acceptor {
                Some(acceptor) => match acceptor.accept(io).await {
                    Ok(tls_stream) => ConnIo::new(tls_stream),
                    Err(e) => {
                        warn!(error = %e, "TLS handshake failed");
                        stats.incr("conns.tls_failed", 1);
                        return;
                    }
                },
                None => ConnIo::new(io),
            };
            lifecycle::run(conn_io, hooks, read_timeout, request_pipelining, tls_enabled).await;
            stats.incr("conns.closed", 1);
        });
    }
}

async fn accept_one(listener: &Listener) -> std::io::Result<(Box<dyn AsyncDuplexStream>, String)> {
    match listener {
        Listener::Tcp(l) => {
            let (stream, addr) = l.accept().await?;
            Ok((Box::new(stream), addr.to_string()))
        }
        Listener::Unix(l) => {
            let (stream, _addr) = l.accept().await?;
            Ok((Box::new(stream), "unix".to_string()))
        }
    }
}

trait AsyncDuplexStream: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin + Send {}
impl<T: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin + Send> AsyncDuplexStream for T {}
