//! A minimal "Hello, World!" HTTP server: the HTTP parser hook handles
//! framing, and a single application hook answers every request the same
//! way. Mirrors libasyncd's `helloworld_http_server.c` example.

use asyncd::event::{Event, Status};
use asyncd::http::{http_hook, HttpState};
use asyncd::Server;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let mut server = Server::new();
    server.set_option("server.port", "8888");
    server.set_option("server.thread", "0");

    server.register_raw_hook(http_hook());
    server.register_hook(|event, conn| {
        if !event.contains(Event::READ) {
            return Status::Ok;
        }
        let done = conn
            .protocol_data::<HttpState>()
            .map(|state| state.request.is_done())
            .unwrap_or(false);
        if !done {
            return Status::Ok;
        }

        let mut out = Vec::new();
        {
            let state = conn
                .protocol_data_mut::<HttpState>()
                .expect("http state attached by http_hook");
            let keepalive = state.request.is_keepalive_request();
            state.response.response(&mut out, 200, b"Hello, World!\n", keepalive);
        }
        conn.queue_output(&out);
        Status::Done
    });

    println!("listening on 0.0.0.0:8888");
    server.start().await?;
    Ok(())
}
