//! Echoes the request method, path, and body back to the client. Mirrors
//! libasyncd's `echo_http_server.c` example.

use asyncd::event::{Event, Status};
use asyncd::http::{http_hook, HttpState};
use asyncd::Server;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let mut server = Server::new();
    server.set_option("server.port", "8889");
    server.set_option("server.request_pipelining", "1");

    server.register_raw_hook(http_hook());
    server.register_hook(|event, conn| {
        if !event.contains(Event::READ) {
            return Status::Ok;
        }

        let rendered = {
            let state = match conn.protocol_data::<HttpState>() {
                Some(state) => state,
                None => return Status::Ok,
            };
            if !state.request.is_done() {
                return Status::Ok;
            }
            format!(
                "{} {}\n{}",
                state.request.method().unwrap_or("-"),
                state.request.path().unwrap_or("-"),
                String::from_utf8_lossy(state.request.body())
            )
        };

        let mut out = Vec::new();
        {
            let state = conn
                .protocol_data_mut::<HttpState>()
                .expect("http state attached by http_hook");
            let keepalive = state.request.is_keepalive_request();
            state.response.response(&mut out, 200, rendered.as_bytes(), keepalive);
        }
        conn.queue_output(&out);
        Status::Done
    });

    println!("listening on 0.0.0.0:8889");
    server.start().await?;
    Ok(())
}
