//! End-to-end scenarios exercising the full `Server` over real loopback
//! sockets: HTTP parser hook, application hook, response builder, and the
//! connection lifecycle engine all wired together.

use asyncd::event::{Event, Status};
use asyncd::http::{http_hook, HttpState};
use asyncd::Server;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

async fn spawn_echo_server(pipelining: bool) -> (std::net::SocketAddr, Server) {
    let mut server = Server::new();
    server.set_option("server.addr", "127.0.0.1");
    server.set_option("server.port", "0");
    server.set_option("server.thread", "1");
    server.set_option("server.request_pipelining", if pipelining { "1" } else { "0" });

    server.register_raw_hook(http_hook());
    server.register_hook(|event, conn| {
        if !event.contains(Event::READ) {
            return Status::Ok;
        }
        let ready = conn
            .protocol_data::<HttpState>()
            .map(|s| s.request.is_done())
            .unwrap_or(false);
        if !ready {
            return Status::Ok;
        }
        let mut out = Vec::new();
        {
            let state = conn.protocol_data_mut::<HttpState>().unwrap();
            let keepalive = state.request.is_keepalive_request();
            let body = state.request.body().to_vec();
            state.response.response(&mut out, 200, &body, keepalive);
        }
        conn.queue_output(&out);
        Status::Done
    });

    server.start().await.expect("server starts");
    let addr = server.local_addr().expect("tcp server has a local addr");
    (addr, server)
}

#[tokio::test]
async fn single_request_response_round_trip() {
    let (addr, _server) = spawn_echo_server(false).await;

    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream
        .write_all(b"POST /echo HTTP/1.1\r\nContent-Length: 5\r\n\r\nhello")
        .await
        .unwrap();

    let mut buf = Vec::new();
    stream.read_to_end(&mut buf).await.unwrap();
    let response = String::from_utf8_lossy(&buf);
    assert!(response.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(response.ends_with("hello"));
}

#[tokio::test]
async fn pipelined_requests_on_one_connection_are_answered_in_order() {
    let (addr, _server) = spawn_echo_server(true).await;

    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream
        .write_all(b"GET /one HTTP/1.1\r\nContent-Length: 0\r\nConnection: keep-alive\r\n\r\n")
        .await
        .unwrap();
    stream
        .write_all(b"GET /two HTTP/1.1\r\nContent-Length: 0\r\nConnection: close\r\n\r\n")
        .await
        .unwrap();

    let mut received = Vec::new();
    let mut chunk = [0u8; 256];
    loop {
        let rendered = String::from_utf8_lossy(&received);
        if rendered.matches("HTTP/1.1 200 OK").count() >= 2 {
            break;
        }
        let n = stream.read(&mut chunk).await.unwrap();
        assert!(n > 0, "connection closed before both responses arrived");
        received.extend_from_slice(&chunk[..n]);
    }
}

#[tokio::test]
async fn malformed_request_line_closes_connection() {
    let (addr, _server) = spawn_echo_server(false).await;

    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(b"NOTAREQUESTLINE\r\n\r\n").await.unwrap();

    let mut buf = Vec::new();
    let _ = stream.read_to_end(&mut buf).await;
    assert!(buf.is_empty());
}
