extern crate env_logger;
extern crate spindle_http;

use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use spindle_http::{Handler, Header, Options, Request, Response};
use spindle_http::{ResponseSender, Server};

fn serve<H: Handler>(options: &mut Options, handler: H) -> Server {
    let _ = env_logger::try_init();
    let mut server = Server::new(
        options.host("127.0.0.1").port(0).done(), handler);
    server.start().expect("server starts");
    server
}

fn connect(server: &Server) -> TcpStream {
    let stream = TcpStream::connect(server.local_addr().unwrap()).unwrap();
    stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
    stream
}

fn read_exactly(stream: &mut TcpStream, len: usize) -> Vec<u8> {
    let mut buf = vec![0; len];
    stream.read_exact(&mut buf).unwrap();
    buf
}

fn text_response(body: &str) -> Response {
    Response::new(200, "OK",
        vec![Header::new("Content-Type", "text/plain")],
        body.as_bytes().to_vec())
}

fn text_wire(body: &str) -> String {
    format!("HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\n\
             Content-Length: {}\r\n\r\n{}", body.len(), body)
}

fn hello(_request: Request, sender: ResponseSender) {
    sender.send(text_response("hi"));
}

fn echo(request: Request, sender: ResponseSender) {
    let body = String::from_utf8(request.body().to_vec()).unwrap();
    sender.send(text_response(&body));
}

#[test]
fn minimal_get_keeps_connection_open() {
    let mut server = serve(Options::new().concurrency(1), hello);
    let mut stream = connect(&server);
    let expected = text_wire("hi");
    stream.write_all(b"GET / HTTP/1.1\r\nHost: x\r\n\r\n").unwrap();
    assert_eq!(read_exactly(&mut stream, expected.len()),
               expected.as_bytes());
    // The connection survived; a second request round-trips on it
    stream.write_all(b"GET / HTTP/1.1\r\nHost: x\r\n\r\n").unwrap();
    assert_eq!(read_exactly(&mut stream, expected.len()),
               expected.as_bytes());
    server.stop();
    server.join();
}

#[test]
fn http10_defaults_to_close() {
    let mut server = serve(Options::new().concurrency(1), hello);
    let mut stream = connect(&server);
    stream.write_all(b"GET / HTTP/1.0\r\nHost: x\r\n\r\n").unwrap();
    let mut bytes = Vec::new();
    stream.read_to_end(&mut bytes).unwrap();
    assert_eq!(&bytes[..], concat!(
        "HTTP/1.1 200 OK\r\n",
        "Content-Type: text/plain\r\n",
        "Content-Length: 2\r\n",
        "Connection: close\r\n",
        "\r\n",
        "hi").as_bytes());
    server.stop();
    server.join();
}

#[test]
fn explicit_close_is_honored_on_http11() {
    let mut server = serve(Options::new().concurrency(1), hello);
    let mut stream = connect(&server);
    stream.write_all(
        b"GET / HTTP/1.1\r\nConnection: close\r\n\r\n").unwrap();
    let mut bytes = Vec::new();
    stream.read_to_end(&mut bytes).unwrap();
    assert!(bytes.ends_with(b"\r\nhi"));
    server.stop();
    server.join();
}

#[test]
fn chunked_request_body_is_decoded() {
    let mut server = serve(Options::new().concurrency(1), echo);
    let mut stream = connect(&server);
    stream.write_all(concat!(
        "POST /upload HTTP/1.1\r\n",
        "Transfer-Encoding: chunked\r\n",
        "\r\n",
        "5\r\nhello\r\n",
        "6\r\n world\r\n",
        "0\r\n\r\n").as_bytes()).unwrap();
    let expected = text_wire("hello world");
    assert_eq!(read_exactly(&mut stream, expected.len()),
               expected.as_bytes());
    server.stop();
    server.join();
}

// Three pipelined requests completed from a foreign thread in the
// order 3, 1, 2 must still produce wire order 1, 2, 3.
#[test]
fn pipelined_responses_keep_request_order() {
    let pending: Arc<Mutex<Vec<(String, ResponseSender)>>> =
        Arc::new(Mutex::new(Vec::new()));
    let inbox = pending.clone();
    let mut server = serve(Options::new().concurrency(1),
        move |request: Request, sender: ResponseSender| {
            inbox.lock().unwrap()
                .push((request.uri().to_string(), sender));
        });
    let mut stream = connect(&server);
    stream.write_all(concat!(
        "GET /1 HTTP/1.1\r\n\r\n",
        "GET /2 HTTP/1.1\r\n\r\n",
        "GET /3 HTTP/1.1\r\n\r\n").as_bytes()).unwrap();

    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        if pending.lock().unwrap().len() == 3 {
            break;
        }
        assert!(Instant::now() < deadline, "requests did not arrive");
        thread::sleep(Duration::from_millis(10));
    }
    let mut collected: Vec<(String, ResponseSender)> =
        pending.lock().unwrap().drain(..).collect();
    let mut complete = |uri: &str, body: &str| {
        let pos = collected.iter()
            .position(|(u, _)| u == uri)
            .expect("request seen");
        let (_, sender) = collected.remove(pos);
        sender.send(text_response(body));
    };
    complete("/3", "three");
    complete("/1", "one");
    complete("/2", "two");

    let expected = format!("{}{}{}",
        text_wire("one"), text_wire("two"), text_wire("three"));
    assert_eq!(read_exactly(&mut stream, expected.len()),
               expected.as_bytes());
    server.stop();
    server.join();
}

#[test]
fn oversized_request_closes_without_response() {
    let mut server = serve(
        Options::new().concurrency(1).max_request_size(64), hello);
    let mut stream = connect(&server);
    stream.write_all(&[b'x'; 64]).unwrap();
    let mut buf = [0; 64];
    // Either a clean EOF or a reset, but never any response bytes
    match stream.read(&mut buf) {
        Ok(received) => assert_eq!(received, 0),
        Err(_) => {}
    }
    server.stop();
    server.join();
}

#[test]
fn idle_connection_times_out_silently() {
    let mut server = serve(
        Options::new()
            .concurrency(1)
            .request_timeout(Duration::from_millis(200))
            .resolution(Duration::from_millis(50)),
        hello);
    let mut stream = connect(&server);
    let started = Instant::now();
    let mut buf = [0; 64];
    let received = stream.read(&mut buf).unwrap();
    assert_eq!(received, 0);
    assert!(started.elapsed() >= Duration::from_millis(150));
    server.stop();
    server.join();
}

#[test]
fn expect_continue_gets_interim_response() {
    let mut server = serve(Options::new().concurrency(1), echo);
    let mut stream = connect(&server);
    stream.write_all(concat!(
        "POST / HTTP/1.1\r\n",
        "Content-Length: 5\r\n",
        "Expect: 100-continue\r\n",
        "\r\n").as_bytes()).unwrap();
    let interim = "HTTP/1.1 100 Continue\r\n\r\n";
    assert_eq!(read_exactly(&mut stream, interim.len()),
               interim.as_bytes());
    stream.write_all(b"hello").unwrap();
    let expected = text_wire("hello");
    assert_eq!(read_exactly(&mut stream, expected.len()),
               expected.as_bytes());
    server.stop();
    server.join();
}

// Accepted sockets are dealt round-robin to all reactors; every one of
// them must serve its connections.
#[test]
fn connections_are_shared_between_reactors() {
    let mut server = serve(Options::new().concurrency(2), hello);
    let expected = text_wire("hi");
    for _ in 0..4 {
        let mut stream = connect(&server);
        stream.write_all(b"GET / HTTP/1.1\r\nHost: x\r\n\r\n").unwrap();
        assert_eq!(read_exactly(&mut stream, expected.len()),
                   expected.as_bytes());
    }
    server.stop();
    server.join();
}

#[test]
fn stop_terminates_all_reactors() {
    let mut server = serve(Options::new().concurrency(3), hello);
    server.stop();
    server.join();
}
