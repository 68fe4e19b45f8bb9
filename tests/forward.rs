//! End-to-end forward requests through a real origin.

mod common;

use std::time::Duration;

use common::{send_raw, start_origin, start_proxy, test_config};
use tokio::net::TcpListener;

#[tokio::test]
async fn get_is_relayed_with_bare_status_line() {
    let (origin, mut requests) = start_origin(200, "hello from origin").await;
    let proxy = start_proxy(test_config()).await;

    let wire = format!(
        "GET http://{}/path?q=1 HTTP/1.1\r\nHost: client-supplied.example\r\nProxy-Connection: keep-alive\r\nAccept: text/plain\r\n\r\n",
        origin
    );
    let out = send_raw(proxy.addr, wire.as_bytes()).await;
    assert_eq!(out, b"HTTP/1.1 200\n\nhello from origin");

    let captured = requests.recv().await.unwrap();
    assert!(captured.head.starts_with("GET /path?q=1 HTTP/1.1"));
    assert!(!captured.head.contains("client-supplied.example"));
    assert!(captured.header_values("proxy-connection").is_empty());
    assert_eq!(captured.header_values("accept"), vec!["text/plain"]);
    assert_eq!(captured.header_values("x-forwarded-for"), vec!["127.0.0.1"]);
    assert!(captured.body.is_empty());
}

#[tokio::test]
async fn client_x_forwarded_for_is_replaced() {
    let (origin, mut requests) = start_origin(204, "").await;
    let proxy = start_proxy(test_config()).await;

    let wire = format!(
        "DELETE http://{}/item HTTP/1.1\r\nX-Forwarded-For: 203.0.113.9\r\n\r\n",
        origin
    );
    let out = send_raw(proxy.addr, wire.as_bytes()).await;
    assert_eq!(out, b"HTTP/1.1 204\n\n");

    let captured = requests.recv().await.unwrap();
    assert_eq!(captured.header_values("x-forwarded-for"), vec!["127.0.0.1"]);
}

#[tokio::test]
async fn post_body_reaches_origin() {
    let (origin, mut requests) = start_origin(201, "created").await;
    let proxy = start_proxy(test_config()).await;

    let wire = format!(
        "POST http://{}/items HTTP/1.1\r\nContent-Type: application/json\r\nContent-Length: 12\r\n\r\n{{\"name\":\"a\"}}",
        origin
    );
    let out = send_raw(proxy.addr, wire.as_bytes()).await;
    assert_eq!(out, b"HTTP/1.1 201\n\ncreated");

    let captured = requests.recv().await.unwrap();
    assert_eq!(captured.body, b"{\"name\":\"a\"}");
}

#[tokio::test]
async fn identical_requests_are_independent() {
    let (origin, mut requests) = start_origin(200, "same").await;
    let proxy = start_proxy(test_config()).await;

    let wire = format!("GET http://{}/ HTTP/1.1\r\n\r\n", origin);
    let first = send_raw(proxy.addr, wire.as_bytes()).await;
    let second = send_raw(proxy.addr, wire.as_bytes()).await;
    assert_eq!(first, second);
    assert_eq!(first, b"HTTP/1.1 200\n\nsame");

    requests.recv().await.unwrap();
    requests.recv().await.unwrap();
    assert!(common::eventually(Duration::from_secs(1), || proxy.workers.stopped() == 2).await);
}

#[tokio::test]
async fn unreachable_origin_closes_without_response() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let dead = listener.local_addr().unwrap();
    drop(listener);

    let proxy = start_proxy(test_config()).await;
    let wire = format!("GET http://{}/ HTTP/1.1\r\n\r\n", dead);
    let out = send_raw(proxy.addr, wire.as_bytes()).await;
    assert!(out.is_empty());
}

#[tokio::test]
async fn malformed_request_line_gets_no_bytes() {
    let proxy = start_proxy(test_config()).await;
    let out = send_raw(proxy.addr, b"BADLINE\r\n\r\n").await;
    assert!(out.is_empty());

    assert!(common::eventually(Duration::from_secs(1), || proxy.workers.stopped() == 1).await);
    assert!(common::eventually(Duration::from_secs(1), || proxy.dispatcher.tracker().active_count() == 0).await);
}

#[tokio::test]
async fn header_without_colon_is_rejected() {
    let proxy = start_proxy(test_config()).await;
    let out = send_raw(proxy.addr, b"GET http://example.test/ HTTP/1.1\r\nNoColonHere\r\n\r\n").await;
    assert!(out.is_empty());
}
