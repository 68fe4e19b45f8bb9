//! End-to-end CONNECT tunnels.

mod common;

use std::time::{Duration, Instant};

use common::{start_echo_target, start_proxy, test_config};
use forward_proxy::proxy::tunnel::CONNECT_ESTABLISHED;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

async fn open_tunnel(proxy: std::net::SocketAddr, target: std::net::SocketAddr) -> TcpStream {
    let mut stream = TcpStream::connect(proxy).await.unwrap();
    let head = format!("CONNECT {} HTTP/1.1\r\nHost: {}\r\n\r\n", target, target);
    stream.write_all(head.as_bytes()).await.unwrap();

    let mut ack = [0u8; CONNECT_ESTABLISHED.len()];
    stream.read_exact(&mut ack).await.unwrap();
    assert_eq!(&ack, CONNECT_ESTABLISHED);
    stream
}

#[tokio::test]
async fn connect_relays_bytes_both_ways() {
    let target = start_echo_target().await;
    let proxy = start_proxy(test_config()).await;
    let mut stream = open_tunnel(proxy.addr, target).await;

    // Not HTTP: the tunnel must not care.
    let payload: Vec<u8> = (0..=255u8).cycle().take(10_000).collect();
    stream.write_all(&payload).await.unwrap();
    let mut echoed = vec![0u8; payload.len()];
    stream.read_exact(&mut echoed).await.unwrap();
    assert_eq!(echoed, payload);

    stream.shutdown().await.unwrap();
    let mut rest = Vec::new();
    tokio::time::timeout(Duration::from_secs(2), stream.read_to_end(&mut rest))
        .await
        .unwrap()
        .unwrap();
    assert!(rest.is_empty());
}

#[tokio::test]
async fn idle_tunnel_is_closed() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let target = listener.local_addr().unwrap();
    // Accept and hold the socket without ever writing or closing it.
    let held = tokio::spawn(async move { listener.accept().await.map(|(s, _)| s) });

    let proxy = start_proxy(test_config()).await;
    let mut stream = open_tunnel(proxy.addr, target).await;

    let started = Instant::now();
    let mut rest = Vec::new();
    tokio::time::timeout(Duration::from_secs(3), stream.read_to_end(&mut rest))
        .await
        .expect("idle tunnel was not closed")
        .unwrap();
    assert!(rest.is_empty());
    assert!(started.elapsed() < Duration::from_secs(2));

    drop(held);
}

#[tokio::test]
async fn unreachable_target_gets_no_acknowledgment() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let dead = listener.local_addr().unwrap();
    drop(listener);

    let proxy = start_proxy(test_config()).await;
    let wire = format!("CONNECT {} HTTP/1.1\r\n\r\n", dead);
    let out = common::send_raw(proxy.addr, wire.as_bytes()).await;
    assert!(out.is_empty());
}

#[tokio::test]
async fn bytes_after_head_are_relayed() {
    let target = start_echo_target().await;
    let proxy = start_proxy(test_config()).await;

    // Head and first tunnel bytes in a single write.
    let mut stream = TcpStream::connect(proxy.addr).await.unwrap();
    let wire = format!("CONNECT {} HTTP/1.1\r\n\r\nearly", target);
    stream.write_all(wire.as_bytes()).await.unwrap();

    let mut received = vec![0u8; CONNECT_ESTABLISHED.len() + 5];
    stream.read_exact(&mut received).await.unwrap();
    assert_eq!(received, [CONNECT_ESTABLISHED, b"early"].concat());
}
