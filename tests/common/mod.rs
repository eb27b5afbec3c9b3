#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use warden::server::{Connection, ConnectionManager, Services, Transport};

pub const UPGRADE_REQUEST: &[u8] = b"GET /chat HTTP/1.1\r\n\
Host: localhost\r\n\
Upgrade: websocket\r\n\
Connection: Upgrade\r\n\
Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\
Sec-WebSocket-Version: 13\r\n\r\n";

pub fn peer() -> SocketAddr {
    "127.0.0.1:9000".parse().unwrap()
}

/// Hands one end of an in-memory pipe to `manager` and returns the other.
pub fn connect(manager: &ConnectionManager) -> (DuplexStream, Arc<Connection>) {
    connect_from(manager, peer())
}

pub fn connect_from(
    manager: &ConnectionManager,
    peer: SocketAddr,
) -> (DuplexStream, Arc<Connection>) {
    let (client, server) = tokio::io::duplex(64 * 1024);
    let conn = manager.accept(Transport::plain(server, peer));
    (client, conn)
}

pub fn manager(services: Services) -> ConnectionManager {
    ConnectionManager::new(services, Duration::from_secs(20))
}

/// Reads one HTTP response: the head plus `Content-Length` body bytes.
pub async fn read_response(client: &mut DuplexStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];

    let head_end = loop {
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
        let n = client.read(&mut chunk).await.unwrap();
        assert!(n > 0, "connection closed before a full response head");
        buf.extend_from_slice(&chunk[..n]);
    };

    let head = String::from_utf8_lossy(&buf[..head_end]).to_string();
    let content_length = head
        .lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(k, _)| k.trim().eq_ignore_ascii_case("content-length"))
        .map(|(_, v)| v.trim().parse::<usize>().unwrap())
        .unwrap_or(0);

    while buf.len() < head_end + content_length {
        let n = client.read(&mut chunk).await.unwrap();
        assert!(n > 0, "connection closed before the full body");
        buf.extend_from_slice(&chunk[..n]);
    }

    String::from_utf8_lossy(&buf[..head_end + content_length]).to_string()
}

/// Waits for the server side to close; returns the bytes seen meanwhile.
pub async fn read_to_eof(client: &mut DuplexStream) -> Vec<u8> {
    let mut rest = Vec::new();
    tokio::time::timeout(Duration::from_secs(5), client.read_to_end(&mut rest))
        .await
        .expect("server did not close the connection")
        .unwrap();
    rest
}

pub async fn send(client: &mut DuplexStream, bytes: &[u8]) {
    client.write_all(bytes).await.unwrap();
}

/// A client frame: final, masked, payload under 126 bytes.
pub fn masked(opcode: u8, payload: &[u8]) -> Vec<u8> {
    assert!(payload.len() < 126);
    let mask = [0x12, 0x34, 0x56, 0x78];
    let mut out = vec![0x80 | opcode, 0x80 | payload.len() as u8];
    out.extend_from_slice(&mask);
    out.extend(payload.iter().enumerate().map(|(i, b)| b ^ mask[i % 4]));
    out
}

/// Reads one short unmasked server frame as (first byte, payload).
pub async fn read_frame(client: &mut DuplexStream) -> (u8, Vec<u8>) {
    let mut header = [0u8; 2];
    client.read_exact(&mut header).await.unwrap();
    assert_eq!(header[1] & 0x80, 0, "server frames are never masked");

    let len = (header[1] & 0x7F) as usize;
    assert!(len < 126);

    let mut payload = vec![0u8; len];
    client.read_exact(&mut payload).await.unwrap();
    (header[0], payload)
}

/// Performs the upgrade handshake and returns the 101 response.
pub async fn upgrade(client: &mut DuplexStream) -> String {
    send(client, UPGRADE_REQUEST).await;
    read_response(client).await
}

/// Polls `check` until it holds or a second has passed.
pub async fn eventually(mut check: impl FnMut() -> bool) {
    for _ in 0..100 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(check(), "condition not reached in time");
}
