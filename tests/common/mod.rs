#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream, UdpSocket};

/// Counts the datagrams a fake server received.
#[derive(Clone, Default)]
pub struct Counter(Arc<AtomicUsize>);

impl Counter {
    pub fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }

    fn bump(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

/// Spawn a UDP server on localhost that answers every datagram with the
/// datagrams `handler` returns for it.
pub async fn spawn_udp<F>(mut handler: F) -> (SocketAddr, Counter)
where
    F: FnMut(&[u8]) -> Vec<Vec<u8>> + Send + 'static,
{
    let sock = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let addr = sock.local_addr().unwrap();
    let counter = Counter::default();
    let requests = counter.clone();

    tokio::spawn(async move {
        let mut buf = [0u8; 2048];
        loop {
            let (len, peer) = match sock.recv_from(&mut buf).await {
                Ok(received) => received,
                Err(_) => return,
            };
            requests.bump();
            for reply in handler(&buf[..len]) {
                let _ = sock.send_to(&reply, peer).await;
            }
        }
    });

    (addr, counter)
}

/// A UDP server that never answers.
pub async fn spawn_silent_udp() -> (SocketAddr, Counter) {
    spawn_udp(|_| Vec::new()).await
}

/// Prefix `payload` with the single packet header.
pub fn single(payload: &[u8]) -> Vec<u8> {
    let mut packet = vec![0xFF, 0xFF, 0xFF, 0xFF];
    packet.extend_from_slice(payload);
    packet
}

pub fn cstr(buf: &mut Vec<u8>, s: &str) {
    buf.extend_from_slice(s.as_bytes());
    buf.push(0);
}

/// Spawn a TCP server on localhost that handles a single connection with `script`.
pub async fn spawn_tcp<F, Fut>(script: F) -> SocketAddr
where
    F: FnOnce(TcpStream) -> Fut + Send + 'static,
    Fut: std::future::Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        if let Ok((stream, _)) = listener.accept().await {
            script(stream).await;
        }
    });

    addr
}

/// Read one rcon packet: (id, type, body without the two null bytes).
pub async fn read_rcon(stream: &mut TcpStream) -> Option<(i32, i32, Vec<u8>)> {
    let size = stream.read_i32_le().await.ok()?;
    let mut data = vec![0u8; size as usize];
    stream.read_exact(&mut data).await.ok()?;

    let id = i32::from_le_bytes(data[0..4].try_into().unwrap());
    let packet_type = i32::from_le_bytes(data[4..8].try_into().unwrap());
    let body = data[8..data.len() - 2].to_vec();
    Some((id, packet_type, body))
}

pub async fn write_rcon(stream: &mut TcpStream, id: i32, packet_type: i32, body: &[u8]) {
    let mut packet = Vec::new();
    packet.extend_from_slice(&(body.len() as i32 + 10).to_le_bytes());
    packet.extend_from_slice(&id.to_le_bytes());
    packet.extend_from_slice(&packet_type.to_le_bytes());
    packet.extend_from_slice(body);
    packet.extend_from_slice(&[0, 0]);
    stream.write_all(&packet).await.unwrap();
}

/// Answer an auth request the way srcds does: an empty response value
/// first, then the auth response, which echoes the request ID if `accept`.
pub async fn answer_auth(stream: &mut TcpStream, accept: bool) -> i32 {
    let (id, packet_type, _) = read_rcon(stream).await.unwrap();
    assert_eq!(packet_type, 3);

    write_rcon(stream, id, 0, b"").await;
    write_rcon(stream, if accept { id } else { -1 }, 2, b"").await;
    id
}
