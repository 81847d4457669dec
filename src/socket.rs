use std::io::ErrorKind;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;

use log::{debug, trace};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UdpSocket};
use tokio::time::timeout;

use crate::error::SourceError;
use crate::packet::MAX_PACKET_SIZE;

/// A connected UDP socket that is bound on first use.
///
/// One datagram goes out per [UdpChannel::send]; one comes back per
/// [UdpChannel::receive], or the timeout elapses.
pub struct UdpChannel {
    addr: SocketAddr,
    socket: Option<UdpSocket>,
    timeout: Duration,
    buffer: [u8; MAX_PACKET_SIZE],
}

impl UdpChannel {
    pub fn new(addr: SocketAddr, timeout: Duration) -> Self {
        UdpChannel {
            addr,
            socket: None,
            timeout,
            buffer: [0u8; MAX_PACKET_SIZE],
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    async fn open(&mut self) -> Result<&UdpSocket, SourceError> {
        if self.socket.is_none() {
            // just arbitrarily bind any port, doesn't matter really
            let local = if self.addr.is_ipv4() {
                SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0)
            } else {
                SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), 0)
            };
            let sock = UdpSocket::bind(local)
                .await
                .map_err(SourceError::FailedPortBind)?;
            sock.connect(self.addr)
                .await
                .map_err(SourceError::UnreachableHost)?;
            debug!("opened udp socket to {}", self.addr);
            self.socket = Some(sock);
        }

        match self.socket.as_ref() {
            Some(sock) => Ok(sock),
            None => Err(SourceError::ConnectionReset),
        }
    }

    /// Send one datagram.
    pub async fn send(&mut self, bytes: &[u8]) -> Result<(), SourceError> {
        if bytes.len() > MAX_PACKET_SIZE {
            return Err(SourceError::PacketTooLarge(bytes.len()));
        }

        let timeout_dur = self.timeout;
        let addr = self.addr;
        let sock = self.open().await?;
        trace!("sending {} bytes to {}", bytes.len(), addr);
        timeout(timeout_dur, sock.send(bytes))
            .await?
            .map_err(SourceError::SendError)?;
        Ok(())
    }

    /// Wait for the next datagram and return its bytes.
    pub async fn receive(&mut self) -> Result<&[u8], SourceError> {
        let timeout_dur = self.timeout;
        let sock = match self.socket.as_ref() {
            Some(sock) => sock,
            None => return Err(SourceError::ConnectionReset),
        };

        let result = timeout(timeout_dur, sock.recv(&mut self.buffer)).await?;
        let len = match result {
            Ok(len) => len,
            Err(e)
                if e.kind() == ErrorKind::ConnectionRefused
                    || e.kind() == ErrorKind::ConnectionReset =>
            {
                // ICMP port unreachable surfaces as a refused connection
                self.close();
                return Err(SourceError::ConnectionReset);
            }
            Err(e) => return Err(SourceError::ReceiveError(e)),
        };
        trace!("received {} bytes from {}", len, self.addr);

        Ok(&self.buffer[..len])
    }

    /// Throw away datagrams that already arrived without waiting for more.
    /// Returns how many were dropped.
    pub fn discard_pending(&mut self) -> usize {
        let sock = match self.socket.as_ref() {
            Some(sock) => sock,
            None => return 0,
        };

        let mut dropped = 0;
        while sock.try_recv(&mut self.buffer).is_ok() {
            dropped += 1;
        }
        if dropped > 0 {
            debug!("discarded {} stale datagrams from {}", dropped, self.addr);
        }
        dropped
    }

    pub fn close(&mut self) {
        if self.socket.take().is_some() {
            debug!("closed udp socket to {}", self.addr);
        }
    }
}

/// A TCP stream that connects on first send and reconnects after being closed.
///
/// Received bytes are collected in an internal buffer; [TcpChannel::take]
/// removes them from its front.
pub struct TcpChannel {
    addr: SocketAddr,
    stream: Option<TcpStream>,
    timeout: Duration,
    buffer: Vec<u8>,
}

impl TcpChannel {
    const READ_CHUNK: usize = 4096;

    pub fn new(addr: SocketAddr, timeout: Duration) -> Self {
        TcpChannel {
            addr,
            stream: None,
            timeout,
            buffer: Vec::new(),
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    /// Connect to the peer, waiting at most for the socket timeout.
    pub async fn connect(&mut self) -> Result<(), SourceError> {
        if self.is_connected() {
            return Ok(());
        }

        let stream = timeout(self.timeout, TcpStream::connect(self.addr))
            .await?
            .map_err(SourceError::UnreachableHost)?;
        debug!("opened tcp stream to {}", self.addr);

        self.buffer.clear();
        self.stream = Some(stream);
        Ok(())
    }

    /// Write the whole buffer, connecting first if needed.
    pub async fn send(&mut self, bytes: &[u8]) -> Result<(), SourceError> {
        self.connect().await?;

        let timeout_dur = self.timeout;
        let result = match self.stream.as_mut() {
            Some(stream) => timeout(timeout_dur, stream.write_all(bytes)).await?,
            None => return Err(SourceError::ConnectionReset),
        };

        match result {
            Ok(()) => {
                trace!("sent {} bytes to {}", bytes.len(), self.addr);
                Ok(())
            }
            Err(e) => {
                self.close();
                Err(SourceError::SendError(e))
            }
        }
    }

    /// Wait until at least `min_bytes` are buffered and return the number of
    /// buffered bytes.
    ///
    /// If the peer closed the connection the stream is torn down and
    /// [SourceError::ConnectionReset] is returned.
    pub async fn receive(&mut self, min_bytes: usize) -> Result<usize, SourceError> {
        let timeout_dur = self.timeout;
        let result = match self.stream.as_mut() {
            Some(stream) => {
                timeout(timeout_dur, Self::fill(stream, &mut self.buffer, min_bytes)).await?
            }
            None => return Err(SourceError::ConnectionReset),
        };

        match result {
            Ok(len) => Ok(len),
            Err(SourceError::ConnectionReset) => {
                debug!("{} closed the connection", self.addr);
                self.close();
                Err(SourceError::ConnectionReset)
            }
            Err(e) => {
                self.close();
                Err(e)
            }
        }
    }

    async fn fill(
        stream: &mut TcpStream,
        buffer: &mut Vec<u8>,
        min_bytes: usize,
    ) -> Result<usize, SourceError> {
        let mut chunk = [0u8; Self::READ_CHUNK];

        while buffer.len() < min_bytes {
            match stream.read(&mut chunk).await {
                Ok(0) => return Err(SourceError::ConnectionReset),
                Ok(n) => buffer.extend_from_slice(&chunk[..n]),
                Err(e)
                    if e.kind() == ErrorKind::ConnectionReset
                        || e.kind() == ErrorKind::ConnectionAborted =>
                {
                    return Err(SourceError::ConnectionReset)
                }
                Err(e) => return Err(SourceError::ReceiveError(e)),
            }
        }

        Ok(buffer.len())
    }

    /// Bytes received but not taken yet.
    pub fn buffered(&self) -> &[u8] {
        &self.buffer
    }

    /// Remove and return the first `count` buffered bytes.
    pub fn take(&mut self, count: usize) -> Vec<u8> {
        let count = count.min(self.buffer.len());
        self.buffer.drain(..count).collect()
    }

    /// Drop the connection. Does nothing if not connected.
    pub fn close(&mut self) {
        if self.stream.take().is_some() {
            debug!("closed tcp stream to {}", self.addr);
        }
        self.buffer.clear();
    }
}
