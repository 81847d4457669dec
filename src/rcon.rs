use std::net::SocketAddr;
use std::time::Duration;

use log::{debug, trace};

use crate::error::SourceError;
use crate::parse::PacketReader;
use crate::socket::TcpChannel;

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum RconPacketType {
    // SERVERDATA_AUTH
    Auth,
    // SERVERDATA_EXECCOMMAND
    Exec,
    // SERVERDATA_RESPONSE_VALUE
    Response,
}

impl RconPacketType {
    pub fn to_le_bytes(&self) -> [u8; 4] {
        let type_value: i32 = match self {
            RconPacketType::Auth => 3,
            RconPacketType::Exec => 2,
            RconPacketType::Response => 0,
        };
        type_value.to_le_bytes()
    }
}

/// An outgoing rcon packet.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct RconPacket {
    id: i32,
    packet_type: RconPacketType,
    body: String,
}

impl RconPacket {
    /// Size of ID, type and the two terminating null bytes.
    pub const BASE_PACKET_SIZE: i32 = 10;

    pub fn new(id: i32, packet_type: RconPacketType, body: &str) -> Self {
        RconPacket {
            id,
            packet_type,
            body: body.to_owned(),
        }
    }

    pub fn auth(id: i32, password: &str) -> Self {
        Self::new(id, RconPacketType::Auth, password)
    }

    pub fn exec(id: i32, command: &str) -> Self {
        Self::new(id, RconPacketType::Exec, command)
    }

    /// An empty SERVERDATA_RESPONSE_VALUE. srcds mirrors it back after all
    /// packets of the previous command, followed by one more empty packet.
    pub fn terminator(id: i32) -> Self {
        Self::new(id, RconPacketType::Response, "")
    }

    // Since the only one of these values that can change in length is the body,
    // an easy way to calculate the size of a packet is to find the byte-length
    // of the packet body, then add 10 to it.
    pub fn size(&self) -> i32 {
        self.body.len() as i32 + Self::BASE_PACKET_SIZE
    }

    pub fn id(&self) -> i32 {
        self.id
    }

    pub fn packet_type(&self) -> &RconPacketType {
        &self.packet_type
    }

    pub fn body(&self) -> &str {
        self.body.as_ref()
    }

    pub fn pack(&self) -> Vec<u8> {
        // Size, ID, Type, Body, Terminator
        let mut payload = Vec::<u8>::with_capacity(self.size() as usize + 4);
        payload.extend_from_slice(&self.size().to_le_bytes());
        payload.extend_from_slice(&self.id().to_le_bytes());
        payload.extend_from_slice(&self.packet_type().to_le_bytes());
        payload.extend_from_slice(self.body().as_bytes());
        // null terminate the body, then null terminate the entire packet
        payload.extend_from_slice(&[0u8, 0u8]);
        payload
    }
}

/// An incoming rcon packet, selected by its type code.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum RconResponse {
    /// SERVERDATA_AUTH_RESPONSE. The ID is `-1` if the password was wrong.
    Auth { id: i32 },
    /// SERVERDATA_RESPONSE_VALUE, one fragment of command output.
    Exec { id: i32, body: String },
}

impl RconResponse {
    /// Decode a packet without its length prefix.
    pub fn unpack(data: &[u8]) -> Result<Self, SourceError> {
        let mut reader = PacketReader::new(data);
        let id = reader.get_i32()?;
        let packet_type = reader.get_i32()?;

        match packet_type {
            2 => Ok(RconResponse::Auth { id }),
            0 => {
                // the body is null terminated; anything after that is padding
                let rest = reader.rest();
                let end = rest.iter().position(|c| *c == 0).unwrap_or(rest.len());
                let body = std::str::from_utf8(&rest[..end])?.to_string();
                Ok(RconResponse::Exec { id, body })
            }
            n => Err(SourceError::UnknownRconPacketType(n)),
        }
    }

    pub fn id(&self) -> i32 {
        match self {
            RconResponse::Auth { id } => *id,
            RconResponse::Exec { id, .. } => *id,
        }
    }

    /// Command output carried by the packet; empty for auth responses.
    pub fn body(&self) -> &str {
        match self {
            RconResponse::Auth { .. } => "",
            RconResponse::Exec { body, .. } => body,
        }
    }
}

/// TCP socket speaking the length-prefixed rcon protocol.
pub struct RconSocket {
    channel: TcpChannel,
}

impl RconSocket {
    /// Smallest valid size field: ID, type and two null bytes.
    const MIN_PACKET_SIZE: usize = RconPacket::BASE_PACKET_SIZE as usize;
    /// srcds never sends a body longer than 4096 bytes.
    const MAX_PACKET_SIZE: usize = 4096 + Self::MIN_PACKET_SIZE;

    /// The connection is only opened when the first packet is sent.
    pub fn new(addr: SocketAddr, timeout: Duration) -> Self {
        RconSocket {
            channel: TcpChannel::new(addr, timeout),
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.channel.addr()
    }

    pub fn is_connected(&self) -> bool {
        self.channel.is_connected()
    }

    /// Send a packet, reopening the connection if it was closed.
    pub async fn send(&mut self, packet: &RconPacket) -> Result<(), SourceError> {
        trace!(
            "sending {:?} packet {} to {}",
            packet.packet_type(),
            packet.id(),
            self.addr()
        );
        self.channel.send(&packet.pack()).await
    }

    /// Read the next packet.
    ///
    /// Returns `None` if the server closed the connection (or it was never
    /// opened); the socket is closed afterwards.
    pub async fn reply(&mut self) -> Result<Option<RconResponse>, SourceError> {
        if !self.channel.is_connected() {
            return Ok(None);
        }

        match self.channel.receive(4).await {
            Ok(_) => {}
            Err(SourceError::ConnectionReset) => return Ok(None),
            Err(e) => return Err(e),
        }

        // the size field stays buffered until the whole packet is there, so
        // a timeout leaves the stream at a packet boundary
        let size = PacketReader::new(self.channel.buffered()).get_i32()?;
        if size < Self::MIN_PACKET_SIZE as i32 || size > Self::MAX_PACKET_SIZE as i32 {
            self.close();
            return Err(SourceError::MalformedPacket(format!("rcon packet size {}", size)));
        }
        let size = size as usize;

        // a stream cut short in the middle of a packet is not a clean close
        match self.channel.receive(4 + size).await {
            Ok(_) => {}
            Err(SourceError::ConnectionReset) => {
                return Err(SourceError::MalformedPacket(format!(
                    "connection closed inside a packet of {} bytes",
                    size
                )))
            }
            Err(e) => return Err(e),
        }

        self.channel.take(4);
        let packet = RconResponse::unpack(&self.channel.take(size))?;
        debug!("received rcon packet {} ({} bytes)", packet.id(), size);
        Ok(Some(packet))
    }

    /// Close the connection. Does nothing if not connected.
    pub fn close(&mut self) {
        self.channel.close();
    }
}
