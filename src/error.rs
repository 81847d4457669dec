use thiserror::Error;
use tokio::time::error::Elapsed;

/// Possible errors for the package.
#[derive(Error, Debug)]
pub enum SourceError {
    /// Returned if the peer did not answer before the socket timeout elapsed.
    #[error("timeout")]
    Timeout,
    /// Returned if the peer closed the connection while we expected data.
    #[error("connection reset by peer")]
    ConnectionReset,
    /// Returned if a packet does not start with a known connectionless header.
    #[error("unknown packet header: {0:#010x}")]
    UnknownPacketHeader(i32),
    /// Returned if the discriminator byte of a response is not known to us.
    #[error("unknown packet type: {0:#04x}")]
    UnknownPacketType(u8),
    /// Returned if an rcon packet carries a type code not known to us.
    #[error("unknown rcon packet type: {0}")]
    UnknownRconPacketType(i32),
    /// Returned if decoding would read past the end of the packet.
    #[error("unexpected end of packet: needed {needed} bytes, {available} left")]
    UnexpectedEnd { needed: usize, available: usize },
    /// Returned if a string field is not valid utf-8.
    #[error("packet string malformed (not valid ascii or utf-8)")]
    MalformedString(#[from] std::str::Utf8Error),
    /// Returned if a packet is structurally wrong in some other way.
    #[error("malformed packet: {0}")]
    MalformedPacket(String),
    /// Returned if the server answered with a different packet than the request calls for.
    #[error("unexpected {0} packet")]
    UnexpectedPacket(&'static str),
    /// Returned if a compressed split response is not valid bzip2 data.
    #[error("cannot decompress split response")]
    Decompression(#[source] std::io::Error),
    /// Returned if a decompressed split response does not have the size and
    /// CRC32 its first fragment announced.
    #[error("decompressed split response does not match its checksum")]
    ChecksumMismatch,
    /// Returned if an outgoing datagram exceeds the protocol maximum.
    #[error("packet of {0} bytes exceeds the maximum datagram size")]
    PacketTooLarge(usize),
    /// Returned if authentication is refused outright: the server closed the
    /// connection before answering. A new connection is needed to try again.
    #[error("banned by server")]
    RconBan,
    /// Returned if an rcon command is issued without a valid authentication.
    #[error("rcon connection is not authenticated")]
    RconNoAuth,
    /// Returned if a master server keeps sending batches past the configured limit.
    #[error("master server sent more than {0} batches")]
    BatchLimit(usize),
    /// Returned if no local port could be bound for the query socket.
    #[error("cannot bind local port")]
    FailedPortBind(#[source] std::io::Error),
    /// Returned if the host is down or behind a firewall.
    #[error("host cannot be reached")]
    UnreachableHost(#[source] std::io::Error),
    /// Returned if a host name does not resolve to any address.
    #[error("cannot resolve host {0}")]
    UnresolvableHost(String),
    /// Internal error used if there was a problem writing to the socket.
    #[error("cannot send message to host")]
    SendError(#[source] std::io::Error),
    /// Internal error used if there was a problem reading from the socket.
    #[error("cannot receive response from host")]
    ReceiveError(#[source] std::io::Error),
}

impl From<Elapsed> for SourceError {
    fn from(_: Elapsed) -> Self {
        SourceError::Timeout
    }
}

impl SourceError {
    /// Whether the error means the received bytes did not match the expected
    /// packet layout. Such errors are fatal for the current request.
    pub fn is_format_error(&self) -> bool {
        matches!(
            self,
            SourceError::UnknownPacketHeader(_)
                | SourceError::UnknownPacketType(_)
                | SourceError::UnknownRconPacketType(_)
                | SourceError::UnexpectedEnd { .. }
                | SourceError::MalformedString(_)
                | SourceError::MalformedPacket(_)
                | SourceError::UnexpectedPacket(_)
                | SourceError::Decompression(_)
                | SourceError::ChecksumMismatch
        )
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, SourceError::Timeout)
    }
}
