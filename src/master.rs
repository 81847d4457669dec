//! Server lists from Valve's master servers.
//!
//! https://developer.valvesoftware.com/wiki/Master_Server_Query_Protocol

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::ops::ControlFlow;

use log::{debug, info, warn};

use crate::config::MasterOptions;
use crate::endpoint::Endpoint;
use crate::error::SourceError;
use crate::packet::{Engine, RequestPacket, ResponsePacket};
use crate::parse::PacketReader;
use crate::query::QuerySocket;

/// Master server for Source engine games.
pub const SOURCE_MASTER_SERVER: &str = "hl2master.steampowered.com:27011";

/// Master server for GoldSrc engine games.
pub const GOLDSRC_MASTER_SERVER: &str = "hl1master.steampowered.com:27010";

/// Seed of the first request, and the last address of the last batch.
pub const END_OF_LIST: SocketAddrV4 = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0);

/// Byte following the type of every M2A_SERVER_BATCH.
const BATCH_SEPARATOR: u8 = 0x0A;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Region {
    UsEastCoast,
    UsWestCoast,
    SouthAmerica,
    Europe,
    Asia,
    Australia,
    MiddleEast,
    Africa,
    All,
}

impl Region {
    pub fn to_byte(&self) -> u8 {
        match self {
            Region::UsEastCoast => 0x00,
            Region::UsWestCoast => 0x01,
            Region::SouthAmerica => 0x02,
            Region::Europe => 0x03,
            Region::Asia => 0x04,
            Region::Australia => 0x05,
            Region::MiddleEast => 0x06,
            Region::Africa => 0x07,
            Region::All => 0xFF,
        }
    }
}

/// Parse the body of an M2A_SERVER_BATCH response, after its type byte.
///
/// Each entry is four address octets and a big-endian port.
pub fn parse_batch(reader: &mut PacketReader) -> Result<Vec<SocketAddrV4>, SourceError> {
    if reader.get_u8()? != BATCH_SEPARATOR {
        return Err(SourceError::MalformedPacket(
            "master query response is missing the 0x0A byte".to_string(),
        ));
    }

    let mut servers = Vec::with_capacity(reader.remaining() / 6);
    while reader.remaining() > 0 {
        let ip = Ipv4Addr::new(
            reader.get_u8()?,
            reader.get_u8()?,
            reader.get_u8()?,
            reader.get_u8()?,
        );
        let port = reader.get_u16_be()?;
        servers.push(SocketAddrV4::new(ip, port));
    }

    Ok(servers)
}

/// Client of one master server, which may resolve to several addresses.
pub struct MasterServer {
    endpoint: Endpoint,
    socket: QuerySocket,
    options: MasterOptions,
}

impl MasterServer {
    /// Resolve `host` (e.g. [SOURCE_MASTER_SERVER]) to all of its addresses.
    pub async fn new(host: &str, options: MasterOptions) -> Result<Self, SourceError> {
        let endpoint = Endpoint::resolve_with_port(host, 27011).await?;
        Ok(Self::from_endpoint(endpoint, options))
    }

    pub fn from_endpoint(endpoint: Endpoint, options: MasterOptions) -> Self {
        let socket = QuerySocket::new(endpoint.addr(), Engine::Source, options.timeout);
        MasterServer {
            endpoint,
            socket,
            options,
        }
    }

    pub fn from_addr(addr: SocketAddr, options: MasterOptions) -> Self {
        Self::from_endpoint(Endpoint::from(addr), options)
    }

    /// The address currently queried.
    pub fn addr(&self) -> SocketAddr {
        self.endpoint.addr()
    }

    /// Request every server matching `filter` in `region`.
    ///
    /// Repeated timeouts at the same page make the client move on to the next
    /// address of the master server and start over. With `force`, the servers
    /// collected until the timeouts are returned instead.
    pub async fn servers(
        &mut self,
        region: Region,
        filter: &str,
        force: bool,
    ) -> Result<Vec<SocketAddrV4>, SourceError> {
        self.servers_with(region, filter, force, |_| ControlFlow::Continue(()))
            .await
    }

    /// Like [MasterServer::servers], calling `on_batch` with the new servers of
    /// every page. Returning [ControlFlow::Break] ends the enumeration with
    /// the servers collected so far.
    pub async fn servers_with<F>(
        &mut self,
        region: Region,
        filter: &str,
        force: bool,
        mut on_batch: F,
    ) -> Result<Vec<SocketAddrV4>, SourceError>
    where
        F: FnMut(&[SocketAddrV4]) -> ControlFlow<()>,
    {
        let mut attempts = 1;

        loop {
            let mut servers = Vec::new();
            match self.enumerate(region, filter, &mut servers, &mut on_batch).await {
                Ok(()) => return Ok(servers),
                Err(SourceError::Timeout) if force => {
                    warn!("{} timed out, returning {} servers", self.addr(), servers.len());
                    return Ok(servers);
                }
                Err(SourceError::Timeout) => {
                    if attempts >= self.endpoint.addrs().len() || !self.endpoint.rotate() {
                        return Err(SourceError::Timeout);
                    }
                    attempts += 1;
                    info!("master server timed out, retrying with {}", self.endpoint.addr());
                    self.socket.close();
                    self.socket = QuerySocket::new(
                        self.endpoint.addr(),
                        Engine::Source,
                        self.options.timeout,
                    );
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Page through the server list of the current address.
    async fn enumerate<F>(
        &mut self,
        region: Region,
        filter: &str,
        servers: &mut Vec<SocketAddrV4>,
        on_batch: &mut F,
    ) -> Result<(), SourceError>
    where
        F: FnMut(&[SocketAddrV4]) -> ControlFlow<()>,
    {
        let mut seed = END_OF_LIST;
        let mut previous_first: Option<SocketAddrV4> = None;
        let mut fail_count = 0;
        let mut batches = 0;
        let mut awaiting = false;

        loop {
            if batches >= self.options.max_batches {
                return Err(SourceError::BatchLimit(self.options.max_batches));
            }

            if !awaiting {
                self.socket
                    .send(&RequestPacket::master_query(region, &seed, filter))
                    .await?;
            }
            awaiting = false;

            let batch = match self.socket.reply().await {
                Ok(ResponsePacket::MasterServerBatch(batch)) => batch,
                Ok(other) => return Err(SourceError::UnexpectedPacket(other.name())),
                Err(SourceError::Timeout) => {
                    fail_count += 1;
                    warn!(
                        "master server timed out after {} ({}/{})",
                        seed, fail_count, self.options.retries
                    );
                    if fail_count >= self.options.retries {
                        return Err(SourceError::Timeout);
                    }
                    self.socket.discard_pending();
                    continue;
                }
                Err(e) => return Err(e),
            };

            // a late answer to a request that timed out repeats the last page
            if batch.first().is_some() && batch.first() == previous_first.as_ref() {
                debug!("skipping repeated batch starting at {}", batch[0]);
                awaiting = true;
                continue;
            }
            previous_first = batch.first().copied();
            fail_count = 0;
            batches += 1;

            let start = servers.len();
            let mut finished = false;
            for server in batch {
                if server == END_OF_LIST {
                    finished = true;
                    break;
                }
                servers.push(server);
                seed = server;
            }
            debug!("batch {} brought {} servers", batches, servers.len() - start);

            if on_batch(&servers[start..]).is_break() {
                debug!("enumeration interrupted after {} servers", servers.len());
                return Ok(());
            }
            if finished {
                return Ok(());
            }
        }
    }
}
