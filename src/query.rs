use std::net::SocketAddr;
use std::time::Duration;

use log::{debug, trace};

use crate::error::SourceError;
use crate::packet::{self, Engine, PacketHeader, RequestPacket, ResponsePacket, SplitPacket};
use crate::parse::PacketReader;
use crate::socket::UdpChannel;

/// UDP socket speaking the connectionless query protocol of one server.
///
/// Responses split over several datagrams are put back together before they
/// are decoded.
pub struct QuerySocket {
    channel: UdpChannel,
    engine: Engine,
}

impl QuerySocket {
    /// The socket is only bound when the first packet is sent.
    pub fn new(addr: SocketAddr, engine: Engine, timeout: Duration) -> Self {
        QuerySocket {
            channel: UdpChannel::new(addr, timeout),
            engine,
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.channel.addr()
    }

    pub fn engine(&self) -> Engine {
        self.engine
    }

    pub async fn send(&mut self, packet: &RequestPacket) -> Result<(), SourceError> {
        trace!("sending {:?} packet to {}", packet.packet_type(), self.addr());
        self.channel.send(&packet.pack()).await
    }

    /// Wait for the next response and decode it.
    pub async fn reply(&mut self) -> Result<ResponsePacket, SourceError> {
        let (header, data) = self.receive_datagram().await?;

        let payload = match header {
            PacketHeader::Single => data,
            PacketHeader::Split => self.reassemble(data).await?,
        };

        let packet = ResponsePacket::unpack(&payload)?;
        trace!("received {} packet from {}", packet.name(), self.addr());
        Ok(packet)
    }

    /// Send `packet` and wait for its response.
    pub async fn send_recv(
        &mut self,
        packet: &RequestPacket,
    ) -> Result<ResponsePacket, SourceError> {
        self.send(packet).await?;
        self.reply().await
    }

    /// Drop responses that already arrived, e.g. late answers to requests
    /// that timed out.
    pub fn discard_pending(&mut self) -> usize {
        self.channel.discard_pending()
    }

    pub fn close(&mut self) {
        self.channel.close();
    }

    async fn receive_datagram(&mut self) -> Result<(PacketHeader, Vec<u8>), SourceError> {
        let datagram = self.channel.receive().await?;
        let mut reader = PacketReader::new(datagram);
        let header = PacketHeader::try_from(reader.get_i32()?)?;

        Ok((header, reader.rest().to_vec()))
    }

    /// Collect the remaining fragments of a split response. `first` is the
    /// fragment already received, without its header.
    async fn reassemble(&mut self, first: Vec<u8>) -> Result<Vec<u8>, SourceError> {
        let first = SplitPacket::unpack(&first, self.engine)?;
        let id = first.id;
        let compressed = first.compressed;
        let mut decompressed = None;
        let mut fragments: Vec<Option<Vec<u8>>> = vec![None; first.total as usize];
        let mut missing = fragments.len();

        let mut next = Some(first);
        while let Some(split) = next.take() {
            if split.id != id || split.total as usize != fragments.len() {
                return Err(SourceError::MalformedPacket(format!(
                    "split packet {} does not belong to response {}",
                    split.id, id
                )));
            }

            if split.number == 0 {
                decompressed = split.decompressed;
            }
            let slot = &mut fragments[split.number as usize];
            if slot.is_none() {
                missing -= 1;
            }
            *slot = Some(split.payload);
            trace!("got split packet {} of {}, {} missing", split.number + 1, split.total, missing);

            if missing > 0 {
                let (header, data) = self.receive_datagram().await?;
                if header != PacketHeader::Split {
                    return Err(SourceError::MalformedPacket(
                        "single packet inside a split response".to_string(),
                    ));
                }
                next = Some(SplitPacket::unpack(&data, self.engine)?);
            }
        }

        let mut joined: Vec<u8> = fragments.into_iter().flatten().flatten().collect();
        debug!("reassembled {} bytes from split packets", joined.len());

        if compressed {
            let expected = decompressed.ok_or_else(|| {
                SourceError::MalformedPacket("compressed response without its size".to_string())
            })?;
            joined = packet::decompress(&joined, expected)?;
            debug!("decompressed split response to {} bytes", joined.len());
        }

        // the joined payload carries its own single packet header
        let mut reader = PacketReader::new(&joined);
        match PacketHeader::try_from(reader.get_i32()?)? {
            PacketHeader::Single => Ok(reader.rest().to_vec()),
            PacketHeader::Split => Err(SourceError::MalformedPacket(
                "nested split packet".to_string(),
            )),
        }
    }
}
