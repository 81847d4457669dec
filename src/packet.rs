use std::io::Read;
use std::net::SocketAddrV4;

use bzip2::read::BzDecoder;

use crate::error::SourceError;
use crate::info::{GoldSrcServerInfo, SourceServerInfo};
use crate::master;
use crate::parse::PacketReader;
use crate::players::Player;
use crate::rules::{self, Rules};

/// Public query requests are padded to this size so that a spoofed request can
/// never be answered with more bytes than it carried.
pub const MIN_QUERY_PACKET_SIZE: usize = 1200;

/// According to the Valve wiki, Source query packets use 1400 bytes + IP/UDP headers.
pub const MAX_PACKET_SIZE: usize = 1400;

/// Size of the connectionless header plus the type byte.
pub const QUERY_HEADER_SIZE: usize = 5;

/// Which engine family a server belongs to. Decides the split packet layout and
/// how challenge numbers are requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Engine {
    Source,
    GoldSrc,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum PacketHeader {
    Single,
    Split,
}

impl TryFrom<i32> for PacketHeader {
    type Error = SourceError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            -1 => Ok(PacketHeader::Single),
            -2 => Ok(PacketHeader::Split),
            n => Err(SourceError::UnknownPacketHeader(n)),
        }
    }
}

/// For packing a [PacketHeader] into a packet in [RequestPacket::pack].
impl PacketHeader {
    pub fn to_le_bytes(&self) -> [u8; 4] {
        let type_value: i32 = match self {
            PacketHeader::Single => -1,
            PacketHeader::Split => -2,
        };
        type_value.to_le_bytes()
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum PacketType {
    /// A2S_INFO Request -- https://developer.valvesoftware.com/wiki/Server_queries#A2S_INFO
    ///
    /// Retrieves information about the server including, but not limited to:
    /// its name, the map currently being played, and the number of players.
    InfoRequest,
    /// A2S_PLAYER Request -- https://developer.valvesoftware.com/wiki/Server_queries#A2S_PLAYER
    PlayerRequest,
    /// A2S_RULES Request -- https://developer.valvesoftware.com/wiki/Server_queries#A2S_RULES
    RulesRequest,
    /// A2S_SERVERQUERY_GETCHALLENGE, only understood by GoldSrc servers.
    ChallengeRequest,
    /// A2M_GET_SERVERS_BATCH2 -- https://developer.valvesoftware.com/wiki/Master_Server_Query_Protocol
    MasterServerQuery,
    /// S2C_CHALLENGE
    ///
    /// the server may reply with a challenge to the client using S2C_CHALLENGE
    /// ('A' or 0x41). In that case, the client should repeat the request by appending the challenge number.
    Challenge,
    /// S2A_INFO2, the info response of Source servers.
    Info,
    /// S2A_INFO_DETAILED, the obsolete info response of GoldSrc servers.
    InfoDetailed,
    /// S2A_PLAYER
    Players,
    /// S2A_RULES
    Rules,
    /// M2A_SERVER_BATCH
    MasterServerBatch,
}

impl TryFrom<u8> for PacketType {
    type Error = SourceError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x54 => Ok(PacketType::InfoRequest),
            0x55 => Ok(PacketType::PlayerRequest),
            0x56 => Ok(PacketType::RulesRequest),
            0x57 => Ok(PacketType::ChallengeRequest),
            0x31 => Ok(PacketType::MasterServerQuery),
            0x41 => Ok(PacketType::Challenge),
            0x49 => Ok(PacketType::Info),
            0x6D => Ok(PacketType::InfoDetailed),
            0x44 => Ok(PacketType::Players),
            0x45 => Ok(PacketType::Rules),
            0x66 => Ok(PacketType::MasterServerBatch),
            n => Err(SourceError::UnknownPacketType(n)),
        }
    }
}

impl PacketType {
    pub fn to_byte(&self) -> u8 {
        match self {
            PacketType::InfoRequest => 0x54,       // 'T'
            PacketType::PlayerRequest => 0x55,     // 'U'
            PacketType::RulesRequest => 0x56,      // 'V'
            PacketType::ChallengeRequest => 0x57,  // 'W'
            PacketType::MasterServerQuery => 0x31, // '1'
            PacketType::Challenge => 0x41,         // 'A'
            PacketType::Info => 0x49,              // 'I'
            PacketType::InfoDetailed => 0x6D,      // 'm'
            PacketType::Players => 0x44,           // 'D'
            PacketType::Rules => 0x45,             // 'E'
            PacketType::MasterServerBatch => 0x66, // 'f'
        }
    }

    /// Public queries any client may send a game server. These get padded to
    /// [MIN_QUERY_PACKET_SIZE].
    pub fn is_public_query(&self) -> bool {
        matches!(
            self,
            PacketType::InfoRequest
                | PacketType::PlayerRequest
                | PacketType::RulesRequest
                | PacketType::ChallengeRequest
        )
    }
}

/// Append zero bytes to `packet` until it is [MIN_QUERY_PACKET_SIZE] long.
/// Packets that already reach that size are left alone.
pub fn pad_query(mut packet: Vec<u8>) -> Vec<u8> {
    if packet.len() < MIN_QUERY_PACKET_SIZE {
        packet.resize(MIN_QUERY_PACKET_SIZE, 0);
    }
    packet
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct RequestPacket {
    packet_header: PacketHeader,
    packet_type: PacketType,
    body: Vec<u8>,
}

impl RequestPacket {
    const INFO_BODY: &'static [u8] = b"Source Engine Query\0";

    pub fn new(packet_type: PacketType, body: Vec<u8>) -> Self {
        RequestPacket {
            packet_header: PacketHeader::Single,
            packet_type,
            body,
        }
    }

    /// A2S_INFO, with the challenge appended if the server asked for one.
    pub fn info(challenge: Option<i32>) -> Self {
        let mut body = Self::INFO_BODY.to_vec();
        if let Some(c) = challenge {
            body.extend_from_slice(&c.to_le_bytes());
        }
        Self::new(PacketType::InfoRequest, body)
    }

    /// A2S_PLAYER. A challenge of `-1` asks the server for a challenge number.
    pub fn players(challenge: i32) -> Self {
        Self::new(PacketType::PlayerRequest, challenge.to_le_bytes().to_vec())
    }

    /// A2S_RULES. A challenge of `-1` asks the server for a challenge number.
    pub fn rules(challenge: i32) -> Self {
        Self::new(PacketType::RulesRequest, challenge.to_le_bytes().to_vec())
    }

    /// A2S_SERVERQUERY_GETCHALLENGE
    pub fn challenge() -> Self {
        Self::new(PacketType::ChallengeRequest, Vec::new())
    }

    /// A2M_GET_SERVERS_BATCH2, asking for the page of servers after `seed`.
    pub fn master_query(region: master::Region, seed: &SocketAddrV4, filter: &str) -> Self {
        let mut body = vec![region.to_byte()];
        body.extend_from_slice(seed.to_string().as_bytes());
        body.push(0);
        body.extend_from_slice(filter.as_bytes());
        body.push(0);
        Self::new(PacketType::MasterServerQuery, body)
    }

    /// Serializes a request packet into an array of bytes.
    pub fn pack(&self) -> Vec<u8> {
        // packet structure: header, type, body (and padding)
        let mut payload: Vec<u8> = Vec::with_capacity(QUERY_HEADER_SIZE + self.body.len());
        payload.extend_from_slice(&self.packet_header().to_le_bytes());
        payload.push(self.packet_type().to_byte());
        payload.extend_from_slice(&self.body);

        if self.packet_type.is_public_query() {
            pad_query(payload)
        } else {
            payload
        }
    }

    pub fn packet_header(&self) -> &PacketHeader {
        &self.packet_header
    }

    pub fn packet_type(&self) -> &PacketType {
        &self.packet_type
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }
}

/// A decoded response, selected by its discriminator byte.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponsePacket {
    Challenge(i32),
    Info(SourceServerInfo),
    InfoDetailed(GoldSrcServerInfo),
    Players(Vec<Player>),
    Rules(Rules),
    MasterServerBatch(Vec<SocketAddrV4>),
}

impl ResponsePacket {
    /// Decodes a response payload. `data` starts at the type byte, after the
    /// connectionless header.
    pub fn unpack(data: &[u8]) -> Result<Self, SourceError> {
        let mut reader = PacketReader::new(data);
        let packet_type = PacketType::try_from(reader.get_u8()?)?;

        match packet_type {
            PacketType::Challenge => Ok(ResponsePacket::Challenge(reader.get_i32()?)),
            PacketType::Info => Ok(ResponsePacket::Info(SourceServerInfo::parse(&mut reader)?)),
            PacketType::InfoDetailed => Ok(ResponsePacket::InfoDetailed(
                GoldSrcServerInfo::parse(&mut reader)?,
            )),
            PacketType::Players => Ok(ResponsePacket::Players(Player::parse_list(&mut reader)?)),
            PacketType::Rules => Ok(ResponsePacket::Rules(rules::parse(&mut reader)?)),
            PacketType::MasterServerBatch => Ok(ResponsePacket::MasterServerBatch(
                master::parse_batch(&mut reader)?,
            )),
            request => Err(SourceError::MalformedPacket(format!(
                "received request packet {:#04x}",
                request.to_byte()
            ))),
        }
    }

    pub fn packet_type(&self) -> PacketType {
        match self {
            ResponsePacket::Challenge(_) => PacketType::Challenge,
            ResponsePacket::Info(_) => PacketType::Info,
            ResponsePacket::InfoDetailed(_) => PacketType::InfoDetailed,
            ResponsePacket::Players(_) => PacketType::Players,
            ResponsePacket::Rules(_) => PacketType::Rules,
            ResponsePacket::MasterServerBatch(_) => PacketType::MasterServerBatch,
        }
    }

    /// Short name used in log lines and errors.
    pub fn name(&self) -> &'static str {
        match self {
            ResponsePacket::Challenge(_) => "S2C_CHALLENGE",
            ResponsePacket::Info(_) => "S2A_INFO2",
            ResponsePacket::InfoDetailed(_) => "S2A_INFO_DETAILED",
            ResponsePacket::Players(_) => "S2A_PLAYER",
            ResponsePacket::Rules(_) => "S2A_RULES",
            ResponsePacket::MasterServerBatch(_) => "M2A_SERVER_BATCH",
        }
    }
}

/// Size and CRC32 of a compressed split response once it is decompressed.
/// Only the first fragment carries them.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct Decompressed {
    pub size: u32,
    pub crc32: u32,
}

/// One fragment of a response that did not fit in a single datagram.
#[derive(Debug, PartialEq, Eq)]
pub struct SplitPacket {
    pub id: i32,
    pub total: u8,
    pub number: u8,
    /// Set for Source responses compressed with bzip2.
    pub compressed: bool,
    pub decompressed: Option<Decompressed>,
    pub payload: Vec<u8>,
}

impl SplitPacket {
    const COMPRESSED_FLAG: u32 = 0x8000_0000;

    /// Decodes a split fragment. `data` starts after the `0xFFFFFFFE` header.
    pub fn unpack(data: &[u8], engine: Engine) -> Result<Self, SourceError> {
        let mut reader = PacketReader::new(data);
        let id = reader.get_i32()?;
        let mut compressed = false;
        let mut decompressed = None;

        let (total, number) = match engine {
            Engine::Source => {
                compressed = (id as u32) & Self::COMPRESSED_FLAG != 0;
                let total = reader.get_u8()?;
                let number = reader.get_u8()?;
                // maximum size of a fragment; we just take what arrived
                reader.get_u16()?;
                if compressed && number == 0 {
                    decompressed = Some(Decompressed {
                        size: reader.get_u32()?,
                        crc32: reader.get_u32()?,
                    });
                }
                (total, number)
            }
            Engine::GoldSrc => {
                let number_and_total = reader.get_u8()?;
                (number_and_total & 0x0F, number_and_total >> 4)
            }
        };

        if total == 0 || number >= total {
            return Err(SourceError::MalformedPacket(format!(
                "split packet {} of {}",
                number, total
            )));
        }

        Ok(SplitPacket {
            id,
            total,
            number,
            compressed,
            decompressed,
            payload: reader.rest().to_vec(),
        })
    }
}

/// Unpack a bzip2 compressed response and check it against the size and CRC32
/// sent with its first fragment.
pub fn decompress(data: &[u8], expected: Decompressed) -> Result<Vec<u8>, SourceError> {
    let mut output = Vec::new();
    // one byte more than announced is enough to notice a wrong size
    BzDecoder::new(data)
        .take(expected.size as u64 + 1)
        .read_to_end(&mut output)
        .map_err(SourceError::Decompression)?;

    if output.len() != expected.size as usize || crc32fast::hash(&output) != expected.crc32 {
        return Err(SourceError::ChecksumMismatch);
    }
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_queries_are_padded_to_minimum() {
        for len in [0, 1, 20, 600, 1194] {
            let body: Vec<u8> = (0..len).map(|i| (i % 251) as u8 + 1).collect();
            let packet = RequestPacket::new(PacketType::InfoRequest, body.clone()).pack();

            assert_eq!(packet.len(), MIN_QUERY_PACKET_SIZE);
            assert_eq!(&packet[..4], &[0xFF; 4]);
            assert_eq!(packet[4], 0x54);
            assert_eq!(&packet[5..5 + len], body.as_slice());
            assert!(packet[5 + len..].iter().all(|b| *b == 0));
        }
    }

    #[test]
    fn long_queries_are_not_padded() {
        for len in [1195, 1196, 1300] {
            let packet = RequestPacket::new(PacketType::RulesRequest, vec![7; len]).pack();
            assert_eq!(packet.len(), len + QUERY_HEADER_SIZE);
        }
    }

    #[test]
    fn master_queries_are_not_padded() {
        let seed: SocketAddrV4 = "0.0.0.0:0".parse().unwrap();
        let packet =
            RequestPacket::master_query(master::Region::Europe, &seed, "\\gamedir\\tf").pack();

        let mut expected = vec![0xFF, 0xFF, 0xFF, 0xFF, 0x31, 0x03];
        expected.extend_from_slice(b"0.0.0.0:0\0\\gamedir\\tf\0");
        assert_eq!(packet, expected);
    }

    #[test]
    fn info_request_carries_challenge() {
        let packet = RequestPacket::info(Some(0x0403_0201)).pack();

        assert_eq!(&packet[5..25], b"Source Engine Query\0");
        assert_eq!(&packet[25..29], &[1, 2, 3, 4]);
        assert_eq!(packet.len(), MIN_QUERY_PACKET_SIZE);
    }

    #[test]
    fn unknown_discriminator_is_an_error() {
        assert!(matches!(
            ResponsePacket::unpack(&[0x7A, 0, 0]),
            Err(SourceError::UnknownPacketType(0x7A))
        ));
        assert!(ResponsePacket::unpack(&[]).is_err());
    }

    #[test]
    fn request_type_is_not_a_response() {
        let err = ResponsePacket::unpack(&[0x54]).unwrap_err();
        assert!(err.is_format_error());
    }

    #[test]
    fn challenge_response() {
        let packet = ResponsePacket::unpack(&[0x41, 0x78, 0x56, 0x34, 0x12]).unwrap();
        assert_eq!(packet, ResponsePacket::Challenge(0x1234_5678));
    }

    #[test]
    fn packet_headers() {
        assert_eq!(PacketHeader::try_from(-1).unwrap(), PacketHeader::Single);
        assert_eq!(PacketHeader::try_from(-2).unwrap(), PacketHeader::Split);
        assert!(matches!(
            PacketHeader::try_from(5),
            Err(SourceError::UnknownPacketHeader(5))
        ));
    }

    #[test]
    fn source_split_fragment() {
        let data = [0x10, 0, 0, 0, 3, 1, 0xE0, 0x04, b'a', b'b'];
        let split = SplitPacket::unpack(&data, Engine::Source).unwrap();

        assert_eq!(split.id, 0x10);
        assert_eq!(split.total, 3);
        assert_eq!(split.number, 1);
        assert_eq!(split.payload, b"ab");
    }

    #[test]
    fn goldsrc_split_fragment() {
        let data = [0x10, 0, 0, 0, 0x12, b'x'];
        let split = SplitPacket::unpack(&data, Engine::GoldSrc).unwrap();

        assert_eq!(split.total, 2);
        assert_eq!(split.number, 1);
        assert_eq!(split.payload, b"x");
    }

    #[test]
    fn compressed_split_fragments() {
        let first = [
            0x10, 0, 0, 0x80, 2, 0, 0xE0, 0x04, 40, 0, 0, 0, 0x78, 0x56, 0x34, 0x12, b'B',
        ];
        let split = SplitPacket::unpack(&first, Engine::Source).unwrap();

        assert!(split.compressed);
        assert_eq!(
            split.decompressed,
            Some(Decompressed {
                size: 40,
                crc32: 0x1234_5678
            })
        );
        assert_eq!(split.payload, b"B");

        // later fragments only carry payload
        let second = [0x10, 0, 0, 0x80, 2, 1, 0xE0, 0x04, b'Z'];
        let split = SplitPacket::unpack(&second, Engine::Source).unwrap();
        assert!(split.compressed);
        assert_eq!(split.decompressed, None);
        assert_eq!(split.payload, b"Z");
    }

    fn bzip2(data: &[u8]) -> Vec<u8> {
        use std::io::Write;

        let mut encoder =
            bzip2::write::BzEncoder::new(Vec::new(), bzip2::Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn decompress_checks_size_and_crc() {
        let data = b"\xFF\xFF\xFF\xFFEsome rules";
        let compressed = bzip2(data);
        let expected = Decompressed {
            size: data.len() as u32,
            crc32: crc32fast::hash(data),
        };

        assert_eq!(decompress(&compressed, expected).unwrap(), data);
        assert!(matches!(
            decompress(&compressed, Decompressed { crc32: 1, ..expected }),
            Err(SourceError::ChecksumMismatch)
        ));
        assert!(matches!(
            decompress(&compressed, Decompressed { size: 4, ..expected }),
            Err(SourceError::ChecksumMismatch)
        ));
        assert!(matches!(
            decompress(b"not bzip2", expected),
            Err(SourceError::Decompression(_))
        ));
    }

    #[test]
    fn split_number_out_of_range() {
        let data = [0x10, 0, 0, 0, 2, 2, 0, 0];
        assert!(SplitPacket::unpack(&data, Engine::Source).is_err());
    }
}
