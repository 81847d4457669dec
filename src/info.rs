use crate::error::SourceError;
use crate::parse::PacketReader;

/// Server information as obtained by [crate::server::GameServer::server_info].
///
/// Source servers answer with [SourceServerInfo]; old GoldSrc servers may still
/// answer with the obsolete [GoldSrcServerInfo] layout.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerInfo {
    Source(SourceServerInfo),
    GoldSrc(GoldSrcServerInfo),
}

impl ServerInfo {
    pub fn hostname(&self) -> &str {
        match self {
            ServerInfo::Source(info) => &info.hostname,
            ServerInfo::GoldSrc(info) => &info.hostname,
        }
    }

    pub fn map(&self) -> &str {
        match self {
            ServerInfo::Source(info) => &info.map,
            ServerInfo::GoldSrc(info) => &info.map,
        }
    }

    pub fn folder(&self) -> &str {
        match self {
            ServerInfo::Source(info) => &info.folder,
            ServerInfo::GoldSrc(info) => &info.folder,
        }
    }

    pub fn game(&self) -> &str {
        match self {
            ServerInfo::Source(info) => &info.game,
            ServerInfo::GoldSrc(info) => &info.game,
        }
    }

    pub fn players(&self) -> u8 {
        match self {
            ServerInfo::Source(info) => info.players,
            ServerInfo::GoldSrc(info) => info.players,
        }
    }

    pub fn maxplayers(&self) -> u8 {
        match self {
            ServerInfo::Source(info) => info.maxplayers,
            ServerInfo::GoldSrc(info) => info.maxplayers,
        }
    }

    /// Number of bots, if the server reported it.
    pub fn bots(&self) -> Option<u8> {
        match self {
            ServerInfo::Source(info) => Some(info.bots),
            ServerInfo::GoldSrc(info) => info.bots,
        }
    }

    pub fn password_protected(&self) -> bool {
        match self {
            ServerInfo::Source(info) => info.password_protected,
            ServerInfo::GoldSrc(info) => info.password_protected,
        }
    }
}

/// Bits of the extra data flag (EDF) byte.
///
/// The optional fields follow in the order of [ExtraDataFlags::FIELD_ORDER],
/// which is not the numeric order of the bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExtraDataFlags(pub u8);

impl ExtraDataFlags {
    pub const GAME_ID: u8 = 0x01;
    pub const STEAM_ID: u8 = 0x10;
    pub const KEYWORDS: u8 = 0x20;
    pub const SOURCE_TV: u8 = 0x40;
    pub const PORT: u8 = 0x80;

    /// Order in which Valve servers serialize the optional fields.
    pub const FIELD_ORDER: [u8; 5] = [
        Self::PORT,
        Self::STEAM_ID,
        Self::SOURCE_TV,
        Self::KEYWORDS,
        Self::GAME_ID,
    ];

    pub fn contains(&self, flag: u8) -> bool {
        self.0 & flag != 0
    }
}

/// SourceTV relay announced by a server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceTv {
    pub port: u16,
    pub name: String,
}

/// Optional fields of an S2A_INFO2 response.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExtraData {
    /// The flag byte itself, `None` if the packet ended before it.
    pub flags: Option<ExtraDataFlags>,
    /// Game port of the server
    pub port: Option<u16>,
    /// SteamID of the server
    pub steam_id: Option<u64>,
    pub source_tv: Option<SourceTv>,
    /// Tags that describe the game (`sv_tags`)
    pub keywords: Option<String>,
    /// 64-bit game ID, its lower 24 bits hold the app ID
    pub game_id: Option<u64>,
}

impl ExtraData {
    fn parse(reader: &mut PacketReader) -> Result<Self, SourceError> {
        let mut extra = ExtraData::default();
        if reader.remaining() == 0 {
            return Ok(extra);
        }

        let flags = ExtraDataFlags(reader.get_u8()?);
        extra.flags = Some(flags);

        for flag in ExtraDataFlags::FIELD_ORDER {
            if !flags.contains(flag) {
                continue;
            }
            match flag {
                ExtraDataFlags::PORT => extra.port = Some(reader.get_u16()?),
                ExtraDataFlags::STEAM_ID => extra.steam_id = Some(reader.get_u64()?),
                ExtraDataFlags::SOURCE_TV => {
                    let port = reader.get_u16()?;
                    let name = reader.get_string()?;
                    extra.source_tv = Some(SourceTv { port, name });
                }
                ExtraDataFlags::KEYWORDS => extra.keywords = Some(reader.get_string()?),
                _ => extra.game_id = Some(reader.get_u64()?),
            }
        }

        Ok(extra)
    }
}

/// S2A_INFO2 -- https://developer.valvesoftware.com/wiki/Server_queries#A2S_INFO
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceServerInfo {
    /// A2S_INFO protocol version
    pub protocol: u8,
    /// Server hostname
    pub hostname: String,
    /// Current map
    pub map: String,
    /// Location of server files
    pub folder: String,
    /// Name of game
    pub game: String,
    /// Steam app ID of game
    pub game_id: u16,
    /// Current players
    pub players: u8,
    /// Max players
    pub maxplayers: u8,
    /// Current bots
    pub bots: u8,
    /// Server type:
    /// - `d`: Dedicated
    /// - `l`: Listen (non-dedicated)
    /// - `p`: SourceTV relay (proxy)
    pub server_type: char,
    /// Server environment:
    /// - `l`: Linux
    /// - `w`: Windows
    /// - `m` or `o`: Mac
    pub server_env: char,
    /// Is the server password protected?
    pub password_protected: bool,
    /// Is the server VAC enabled?
    pub vac_enabled: bool,
    /// Version of the game installed on the server
    pub version: String,
    pub extra: ExtraData,
}

impl SourceServerInfo {
    /// Parse the body of an S2A_INFO2 response, after its type byte.
    pub fn parse(reader: &mut PacketReader) -> Result<Self, SourceError> {
        Ok(SourceServerInfo {
            protocol: reader.get_u8()?,
            hostname: reader.get_string()?,
            map: reader.get_string()?,
            folder: reader.get_string()?,
            game: reader.get_string()?,
            game_id: reader.get_u16()?,
            players: reader.get_u8()?,
            maxplayers: reader.get_u8()?,
            bots: reader.get_u8()?,
            server_type: reader.get_char()?,
            server_env: reader.get_char()?,
            password_protected: reader.get_bool()?,
            vac_enabled: reader.get_bool()?,
            version: reader.get_string()?,
            extra: ExtraData::parse(reader)?,
        })
    }
}

/// Additional fields of a GoldSrc server running a mod.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModInfo {
    /// URL to mod website
    pub url_info: String,
    /// URL to download the mod
    pub url_download: String,
    pub details: Option<ModDetails>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModDetails {
    pub version: u32,
    /// Space (in bytes) the mod takes up
    pub size: u32,
    /// Is the mod server side only?
    pub server_only: bool,
    /// Does the mod use its own client DLL?
    pub custom_dll: bool,
}

/// S2A_INFO_DETAILED, the obsolete GoldSrc response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GoldSrcServerInfo {
    /// IP address and port of the server, as text
    pub address: String,
    pub hostname: String,
    pub map: String,
    pub folder: String,
    pub game: String,
    pub players: u8,
    pub maxplayers: u8,
    pub protocol: u8,
    pub server_type: char,
    pub server_env: char,
    pub password_protected: bool,
    pub mod_info: Option<ModInfo>,
    /// Missing for mods that did not send their details.
    pub vac_enabled: Option<bool>,
    /// Missing for mods that did not send their details.
    pub bots: Option<u8>,
}

impl GoldSrcServerInfo {
    /// Bytes left after the mod URLs when a mod sends its details along with
    /// the VAC flag and bot count.
    const MOD_DETAILS_LEN: usize = 12;

    /// Parse the body of an S2A_INFO_DETAILED response, after its type byte.
    pub fn parse(reader: &mut PacketReader) -> Result<Self, SourceError> {
        let address = reader.get_string()?;
        let hostname = reader.get_string()?;
        let map = reader.get_string()?;
        let folder = reader.get_string()?;
        let game = reader.get_string()?;
        let players = reader.get_u8()?;
        let maxplayers = reader.get_u8()?;
        let protocol = reader.get_u8()?;
        let server_type = reader.get_char()?;
        let server_env = reader.get_char()?;
        let password_protected = reader.get_bool()?;
        let is_mod = reader.get_bool()?;

        let mut mod_info = None;
        let mut vac_enabled = None;
        let mut bots = None;

        if is_mod {
            let url_info = reader.get_string()?;
            let url_download = reader.get_string()?;
            // unused
            reader.skip(1)?;

            // the details are only trusted if their exact length is left
            let details = if reader.remaining() == Self::MOD_DETAILS_LEN {
                let details = ModDetails {
                    version: reader.get_u32()?,
                    size: reader.get_u32()?,
                    server_only: reader.get_bool()?,
                    custom_dll: reader.get_bool()?,
                };
                vac_enabled = Some(reader.get_bool()?);
                bots = Some(reader.get_u8()?);
                Some(details)
            } else {
                None
            };

            mod_info = Some(ModInfo {
                url_info,
                url_download,
                details,
            });
        } else {
            vac_enabled = Some(reader.get_bool()?);
            bots = Some(reader.get_u8()?);
        }

        Ok(GoldSrcServerInfo {
            address,
            hostname,
            map,
            folder,
            game,
            players,
            maxplayers,
            protocol,
            server_type,
            server_env,
            password_protected,
            mod_info,
            vac_enabled,
            bots,
        })
    }
}
