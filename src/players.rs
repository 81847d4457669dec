use crate::error::SourceError;
use crate::parse::PacketReader;

/// A player entry of an S2A_PLAYER response.
#[derive(Debug, Clone, PartialEq)]
pub struct Player {
    /// Index of the entry, not a stable player ID
    pub index: u8,
    pub name: String,
    pub score: i32,
    /// Seconds the player has been connected
    pub duration: f32,
}

impl Player {
    /// Parse the body of an S2A_PLAYER response, after its type byte.
    ///
    /// The body starts with the number of entries that follow.
    pub fn parse_list(reader: &mut PacketReader) -> Result<Vec<Player>, SourceError> {
        let count = reader.get_u8()?;
        let mut players = Vec::with_capacity(count as usize);

        for _ in 0..count {
            players.push(Player {
                index: reader.get_u8()?,
                name: reader.get_string()?,
                score: reader.get_i32()?,
                duration: reader.get_f32()?,
            });
        }

        Ok(players)
    }
}
