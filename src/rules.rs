use std::collections::HashMap;

use crate::error::SourceError;
use crate::parse::PacketReader;

/// Server cvars as returned by A2S_RULES, keyed by cvar name.
pub type Rules = HashMap<String, String>;

/// Parse the body of an S2A_RULES response, after its type byte.
pub fn parse(reader: &mut PacketReader) -> Result<Rules, SourceError> {
    let count = reader.get_u16()?;
    let mut rules = Rules::with_capacity(count as usize);

    for _ in 0..count {
        let name = reader.get_string()?;
        let value = reader.get_string()?;
        rules.insert(name, value);
    }

    Ok(rules)
}
