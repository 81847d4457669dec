use std::io::Cursor;

use byteorder::{BigEndian, LittleEndian, ReadBytesExt};

use crate::error::SourceError;

/// Reads packet fields in strict positional order from a byte slice.
///
/// Every getter advances the read offset past the bytes it consumed. Reading
/// past the end of the data fails with [SourceError::UnexpectedEnd]; bytes left
/// unread at the end are never an error.
pub struct PacketReader<'a> {
    cursor: Cursor<&'a [u8]>,
}

impl<'a> PacketReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        PacketReader {
            cursor: Cursor::new(data),
        }
    }

    /// Index of the next byte to be read.
    pub fn position(&self) -> usize {
        self.cursor.position() as usize
    }

    /// Number of bytes not read yet.
    pub fn remaining(&self) -> usize {
        self.cursor.get_ref().len().saturating_sub(self.position())
    }

    /// The unread rest of the data. Does not advance the offset.
    pub fn rest(&self) -> &'a [u8] {
        let data: &'a [u8] = *self.cursor.get_ref();
        &data[self.position().min(data.len())..]
    }

    fn ensure(&self, needed: usize) -> Result<(), SourceError> {
        let available = self.remaining();
        if available < needed {
            return Err(SourceError::UnexpectedEnd { needed, available });
        }
        Ok(())
    }

    fn read<T>(
        &mut self,
        width: usize,
        f: impl FnOnce(&mut Cursor<&'a [u8]>) -> std::io::Result<T>,
    ) -> Result<T, SourceError> {
        self.ensure(width)?;
        f(&mut self.cursor).map_err(|_| SourceError::UnexpectedEnd {
            needed: width,
            available: 0,
        })
    }

    /// Get the value of a null-terminated string.
    ///
    /// Mutates the offset to the index after the null-termination byte.
    pub fn get_string(&mut self) -> Result<String, SourceError> {
        let rest = self.rest();
        let end = rest
            .iter()
            .position(|c| *c == 0)
            .ok_or(SourceError::UnexpectedEnd {
                needed: rest.len() + 1,
                available: rest.len(),
            })?;
        let value = std::str::from_utf8(&rest[..end])?.to_string();
        self.skip(end + 1)?;
        Ok(value)
    }

    /// Get a single byte.
    pub fn get_u8(&mut self) -> Result<u8, SourceError> {
        self.read(1, |c| c.read_u8())
    }

    /// Get a single byte as an ASCII flag such as `d` or `w`.
    pub fn get_char(&mut self) -> Result<char, SourceError> {
        Ok(char::from(self.get_u8()?))
    }

    /// Get a single byte as a boolean; only `1` is true.
    pub fn get_bool(&mut self) -> Result<bool, SourceError> {
        Ok(self.get_u8()? == 1)
    }

    /// Get 2 little-endian bytes as a [u16].
    pub fn get_u16(&mut self) -> Result<u16, SourceError> {
        self.read(2, |c| c.read_u16::<LittleEndian>())
    }

    /// Get 2 big-endian bytes as a [u16]. Only used for master server ports.
    pub fn get_u16_be(&mut self) -> Result<u16, SourceError> {
        self.read(2, |c| c.read_u16::<BigEndian>())
    }

    /// Get 4 little-endian bytes as a [u32].
    pub fn get_u32(&mut self) -> Result<u32, SourceError> {
        self.read(4, |c| c.read_u32::<LittleEndian>())
    }

    /// Get 4 little-endian bytes as an [i32].
    pub fn get_i32(&mut self) -> Result<i32, SourceError> {
        self.read(4, |c| c.read_i32::<LittleEndian>())
    }

    /// Get 4 little-endian bytes as an [f32].
    pub fn get_f32(&mut self) -> Result<f32, SourceError> {
        self.read(4, |c| c.read_f32::<LittleEndian>())
    }

    /// Get 8 bytes as a [u64], read as two little-endian [u32] halves with the
    /// low half first.
    pub fn get_u64(&mut self) -> Result<u64, SourceError> {
        self.ensure(8)?;
        let low = self.get_u32()? as u64;
        let high = self.get_u32()? as u64;
        Ok((high << 32) | low)
    }

    /// Advance the offset by `count` bytes without decoding them.
    pub fn skip(&mut self, count: usize) -> Result<(), SourceError> {
        self.ensure(count)?;
        self.cursor.set_position((self.position() + count) as u64);
        Ok(())
    }
}
