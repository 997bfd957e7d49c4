//! Bounds-checked cursor over a byte slice.

use crate::FormatError;

pub(crate) struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub(crate) fn pos(&self) -> usize {
        self.pos
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    pub(crate) fn skip(&mut self, n: usize) -> Result<(), FormatError> {
        self.read_bytes(n).map(|_| ())
    }

    pub(crate) fn read_u8(&mut self) -> Result<u8, FormatError> {
        let v = *self.data.get(self.pos).ok_or(FormatError::UnexpectedEof)?;
        self.pos += 1;
        Ok(v)
    }

    pub(crate) fn read_i8(&mut self) -> Result<i8, FormatError> {
        Ok(self.read_u8()? as i8)
    }

    pub(crate) fn read_u16_be(&mut self) -> Result<u16, FormatError> {
        let b = self.read_bytes(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    pub(crate) fn read_bytes(&mut self, n: usize) -> Result<&'a [u8], FormatError> {
        let end = self.pos.checked_add(n).ok_or(FormatError::UnexpectedEof)?;
        let slice = self.data.get(self.pos..end).ok_or(FormatError::UnexpectedEof)?;
        self.pos = end;
        Ok(slice)
    }

    /// Everything not yet consumed.
    pub(crate) fn rest(&self) -> &'a [u8] {
        &self.data[self.pos.min(self.data.len())..]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_big_endian() {
        let mut r = ByteReader::new(&[0x12, 0x34, 0xff]);
        assert_eq!(r.read_u16_be().unwrap(), 0x1234);
        assert_eq!(r.read_i8().unwrap(), -1);
        assert!(r.is_empty());
    }

    #[test]
    fn short_read_fails_without_moving() {
        let mut r = ByteReader::new(&[1, 2, 3]);
        r.skip(2).unwrap();
        assert!(matches!(r.read_u16_be(), Err(FormatError::UnexpectedEof)));
        assert_eq!(r.pos(), 2);
        assert_eq!(r.rest(), &[3]);
    }
}
