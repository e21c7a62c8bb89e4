use crate::error::ParseError;

/// Bounds-checked random access into a byte buffer.
///
/// Every read takes an absolute offset, the same way the parsers address
/// header fields, so there is no hidden cursor state.
#[derive(Clone, Copy)]
pub struct Reader<'a> {
    data: &'a [u8],
}

impl<'a> Reader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Reader { data }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn read_n(&self, offset: usize, n: usize) -> Result<&'a [u8], ParseError> {
        match offset.checked_add(n) {
            Some(end) if end <= self.data.len() => Ok(&self.data[offset..end]),
            _ => Err(ParseError::Truncated {
                offset,
                needed: n,
                len: self.data.len(),
            }),
        }
    }

    fn read_array<const N: usize>(&self, offset: usize) -> Result<[u8; N], ParseError> {
        let mut out = [0; N];
        out.copy_from_slice(self.read_n(offset, N)?);
        Ok(out)
    }

    pub fn read_u8(&self, offset: usize) -> Result<u8, ParseError> {
        Ok(self.read_n(offset, 1)?[0])
    }

    pub fn read_u16_be(&self, offset: usize) -> Result<u16, ParseError> {
        Ok(u16::from_be_bytes(self.read_array(offset)?))
    }

    pub fn read_u32_be(&self, offset: usize) -> Result<u32, ParseError> {
        Ok(u32::from_be_bytes(self.read_array(offset)?))
    }

    pub fn read_u16_le(&self, offset: usize) -> Result<u16, ParseError> {
        Ok(u16::from_le_bytes(self.read_array(offset)?))
    }

    pub fn read_i16_le(&self, offset: usize) -> Result<i16, ParseError> {
        Ok(i16::from_le_bytes(self.read_array(offset)?))
    }

    pub fn read_u32_le(&self, offset: usize) -> Result<u32, ParseError> {
        Ok(u32::from_le_bytes(self.read_array(offset)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_both_endiannesses() {
        let r = Reader::new(&[0x12, 0x34, 0x56, 0x78, 0xFF, 0xFF]);
        assert_eq!(r.read_u16_be(0), Ok(0x1234));
        assert_eq!(r.read_u16_le(0), Ok(0x3412));
        assert_eq!(r.read_u32_be(0), Ok(0x12345678));
        assert_eq!(r.read_u32_le(0), Ok(0x78563412));
        assert_eq!(r.read_i16_le(4), Ok(-1));
    }

    #[test]
    fn out_of_bounds_is_truncated() {
        let r = Reader::new(&[1, 2, 3]);
        assert_eq!(
            r.read_u32_be(1),
            Err(ParseError::Truncated {
                offset: 1,
                needed: 4,
                len: 3
            })
        );
        assert!(r.read_n(usize::MAX, 2).is_err());
        assert_eq!(r.read_n(3, 0), Ok(&[][..]));
    }
}
