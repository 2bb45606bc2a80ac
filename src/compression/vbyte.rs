use crate::core::error::{Error, Result};

/// Variable byte encoding for integers (best for small integers)
pub struct VByteEncoder;

impl VByteEncoder {
    /// Values < 128 use 1 byte, < 16384 use 2 bytes, etc.
    pub fn encode_u32(output: &mut Vec<u8>, value: u32) {
        Self::encode_u64(output, value as u64);
    }

    pub fn encode_u64(output: &mut Vec<u8>, mut value: u64) {
        while value >= 128 {
            output.push((value & 127) as u8 | 128);  // Set continuation bit
            value >>= 7;
        }
        output.push(value as u8);
    }

    /// Decode single u64 value, returns (value, bytes_consumed)
    pub fn decode_u64(input: &[u8]) -> Result<(u64, usize)> {
        let mut value = 0u64;
        let mut shift = 0;

        for (i, &byte) in input.iter().enumerate() {
            if shift > 63 || (shift == 63 && byte & 127 > 1) {
                return Err(Error::corrupt("varint overflow"));
            }
            value |= ((byte & 127) as u64) << shift;

            if byte & 128 == 0 {  // No continuation bit
                return Ok((value, i + 1));
            }
            shift += 7;
        }

        Err(Error::corrupt("truncated varint"))
    }

    pub fn decode_u32(input: &[u8]) -> Result<(u32, usize)> {
        let (value, used) = Self::decode_u64(input)?;
        let value = u32::try_from(value)
            .map_err(|_| Error::corrupt("varint too large for 32 bits"))?;
        Ok((value, used))
    }

    /// Length-prefixed byte string.
    pub fn encode_bytes(output: &mut Vec<u8>, bytes: &[u8]) {
        Self::encode_u32(output, bytes.len() as u32);
        output.extend_from_slice(bytes);
    }

    /// Encode `bytes` so that encoded keys sort the same as the raw strings.
    ///
    /// Zero bytes are escaped as `\0\xff`; unless this is the last component
    /// of the key a `\0\0` terminator follows.
    pub fn encode_sortable(output: &mut Vec<u8>, bytes: &[u8], last: bool) {
        for &b in bytes {
            output.push(b);
            if b == 0 {
                output.push(0xff);
            }
        }
        if !last {
            output.extend_from_slice(&[0, 0]);
        }
    }
}

/// Sequential reader over packed data.
#[derive(Debug, Clone)]
pub struct Unpacker<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Unpacker<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Unpacker { data, pos: 0 }
    }

    pub fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn rest(&self) -> &'a [u8] {
        &self.data[self.pos.min(self.data.len())..]
    }

    pub fn uint(&mut self) -> Result<u32> {
        let (value, used) = VByteEncoder::decode_u32(self.rest())?;
        self.pos += used;
        Ok(value)
    }

    pub fn uint64(&mut self) -> Result<u64> {
        let (value, used) = VByteEncoder::decode_u64(self.rest())?;
        self.pos += used;
        Ok(value)
    }

    pub fn byte(&mut self) -> Result<u8> {
        match self.data.get(self.pos) {
            Some(&b) => {
                self.pos += 1;
                Ok(b)
            }
            None => Err(Error::corrupt("unexpected end of packed data")),
        }
    }

    pub fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self.pos.checked_add(len)
            .filter(|&end| end <= self.data.len())
            .ok_or_else(|| Error::corrupt("packed data shorter than its length field"))?;
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    pub fn bytes(&mut self) -> Result<&'a [u8]> {
        let len = self.uint()? as usize;
        self.take(len)
    }

    pub fn be_u32(&mut self) -> Result<u32> {
        let raw = self.take(4)?;
        Ok(u32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]]))
    }

    /// Inverse of [`VByteEncoder::encode_sortable`].
    pub fn sortable(&mut self, last: bool) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        loop {
            let Some(&b) = self.data.get(self.pos) else {
                if last {
                    return Ok(out);
                }
                return Err(Error::corrupt("unterminated sortable string"));
            };
            self.pos += 1;
            if b != 0 {
                out.push(b);
                continue;
            }
            match self.data.get(self.pos) {
                Some(0xff) => {
                    self.pos += 1;
                    out.push(0);
                }
                Some(0) if !last => {
                    self.pos += 1;
                    return Ok(out);
                }
                _ => return Err(Error::corrupt("bad escape in sortable string")),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn varint_sizes() {
        let mut out = Vec::new();
        VByteEncoder::encode_u32(&mut out, 127);
        assert_eq!(out.len(), 1);
        VByteEncoder::encode_u32(&mut out, 128);
        assert_eq!(out.len(), 3);
        VByteEncoder::encode_u64(&mut out, u64::MAX);

        let mut rd = Unpacker::new(&out);
        assert_eq!(rd.uint().unwrap(), 127);
        assert_eq!(rd.uint().unwrap(), 128);
        assert_eq!(rd.uint64().unwrap(), u64::MAX);
        assert!(rd.is_empty());
        assert!(rd.uint().is_err());
    }

    #[test]
    fn oversized_value_rejected_as_u32() {
        let mut out = Vec::new();
        VByteEncoder::encode_u64(&mut out, 1 << 40);
        assert!(Unpacker::new(&out).uint().is_err());
    }

    #[test]
    fn sortable_strings_keep_order_with_zero_bytes() {
        let mut a = Vec::new();
        let mut b = Vec::new();
        let mut c = Vec::new();
        VByteEncoder::encode_sortable(&mut a, b"ab", false);
        VByteEncoder::encode_sortable(&mut b, b"ab\0", false);
        VByteEncoder::encode_sortable(&mut c, b"abc", false);
        assert!(a < b && b < c);

        let mut rd = Unpacker::new(&b);
        assert_eq!(rd.sortable(false).unwrap(), b"ab\0".to_vec());
        assert!(rd.is_empty());
    }
}
