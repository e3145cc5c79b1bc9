use bytes::{Buf, BufMut, BytesMut};

use crate::error::BufferError;

pub const DEFAULT_CAPACITY: usize = 1024;

#[derive(Debug, Clone)]
pub struct NetBuffer {
    buf: BytesMut,
    capacity: usize,
}

impl Default for NetBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl NetBuffer {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn reserve(&self, needed: usize) -> Result<(), BufferError> {
        if self.buf.len() + needed > self.capacity {
            return Err(BufferError::Overflow {
                needed,
                written: self.buf.len(),
                capacity: self.capacity,
            });
        }
        Ok(())
    }

    pub fn write_u8(&mut self, value: u8) -> Result<(), BufferError> {
        self.reserve(1)?;
        self.buf.put_u8(value);
        Ok(())
    }

    pub fn write_i32(&mut self, value: i32) -> Result<(), BufferError> {
        self.reserve(4)?;
        self.buf.put_i32(value);
        Ok(())
    }

    pub fn write_f32(&mut self, value: f32) -> Result<(), BufferError> {
        self.reserve(4)?;
        self.buf.put_f32(value);
        Ok(())
    }

    pub fn write_bool(&mut self, value: bool) -> Result<(), BufferError> {
        self.write_u8(u8::from(value))
    }

    /// Writes a 4-byte length prefix followed by the UTF-8 bytes.
    pub fn write_string(&mut self, value: &str) -> Result<(), BufferError> {
        let bytes = value.as_bytes();
        let len = i32::try_from(bytes.len()).map_err(|_| BufferError::Overflow {
            needed: bytes.len(),
            written: self.buf.len(),
            capacity: self.capacity,
        })?;
        self.reserve(4 + bytes.len())?;
        self.buf.put_i32(len);
        self.buf.put_slice(bytes);
        Ok(())
    }

    /// `None` is written as the empty string.
    pub fn write_opt_string(&mut self, value: Option<&str>) -> Result<(), BufferError> {
        self.write_string(value.unwrap_or_default())
    }

    pub fn to_byte_array(&self) -> Vec<u8> {
        self.buf.to_vec()
    }

    pub fn into_vec(self) -> Vec<u8> {
        Vec::from(self.buf)
    }
}

#[derive(Debug, Clone)]
pub struct NetReader<'a> {
    data: &'a [u8],
}

impl<'a> NetReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    pub fn remaining(&self) -> usize {
        self.data.remaining()
    }

    fn require(&self, needed: usize) -> Result<(), BufferError> {
        if self.data.remaining() < needed {
            return Err(BufferError::Underflow {
                needed,
                remaining: self.data.remaining(),
            });
        }
        Ok(())
    }

    pub fn read_u8(&mut self) -> Result<u8, BufferError> {
        self.require(1)?;
        Ok(self.data.get_u8())
    }

    pub fn read_i32(&mut self) -> Result<i32, BufferError> {
        self.require(4)?;
        Ok(self.data.get_i32())
    }

    pub fn read_f32(&mut self) -> Result<f32, BufferError> {
        self.require(4)?;
        Ok(self.data.get_f32())
    }

    pub fn read_bool(&mut self) -> Result<bool, BufferError> {
        Ok(self.read_u8()? == 1)
    }

    pub fn read_string(&mut self) -> Result<String, BufferError> {
        let len = self.read_i32()?;
        let len = usize::try_from(len).map_err(|_| BufferError::NegativeLength(len))?;
        self.require(len)?;
        let (text, rest) = self.data.split_at(len);
        self.data = rest;
        String::from_utf8(text.to_vec()).map_err(|_| BufferError::InvalidUtf8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mixed_scalars_roundtrip() {
        let mut out = NetBuffer::new();
        out.write_i32(10086).unwrap();
        out.write_f32(-99.5).unwrap();
        out.write_bool(true).unwrap();
        out.write_string("T34-坦克").unwrap();

        let payload = out.to_byte_array();
        assert_eq!(payload.len(), 4 + 4 + 1 + 4 + "T34-坦克".len());

        let mut inp = NetReader::new(&payload);
        assert_eq!(inp.read_i32().unwrap(), 10086);
        assert!((inp.read_f32().unwrap() - -99.5).abs() < 0.001);
        assert!(inp.read_bool().unwrap());
        assert_eq!(inp.read_string().unwrap(), "T34-坦克");
        assert_eq!(inp.remaining(), 0);
    }

    #[test]
    fn test_big_endian_layout() {
        let mut out = NetBuffer::new();
        out.write_i32(0x11).unwrap();
        out.write_bool(false).unwrap();
        assert_eq!(out.to_byte_array(), vec![0, 0, 0, 0x11, 0]);
    }

    #[test]
    fn test_none_and_empty_strings_read_back_empty() {
        let mut out = NetBuffer::new();
        out.write_opt_string(None).unwrap();
        out.write_string("").unwrap();
        let payload = out.to_byte_array();
        assert_eq!(payload, vec![0; 8]);

        let mut inp = NetReader::new(&payload);
        assert_eq!(inp.read_string().unwrap(), "");
        assert_eq!(inp.read_string().unwrap(), "");
    }

    #[test]
    fn test_write_past_capacity_fails() {
        let mut out = NetBuffer::with_capacity(6);
        out.write_i32(1).unwrap();
        let err = out.write_i32(2).unwrap_err();
        assert_eq!(
            err,
            BufferError::Overflow {
                needed: 4,
                written: 4,
                capacity: 6
            }
        );
        assert_eq!(out.len(), 4);
    }

    #[test]
    fn test_read_past_end_fails() {
        let mut inp = NetReader::new(&[0, 0, 1]);
        assert_eq!(
            inp.read_i32(),
            Err(BufferError::Underflow {
                needed: 4,
                remaining: 3
            })
        );
    }

    #[test]
    fn test_string_length_checks() {
        let mut inp = NetReader::new(&[0xFF, 0xFF, 0xFF, 0xFF]);
        assert_eq!(inp.read_string(), Err(BufferError::NegativeLength(-1)));

        let mut inp = NetReader::new(&[0, 0, 0, 9, b'a']);
        assert!(matches!(
            inp.read_string(),
            Err(BufferError::Underflow { needed: 9, .. })
        ));
    }
}
