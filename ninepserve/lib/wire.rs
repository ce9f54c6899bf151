//! 9P wire format implementation
//!
//! All 9P integers are little-endian. Strings are a u16 length followed by
//! UTF-8 bytes with no padding or terminator.

use bytes::{Buf, BufMut};

use crate::error::Error;
use crate::Result;

/// Trait for types that can be encoded to the 9P wire format
pub trait WireEncode {
    /// Encode self into 9P wire format
    fn encode<B: BufMut>(&self, buf: &mut B) -> Result<()>;
}

/// Trait for types that can be decoded from the 9P wire format
pub trait WireDecode: Sized {
    /// Decode self from 9P wire format
    fn decode<B: Buf>(buf: &mut B) -> Result<Self>;
}

/// Helper functions for 9P wire encoding/decoding
pub mod helpers {
    use super::*;

    /// Encode a string to 9P wire format
    pub fn encode_string<B: BufMut>(s: &str, buf: &mut B) -> Result<()> {
        let bytes = s.as_bytes();
        if bytes.len() > u16::MAX as usize {
            return Err(Error::Wire(format!("string too long: {}", bytes.len())));
        }
        buf.put_u16_le(bytes.len() as u16);
        buf.put_slice(bytes);
        Ok(())
    }

    /// Decode a string from 9P wire format
    pub fn decode_string<B: Buf>(buf: &mut B) -> Result<String> {
        if buf.remaining() < 2 {
            return Err(Error::Wire("truncated string length".into()));
        }
        let len = buf.get_u16_le() as usize;
        if buf.remaining() < len {
            return Err(Error::Wire("truncated string body".into()));
        }
        let mut bytes = vec![0; len];
        buf.copy_to_slice(&mut bytes);
        String::from_utf8(bytes).map_err(|e| Error::Wire(format!("invalid UTF-8: {}", e)))
    }

    /// Decode a counted byte blob (u32 length prefix)
    pub fn decode_bytes<B: Buf>(buf: &mut B) -> Result<Vec<u8>> {
        if buf.remaining() < 4 {
            return Err(Error::Wire("truncated blob length".into()));
        }
        let len = buf.get_u32_le() as usize;
        if buf.remaining() < len {
            return Err(Error::Wire("truncated blob body".into()));
        }
        let mut bytes = vec![0; len];
        buf.copy_to_slice(&mut bytes);
        Ok(bytes)
    }

    /// Ensure at least `n` bytes remain in the buffer
    pub fn need<B: Buf>(buf: &B, n: usize) -> Result<()> {
        if buf.remaining() < n {
            return Err(Error::Wire(format!(
                "message truncated: need {} bytes, have {}",
                n,
                buf.remaining()
            )));
        }
        Ok(())
    }
}

// Implement wire encoding/decoding for basic types
impl WireEncode for u8 {
    fn encode<B: BufMut>(&self, buf: &mut B) -> Result<()> {
        buf.put_u8(*self);
        Ok(())
    }
}

impl WireDecode for u8 {
    fn decode<B: Buf>(buf: &mut B) -> Result<Self> {
        helpers::need(buf, 1)?;
        Ok(buf.get_u8())
    }
}

impl WireEncode for u16 {
    fn encode<B: BufMut>(&self, buf: &mut B) -> Result<()> {
        buf.put_u16_le(*self);
        Ok(())
    }
}

impl WireDecode for u16 {
    fn decode<B: Buf>(buf: &mut B) -> Result<Self> {
        helpers::need(buf, 2)?;
        Ok(buf.get_u16_le())
    }
}

impl WireEncode for u32 {
    fn encode<B: BufMut>(&self, buf: &mut B) -> Result<()> {
        buf.put_u32_le(*self);
        Ok(())
    }
}

impl WireDecode for u32 {
    fn decode<B: Buf>(buf: &mut B) -> Result<Self> {
        helpers::need(buf, 4)?;
        Ok(buf.get_u32_le())
    }
}

impl WireEncode for u64 {
    fn encode<B: BufMut>(&self, buf: &mut B) -> Result<()> {
        buf.put_u64_le(*self);
        Ok(())
    }
}

impl WireDecode for u64 {
    fn decode<B: Buf>(buf: &mut B) -> Result<Self> {
        helpers::need(buf, 8)?;
        Ok(buf.get_u64_le())
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    #[test]
    fn test_string_roundtrip() {
        let mut buf = BytesMut::new();
        helpers::encode_string("hello.txt", &mut buf).unwrap();
        assert_eq!(&buf[..2], &9u16.to_le_bytes());

        let mut reader = buf.freeze();
        assert_eq!(helpers::decode_string(&mut reader).unwrap(), "hello.txt");
    }

    #[test]
    fn test_truncated_string_fails() {
        let mut buf = BytesMut::new();
        buf.put_u16_le(10);
        buf.put_slice(b"abc");

        let mut reader = buf.freeze();
        assert!(matches!(
            helpers::decode_string(&mut reader),
            Err(Error::Wire(_))
        ));
    }

    #[test]
    fn test_integers_are_little_endian() {
        let mut buf = BytesMut::new();
        0x1234u16.encode(&mut buf).unwrap();
        0xdeadbeefu32.encode(&mut buf).unwrap();
        assert_eq!(&buf[..2], &[0x34, 0x12]);
        assert_eq!(&buf[2..6], &[0xef, 0xbe, 0xad, 0xde]);

        let mut reader = buf.freeze();
        assert_eq!(u16::decode(&mut reader).unwrap(), 0x1234);
        assert_eq!(u32::decode(&mut reader).unwrap(), 0xdeadbeef);
    }
}
