//! Length-encoded primitives used throughout the wire format.
//!
//! Extension traits over [`bytes::Buf`] / [`bytes::BufMut`] for the
//! variable-length integer and string encodings:
//!
//! - `< 0xFB`: the byte is the value
//! - `0xFC`: 2-byte little-endian value follows
//! - `0xFD`: 3-byte little-endian value follows
//! - `0xFE`: 8-byte little-endian value follows
//! - `0xFB`: NULL marker (only valid in row payloads)

use bytes::{Buf, BufMut, Bytes};

use crate::error::ProtocolError;

/// Length-encoded NULL marker byte.
pub const NULL_MARKER: u8 = 0xFB;

/// Read-side extensions for MySQL wire primitives.
pub trait WireReadExt: Buf {
    /// Read a length-encoded integer.
    ///
    /// Returns `Ok(None)` for the NULL marker.
    fn get_lenenc_int(&mut self) -> Result<Option<u64>, ProtocolError> {
        if self.remaining() < 1 {
            return Err(ProtocolError::IncompletePacket {
                expected: 1,
                actual: 0,
            });
        }
        let first = self.get_u8();
        let needed = match first {
            0x00..=0xFA => return Ok(Some(u64::from(first))),
            NULL_MARKER => return Ok(None),
            0xFC => 2,
            0xFD => 3,
            0xFE => 8,
            0xFF => return Err(ProtocolError::InvalidLengthEncoding(first)),
        };
        if self.remaining() < needed {
            return Err(ProtocolError::IncompletePacket {
                expected: needed,
                actual: self.remaining(),
            });
        }
        Ok(Some(self.get_uint_le(needed)))
    }

    /// Read a length-encoded byte string; `None` for the NULL marker.
    fn get_lenenc_bytes(&mut self) -> Result<Option<Bytes>, ProtocolError> {
        let Some(len) = self.get_lenenc_int()? else {
            return Ok(None);
        };
        let len = usize::try_from(len).unwrap_or(usize::MAX);
        if self.remaining() < len {
            return Err(ProtocolError::IncompletePacket {
                expected: len,
                actual: self.remaining(),
            });
        }
        Ok(Some(self.copy_to_bytes(len)))
    }

    /// Read a NUL-terminated string.
    fn get_null_terminated(&mut self) -> Result<Bytes, ProtocolError> {
        let chunk = self.chunk();
        match chunk.iter().position(|&b| b == 0) {
            Some(pos) => {
                let s = self.copy_to_bytes(pos);
                self.advance(1);
                Ok(s)
            }
            None => Err(ProtocolError::MalformedPacket(
                "unterminated string".into(),
            )),
        }
    }

    /// Read `len` bytes, failing cleanly when short.
    fn get_exact(&mut self, len: usize) -> Result<Bytes, ProtocolError> {
        if self.remaining() < len {
            return Err(ProtocolError::IncompletePacket {
                expected: len,
                actual: self.remaining(),
            });
        }
        Ok(self.copy_to_bytes(len))
    }
}

impl<B: Buf + ?Sized> WireReadExt for B {}

/// Write-side extensions for MySQL wire primitives.
pub trait WireWriteExt: BufMut {
    /// Write a length-encoded integer.
    fn put_lenenc_int(&mut self, value: u64) {
        match value {
            0..=0xFA => self.put_u8(value as u8),
            0xFB..=0xFFFF => {
                self.put_u8(0xFC);
                self.put_uint_le(value, 2);
            }
            0x1_0000..=0xFF_FFFF => {
                self.put_u8(0xFD);
                self.put_uint_le(value, 3);
            }
            _ => {
                self.put_u8(0xFE);
                self.put_u64_le(value);
            }
        }
    }

    /// Write a length-encoded byte string.
    fn put_lenenc_bytes(&mut self, value: &[u8]) {
        self.put_lenenc_int(value.len() as u64);
        self.put_slice(value);
    }

    /// Write a NUL-terminated string.
    fn put_null_terminated(&mut self, value: &[u8]) {
        self.put_slice(value);
        self.put_u8(0);
    }
}

impl<B: BufMut + ?Sized> WireWriteExt for B {}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use bytes::BytesMut;

    use super::*;

    fn roundtrip_int(value: u64) -> (usize, u64) {
        let mut buf = BytesMut::new();
        buf.put_lenenc_int(value);
        let encoded_len = buf.len();
        let decoded = buf.get_lenenc_int().unwrap().unwrap();
        (encoded_len, decoded)
    }

    #[test]
    fn test_lenenc_int_boundaries() {
        assert_eq!(roundtrip_int(0), (1, 0));
        assert_eq!(roundtrip_int(0xFA), (1, 0xFA));
        assert_eq!(roundtrip_int(0xFB), (3, 0xFB));
        assert_eq!(roundtrip_int(0xFFFF), (3, 0xFFFF));
        assert_eq!(roundtrip_int(0x1_0000), (4, 0x1_0000));
        assert_eq!(roundtrip_int(0xFF_FFFF), (4, 0xFF_FFFF));
        assert_eq!(roundtrip_int(0x100_0000), (9, 0x100_0000));
        assert_eq!(roundtrip_int(u64::MAX), (9, u64::MAX));
    }

    #[test]
    fn test_lenenc_null_marker() {
        let mut buf = &[NULL_MARKER][..];
        assert_eq!(buf.get_lenenc_int().unwrap(), None);
    }

    #[test]
    fn test_lenenc_bytes_roundtrip() {
        let mut buf = BytesMut::new();
        buf.put_lenenc_bytes(b"hello");
        let decoded = buf.get_lenenc_bytes().unwrap().unwrap();
        assert_eq!(&decoded[..], b"hello");
    }

    #[test]
    fn test_lenenc_bytes_truncated() {
        let mut buf = &[0x05, b'h', b'i'][..];
        assert!(buf.get_lenenc_bytes().is_err());
    }

    #[test]
    fn test_null_terminated() {
        let mut buf = &b"mysql_native_password\0rest"[..];
        let s = buf.get_null_terminated().unwrap();
        assert_eq!(&s[..], b"mysql_native_password");
        assert_eq!(buf, b"rest");
    }

    #[test]
    fn test_null_terminated_missing() {
        let mut buf = &b"no terminator"[..];
        assert!(buf.get_null_terminated().is_err());
    }
}
