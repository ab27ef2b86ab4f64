//! MySQL packet header definitions.
//!
//! Every packet starts with a 4-byte header: a 3-byte little-endian payload
//! length followed by a 1-byte sequence number. Payloads of
//! [`MAX_PAYLOAD_SIZE`] bytes continue in the next packet; a logical payload
//! that is an exact multiple of the limit is terminated by an empty packet.

use bytes::{Buf, BufMut};

use crate::error::ProtocolError;

/// MySQL packet header size in bytes.
pub const PACKET_HEADER_SIZE: usize = 4;

/// Maximum payload carried by a single packet (2^24 - 1, just under 16MB).
pub const MAX_PAYLOAD_SIZE: usize = 0xFF_FFFF;

/// Default `max_allowed_packet` assumed before the server reports its own.
pub const DEFAULT_MAX_ALLOWED_PACKET: usize = 64 * 1024 * 1024;

/// MySQL packet header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    /// Payload length, excluding the header itself.
    pub payload_length: u32,
    /// Sequence number (wraps at 255).
    pub sequence_id: u8,
}

impl PacketHeader {
    /// Create a new packet header.
    #[must_use]
    pub const fn new(payload_length: u32, sequence_id: u8) -> Self {
        Self {
            payload_length,
            sequence_id,
        }
    }

    /// Parse a packet header from bytes.
    pub fn decode(src: &mut impl Buf) -> Result<Self, ProtocolError> {
        if src.remaining() < PACKET_HEADER_SIZE {
            return Err(ProtocolError::IncompletePacket {
                expected: PACKET_HEADER_SIZE,
                actual: src.remaining(),
            });
        }

        let payload_length = src.get_uint_le(3) as u32;
        let sequence_id = src.get_u8();

        Ok(Self {
            payload_length,
            sequence_id,
        })
    }

    /// Encode the packet header to bytes.
    pub fn encode(&self, dst: &mut impl BufMut) {
        dst.put_uint_le(u64::from(self.payload_length), 3);
        dst.put_u8(self.sequence_id);
    }

    /// Check whether the payload continues in a following packet.
    #[must_use]
    pub const fn is_continued(&self) -> bool {
        self.payload_length as usize == MAX_PAYLOAD_SIZE
    }
}

/// Classification of a response payload by its first byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketType {
    /// OK packet (0x00).
    Ok,
    /// ERR packet (0xFF).
    Err,
    /// EOF packet (0xFE with a payload under 9 bytes).
    Eof,
    /// LOCAL INFILE request (0xFB).
    LocalInfile,
    /// Anything else: a column count, column definition, or row.
    Data,
}

impl PacketType {
    /// Classify a payload by its first byte and length.
    #[must_use]
    pub fn classify(payload: &[u8]) -> Self {
        match payload.first() {
            Some(0x00) => Self::Ok,
            Some(0xFF) => Self::Err,
            Some(0xFE) if payload.len() < 9 => Self::Eof,
            Some(0xFB) => Self::LocalInfile,
            _ => Self::Data,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use bytes::BytesMut;

    use super::*;

    #[test]
    fn test_header_roundtrip() {
        let header = PacketHeader::new(0x12_3456, 7);

        let mut buf = BytesMut::new();
        header.encode(&mut buf);
        assert_eq!(buf.len(), PACKET_HEADER_SIZE);
        assert_eq!(&buf[..], &[0x56, 0x34, 0x12, 7]);

        let decoded = PacketHeader::decode(&mut buf).unwrap();
        assert_eq!(header, decoded);
    }

    #[test]
    fn test_header_incomplete() {
        let mut buf = &[0x01u8, 0x00][..];
        assert!(matches!(
            PacketHeader::decode(&mut buf),
            Err(ProtocolError::IncompletePacket { expected: 4, actual: 2 })
        ));
    }

    #[test]
    fn test_continuation_flag() {
        assert!(PacketHeader::new(MAX_PAYLOAD_SIZE as u32, 0).is_continued());
        assert!(!PacketHeader::new(100, 0).is_continued());
    }

    #[test]
    fn test_classify() {
        assert_eq!(PacketType::classify(&[0x00, 0x01]), PacketType::Ok);
        assert_eq!(PacketType::classify(&[0xFF, 0x12]), PacketType::Err);
        assert_eq!(PacketType::classify(&[0xFE, 0, 0, 0, 0]), PacketType::Eof);
        // A 0xFE first byte on a long payload is a length-encoded integer, not EOF.
        assert_eq!(
            PacketType::classify(&[0xFE, 0, 0, 0, 0, 0, 0, 0, 0, 0]),
            PacketType::Data
        );
        assert_eq!(PacketType::classify(&[0xFB]), PacketType::LocalInfile);
        assert_eq!(PacketType::classify(&[0x05, b'h']), PacketType::Data);
    }
}
