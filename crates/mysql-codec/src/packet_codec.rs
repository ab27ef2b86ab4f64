//! MySQL packet codec implementation.
//!
//! Frames are a 4-byte header (3-byte little-endian payload length plus a
//! sequence id) followed by up to [`MAX_PAYLOAD_SIZE`] payload bytes. Logical
//! payloads larger than that are fragmented; a fragment that fills the
//! maximum signals continuation, and a payload that is an exact multiple of
//! the maximum is terminated by an empty frame.

use bytes::{BufMut, Bytes, BytesMut};
use mysql_protocol::packet::{
    PacketHeader, DEFAULT_MAX_ALLOWED_PACKET, MAX_PAYLOAD_SIZE, PACKET_HEADER_SIZE,
};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::CodecError;

/// A single wire frame with header and payload.
#[derive(Debug, Clone)]
pub struct Packet {
    /// Frame header.
    pub header: PacketHeader,
    /// Frame payload (excluding header).
    pub payload: BytesMut,
}

impl Packet {
    /// Create a new packet with the given header and payload.
    #[must_use]
    pub fn new(header: PacketHeader, payload: BytesMut) -> Self {
        Self { header, payload }
    }

    /// Get the total frame size including header.
    #[must_use]
    pub fn total_size(&self) -> usize {
        PACKET_HEADER_SIZE + self.payload.len()
    }
}

/// MySQL packet codec for tokio-util framing.
///
/// Decoding yields one wire frame at a time with sequence validation;
/// encoding takes a complete logical payload and fragments it. The sequence
/// counter is shared by both directions and must be reset before each
/// command round trip.
pub struct MySqlCodec {
    /// Largest single-frame payload to emit or expect.
    max_payload_size: usize,
    /// Largest logical payload allowed outbound.
    max_allowed_packet: usize,
    /// Next sequence id.
    sequence_id: u8,
}

impl MySqlCodec {
    /// Create a new codec with protocol defaults.
    #[must_use]
    pub fn new() -> Self {
        Self {
            max_payload_size: MAX_PAYLOAD_SIZE as usize,
            max_allowed_packet: DEFAULT_MAX_ALLOWED_PACKET,
            sequence_id: 0,
        }
    }

    /// Override the per-frame payload cap (clamped to the wire maximum).
    #[must_use]
    pub fn with_max_payload_size(mut self, size: usize) -> Self {
        self.max_payload_size = size.clamp(1, MAX_PAYLOAD_SIZE as usize);
        self
    }

    /// Override the logical payload cap.
    #[must_use]
    pub fn with_max_allowed_packet(mut self, size: usize) -> Self {
        self.max_allowed_packet = size;
        self
    }

    /// Largest single-frame payload this codec emits.
    #[must_use]
    pub fn max_payload_size(&self) -> usize {
        self.max_payload_size
    }

    /// Current sequence id.
    #[must_use]
    pub fn sequence_id(&self) -> u8 {
        self.sequence_id
    }

    /// Reset the sequence counter for a new command round trip.
    pub fn reset_sequence(&mut self) {
        self.sequence_id = 0;
    }

    /// Force the sequence counter (used after the TLS upgrade, where the
    /// handshake continues mid-sequence on a new stream).
    pub fn set_sequence_id(&mut self, sequence_id: u8) {
        self.sequence_id = sequence_id;
    }

    fn next_sequence_id(&mut self) -> u8 {
        let id = self.sequence_id;
        self.sequence_id = self.sequence_id.wrapping_add(1);
        id
    }
}

impl Default for MySqlCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for MySqlCodec {
    type Item = Packet;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < PACKET_HEADER_SIZE {
            return Ok(None);
        }

        // Peek at the header to get the payload length.
        let length =
            usize::from(src[0]) | (usize::from(src[1]) << 8) | (usize::from(src[2]) << 16);

        if src.len() < PACKET_HEADER_SIZE + length {
            src.reserve(PACKET_HEADER_SIZE + length - src.len());
            return Ok(None);
        }

        let frame = src.split_to(PACKET_HEADER_SIZE + length);
        let mut cursor = frame.as_ref();
        let header = PacketHeader::decode(&mut cursor)?;

        if header.sequence_id != self.sequence_id {
            return Err(CodecError::OutOfSequence {
                expected: self.sequence_id,
                actual: header.sequence_id,
            });
        }
        self.sequence_id = header.sequence_id.wrapping_add(1);

        let payload = BytesMut::from(&frame[PACKET_HEADER_SIZE..]);

        tracing::trace!(
            length = length,
            sequence_id = header.sequence_id,
            continued = header.is_continued(),
            "decoded packet"
        );

        Ok(Some(Packet::new(header, payload)))
    }
}

impl Encoder<Bytes> for MySqlCodec {
    type Error = CodecError;

    fn encode(&mut self, payload: Bytes, dst: &mut BytesMut) -> Result<(), Self::Error> {
        if payload.len() > self.max_allowed_packet {
            return Err(CodecError::PacketTooLarge {
                size: payload.len(),
                max: self.max_allowed_packet,
            });
        }

        let mut offset = 0;
        loop {
            let chunk = (payload.len() - offset).min(self.max_payload_size);
            let header = PacketHeader {
                payload_length: chunk as u32,
                sequence_id: self.next_sequence_id(),
            };

            dst.reserve(PACKET_HEADER_SIZE + chunk);
            header.encode(dst);
            dst.put_slice(&payload[offset..offset + chunk]);

            tracing::trace!(
                length = chunk,
                sequence_id = header.sequence_id,
                "encoded packet"
            );

            offset += chunk;
            if chunk < self.max_payload_size {
                break;
            }
            if offset == payload.len() {
                // Exact multiple of the maximum: empty terminator frame.
                let terminator = PacketHeader {
                    payload_length: 0,
                    sequence_id: self.next_sequence_id(),
                };
                dst.reserve(PACKET_HEADER_SIZE);
                terminator.encode(dst);
                break;
            }
        }
        Ok(())
    }
}

/// Reassembles fragmented wire frames into complete logical payloads.
///
/// A frame whose payload fills the per-frame maximum signals that another
/// fragment follows; anything shorter completes the payload.
#[derive(Debug)]
pub struct PayloadAssembler {
    buffer: BytesMut,
    max_payload_size: usize,
    max_allowed_packet: usize,
    fragments: usize,
}

impl PayloadAssembler {
    /// Create an assembler with protocol defaults.
    #[must_use]
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::new(),
            max_payload_size: MAX_PAYLOAD_SIZE as usize,
            max_allowed_packet: DEFAULT_MAX_ALLOWED_PACKET,
            fragments: 0,
        }
    }

    /// Override the per-frame payload cap (must match the codec's).
    #[must_use]
    pub fn with_max_payload_size(mut self, size: usize) -> Self {
        self.max_payload_size = size.clamp(1, MAX_PAYLOAD_SIZE as usize);
        self
    }

    /// Override the logical payload cap.
    #[must_use]
    pub fn with_max_allowed_packet(mut self, size: usize) -> Self {
        self.max_allowed_packet = size;
        self
    }

    /// Push a frame into the assembler.
    ///
    /// Returns `Some(payload)` when the frame completes a logical payload,
    /// `None` when more fragments are needed.
    pub fn push(&mut self, packet: Packet) -> Result<Option<Bytes>, CodecError> {
        if self.buffer.len() + packet.payload.len() > self.max_allowed_packet {
            return Err(CodecError::PacketTooLarge {
                size: self.buffer.len() + packet.payload.len(),
                max: self.max_allowed_packet,
            });
        }

        let continued = packet.payload.len() == self.max_payload_size;
        self.fragments += 1;

        if self.fragments == 1 && !continued {
            // Fast path: single-frame payload, no copy.
            self.fragments = 0;
            return Ok(Some(packet.payload.freeze()));
        }

        self.buffer.extend_from_slice(&packet.payload);

        tracing::trace!(
            fragments = self.fragments,
            buffered = self.buffer.len(),
            continued = continued,
            "assembling payload"
        );

        if continued {
            Ok(None)
        } else {
            self.fragments = 0;
            Ok(Some(self.buffer.split().freeze()))
        }
    }

    /// Whether a partially assembled payload is buffered.
    #[must_use]
    pub fn has_partial(&self) -> bool {
        self.fragments > 0
    }
}

impl Default for PayloadAssembler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn decode_all(codec: &mut MySqlCodec, data: &mut BytesMut) -> Vec<Packet> {
        let mut packets = Vec::new();
        while let Some(packet) = codec.decode(data).unwrap() {
            packets.push(packet);
        }
        packets
    }

    #[test]
    fn test_decode_packet() {
        let mut codec = MySqlCodec::new();
        let mut data = BytesMut::new();
        data.put_slice(&[4, 0, 0, 0]); // 4-byte payload, sequence 0
        data.put_slice(b"test");

        let packet = codec.decode(&mut data).unwrap().unwrap();
        assert_eq!(packet.header.payload_length, 4);
        assert_eq!(packet.header.sequence_id, 0);
        assert_eq!(&packet.payload[..], b"test");
    }

    #[test]
    fn test_decode_incomplete_returns_none() {
        let mut codec = MySqlCodec::new();
        let mut data = BytesMut::new();
        data.put_slice(&[10, 0, 0, 0]);
        data.put_slice(b"tes"); // 7 bytes missing
        assert!(codec.decode(&mut data).unwrap().is_none());
    }

    #[test]
    fn test_decode_out_of_sequence() {
        let mut codec = MySqlCodec::new();
        let mut data = BytesMut::new();
        data.put_slice(&[1, 0, 0, 5]); // sequence 5, expected 0
        data.put_u8(0xAB);
        assert!(matches!(
            codec.decode(&mut data),
            Err(CodecError::OutOfSequence {
                expected: 0,
                actual: 5
            })
        ));
    }

    #[test]
    fn test_encode_stamps_sequence() {
        let mut codec = MySqlCodec::new();
        let mut dst = BytesMut::new();
        codec.encode(Bytes::from_static(b"ping"), &mut dst).unwrap();
        codec.encode(Bytes::from_static(b"pong"), &mut dst).unwrap();
        assert_eq!(&dst[..4], &[4, 0, 0, 0]);
        assert_eq!(&dst[8..12], &[4, 0, 0, 1]);
    }

    #[test]
    fn test_encode_fragments_large_payload() {
        let mut codec = MySqlCodec::new().with_max_payload_size(8);
        let mut dst = BytesMut::new();
        codec
            .encode(Bytes::from_static(b"0123456789abc"), &mut dst)
            .unwrap();
        // 8-byte fragment then 5-byte tail.
        assert_eq!(&dst[..4], &[8, 0, 0, 0]);
        assert_eq!(&dst[4..12], b"01234567");
        assert_eq!(&dst[12..16], &[5, 0, 0, 1]);
        assert_eq!(&dst[16..], b"89abc");
    }

    #[test]
    fn test_encode_exact_multiple_gets_empty_terminator() {
        let mut codec = MySqlCodec::new().with_max_payload_size(8);
        let mut dst = BytesMut::new();
        codec
            .encode(Bytes::from_static(b"0123456789abcdef"), &mut dst)
            .unwrap();
        // Two full fragments and an empty terminator.
        assert_eq!(dst.len(), 4 + 8 + 4 + 8 + 4);
        assert_eq!(&dst[24..28], &[0, 0, 0, 2]);
    }

    #[test]
    fn test_encode_oversize_rejected() {
        let mut codec = MySqlCodec::new().with_max_allowed_packet(8);
        let mut dst = BytesMut::new();
        assert!(matches!(
            codec.encode(Bytes::from_static(b"123456789"), &mut dst),
            Err(CodecError::PacketTooLarge { size: 9, max: 8 })
        ));
        assert!(dst.is_empty());
    }

    #[test]
    fn test_roundtrip_reassembly() {
        let payload: Bytes = (0..1000u32).flat_map(u32::to_le_bytes).collect();
        let mut encoder = MySqlCodec::new().with_max_payload_size(64);
        let mut wire = BytesMut::new();
        encoder.encode(payload.clone(), &mut wire).unwrap();

        let mut decoder = MySqlCodec::new();
        let packets = decode_all(&mut decoder, &mut wire);
        assert!(packets.len() > 1);

        let mut assembler = PayloadAssembler::new().with_max_payload_size(64);
        let mut result = None;
        for packet in packets {
            if let Some(complete) = assembler.push(packet).unwrap() {
                result = Some(complete);
            }
        }
        assert_eq!(result.unwrap(), payload);
        assert!(!assembler.has_partial());
    }

    #[test]
    fn test_assembler_enforces_max_allowed_packet() {
        let mut assembler = PayloadAssembler::new()
            .with_max_payload_size(4)
            .with_max_allowed_packet(6);
        let full = Packet::new(
            PacketHeader {
                payload_length: 4,
                sequence_id: 0,
            },
            BytesMut::from(&b"abcd"[..]),
        );
        assert!(assembler.push(full.clone()).unwrap().is_none());
        assert!(matches!(
            assembler.push(full),
            Err(CodecError::PacketTooLarge { size: 8, max: 6 })
        ));
    }
}
