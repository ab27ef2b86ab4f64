//! Compressed protocol transport.
//!
//! When compression is negotiated, every byte after the handshake travels
//! inside compressed frames: a 7-byte header (3-byte little-endian
//! compressed length, sequence id, 3-byte little-endian uncompressed length)
//! followed by a zlib-deflated body. An uncompressed length of zero marks a
//! body stored verbatim; short payloads are not worth deflating and are
//! stored that way.
//!
//! [`CompressedStream`] implements `AsyncRead`/`AsyncWrite`, so the regular
//! packet codec can be layered on top unchanged.

use std::io::{Read, Write};
use std::pin::Pin;
use std::task::{ready, Context, Poll};

use bytes::{Buf, BufMut, BytesMut};
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use mysql_protocol::packet::MAX_PAYLOAD_SIZE;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

/// Size of the compressed frame header.
pub const COMPRESSED_HEADER_SIZE: usize = 7;

/// Payloads below this size are stored uncompressed.
pub const MIN_COMPRESS_LENGTH: usize = 50;

fn deflate(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    encoder.finish()
}

fn inflate(data: &[u8], uncompressed_len: usize) -> std::io::Result<Vec<u8>> {
    let mut out = Vec::with_capacity(uncompressed_len);
    ZlibDecoder::new(data).read_to_end(&mut out)?;
    if out.len() != uncompressed_len {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!(
                "compressed frame inflated to {} bytes, header claimed {uncompressed_len}",
                out.len()
            ),
        ));
    }
    Ok(out)
}

/// Transport adapter that speaks the compressed protocol.
///
/// Writes are buffered and framed on flush; reads transparently inflate
/// incoming frames. The sequence counters restart with each command round
/// trip, mirroring the packet codec.
#[derive(Debug)]
pub struct CompressedStream<T> {
    io: T,
    /// Raw bytes read from the transport, not yet framed.
    read_raw: BytesMut,
    /// Inflated bytes ready to serve to the reader.
    inflated: BytesMut,
    /// Plaintext bytes written but not yet framed.
    out_plain: BytesMut,
    /// Framed wire bytes not yet written to the transport.
    out_wire: BytesMut,
    write_sequence: u8,
}

impl<T> CompressedStream<T> {
    /// Wrap a transport in the compressed protocol.
    pub fn new(io: T) -> Self {
        Self {
            io,
            read_raw: BytesMut::new(),
            inflated: BytesMut::new(),
            out_plain: BytesMut::new(),
            out_wire: BytesMut::new(),
            write_sequence: 0,
        }
    }

    /// Reset the outbound sequence counter for a new command round trip.
    pub fn reset_sequence(&mut self) {
        self.write_sequence = 0;
    }

    /// Get a reference to the underlying transport.
    pub fn get_ref(&self) -> &T {
        &self.io
    }

    /// Frame everything in `out_plain` into `out_wire`.
    fn frame_pending(&mut self) -> std::io::Result<()> {
        while !self.out_plain.is_empty() {
            let take = self.out_plain.len().min(MAX_PAYLOAD_SIZE as usize);
            let chunk = self.out_plain.split_to(take);

            let (body, uncompressed_len) = if chunk.len() < MIN_COMPRESS_LENGTH {
                (chunk.to_vec(), 0)
            } else {
                let deflated = deflate(&chunk)?;
                if deflated.len() >= chunk.len() {
                    (chunk.to_vec(), 0)
                } else {
                    (deflated, chunk.len())
                }
            };

            self.out_wire.reserve(COMPRESSED_HEADER_SIZE + body.len());
            let len = body.len() as u32;
            self.out_wire.put_u8((len & 0xFF) as u8);
            self.out_wire.put_u8(((len >> 8) & 0xFF) as u8);
            self.out_wire.put_u8(((len >> 16) & 0xFF) as u8);
            self.out_wire.put_u8(self.write_sequence);
            let ulen = uncompressed_len as u32;
            self.out_wire.put_u8((ulen & 0xFF) as u8);
            self.out_wire.put_u8(((ulen >> 8) & 0xFF) as u8);
            self.out_wire.put_u8(((ulen >> 16) & 0xFF) as u8);
            self.out_wire.put_slice(&body);

            tracing::trace!(
                compressed_len = body.len(),
                uncompressed_len = uncompressed_len,
                sequence_id = self.write_sequence,
                "framed compressed packet"
            );

            self.write_sequence = self.write_sequence.wrapping_add(1);
        }
        Ok(())
    }

    /// Inflate one frame out of `read_raw`, if a complete one is buffered.
    fn inflate_one(&mut self) -> std::io::Result<bool> {
        if self.read_raw.len() < COMPRESSED_HEADER_SIZE {
            return Ok(false);
        }
        let compressed_len = usize::from(self.read_raw[0])
            | (usize::from(self.read_raw[1]) << 8)
            | (usize::from(self.read_raw[2]) << 16);
        if self.read_raw.len() < COMPRESSED_HEADER_SIZE + compressed_len {
            return Ok(false);
        }
        let uncompressed_len = usize::from(self.read_raw[4])
            | (usize::from(self.read_raw[5]) << 8)
            | (usize::from(self.read_raw[6]) << 16);

        self.read_raw.advance(COMPRESSED_HEADER_SIZE);
        let body = self.read_raw.split_to(compressed_len);

        if uncompressed_len == 0 {
            self.inflated.extend_from_slice(&body);
        } else {
            let plain = inflate(&body, uncompressed_len)?;
            self.inflated.extend_from_slice(&plain);
        }
        Ok(true)
    }
}

impl<T> AsyncRead for CompressedStream<T>
where
    T: AsyncRead + Unpin,
{
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        let this = self.get_mut();
        loop {
            if !this.inflated.is_empty() {
                let take = this.inflated.len().min(buf.remaining());
                buf.put_slice(&this.inflated.split_to(take));
                return Poll::Ready(Ok(()));
            }
            if this.inflate_one()? {
                continue;
            }

            let mut tmp = [0u8; 8192];
            let mut tmp_buf = ReadBuf::new(&mut tmp);
            ready!(Pin::new(&mut this.io).poll_read(cx, &mut tmp_buf))?;
            let filled = tmp_buf.filled();
            if filled.is_empty() {
                return Poll::Ready(Ok(())); // EOF
            }
            this.read_raw.extend_from_slice(filled);
        }
    }
}

impl<T> AsyncWrite for CompressedStream<T>
where
    T: AsyncWrite + Unpin,
{
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        let this = self.get_mut();
        this.out_plain.extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        let this = self.get_mut();
        this.frame_pending()?;
        while !this.out_wire.is_empty() {
            let written = ready!(Pin::new(&mut this.io).poll_write(cx, &this.out_wire))?;
            if written == 0 {
                return Poll::Ready(Err(std::io::ErrorKind::WriteZero.into()));
            }
            this.out_wire.advance(written);
        }
        Pin::new(&mut this.io).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        ready!(self.as_mut().poll_flush(cx))?;
        Pin::new(&mut self.get_mut().io).poll_shutdown(cx)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    use super::*;

    #[tokio::test]
    async fn test_short_payload_stored_raw() {
        let (client, server) = tokio::io::duplex(4096);
        let mut writer = CompressedStream::new(client);
        let mut reader = CompressedStream::new(server);

        writer.write_all(b"hello").await.unwrap();
        writer.flush().await.unwrap();

        let mut out = [0u8; 5];
        reader.read_exact(&mut out).await.unwrap();
        assert_eq!(&out, b"hello");
    }

    #[tokio::test]
    async fn test_large_payload_roundtrip() {
        let (client, server) = tokio::io::duplex(1 << 20);
        let mut writer = CompressedStream::new(client);
        let mut reader = CompressedStream::new(server);

        let payload = b"SELECT * FROM t WHERE ".repeat(500);
        writer.write_all(&payload).await.unwrap();
        writer.flush().await.unwrap();

        let mut out = vec![0u8; payload.len()];
        reader.read_exact(&mut out).await.unwrap();
        assert_eq!(out, payload);
    }

    #[test]
    fn test_deflate_inflate_roundtrip() {
        let data = b"abcabcabcabcabcabcabcabc".repeat(10);
        let packed = deflate(&data).unwrap();
        assert!(packed.len() < data.len());
        assert_eq!(inflate(&packed, data.len()).unwrap(), data);
    }

    #[test]
    fn test_inflate_length_mismatch() {
        let packed = deflate(b"abc").unwrap();
        assert!(inflate(&packed, 99).is_err());
    }
}
