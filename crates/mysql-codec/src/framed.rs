//! Framed payload stream for async I/O.
//!
//! `PacketStream<T>` combines the wire codec with payload reassembly: the
//! `Sink` side accepts complete logical payloads and fragments them, and the
//! `Stream` side yields complete logical payloads with fragments already
//! joined.

use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures_core::Stream;
use futures_util::Sink;
use pin_project_lite::pin_project;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::Framed;

use crate::error::CodecError;
use crate::packet_codec::{MySqlCodec, PayloadAssembler};

pin_project! {
    /// A framed payload stream over an async I/O transport.
    pub struct PacketStream<T> {
        #[pin]
        inner: Framed<T, MySqlCodec>,
        assembler: PayloadAssembler,
    }
}

impl<T> PacketStream<T>
where
    T: AsyncRead + AsyncWrite,
{
    /// Create a new payload stream over the given transport.
    pub fn new(transport: T) -> Self {
        Self::with_codec(transport, MySqlCodec::new())
    }

    /// Create a new payload stream with a custom codec.
    pub fn with_codec(transport: T, codec: MySqlCodec) -> Self {
        let assembler =
            PayloadAssembler::new().with_max_payload_size(codec.max_payload_size());
        Self {
            inner: Framed::new(transport, codec),
            assembler,
        }
    }

    /// Get a reference to the underlying transport.
    pub fn get_ref(&self) -> &T {
        self.inner.get_ref()
    }

    /// Get a mutable reference to the underlying transport.
    pub fn get_mut(&mut self) -> &mut T {
        self.inner.get_mut()
    }

    /// Get a reference to the codec.
    pub fn codec(&self) -> &MySqlCodec {
        self.inner.codec()
    }

    /// Get a mutable reference to the codec.
    pub fn codec_mut(&mut self) -> &mut MySqlCodec {
        self.inner.codec_mut()
    }

    /// Reset the sequence counter for a new command round trip.
    pub fn reset_sequence(&mut self) {
        self.inner.codec_mut().reset_sequence();
    }

    /// Consume the stream and return the underlying transport.
    pub fn into_inner(self) -> T {
        self.inner.into_inner()
    }

    /// Consume the stream and return the transport together with any bytes
    /// already read past the last frame (needed for the TLS upgrade).
    pub fn into_parts(self) -> (T, bytes::BytesMut) {
        let parts = self.inner.into_parts();
        (parts.io, parts.read_buf)
    }
}

impl<T> Stream for PacketStream<T>
where
    T: AsyncRead + Unpin,
{
    type Item = Result<Bytes, CodecError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();
        loop {
            match this.inner.as_mut().poll_next(cx) {
                Poll::Ready(Some(Ok(packet))) => match this.assembler.push(packet) {
                    Ok(Some(payload)) => return Poll::Ready(Some(Ok(payload))),
                    Ok(None) => {}
                    Err(err) => return Poll::Ready(Some(Err(err))),
                },
                Poll::Ready(Some(Err(err))) => return Poll::Ready(Some(Err(err))),
                Poll::Ready(None) => return Poll::Ready(None),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

impl<T> Sink<Bytes> for PacketStream<T>
where
    T: AsyncWrite + Unpin,
{
    type Error = CodecError;

    fn poll_ready(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.project().inner.poll_ready(cx)
    }

    fn start_send(self: Pin<&mut Self>, item: Bytes) -> Result<(), Self::Error> {
        self.project().inner.start_send(item)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.project().inner.poll_flush(cx)
    }

    fn poll_close(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.project().inner.poll_close(cx)
    }
}

impl<T> std::fmt::Debug for PacketStream<T>
where
    T: std::fmt::Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PacketStream")
            .field("transport", self.inner.get_ref())
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use futures_util::{SinkExt, StreamExt};

    use super::*;

    #[tokio::test]
    async fn test_send_and_receive_payload() {
        let (client, server) = tokio::io::duplex(4096);
        let mut client = PacketStream::new(client);
        let mut server = PacketStream::new(server);

        client.send(Bytes::from_static(b"\x0e")).await.unwrap();
        let received = server.next().await.unwrap().unwrap();
        assert_eq!(&received[..], b"\x0e");
    }

    #[tokio::test]
    async fn test_fragmented_payload_is_reassembled() {
        let (client, server) = tokio::io::duplex(4096);
        let codec = MySqlCodec::new().with_max_payload_size(16);
        let mut client = PacketStream::with_codec(client, codec);
        let codec = MySqlCodec::new().with_max_payload_size(16);
        let mut server = PacketStream::with_codec(server, codec);

        let payload = Bytes::from(vec![0x42u8; 100]);
        client.send(payload.clone()).await.unwrap();
        let received = server.next().await.unwrap().unwrap();
        assert_eq!(received, payload);
    }
}
