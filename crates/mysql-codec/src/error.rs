//! Codec error types.

use mysql_protocol::ProtocolError;
use thiserror::Error;

/// Errors produced by the framing layer.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Underlying I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Protocol-level decode failure inside a frame.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// A logical payload exceeded the configured `max_allowed_packet`.
    #[error("packet of {size} bytes exceeds max_allowed_packet ({max})")]
    PacketTooLarge {
        /// Size of the offending payload.
        size: usize,
        /// Configured limit.
        max: usize,
    },

    /// A frame arrived with an unexpected sequence id.
    #[error("packet out of sequence: got {actual}, expected {expected}")]
    OutOfSequence {
        /// Sequence id expected next.
        expected: u8,
        /// Sequence id received.
        actual: u8,
    },

    /// A compressed frame failed to inflate or deflate.
    #[error("compression error: {0}")]
    Compression(String),
}

impl CodecError {
    /// Whether the error leaves the connection unusable.
    ///
    /// Everything except an oversized outbound payload desynchronizes the
    /// stream.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::PacketTooLarge { .. })
    }
}
