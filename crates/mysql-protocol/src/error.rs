//! Protocol error types.

use thiserror::Error;

/// Errors that can occur while encoding or decoding wire-format data.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Not enough bytes available to decode a complete structure.
    #[error("incomplete packet: expected {expected} bytes, got {actual}")]
    IncompletePacket {
        /// Number of bytes required.
        expected: usize,
        /// Number of bytes available.
        actual: usize,
    },

    /// A length-encoded integer had an invalid leading byte.
    #[error("invalid length-encoded integer prefix 0x{0:02X}")]
    InvalidLengthEncoding(u8),

    /// The server spoke an unsupported handshake protocol version.
    #[error("unsupported handshake protocol version {0} (expected 10)")]
    UnsupportedHandshakeVersion(u8),

    /// The server requested an authentication plugin this driver cannot satisfy.
    #[error("unsupported authentication plugin: {0}")]
    UnsupportedAuthPlugin(String),

    /// A column definition carried an unknown type byte.
    #[error("unknown column type 0x{0:02X}")]
    UnknownColumnType(u8),

    /// A row payload did not match its column metadata.
    #[error("malformed row: {0}")]
    MalformedRow(String),

    /// A packet payload was structurally invalid.
    #[error("malformed packet: {0}")]
    MalformedPacket(String),

    /// A value could not be parsed in its declared type.
    #[error("cannot decode {value:?} as {column_type}")]
    ValueDecode {
        /// Raw text of the offending value.
        value: String,
        /// Declared type name.
        column_type: &'static str,
    },
}

/// Result type for protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;
