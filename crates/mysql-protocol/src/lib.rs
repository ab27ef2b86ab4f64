//! # mysql-protocol
//!
//! Pure implementation of the MySQL client/server wire protocol.
//!
//! This crate contains packet structures, length-encoded primitives, the
//! handshake and authentication exchange, command encoders, row decoders for
//! both the text and binary protocols, and the SQL tokenizer used for
//! statement splitting and parameter discovery.
//!
//! ## Design Philosophy
//!
//! This crate is intentionally IO-agnostic. It contains no networking logic
//! and makes no assumptions about the async runtime. Higher-level crates
//! build upon this foundation to provide async I/O capabilities.
//!
//! ## Example
//!
//! ```rust
//! use mysql_protocol::{PacketHeader, PacketType};
//!
//! let header = PacketHeader {
//!     payload_length: 5,
//!     sequence_id: 0,
//! };
//! assert!(!header.is_continued());
//! assert_eq!(PacketType::classify(&[0x00, 0, 0, 0, 0]), PacketType::Ok);
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod column;
pub mod command;
pub mod error;
pub mod flags;
pub mod handshake;
pub mod packet;
pub mod quoting;
pub mod response;
pub mod row;
pub mod tokenizer;
pub mod value;
pub mod wire;

pub use column::{ColumnDefinition, ColumnFlags, ColumnType, BINARY_CHARSET};
pub use command::Command;
pub use error::ProtocolError;
pub use flags::{CapabilityFlags, StatusFlags};
pub use handshake::{
    scramble_native_password, AuthSwitchRequest, HandshakeResponse, InitialHandshake,
    AUTH_SWITCH_HEADER, NATIVE_PASSWORD_PLUGIN,
};
pub use packet::{
    PacketHeader, PacketType, DEFAULT_MAX_ALLOWED_PACKET, MAX_PAYLOAD_SIZE, PACKET_HEADER_SIZE,
};
pub use quoting::{escape_string_literal, quote_identifier, unquote_identifier};
pub use response::{
    EofPacket, ErrPacket, LocalInfileRequest, OkPacket, ER_NET_PACKET_TOO_LARGE,
    ER_QUERY_INTERRUPTED,
};
pub use row::{decode_binary_row, decode_text_row};
pub use tokenizer::{SqlTokenizer, TokenKind, TokenSpan};
pub use value::Value;
pub use wire::{WireReadExt, WireWriteExt};
