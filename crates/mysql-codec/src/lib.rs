//! # mysql-codec
//!
//! Async framing layer for MySQL packet handling.
//!
//! This crate transforms raw byte streams into logical protocol payloads,
//! handling frame reassembly across TCP segment boundaries, fragmentation of
//! oversized payloads, sequence-id bookkeeping, and the optional compressed
//! protocol.
//!
//! ## Architecture
//!
//! The codec layer sits between the raw transport and the higher-level
//! client:
//!
//! ```text
//! TCP stream → [CompressedStream] → MySqlCodec → PayloadAssembler → client
//! ```
//!
//! [`PacketStream`] bundles the codec and assembler behind a `Stream`/`Sink`
//! pair whose items are complete logical payloads, so callers never see
//! individual wire fragments.

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod compress;
pub mod error;
pub mod framed;
pub mod packet_codec;

pub use compress::{CompressedStream, COMPRESSED_HEADER_SIZE, MIN_COMPRESS_LENGTH};
pub use error::CodecError;
pub use framed::PacketStream;
pub use packet_codec::{MySqlCodec, Packet, PayloadAssembler};
