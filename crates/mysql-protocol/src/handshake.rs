//! Handshake and authentication payloads.
//!
//! Implements the v10 initial handshake, the HandshakeResponse41 reply, the
//! SSLRequest prefix used for the TLS upgrade, and the
//! `mysql_native_password` scramble:
//!
//! ```text
//! SHA1(password) XOR SHA1(seed + SHA1(SHA1(password)))
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};
use sha1::{Digest, Sha1};

use crate::error::ProtocolError;
use crate::flags::{CapabilityFlags, StatusFlags};
use crate::wire::{WireReadExt, WireWriteExt};

/// The only authentication plugin this driver implements natively.
pub const NATIVE_PASSWORD_PLUGIN: &str = "mysql_native_password";

/// First byte of an auth-switch request during authentication.
pub const AUTH_SWITCH_HEADER: u8 = 0xFE;

/// Decoded v10 initial handshake from the server.
#[derive(Debug, Clone)]
pub struct InitialHandshake {
    /// Human-readable server version string.
    pub server_version: String,
    /// Server-assigned connection thread id (KILL target).
    pub thread_id: u32,
    /// Full authentication seed (both scramble parts, NUL stripped).
    pub auth_seed: Vec<u8>,
    /// Server capability flags.
    pub capabilities: CapabilityFlags,
    /// Server default charset id.
    pub charset: u8,
    /// Server status flags.
    pub status: StatusFlags,
    /// Authentication plugin the server wants to start with.
    pub auth_plugin: String,
}

impl InitialHandshake {
    /// Decode the initial handshake payload.
    pub fn decode(mut src: impl Buf) -> Result<Self, ProtocolError> {
        if src.remaining() < 1 {
            return Err(ProtocolError::IncompletePacket {
                expected: 1,
                actual: 0,
            });
        }
        let protocol_version = src.get_u8();
        if protocol_version != 10 {
            return Err(ProtocolError::UnsupportedHandshakeVersion(protocol_version));
        }

        let server_version =
            String::from_utf8_lossy(&src.get_null_terminated()?).into_owned();
        if src.remaining() < 4 + 8 + 1 + 2 {
            return Err(ProtocolError::MalformedPacket("handshake truncated".into()));
        }
        let thread_id = src.get_u32_le();

        let mut auth_seed = src.get_exact(8)?.to_vec();
        src.advance(1); // filler

        let cap_low = u32::from(src.get_u16_le());
        let mut charset = 0;
        let mut status = StatusFlags::empty();
        let mut capabilities = CapabilityFlags::from_bits_truncate(cap_low);
        let mut auth_plugin = NATIVE_PASSWORD_PLUGIN.to_string();

        if src.remaining() >= 1 + 2 + 2 + 1 + 10 {
            charset = src.get_u8();
            status = StatusFlags::from_bits_truncate(src.get_u16_le());
            let cap_high = u32::from(src.get_u16_le()) << 16;
            capabilities = CapabilityFlags::from_bits_truncate(cap_low | cap_high);
            let seed_len = src.get_u8() as usize;
            src.advance(10); // reserved

            if capabilities.contains(CapabilityFlags::SECURE_CONNECTION) {
                let part2_len = seed_len.saturating_sub(8).max(13);
                let part2 = src.get_exact(part2_len.min(src.remaining()))?;
                auth_seed.extend_from_slice(&part2);
                // The second scramble part is NUL terminated on the wire.
                if auth_seed.last() == Some(&0) {
                    auth_seed.pop();
                }
            }
            if capabilities.contains(CapabilityFlags::PLUGIN_AUTH) && src.has_remaining() {
                let name = src.get_null_terminated().unwrap_or_else(|_| {
                    // Some servers omit the trailing NUL on the last field.
                    Bytes::new()
                });
                if !name.is_empty() {
                    auth_plugin = String::from_utf8_lossy(&name).into_owned();
                }
            }
        }

        Ok(Self {
            server_version,
            thread_id,
            auth_seed,
            capabilities,
            charset,
            status,
            auth_plugin,
        })
    }
}

/// Client handshake response (HandshakeResponse41).
#[derive(Debug, Clone)]
pub struct HandshakeResponse {
    /// Negotiated client capability flags.
    pub capabilities: CapabilityFlags,
    /// Client `max_allowed_packet` advertisement.
    pub max_packet_size: u32,
    /// Requested charset id.
    pub charset: u8,
    /// Username.
    pub username: String,
    /// Scrambled authentication response bytes.
    pub auth_response: Vec<u8>,
    /// Initial database, when `CONNECT_WITH_DB` is set.
    pub database: Option<String>,
    /// Authentication plugin name.
    pub auth_plugin: String,
}

impl HandshakeResponse {
    /// Encode the full handshake response payload.
    #[must_use]
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(128);
        self.encode_prefix(&mut buf);
        buf.put_null_terminated(self.username.as_bytes());

        if self
            .capabilities
            .contains(CapabilityFlags::PLUGIN_AUTH_LENENC_CLIENT_DATA)
        {
            buf.put_lenenc_bytes(&self.auth_response);
        } else {
            buf.put_u8(self.auth_response.len() as u8);
            buf.put_slice(&self.auth_response);
        }

        if let Some(database) = &self.database {
            if self.capabilities.contains(CapabilityFlags::CONNECT_WITH_DB) {
                buf.put_null_terminated(database.as_bytes());
            }
        }
        if self.capabilities.contains(CapabilityFlags::PLUGIN_AUTH) {
            buf.put_null_terminated(self.auth_plugin.as_bytes());
        }
        buf.freeze()
    }

    /// Encode the 32-byte SSLRequest prefix sent before a TLS upgrade.
    #[must_use]
    pub fn encode_ssl_request(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(32);
        self.encode_prefix(&mut buf);
        buf.freeze()
    }

    fn encode_prefix(&self, buf: &mut BytesMut) {
        buf.put_u32_le(self.capabilities.bits());
        buf.put_u32_le(self.max_packet_size);
        buf.put_u8(self.charset);
        buf.put_bytes(0, 23);
    }
}

/// Server request to switch authentication plugins mid-handshake.
#[derive(Debug, Clone)]
pub struct AuthSwitchRequest {
    /// Plugin the server wants to switch to.
    pub plugin: String,
    /// Fresh plugin seed data.
    pub seed: Vec<u8>,
}

impl AuthSwitchRequest {
    /// Decode an auth-switch request payload (leading 0xFE already verified).
    pub fn decode(mut src: impl Buf) -> Result<Self, ProtocolError> {
        if src.remaining() < 1 || src.get_u8() != AUTH_SWITCH_HEADER {
            return Err(ProtocolError::MalformedPacket(
                "not an auth switch request".into(),
            ));
        }
        let plugin = String::from_utf8_lossy(&src.get_null_terminated()?).into_owned();
        let mut seed = src.copy_to_bytes(src.remaining()).to_vec();
        if seed.last() == Some(&0) {
            seed.pop();
        }
        Ok(Self { plugin, seed })
    }
}

/// Compute the `mysql_native_password` scramble for a password and seed.
///
/// Empty passwords produce an empty response, per the protocol.
#[must_use]
pub fn scramble_native_password(password: &str, seed: &[u8]) -> Vec<u8> {
    if password.is_empty() {
        return Vec::new();
    }
    let seed = if seed.len() > 20 { &seed[..20] } else { seed };

    let stage1: [u8; 20] = Sha1::digest(password.as_bytes()).into();
    let stage2: [u8; 20] = Sha1::digest(stage1).into();

    let mut hasher = Sha1::new();
    hasher.update(seed);
    hasher.update(stage2);
    let stage3: [u8; 20] = hasher.finalize().into();

    stage1
        .iter()
        .zip(stage3.iter())
        .map(|(a, b)| a ^ b)
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn sample_handshake() -> BytesMut {
        let mut buf = BytesMut::new();
        buf.put_u8(10);
        buf.put_null_terminated(b"8.0.36");
        buf.put_u32_le(1234);
        buf.put_slice(b"abcdefgh"); // seed part 1
        buf.put_u8(0);
        let caps = CapabilityFlags::client_default()
            | CapabilityFlags::SECURE_CONNECTION
            | CapabilityFlags::SSL;
        buf.put_u16_le((caps.bits() & 0xFFFF) as u16);
        buf.put_u8(45);
        buf.put_u16_le(StatusFlags::AUTOCOMMIT.bits());
        buf.put_u16_le((caps.bits() >> 16) as u16);
        buf.put_u8(21);
        buf.put_bytes(0, 10);
        buf.put_slice(b"ijklmnopqrst\0"); // seed part 2, NUL terminated
        buf.put_null_terminated(NATIVE_PASSWORD_PLUGIN.as_bytes());
        buf
    }

    #[test]
    fn test_decode_initial_handshake() {
        let handshake = InitialHandshake::decode(sample_handshake().freeze()).unwrap();
        assert_eq!(handshake.server_version, "8.0.36");
        assert_eq!(handshake.thread_id, 1234);
        assert_eq!(handshake.auth_seed, b"abcdefghijklmnopqrst");
        assert_eq!(handshake.auth_plugin, NATIVE_PASSWORD_PLUGIN);
        assert!(handshake.capabilities.contains(CapabilityFlags::SSL));
        assert!(handshake.status.contains(StatusFlags::AUTOCOMMIT));
        assert_eq!(handshake.charset, 45);
    }

    #[test]
    fn test_wrong_protocol_version() {
        let mut buf = BytesMut::new();
        buf.put_u8(9);
        assert!(matches!(
            InitialHandshake::decode(buf.freeze()),
            Err(ProtocolError::UnsupportedHandshakeVersion(9))
        ));
    }

    #[test]
    fn test_scramble_shape() {
        let response = scramble_native_password("secret", b"abcdefghijklmnopqrst");
        assert_eq!(response.len(), 20);
        // Scramble must depend on the seed.
        let other = scramble_native_password("secret", b"ABCDEFGHIJKLMNOPQRST");
        assert_ne!(response, other);
    }

    #[test]
    fn test_scramble_empty_password() {
        assert!(scramble_native_password("", b"abcdefghijklmnopqrst").is_empty());
    }

    #[test]
    fn test_handshake_response_roundtrip_fields() {
        let response = HandshakeResponse {
            capabilities: CapabilityFlags::client_default() | CapabilityFlags::CONNECT_WITH_DB,
            max_packet_size: 0x0100_0000,
            charset: 45,
            username: "app".into(),
            auth_response: vec![1, 2, 3],
            database: Some("orders".into()),
            auth_plugin: NATIVE_PASSWORD_PLUGIN.into(),
        };
        let bytes = response.encode();
        // Fixed prefix: 4 + 4 + 1 + 23 bytes.
        assert!(bytes.len() > 32);
        assert_eq!(&bytes[32..36], b"app\0");
        // SSLRequest is exactly the fixed prefix.
        assert_eq!(response.encode_ssl_request().len(), 32);
    }

    #[test]
    fn test_auth_switch_decode() {
        let mut buf = BytesMut::new();
        buf.put_u8(AUTH_SWITCH_HEADER);
        buf.put_null_terminated(b"caching_sha2_password");
        buf.put_slice(b"newseednewseed\0");
        let req = AuthSwitchRequest::decode(buf.freeze()).unwrap();
        assert_eq!(req.plugin, "caching_sha2_password");
        assert_eq!(req.seed, b"newseednewseed");
    }
}
