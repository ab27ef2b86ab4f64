//! Generic response packets: OK, ERR, EOF and the LOCAL INFILE request.

use bytes::Buf;

use crate::error::ProtocolError;
use crate::flags::StatusFlags;
use crate::wire::WireReadExt;

/// Server error code for a query killed by `KILL QUERY`.
pub const ER_QUERY_INTERRUPTED: u16 = 1317;

/// Server error code for an oversized packet.
pub const ER_NET_PACKET_TOO_LARGE: u16 = 1153;

/// Decoded OK packet.
#[derive(Debug, Clone)]
pub struct OkPacket {
    /// Rows affected by the command.
    pub affected_rows: u64,
    /// Last AUTO_INCREMENT id generated.
    pub last_insert_id: u64,
    /// Server status flags.
    pub status: StatusFlags,
    /// Warning count.
    pub warnings: u16,
    /// Human-readable info string.
    pub info: String,
}

impl OkPacket {
    /// Decode an OK payload (leading 0x00 or 0xFE byte included).
    pub fn decode(mut src: impl Buf) -> Result<Self, ProtocolError> {
        if src.remaining() < 1 {
            return Err(ProtocolError::IncompletePacket {
                expected: 1,
                actual: 0,
            });
        }
        src.advance(1); // header byte
        let affected_rows = src.get_lenenc_int()?.unwrap_or(0);
        let last_insert_id = src.get_lenenc_int()?.unwrap_or(0);
        let (status, warnings) = if src.remaining() >= 4 {
            (
                StatusFlags::from_bits_truncate(src.get_u16_le()),
                src.get_u16_le(),
            )
        } else {
            (StatusFlags::empty(), 0)
        };
        let info = if src.has_remaining() {
            String::from_utf8_lossy(&src.copy_to_bytes(src.remaining())).into_owned()
        } else {
            String::new()
        };
        Ok(Self {
            affected_rows,
            last_insert_id,
            status,
            warnings,
            info,
        })
    }

    /// Whether another result set follows this one.
    #[must_use]
    pub fn more_results(&self) -> bool {
        self.status.contains(StatusFlags::MORE_RESULTS_EXISTS)
    }
}

/// Decoded ERR packet: the server's structured error report.
#[derive(Debug, Clone)]
pub struct ErrPacket {
    /// Server error code (ER_*).
    pub code: u16,
    /// Five-character SQLSTATE.
    pub sql_state: String,
    /// Error message text.
    pub message: String,
}

impl ErrPacket {
    /// Decode an ERR payload (leading 0xFF byte included).
    pub fn decode(mut src: impl Buf) -> Result<Self, ProtocolError> {
        if src.remaining() < 3 {
            return Err(ProtocolError::IncompletePacket {
                expected: 3,
                actual: src.remaining(),
            });
        }
        src.advance(1); // 0xFF
        let code = src.get_u16_le();
        let mut sql_state = String::from("HY000");
        // Protocol 4.1 marker '#' precedes a five-byte SQLSTATE.
        if src.chunk().first() == Some(&b'#') {
            src.advance(1);
            let state = src.get_exact(5)?;
            sql_state = String::from_utf8_lossy(&state).into_owned();
        }
        let message =
            String::from_utf8_lossy(&src.copy_to_bytes(src.remaining())).into_owned();
        Ok(Self {
            code,
            sql_state,
            message,
        })
    }

    /// Whether this error reports a killed query.
    #[must_use]
    pub fn is_query_interrupted(&self) -> bool {
        self.code == ER_QUERY_INTERRUPTED
    }
}

/// Decoded EOF packet (pre-DEPRECATE_EOF result-set terminator).
#[derive(Debug, Clone, Copy)]
pub struct EofPacket {
    /// Warning count.
    pub warnings: u16,
    /// Server status flags.
    pub status: StatusFlags,
}

impl EofPacket {
    /// Decode an EOF payload (leading 0xFE byte included).
    pub fn decode(mut src: impl Buf) -> Result<Self, ProtocolError> {
        if src.remaining() < 1 {
            return Err(ProtocolError::IncompletePacket {
                expected: 1,
                actual: 0,
            });
        }
        src.advance(1);
        let (warnings, status) = if src.remaining() >= 4 {
            (
                src.get_u16_le(),
                StatusFlags::from_bits_truncate(src.get_u16_le()),
            )
        } else {
            (0, StatusFlags::empty())
        };
        Ok(Self { warnings, status })
    }

    /// Whether another result set follows this one.
    #[must_use]
    pub fn more_results(&self) -> bool {
        self.status.contains(StatusFlags::MORE_RESULTS_EXISTS)
    }
}

/// Server request for a LOCAL INFILE upload (0xFB + file name).
#[derive(Debug, Clone)]
pub struct LocalInfileRequest {
    /// Path of the file the server wants streamed.
    pub filename: String,
}

impl LocalInfileRequest {
    /// Decode a LOCAL INFILE request payload.
    pub fn decode(mut src: impl Buf) -> Result<Self, ProtocolError> {
        if src.remaining() < 1 {
            return Err(ProtocolError::IncompletePacket {
                expected: 1,
                actual: 0,
            });
        }
        src.advance(1); // 0xFB
        let filename =
            String::from_utf8_lossy(&src.copy_to_bytes(src.remaining())).into_owned();
        Ok(Self { filename })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use bytes::{BufMut, BytesMut};

    use super::*;
    use crate::wire::WireWriteExt;

    #[test]
    fn test_decode_ok() {
        let mut buf = BytesMut::new();
        buf.put_u8(0x00);
        buf.put_lenenc_int(3); // affected rows
        buf.put_lenenc_int(42); // last insert id
        buf.put_u16_le(StatusFlags::AUTOCOMMIT.bits() | StatusFlags::MORE_RESULTS_EXISTS.bits());
        buf.put_u16_le(1); // warnings
        buf.put_slice(b"Rows matched: 3");

        let ok = OkPacket::decode(buf.freeze()).unwrap();
        assert_eq!(ok.affected_rows, 3);
        assert_eq!(ok.last_insert_id, 42);
        assert_eq!(ok.warnings, 1);
        assert!(ok.more_results());
        assert_eq!(ok.info, "Rows matched: 3");
    }

    #[test]
    fn test_decode_ok_zero_affected_is_zero() {
        let mut buf = BytesMut::new();
        buf.put_u8(0x00);
        buf.put_lenenc_int(0);
        buf.put_lenenc_int(0);
        buf.put_u16_le(0);
        buf.put_u16_le(0);
        let ok = OkPacket::decode(buf.freeze()).unwrap();
        assert_eq!(ok.affected_rows, 0);
    }

    #[test]
    fn test_decode_err_with_sqlstate() {
        let mut buf = BytesMut::new();
        buf.put_u8(0xFF);
        buf.put_u16_le(1064);
        buf.put_slice(b"#42000");
        buf.put_slice(b"You have an error in your SQL syntax");

        let err = ErrPacket::decode(buf.freeze()).unwrap();
        assert_eq!(err.code, 1064);
        assert_eq!(err.sql_state, "42000");
        assert!(err.message.starts_with("You have an error"));
        assert!(!err.is_query_interrupted());
    }

    #[test]
    fn test_query_interrupted_code() {
        let mut buf = BytesMut::new();
        buf.put_u8(0xFF);
        buf.put_u16_le(ER_QUERY_INTERRUPTED);
        buf.put_slice(b"#70100");
        buf.put_slice(b"Query execution was interrupted");
        assert!(ErrPacket::decode(buf.freeze()).unwrap().is_query_interrupted());
    }

    #[test]
    fn test_decode_eof_more_results() {
        let mut buf = BytesMut::new();
        buf.put_u8(0xFE);
        buf.put_u16_le(0);
        buf.put_u16_le(StatusFlags::MORE_RESULTS_EXISTS.bits());
        let eof = EofPacket::decode(buf.freeze()).unwrap();
        assert!(eof.more_results());
    }

    #[test]
    fn test_decode_local_infile() {
        let mut buf = BytesMut::new();
        buf.put_u8(0xFB);
        buf.put_slice(b"/tmp/data.csv");
        let req = LocalInfileRequest::decode(buf.freeze()).unwrap();
        assert_eq!(req.filename, "/tmp/data.csv");
    }
}
