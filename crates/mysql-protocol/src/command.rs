//! Command packet (COM_*) encoders.
//!
//! Each encoder produces a single logical payload; framing (headers,
//! fragmentation, sequence numbers) is the codec layer's job.

use bytes::{BufMut, Bytes, BytesMut};

use crate::row::{binary_param_type, encode_binary_value};
use crate::value::Value;

/// MySQL command codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Command {
    /// Close the connection.
    Quit = 0x01,
    /// Switch the default database.
    InitDb = 0x02,
    /// Text-protocol query.
    Query = 0x03,
    /// Ping the server.
    Ping = 0x0E,
    /// Kill a connection or query by thread id.
    ProcessKill = 0x0C,
    /// Prepare a statement.
    StmtPrepare = 0x16,
    /// Execute a prepared statement.
    StmtExecute = 0x17,
    /// Close a prepared statement.
    StmtClose = 0x19,
    /// Reset a prepared statement.
    StmtReset = 0x1A,
}

/// Encode a COM_QUIT payload.
#[must_use]
pub fn quit() -> Bytes {
    Bytes::from_static(&[Command::Quit as u8])
}

/// Encode a COM_PING payload.
#[must_use]
pub fn ping() -> Bytes {
    Bytes::from_static(&[Command::Ping as u8])
}

/// Encode a COM_INIT_DB payload.
#[must_use]
pub fn init_db(database: &str) -> Bytes {
    let mut buf = BytesMut::with_capacity(1 + database.len());
    buf.put_u8(Command::InitDb as u8);
    buf.put_slice(database.as_bytes());
    buf.freeze()
}

/// Encode a COM_QUERY payload (text protocol).
#[must_use]
pub fn query(sql: &str) -> Bytes {
    let mut buf = BytesMut::with_capacity(1 + sql.len());
    buf.put_u8(Command::Query as u8);
    buf.put_slice(sql.as_bytes());
    buf.freeze()
}

/// Encode a COM_PROCESS_KILL payload targeting a server thread id.
#[must_use]
pub fn process_kill(thread_id: u32) -> Bytes {
    let mut buf = BytesMut::with_capacity(5);
    buf.put_u8(Command::ProcessKill as u8);
    buf.put_u32_le(thread_id);
    buf.freeze()
}

/// Encode a COM_STMT_PREPARE payload.
#[must_use]
pub fn stmt_prepare(sql: &str) -> Bytes {
    let mut buf = BytesMut::with_capacity(1 + sql.len());
    buf.put_u8(Command::StmtPrepare as u8);
    buf.put_slice(sql.as_bytes());
    buf.freeze()
}

/// Encode a COM_STMT_CLOSE payload.
#[must_use]
pub fn stmt_close(statement_id: u32) -> Bytes {
    let mut buf = BytesMut::with_capacity(5);
    buf.put_u8(Command::StmtClose as u8);
    buf.put_u32_le(statement_id);
    buf.freeze()
}

/// Encode a COM_STMT_EXECUTE payload.
///
/// Layout: command byte, statement id, cursor flags (none), iteration count
/// (always 1), then — when parameters exist — a NULL bitmap, the
/// new-params-bound flag, one type/flags pair per parameter, and the
/// non-NULL values in binary encoding.
#[must_use]
pub fn stmt_execute(statement_id: u32, params: &[Value]) -> Bytes {
    let mut buf = BytesMut::with_capacity(16 + params.len() * 16);
    buf.put_u8(Command::StmtExecute as u8);
    buf.put_u32_le(statement_id);
    buf.put_u8(0x00); // CURSOR_TYPE_NO_CURSOR
    buf.put_u32_le(1);

    if !params.is_empty() {
        let mut null_bitmap = vec![0u8; params.len().div_ceil(8)];
        for (i, param) in params.iter().enumerate() {
            if param.is_null() {
                null_bitmap[i / 8] |= 1 << (i % 8);
            }
        }
        buf.put_slice(&null_bitmap);

        buf.put_u8(1); // new params bound
        for param in params {
            let (column_type, flags) = binary_param_type(param);
            buf.put_u8(column_type as u8);
            buf.put_u8(flags);
        }
        for param in params {
            encode_binary_value(param, &mut buf);
        }
    }

    buf.freeze()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_query_payload() {
        let payload = query("SELECT 1");
        assert_eq!(payload[0], 0x03);
        assert_eq!(&payload[1..], b"SELECT 1");
    }

    #[test]
    fn test_process_kill_payload() {
        let payload = process_kill(0x0102_0304);
        assert_eq!(&payload[..], &[0x0C, 0x04, 0x03, 0x02, 0x01]);
    }

    #[test]
    fn test_stmt_execute_no_params() {
        let payload = stmt_execute(5, &[]);
        assert_eq!(payload[0], 0x17);
        assert_eq!(&payload[1..5], &[5, 0, 0, 0]);
        assert_eq!(payload[5], 0x00);
        assert_eq!(&payload[6..10], &[1, 0, 0, 0]);
        assert_eq!(payload.len(), 10);
    }

    #[test]
    fn test_stmt_execute_null_bitmap() {
        let params = vec![Value::Null, Value::Int(9), Value::Null];
        let payload = stmt_execute(1, &params);
        // Bitmap byte follows the 10-byte fixed prefix: params 0 and 2 NULL.
        assert_eq!(payload[10], 0b0000_0101);
        assert_eq!(payload[11], 1); // new params bound
        // Three type/flags pairs, then one 8-byte value.
        let value_offset = 12 + 3 * 2;
        assert_eq!(payload.len(), value_offset + 8);
        assert_eq!(&payload[value_offset..], &9i64.to_le_bytes());
    }
}
