//! Capability and server status flags.

use bitflags::bitflags;

bitflags! {
    /// Client/server capability flags exchanged during the handshake.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct CapabilityFlags: u32 {
        /// Old password plugin support.
        const LONG_PASSWORD = 1;
        /// Return found rows instead of affected rows.
        const FOUND_ROWS = 1 << 1;
        /// Longer column flags.
        const LONG_FLAG = 1 << 2;
        /// Database name may be supplied on connect.
        const CONNECT_WITH_DB = 1 << 3;
        /// Do not allow `database.table.column` syntax.
        const NO_SCHEMA = 1 << 4;
        /// Compressed packet framing.
        const COMPRESS = 1 << 5;
        /// ODBC behavior.
        const ODBC = 1 << 6;
        /// LOAD DATA LOCAL INFILE support.
        const LOCAL_FILES = 1 << 7;
        /// Ignore spaces before `(`.
        const IGNORE_SPACE = 1 << 8;
        /// 4.1 protocol.
        const PROTOCOL_41 = 1 << 9;
        /// Interactive client (uses `interactive_timeout`).
        const INTERACTIVE = 1 << 10;
        /// TLS upgrade after an SSLRequest packet.
        const SSL = 1 << 11;
        /// Transaction status reporting.
        const TRANSACTIONS = 1 << 13;
        /// 4.1 authentication.
        const SECURE_CONNECTION = 1 << 15;
        /// Multiple statements per COM_QUERY.
        const MULTI_STATEMENTS = 1 << 16;
        /// Multiple result sets per command.
        const MULTI_RESULTS = 1 << 17;
        /// Multiple result sets from prepared statements.
        const PS_MULTI_RESULTS = 1 << 18;
        /// Pluggable authentication.
        const PLUGIN_AUTH = 1 << 19;
        /// Connection attributes in the handshake response.
        const CONNECT_ATTRS = 1 << 20;
        /// Length-encoded auth response data.
        const PLUGIN_AUTH_LENENC_CLIENT_DATA = 1 << 21;
        /// Session state change tracking.
        const SESSION_TRACK = 1 << 23;
        /// OK packets in place of EOF packets.
        const DEPRECATE_EOF = 1 << 24;
    }
}

impl CapabilityFlags {
    /// Capabilities this driver always requests.
    #[must_use]
    pub fn client_default() -> Self {
        Self::PROTOCOL_41
            | Self::LONG_PASSWORD
            | Self::LONG_FLAG
            | Self::SECURE_CONNECTION
            | Self::TRANSACTIONS
            | Self::MULTI_RESULTS
            | Self::PS_MULTI_RESULTS
            | Self::PLUGIN_AUTH
            | Self::LOCAL_FILES
    }
}

bitflags! {
    /// Server status flags carried in OK and EOF packets.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct StatusFlags: u16 {
        /// A transaction is open.
        const IN_TRANS = 0x0001;
        /// Autocommit is enabled.
        const AUTOCOMMIT = 0x0002;
        /// More result sets follow the current one.
        const MORE_RESULTS_EXISTS = 0x0008;
        /// No good index was available for the last query.
        const NO_GOOD_INDEX_USED = 0x0010;
        /// No index was used for the last query.
        const NO_INDEX_USED = 0x0020;
        /// A read-only cursor is open.
        const CURSOR_EXISTS = 0x0040;
        /// The last row of the open cursor was sent.
        const LAST_ROW_SENT = 0x0080;
        /// The current database was dropped.
        const DB_DROPPED = 0x0100;
        /// Backslash is not an escape character.
        const NO_BACKSLASH_ESCAPES = 0x0200;
        /// Result metadata changed since the statement was prepared.
        const METADATA_CHANGED = 0x0400;
        /// The query was flagged slow.
        const QUERY_WAS_SLOW = 0x0800;
        /// This result set carries stored-procedure OUT parameters.
        const PS_OUT_PARAMS = 0x1000;
        /// A read-only transaction is open.
        const IN_TRANS_READONLY = 0x2000;
        /// Session state information follows.
        const SESSION_STATE_CHANGED = 0x4000;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_default_is_41() {
        let caps = CapabilityFlags::client_default();
        assert!(caps.contains(CapabilityFlags::PROTOCOL_41));
        assert!(caps.contains(CapabilityFlags::SECURE_CONNECTION));
        assert!(!caps.contains(CapabilityFlags::COMPRESS));
    }

    #[test]
    fn test_more_results_bit() {
        let status = StatusFlags::from_bits_truncate(0x0008 | 0x0002);
        assert!(status.contains(StatusFlags::MORE_RESULTS_EXISTS));
        assert!(status.contains(StatusFlags::AUTOCOMMIT));
    }
}
