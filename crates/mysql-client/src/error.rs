//! Client error types.

use thiserror::Error;

/// Machine-checkable classification of a client error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorKind {
    /// Connection establishment failed.
    Connection,
    /// Authentication was rejected or could not complete.
    Authentication,
    /// The operation requires an open connection.
    MustBeOpen,
    /// The connection is broken and cannot be used again.
    Broken,
    /// The server reported an error.
    Server,
    /// A command exceeded its timeout.
    CommandTimeout,
    /// The server killed the running query.
    QueryInterrupted,
    /// A payload exceeded `max_allowed_packet`.
    PacketTooLarge,
    /// A connection-string key is not recognized.
    KeywordNotSupported,
    /// The connection string could not be parsed.
    InvalidConnectionString,
    /// A transaction was begun while one is already active.
    NestedTransaction,
    /// The server requested an authentication plugin this driver lacks.
    UnsupportedAuthPlugin,
    /// A statement references a parameter that was never supplied.
    UndefinedParameter,
    /// Wire-format violation.
    Protocol,
    /// Underlying I/O failure.
    Io,
    /// The pool could not supply a connection in time.
    PoolTimeout,
}

/// Errors that can occur during client operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Connection failed.
    #[error("connection failed: {0}")]
    Connection(String),

    /// Authentication failed.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// Operation attempted on a connection that is not open.
    #[error("connection must be open for this operation (state: {state})")]
    MustBeOpen {
        /// State the connection was actually in.
        state: &'static str,
    },

    /// Connection is broken; only close is allowed.
    #[error("connection is broken: {0}")]
    Broken(String),

    /// Server returned an error packet.
    #[error("server error {code} ({sql_state}): {message}")]
    Server {
        /// MySQL error code (ER_*).
        code: u16,
        /// Five-character SQLSTATE.
        sql_state: String,
        /// Error message text.
        message: String,
    },

    /// Command execution timeout occurred.
    #[error("command timed out")]
    CommandTimeout,

    /// The running query was killed.
    #[error("query execution was interrupted")]
    QueryInterrupted,

    /// A payload exceeded `max_allowed_packet`.
    #[error("packet of {size} bytes exceeds max_allowed_packet ({max})")]
    PacketTooLarge {
        /// Size of the offending payload.
        size: usize,
        /// Configured limit.
        max: usize,
    },

    /// Unknown connection-string keyword.
    #[error("connection-string keyword not supported: '{keyword}'")]
    KeywordNotSupported {
        /// The offending keyword.
        keyword: String,
    },

    /// Malformed connection string.
    #[error("invalid connection string: {0}")]
    InvalidConnectionString(String),

    /// Nested transactions are not supported.
    #[error("a transaction is already in progress")]
    NestedTransaction,

    /// The server requires an authentication plugin this driver lacks.
    #[error("unsupported authentication plugin '{plugin}'")]
    UnsupportedAuthPlugin {
        /// Plugin name the server requested.
        plugin: String,
    },

    /// A statement references a parameter that was never supplied.
    #[error("parameter '{name}' must be defined (set 'allow user variables' to pass @-variables through)")]
    UndefinedParameter {
        /// Parameter token as written, including its prefix.
        name: String,
    },

    /// Protocol error.
    #[error("protocol error: {0}")]
    Protocol(#[from] mysql_protocol::ProtocolError),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Pool acquisition timed out.
    #[error("timed out waiting for a pooled connection")]
    PoolTimeout,
}

impl Error {
    /// Classify this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Connection(_) => ErrorKind::Connection,
            Self::Authentication(_) => ErrorKind::Authentication,
            Self::MustBeOpen { .. } => ErrorKind::MustBeOpen,
            Self::Broken(_) => ErrorKind::Broken,
            Self::Server { .. } => ErrorKind::Server,
            Self::CommandTimeout => ErrorKind::CommandTimeout,
            Self::QueryInterrupted => ErrorKind::QueryInterrupted,
            Self::PacketTooLarge { .. } => ErrorKind::PacketTooLarge,
            Self::KeywordNotSupported { .. } => ErrorKind::KeywordNotSupported,
            Self::InvalidConnectionString(_) => ErrorKind::InvalidConnectionString,
            Self::NestedTransaction => ErrorKind::NestedTransaction,
            Self::UnsupportedAuthPlugin { .. } => ErrorKind::UnsupportedAuthPlugin,
            Self::UndefinedParameter { .. } => ErrorKind::UndefinedParameter,
            Self::Protocol(_) => ErrorKind::Protocol,
            Self::Io(_) => ErrorKind::Io,
            Self::PoolTimeout => ErrorKind::PoolTimeout,
        }
    }

    /// Whether this error leaves the connection unusable.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Broken(_) | Self::Io(_) | Self::Protocol(_) | Self::Connection(_)
        )
    }

    /// Check if this is a server error with a specific code.
    #[must_use]
    pub fn is_server_error(&self, error_code: u16) -> bool {
        matches!(self, Self::Server { code, .. } if *code == error_code)
    }
}

impl From<mysql_codec::CodecError> for Error {
    fn from(err: mysql_codec::CodecError) -> Self {
        match err {
            mysql_codec::CodecError::Io(io) => Self::Io(io),
            mysql_codec::CodecError::Protocol(p) => Self::Protocol(p),
            mysql_codec::CodecError::PacketTooLarge { size, max } => {
                Self::PacketTooLarge { size, max }
            }
            other => Self::Broken(other.to_string()),
        }
    }
}

impl From<mysql_protocol::response::ErrPacket> for Error {
    fn from(err: mysql_protocol::response::ErrPacket) -> Self {
        if err.is_query_interrupted() {
            Self::QueryInterrupted
        } else if err.code == mysql_protocol::ER_NET_PACKET_TOO_LARGE {
            Self::PacketTooLarge { size: 0, max: 0 }
        } else {
            Self::Server {
                code: err.code,
                sql_state: err.sql_state,
                message: err.message,
            }
        }
    }
}

/// Convenience result alias for client operations.
pub type Result<T> = std::result::Result<T, Error>;
