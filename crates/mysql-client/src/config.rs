//! Client configuration and connection-string parsing.
//!
//! Connection strings are semicolon-delimited `key=value` pairs drawn from a
//! closed keyword table (with the historical synonyms). Unknown keywords are
//! rejected at parse time; repeated keywords apply last-wins; an empty value
//! restores the keyword's default.

use std::str::FromStr;
use std::time::Duration;

use crate::error::Error;

/// Transport selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportProtocol {
    /// TCP socket (default).
    Tcp,
    /// Named pipe / unix domain socket.
    Pipe,
    /// Shared memory (not supported on this platform; rejected at open).
    SharedMemory,
}

/// TLS negotiation policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SslMode {
    /// Never use TLS.
    Disabled,
    /// Use TLS when the server offers it (default).
    Preferred,
    /// Require TLS; fail if the server does not offer it.
    Required,
    /// Require TLS and verify the server certificate chain.
    VerifyCa,
    /// Require TLS, verify the chain and the host name.
    VerifyFull,
}

/// Typed connection settings with builder-style setters.
#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    /// Server host name or address.
    pub server: String,
    /// Server TCP port.
    pub port: u16,
    /// Login user.
    pub user: String,
    /// Login password.
    pub password: String,
    /// Initial database.
    pub database: Option<String>,
    /// Transport to use.
    pub protocol: TransportProtocol,
    /// Pipe / unix socket path for [`TransportProtocol::Pipe`].
    pub pipe_name: Option<String>,
    /// Shared memory object name (parsed, never usable here).
    pub shared_memory_name: Option<String>,
    /// Session character set.
    pub charset: String,
    /// Negotiate the compressed protocol.
    pub use_compression: bool,
    /// Whether connections participate in pooling.
    pub pooling: bool,
    /// Minimum pooled connections kept warm.
    pub min_pool_size: u32,
    /// Maximum pooled connections.
    pub max_pool_size: u32,
    /// TCP connect / handshake bound.
    pub connect_timeout: Duration,
    /// Maximum age of a pooled connection (zero = unlimited).
    pub connection_lifetime: Duration,
    /// Reset session state when a connection returns to the pool.
    pub connection_reset: bool,
    /// Keep the password retrievable from settings after open.
    pub persist_security_info: bool,
    /// Permit `@var` user variables in parameterized text commands.
    pub allow_user_variables: bool,
    /// TLS policy.
    pub ssl_mode: SslMode,
    /// Default per-command timeout (zero = infinite).
    pub default_command_timeout: Duration,
    /// TCP keepalive interval (zero = disabled).
    pub keepalive: Duration,
    /// Emit query lifecycle events.
    pub logging: bool,
    /// Emit usage-advisor warnings while reading result sets.
    pub use_usage_advisor: bool,
    /// Accepted for compatibility; performance counters are not wired up.
    pub use_performance_monitor: bool,
    /// Derive stored-procedure parameters from metadata.
    pub use_procedure_bodies: bool,
    /// Cache table metadata.
    pub table_cache: bool,
    /// Age bound for cached table metadata.
    pub default_table_cache_age: Duration,
    /// Return SQL function results as strings.
    pub functions_return_string: bool,
    /// Surface `0000-00-00` dates as values instead of errors.
    pub allow_zero_datetime: bool,
    /// Largest logical packet to send.
    pub max_allowed_packet: usize,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            server: "localhost".into(),
            port: 3306,
            user: String::new(),
            password: String::new(),
            database: None,
            protocol: TransportProtocol::Tcp,
            pipe_name: None,
            shared_memory_name: None,
            charset: "utf8mb4".into(),
            use_compression: false,
            pooling: true,
            min_pool_size: 0,
            max_pool_size: 100,
            connect_timeout: Duration::from_secs(15),
            connection_lifetime: Duration::ZERO,
            connection_reset: false,
            persist_security_info: false,
            allow_user_variables: false,
            ssl_mode: SslMode::Preferred,
            default_command_timeout: Duration::from_secs(30),
            keepalive: Duration::ZERO,
            logging: false,
            use_usage_advisor: false,
            use_performance_monitor: false,
            use_procedure_bodies: true,
            table_cache: false,
            default_table_cache_age: Duration::from_secs(60),
            functions_return_string: false,
            allow_zero_datetime: false,
            max_allowed_packet: mysql_protocol::DEFAULT_MAX_ALLOWED_PACKET,
        }
    }
}

impl ConnectionSettings {
    /// Create settings with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a semicolon-delimited connection string.
    pub fn from_connection_string(input: &str) -> Result<Self, Error> {
        let mut settings = Self::default();
        for segment in input.split(';') {
            let segment = segment.trim();
            if segment.is_empty() {
                continue;
            }
            let Some((key, value)) = segment.split_once('=') else {
                return Err(Error::InvalidConnectionString(format!(
                    "expected key=value, got '{segment}'"
                )));
            };
            let key = normalize_key(key);
            let value = strip_quotes(value.trim());
            settings.apply(&key, value)?;
        }
        Ok(settings)
    }

    /// Set the server host.
    #[must_use]
    pub fn server(mut self, server: impl Into<String>) -> Self {
        self.server = server.into();
        self
    }

    /// Set the TCP port.
    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the login user.
    #[must_use]
    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.user = user.into();
        self
    }

    /// Set the login password.
    #[must_use]
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = password.into();
        self
    }

    /// Set the initial database.
    #[must_use]
    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    /// Set the TLS policy.
    #[must_use]
    pub fn ssl_mode(mut self, mode: SslMode) -> Self {
        self.ssl_mode = mode;
        self
    }

    /// Enable or disable the compressed protocol.
    #[must_use]
    pub fn use_compression(mut self, compress: bool) -> Self {
        self.use_compression = compress;
        self
    }

    /// Set the default per-command timeout (zero = infinite).
    #[must_use]
    pub fn default_command_timeout(mut self, timeout: Duration) -> Self {
        self.default_command_timeout = timeout;
        self
    }

    /// Canonical identity key for pooling, independent of keyword order,
    /// case and synonyms in the source connection string.
    #[must_use]
    pub fn cache_key(&self) -> String {
        format!(
            "server={};port={};protocol={:?};pipe={};user={};password={};database={};\
             charset={};compress={};ssl={:?};allowuservariables={}",
            self.server.to_lowercase(),
            self.port,
            self.protocol,
            self.pipe_name.as_deref().unwrap_or(""),
            self.user,
            self.password,
            self.database.as_deref().unwrap_or(""),
            self.charset.to_lowercase(),
            self.use_compression,
            self.ssl_mode,
            self.allow_user_variables,
        )
    }

    fn apply(&mut self, key: &str, value: &str) -> Result<(), Error> {
        let defaults = Self::default();
        match key {
            "server" | "host" | "data source" | "datasource" | "address" | "addr"
            | "network address" => {
                self.server = if value.is_empty() {
                    defaults.server
                } else {
                    value.to_string()
                };
            }
            "port" => self.port = parse_or(key, value, defaults.port)?,
            "user id" | "userid" | "user name" | "username" | "uid" | "user" => {
                self.user = value.to_string();
            }
            "password" | "pwd" => self.password = value.to_string(),
            "database" | "initial catalog" => {
                self.database = if value.is_empty() {
                    None
                } else {
                    Some(value.to_string())
                };
            }
            "protocol" | "connection protocol" => {
                self.protocol = match value.to_lowercase().as_str() {
                    "" | "socket" | "tcp" => TransportProtocol::Tcp,
                    "pipe" | "namedpipe" | "unix" => TransportProtocol::Pipe,
                    "memory" | "sharedmemory" => TransportProtocol::SharedMemory,
                    other => {
                        return Err(Error::InvalidConnectionString(format!(
                            "unknown protocol '{other}'"
                        )));
                    }
                };
            }
            "pipe name" | "pipe" => {
                self.pipe_name = if value.is_empty() {
                    None
                } else {
                    Some(value.to_string())
                };
            }
            "shared memory name" => {
                self.shared_memory_name = if value.is_empty() {
                    None
                } else {
                    Some(value.to_string())
                };
            }
            "character set" | "charset" => {
                self.charset = if value.is_empty() {
                    defaults.charset
                } else {
                    value.to_string()
                };
            }
            "use compression" | "compress" => {
                self.use_compression = parse_or(key, value, defaults.use_compression)?;
            }
            "pooling" => self.pooling = parse_or(key, value, defaults.pooling)?,
            "min pool size" | "minimum pool size" => {
                self.min_pool_size = parse_or(key, value, defaults.min_pool_size)?;
            }
            "max pool size" | "maximum pool size" => {
                self.max_pool_size = parse_or(key, value, defaults.max_pool_size)?;
            }
            "connection timeout" | "connect timeout" => {
                self.connect_timeout = parse_secs(key, value, defaults.connect_timeout)?;
            }
            "connection lifetime" => {
                self.connection_lifetime =
                    parse_secs(key, value, defaults.connection_lifetime)?;
            }
            "connection reset" => {
                self.connection_reset = parse_or(key, value, defaults.connection_reset)?;
            }
            "persist security info" => {
                self.persist_security_info =
                    parse_or(key, value, defaults.persist_security_info)?;
            }
            "allow user variables" => {
                self.allow_user_variables =
                    parse_or(key, value, defaults.allow_user_variables)?;
            }
            "ssl mode" | "sslmode" => {
                self.ssl_mode = match value.to_lowercase().as_str() {
                    "" => defaults.ssl_mode,
                    "none" | "disabled" => SslMode::Disabled,
                    "preferred" => SslMode::Preferred,
                    "required" => SslMode::Required,
                    "verifyca" => SslMode::VerifyCa,
                    "verifyfull" => SslMode::VerifyFull,
                    other => {
                        return Err(Error::InvalidConnectionString(format!(
                            "unknown ssl mode '{other}'"
                        )));
                    }
                };
            }
            "default command timeout" => {
                self.default_command_timeout =
                    parse_secs(key, value, defaults.default_command_timeout)?;
            }
            "keepalive" => self.keepalive = parse_secs(key, value, defaults.keepalive)?,
            "logging" => self.logging = parse_or(key, value, defaults.logging)?,
            "use usage advisor" | "usage advisor" => {
                self.use_usage_advisor = parse_or(key, value, defaults.use_usage_advisor)?;
            }
            "use performance monitor" | "userperfmon" | "perf mon" => {
                self.use_performance_monitor =
                    parse_or(key, value, defaults.use_performance_monitor)?;
            }
            "use procedure bodies" | "procedure bodies" | "check parameters" => {
                self.use_procedure_bodies =
                    parse_or(key, value, defaults.use_procedure_bodies)?;
            }
            "table cache" | "tablecache" | "table caching" => {
                self.table_cache = parse_or(key, value, defaults.table_cache)?;
            }
            "default table cache age" => {
                self.default_table_cache_age =
                    parse_secs(key, value, defaults.default_table_cache_age)?;
            }
            "functions return string" => {
                self.functions_return_string =
                    parse_or(key, value, defaults.functions_return_string)?;
            }
            "allow zero datetime" => {
                self.allow_zero_datetime =
                    parse_or(key, value, defaults.allow_zero_datetime)?;
            }
            other => {
                return Err(Error::KeywordNotSupported {
                    keyword: other.to_string(),
                });
            }
        }
        Ok(())
    }
}

impl FromStr for ConnectionSettings {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_connection_string(s)
    }
}

fn normalize_key(key: &str) -> String {
    key.trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn strip_quotes(value: &str) -> &str {
    let bytes = value.as_bytes();
    if bytes.len() >= 2 {
        let (first, last) = (bytes[0], bytes[bytes.len() - 1]);
        if first == last && (first == b'\'' || first == b'"') {
            return &value[1..value.len() - 1];
        }
    }
    value
}

trait ParseValue: Sized {
    fn parse_value(value: &str) -> Option<Self>;
}

impl ParseValue for bool {
    fn parse_value(value: &str) -> Option<Self> {
        match value.to_lowercase().as_str() {
            "true" | "yes" | "1" => Some(true),
            "false" | "no" | "0" => Some(false),
            _ => None,
        }
    }
}

macro_rules! parse_int_value {
    ($($t:ty),*) => {$(
        impl ParseValue for $t {
            fn parse_value(value: &str) -> Option<Self> {
                value.parse().ok()
            }
        }
    )*};
}
parse_int_value!(u16, u32, u64);

fn parse_or<T: ParseValue>(key: &str, value: &str, default: T) -> Result<T, Error> {
    if value.is_empty() {
        return Ok(default);
    }
    T::parse_value(value).ok_or_else(|| {
        Error::InvalidConnectionString(format!("invalid value '{value}' for '{key}'"))
    })
}

fn parse_secs(key: &str, value: &str, default: Duration) -> Result<Duration, Error> {
    parse_or(key, value, default.as_secs()).map(Duration::from_secs)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_parse_basic() {
        let settings = ConnectionSettings::from_connection_string(
            "Server=db.example.com;Port=3307;Uid=app;Pwd=secret;Database=orders",
        )
        .unwrap();
        assert_eq!(settings.server, "db.example.com");
        assert_eq!(settings.port, 3307);
        assert_eq!(settings.user, "app");
        assert_eq!(settings.password, "secret");
        assert_eq!(settings.database.as_deref(), Some("orders"));
    }

    #[test]
    fn test_synonyms() {
        let a = ConnectionSettings::from_connection_string(
            "Data Source=h;User Id=u;Initial Catalog=d",
        )
        .unwrap();
        let b =
            ConnectionSettings::from_connection_string("host=h;user=u;database=d").unwrap();
        assert_eq!(a.cache_key(), b.cache_key());
    }

    #[test]
    fn test_unknown_keyword_rejected() {
        let err = ConnectionSettings::from_connection_string("server=h;bogus key=1")
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::KeywordNotSupported);
        assert!(err.to_string().contains("bogus key"));
    }

    #[test]
    fn test_last_wins() {
        let settings =
            ConnectionSettings::from_connection_string("port=1111;port=2222").unwrap();
        assert_eq!(settings.port, 2222);
    }

    #[test]
    fn test_empty_value_restores_default() {
        let settings =
            ConnectionSettings::from_connection_string("compress=true;compress=").unwrap();
        assert!(!settings.use_compression);
    }

    #[test]
    fn test_bool_spellings() {
        for (text, expected) in [("yes", true), ("No", false), ("1", true), ("0", false)] {
            let settings = ConnectionSettings::from_connection_string(&format!(
                "use compression={text}"
            ))
            .unwrap();
            assert_eq!(settings.use_compression, expected, "{text}");
        }
    }

    #[test]
    fn test_invalid_value() {
        let err = ConnectionSettings::from_connection_string("port=abc").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidConnectionString);
    }

    #[test]
    fn test_cache_key_ignores_order_and_case() {
        let a = ConnectionSettings::from_connection_string(
            "Server=H;Database=d;User=u;Compress=true",
        )
        .unwrap();
        let b = ConnectionSettings::from_connection_string(
            "compress=yes;user=u;database=d;SERVER=h",
        )
        .unwrap();
        assert_eq!(a.cache_key(), b.cache_key());
    }

    #[test]
    fn test_quoted_values() {
        // Semicolons split before quotes are interpreted, like the classic
        // builders: the quoted form protects spaces, not separators.
        let err = ConnectionSettings::from_connection_string("password='p;w'").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidConnectionString);

        let settings =
            ConnectionSettings::from_connection_string("password=\"spaced pw\"").unwrap();
        assert_eq!(settings.password, "spaced pw");
    }

    #[test]
    fn test_protocol_values() {
        let settings =
            ConnectionSettings::from_connection_string("protocol=memory").unwrap();
        assert_eq!(settings.protocol, TransportProtocol::SharedMemory);
        let settings = ConnectionSettings::from_connection_string(
            "protocol=unix;pipe name=/var/run/mysqld/mysqld.sock",
        )
        .unwrap();
        assert_eq!(settings.protocol, TransportProtocol::Pipe);
        assert_eq!(
            settings.pipe_name.as_deref(),
            Some("/var/run/mysqld/mysqld.sock")
        );
    }
}
