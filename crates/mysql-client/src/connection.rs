//! Connection lifecycle: open, authenticate, command IO, close.

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use mysql_codec::{CodecError, CompressedStream, MySqlCodec, PacketStream};
use mysql_protocol::handshake::{
    scramble_native_password, AuthSwitchRequest, HandshakeResponse, InitialHandshake,
    AUTH_SWITCH_HEADER, NATIVE_PASSWORD_PLUGIN,
};
use mysql_protocol::response::{ErrPacket, OkPacket};
use mysql_protocol::{CapabilityFlags, PacketType, StatusFlags};

use crate::config::{ConnectionSettings, SslMode, TransportProtocol};
use crate::error::{Error, Result};
use crate::state::{ConnectionState, StateObserver, StateTracker};
use crate::transport::{self, BoxedIo};

/// Charset id sent in the handshake response (utf8mb4_general_ci).
const DEFAULT_CHARSET_ID: u8 = 45;

/// Framed stream, with or without the compressed protocol underneath.
enum Stream {
    Plain(PacketStream<BoxedIo>),
    Compressed(PacketStream<CompressedStream<BoxedIo>>),
}

impl Stream {
    fn reset_sequence(&mut self) {
        match self {
            Self::Plain(s) => s.reset_sequence(),
            Self::Compressed(s) => {
                s.get_mut().reset_sequence();
                s.reset_sequence();
            }
        }
    }

    async fn send(&mut self, payload: Bytes) -> std::result::Result<(), CodecError> {
        match self {
            Self::Plain(s) => s.send(payload).await,
            Self::Compressed(s) => s.send(payload).await,
        }
    }

    async fn next(&mut self) -> Option<std::result::Result<Bytes, CodecError>> {
        match self {
            Self::Plain(s) => s.next().await,
            Self::Compressed(s) => s.next().await,
        }
    }
}

/// An authenticated session with a MySQL server.
pub struct Connection {
    stream: Stream,
    settings: ConnectionSettings,
    state: StateTracker,
    capabilities: CapabilityFlags,
    thread_id: u32,
    server_version: String,
    status: StatusFlags,
    last_insert_id: u64,
    affected_rows: u64,
    transaction_depth: u8,
}

impl Connection {
    /// Open a connection with the given settings.
    pub async fn open(settings: ConnectionSettings) -> Result<Self> {
        Self::open_observed(settings, None).await
    }

    /// Open a connection, registering a state observer before the first
    /// transition so the `Closed -> Connecting -> Open` sequence is visible.
    pub async fn open_observed(
        settings: ConnectionSettings,
        observer: Option<StateObserver>,
    ) -> Result<Self> {
        let mut state = StateTracker::new();
        if let Some(observer) = observer {
            state.observe(observer);
        }

        if settings.protocol == TransportProtocol::SharedMemory {
            return Err(Error::Connection(
                "shared memory transport is not supported on this platform".into(),
            ));
        }

        state.transition(ConnectionState::Connecting);
        match Self::handshake(&settings).await {
            Ok((stream, handshake, capabilities, status)) => {
                let mut conn = Self {
                    stream,
                    settings,
                    state,
                    capabilities,
                    thread_id: handshake.thread_id,
                    server_version: handshake.server_version,
                    status,
                    last_insert_id: 0,
                    affected_rows: 0,
                    transaction_depth: 0,
                };
                conn.state.transition(ConnectionState::Open);
                conn.configure_session().await?;
                tracing::info!(
                    thread_id = conn.thread_id,
                    server_version = %conn.server_version,
                    compressed = matches!(conn.stream, Stream::Compressed(_)),
                    "connection open"
                );
                Ok(conn)
            }
            Err(err) => {
                state.transition(ConnectionState::Closed);
                Err(err)
            }
        }
    }

    async fn handshake(
        settings: &ConnectionSettings,
    ) -> Result<(Stream, InitialHandshake, CapabilityFlags, StatusFlags)> {
        let io = transport::connect(settings).await?;
        let codec = MySqlCodec::new().with_max_allowed_packet(settings.max_allowed_packet);
        let mut stream = PacketStream::with_codec(io, codec);

        let payload = next_payload(&mut stream).await?;
        if PacketType::classify(&payload) == PacketType::Err {
            let err = ErrPacket::decode(payload)?;
            return Err(Error::Connection(format!(
                "server refused connection: {} ({})",
                err.message, err.code
            )));
        }
        let handshake = InitialHandshake::decode(payload)?;

        let mut capabilities = CapabilityFlags::client_default() & handshake.capabilities;
        if settings.database.is_some() {
            capabilities |= CapabilityFlags::CONNECT_WITH_DB;
        }
        let compress = settings.use_compression
            && handshake.capabilities.contains(CapabilityFlags::COMPRESS);
        if compress {
            capabilities |= CapabilityFlags::COMPRESS;
        }

        let use_tls = Self::decide_tls(settings, &handshake)?;
        if use_tls {
            capabilities |= CapabilityFlags::SSL;
        }

        let response = HandshakeResponse {
            capabilities,
            max_packet_size: settings.max_allowed_packet as u32,
            charset: DEFAULT_CHARSET_ID,
            username: settings.user.clone(),
            auth_response: scramble_native_password(&settings.password, &handshake.auth_seed),
            database: settings.database.clone(),
            auth_plugin: NATIVE_PASSWORD_PLUGIN.to_string(),
        };

        #[cfg(feature = "tls")]
        let mut stream = if use_tls {
            stream.send(response.encode_ssl_request()).await?;
            let sequence = stream.codec().sequence_id();
            let (io, _) = stream.into_parts();
            let tls_io = transport::upgrade_tls(io, settings).await?;
            let codec = MySqlCodec::new().with_max_allowed_packet(settings.max_allowed_packet);
            let mut stream = PacketStream::with_codec(tls_io, codec);
            stream.codec_mut().set_sequence_id(sequence);
            stream
        } else {
            stream
        };
        #[cfg(not(feature = "tls"))]
        let mut stream = stream;

        stream.send(response.encode()).await?;

        // Authentication loop: the server answers OK, ERR, or asks to switch
        // plugins and expects a fresh scramble.
        let status = loop {
            let payload = next_payload(&mut stream).await?;
            match PacketType::classify(&payload) {
                PacketType::Ok => {
                    let ok = OkPacket::decode(payload)?;
                    break ok.status;
                }
                PacketType::Err => {
                    let err = ErrPacket::decode(payload)?;
                    return Err(Error::Authentication(format!(
                        "{} ({})",
                        err.message, err.code
                    )));
                }
                PacketType::Eof if payload.first() == Some(&AUTH_SWITCH_HEADER) => {
                    let switch = AuthSwitchRequest::decode(payload)?;
                    if switch.plugin != NATIVE_PASSWORD_PLUGIN {
                        return Err(Error::UnsupportedAuthPlugin {
                            plugin: switch.plugin,
                        });
                    }
                    let scramble =
                        scramble_native_password(&settings.password, &switch.seed);
                    stream.send(Bytes::from(scramble)).await?;
                }
                _ => {
                    return Err(Error::Authentication(
                        "unexpected packet during authentication".into(),
                    ));
                }
            }
        };

        let stream = if compress {
            let (io, _) = stream.into_parts();
            let codec = MySqlCodec::new().with_max_allowed_packet(settings.max_allowed_packet);
            Stream::Compressed(PacketStream::with_codec(
                CompressedStream::new(io),
                codec,
            ))
        } else {
            Stream::Plain(stream)
        };

        Ok((stream, handshake, capabilities, status))
    }

    fn decide_tls(settings: &ConnectionSettings, handshake: &InitialHandshake) -> Result<bool> {
        let server_supports = handshake.capabilities.contains(CapabilityFlags::SSL);
        match settings.ssl_mode {
            SslMode::Disabled => Ok(false),
            SslMode::Preferred => Ok(cfg!(feature = "tls") && server_supports),
            SslMode::Required | SslMode::VerifyCa | SslMode::VerifyFull => {
                if !cfg!(feature = "tls") {
                    return Err(Error::Connection(
                        "TLS required but the tls feature is disabled".into(),
                    ));
                }
                if !server_supports {
                    return Err(Error::Connection(
                        "TLS required but the server does not support it".into(),
                    ));
                }
                Ok(true)
            }
        }
    }

    /// Session setup after authentication: character set.
    async fn configure_session(&mut self) -> Result<()> {
        if !self.settings.charset.is_empty() {
            let charset = self.settings.charset.clone();
            self.query_drop(&format!("SET NAMES '{charset}'")).await?;
        }
        Ok(())
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state.state()
    }

    /// Whether the connection is open for commands.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.state.state() == ConnectionState::Open
    }

    /// Register a state observer.
    pub fn observe_state(&mut self, observer: StateObserver) {
        self.state.observe(observer);
    }

    /// Server thread id of this session (the KILL target).
    #[must_use]
    pub fn thread_id(&self) -> u32 {
        self.thread_id
    }

    /// Server version string from the handshake.
    #[must_use]
    pub fn server_version(&self) -> &str {
        &self.server_version
    }

    /// Negotiated capability flags.
    #[must_use]
    pub fn capabilities(&self) -> CapabilityFlags {
        self.capabilities
    }

    /// Last `AUTO_INCREMENT` id reported by the server.
    #[must_use]
    pub fn last_insert_id(&self) -> u64 {
        self.last_insert_id
    }

    /// Affected-row count of the last command.
    #[must_use]
    pub fn affected_rows(&self) -> u64 {
        self.affected_rows
    }

    /// Latest server status flags.
    #[must_use]
    pub fn status(&self) -> StatusFlags {
        self.status
    }

    /// The settings this connection was opened with.
    ///
    /// The password is blanked unless `persist security info` was set.
    #[must_use]
    pub fn settings(&self) -> ConnectionSettings {
        let mut settings = self.settings.clone();
        if !settings.persist_security_info {
            settings.password.clear();
        }
        settings
    }

    pub(crate) fn settings_internal(&self) -> &ConnectionSettings {
        &self.settings
    }

    /// Check the server is alive.
    pub async fn ping(&mut self) -> Result<()> {
        self.send_command(mysql_protocol::command::ping()).await?;
        let payload = self.recv().await?;
        match PacketType::classify(&payload) {
            PacketType::Ok => {
                let ok = OkPacket::decode(payload)?;
                self.apply_ok(&ok);
                Ok(())
            }
            PacketType::Err => Err(ErrPacket::decode(payload)?.into()),
            _ => Err(self.broken("unexpected ping response")),
        }
    }

    /// Switch the default database.
    pub async fn select_database(&mut self, database: &str) -> Result<()> {
        self.send_command(mysql_protocol::command::init_db(database))
            .await?;
        let payload = self.recv().await?;
        match PacketType::classify(&payload) {
            PacketType::Ok => {
                let ok = OkPacket::decode(payload)?;
                self.apply_ok(&ok);
                Ok(())
            }
            PacketType::Err => Err(ErrPacket::decode(payload)?.into()),
            _ => Err(self.broken("unexpected response to USE")),
        }
    }

    /// Begin a transaction. Nesting is not supported.
    pub async fn begin_transaction(&mut self) -> Result<()> {
        self.ensure_open()?;
        if self.transaction_depth > 0 {
            return Err(Error::NestedTransaction);
        }
        self.query_drop("START TRANSACTION").await?;
        self.transaction_depth = 1;
        Ok(())
    }

    /// Commit the active transaction.
    pub async fn commit(&mut self) -> Result<()> {
        self.query_drop("COMMIT").await?;
        self.transaction_depth = 0;
        Ok(())
    }

    /// Roll back the active transaction.
    pub async fn rollback(&mut self) -> Result<()> {
        self.query_drop("ROLLBACK").await?;
        self.transaction_depth = 0;
        Ok(())
    }

    /// Whether a transaction is active.
    #[must_use]
    pub fn in_transaction(&self) -> bool {
        self.transaction_depth > 0
    }

    /// Close the connection with a best-effort COM_QUIT. Idempotent.
    pub async fn close(&mut self) {
        if self.state.state() == ConnectionState::Closed {
            return;
        }
        if self.state.state() == ConnectionState::Open {
            self.stream.reset_sequence();
            let _ = self.stream.send(mysql_protocol::command::quit()).await;
        }
        self.state.transition(ConnectionState::Closed);
        tracing::info!(thread_id = self.thread_id, "connection closed");
    }

    /// Execute a statement and discard any results.
    pub(crate) async fn query_drop(&mut self, sql: &str) -> Result<()> {
        self.send_command(mysql_protocol::command::query(sql)).await?;
        self.drain_results().await
    }

    /// Read and discard result payloads until the command completes.
    ///
    /// Used by fire-and-forget statements and by the timeout path to bring
    /// the session back to command state.
    pub(crate) async fn drain_results(&mut self) -> Result<()> {
        loop {
            let payload = self.recv().await?;
            match PacketType::classify(&payload) {
                PacketType::Ok => {
                    let ok = OkPacket::decode(payload)?;
                    self.apply_ok(&ok);
                    if !ok.more_results() {
                        return Ok(());
                    }
                }
                PacketType::Err => return Err(ErrPacket::decode(payload)?.into()),
                PacketType::LocalInfile => {
                    // Not expected here; refuse by sending the empty
                    // terminator, then keep draining.
                    self.send_more(Bytes::new()).await?;
                }
                _ => {
                    // Result set header: columns, EOF, rows, EOF.
                    let more = self.drain_result_set().await?;
                    if !more {
                        return Ok(());
                    }
                }
            }
        }
    }

    async fn drain_result_set(&mut self) -> Result<bool> {
        // Column definitions end with an EOF packet.
        loop {
            let payload = self.recv().await?;
            if PacketType::classify(&payload) == PacketType::Eof {
                break;
            }
        }
        // Rows end with EOF (or ERR on a killed query).
        loop {
            let payload = self.recv().await?;
            match PacketType::classify(&payload) {
                PacketType::Eof => {
                    let eof = mysql_protocol::response::EofPacket::decode(payload)?;
                    self.status = eof.status;
                    return Ok(eof.more_results());
                }
                PacketType::Err => return Err(ErrPacket::decode(payload)?.into()),
                _ => {}
            }
        }
    }

    pub(crate) fn apply_ok(&mut self, ok: &OkPacket) {
        self.affected_rows = ok.affected_rows;
        if ok.last_insert_id != 0 {
            self.last_insert_id = ok.last_insert_id;
        }
        self.status = ok.status;
        if ok.warnings > 0 {
            tracing::debug!(warnings = ok.warnings, "server reported warnings");
        }
    }

    pub(crate) fn set_status(&mut self, status: StatusFlags) {
        self.status = status;
    }

    pub(crate) fn ensure_open(&self) -> Result<()> {
        match self.state.state() {
            ConnectionState::Open => Ok(()),
            ConnectionState::Broken => {
                Err(Error::Broken("connection is no longer usable".into()))
            }
            other => Err(Error::MustBeOpen {
                state: other.name(),
            }),
        }
    }

    /// Send a command payload, starting a new sequence.
    pub(crate) async fn send_command(&mut self, payload: Bytes) -> Result<()> {
        self.ensure_open()?;
        self.stream.reset_sequence();
        self.send_more(payload).await
    }

    /// Send a payload continuing the current sequence.
    pub(crate) async fn send_more(&mut self, payload: Bytes) -> Result<()> {
        match self.stream.send(payload).await {
            Ok(()) => Ok(()),
            Err(err) => Err(self.map_codec_error(err)),
        }
    }

    /// Receive the next logical payload.
    pub(crate) async fn recv(&mut self) -> Result<Bytes> {
        match self.stream.next().await {
            Some(Ok(payload)) => Ok(payload),
            Some(Err(err)) => Err(self.map_codec_error(err)),
            None => Err(self.broken("server closed the connection")),
        }
    }

    /// Receive with an optional deadline. `None` waits forever.
    pub(crate) async fn recv_deadline(
        &mut self,
        deadline: Option<tokio::time::Instant>,
    ) -> Result<Bytes> {
        match deadline {
            None => self.recv().await,
            Some(deadline) => {
                match tokio::time::timeout_at(deadline, self.stream.next()).await {
                    Ok(Some(Ok(payload))) => Ok(payload),
                    Ok(Some(Err(err))) => Err(self.map_codec_error(err)),
                    Ok(None) => Err(self.broken("server closed the connection")),
                    Err(_) => Err(Error::CommandTimeout),
                }
            }
        }
    }

    fn map_codec_error(&mut self, err: CodecError) -> Error {
        if err.is_fatal() {
            self.state.transition(ConnectionState::Broken);
        }
        err.into()
    }

    pub(crate) fn broken(&mut self, message: &str) -> Error {
        self.state.transition(ConnectionState::Broken);
        Error::Broken(message.into())
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("state", &self.state.state())
            .field("thread_id", &self.thread_id)
            .field("server_version", &self.server_version)
            .finish()
    }
}

async fn next_payload<T>(stream: &mut PacketStream<T>) -> Result<Bytes>
where
    T: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    match stream.next().await {
        Some(Ok(payload)) => Ok(payload),
        Some(Err(err)) => Err(err.into()),
        None => Err(Error::Connection("server closed the connection".into())),
    }
}
