//! # mysql-client
//!
//! High-level async MySQL client: connections, commands, result readers.
//!
//! This is the primary public API surface for the mysql-driver project.
//! It drives the text and prepared-statement protocols over the framing in
//! `mysql-codec`, with connection-string configuration, transactions,
//! script execution and bulk loading.
//!
//! ## Connection lifecycle
//!
//! ```text
//! Closed -> Connecting (via open())
//! Connecting -> Open (handshake + authentication succeeded)
//! Connecting -> Closed (open failed)
//! Open -> Closed (via close())
//! Open -> Broken (fatal I/O or protocol error; only close() remains)
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use mysql_client::{Command, Connection, ConnectionSettings, Value};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let settings = ConnectionSettings::from_connection_string(
//!         "Server=localhost;Database=test;User Id=app;Password=secret;",
//!     )?;
//!
//!     let mut conn = Connection::open(settings).await?;
//!
//!     let cmd = Command::new("SELECT id, name FROM users WHERE id = @id")
//!         .param("id", Value::Int(1));
//!     let mut reader = cmd.execute_reader(&mut conn).await?;
//!     while reader.read().await? {
//!         let name = reader.get(1).cloned();
//!         println!("user: {name:?}");
//!     }
//!
//!     conn.close().await;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod bulk;
pub mod cancel;
pub mod command;
pub mod config;
pub mod connection;
pub mod error;
pub mod instrumentation;
pub mod pending;
pub mod reader;
pub mod script;
pub mod state;
pub mod transport;

// Re-export commonly used types
pub use bulk::{BulkLoader, BulkLoaderConflictOption, BulkLoaderPriority};
pub use cancel::CancelHandle;
pub use command::{
    derive_parameters, execute_call, CallParam, Command, DerivedParameter, ParamDirection,
    Statement,
};
pub use config::{ConnectionSettings, SslMode, TransportProtocol};
pub use connection::Connection;
pub use error::{Error, ErrorKind, Result};
pub use mysql_protocol::Value;
pub use pending::PendingCommand;
pub use reader::{DataReader, Row};
pub use script::{ScriptRunner, ScriptStatement};
pub use state::{ConnectionState, StateChange, StateObserver};
