//! Bulk loading via `LOAD DATA INFILE`.

use std::time::Duration;

use bytes::Bytes;
use mysql_protocol::quoting::{escape_string_literal, quote_identifier};
use mysql_protocol::response::{ErrPacket, LocalInfileRequest, OkPacket};
use mysql_protocol::{command, PacketType};
use tokio::io::AsyncReadExt;

use crate::connection::Connection;
use crate::error::{Error, Result};

/// File chunk size for LOCAL streaming. The codec refragments as needed.
const CHUNK_SIZE: usize = 8192;

/// Load priority clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BulkLoaderPriority {
    /// No priority clause.
    #[default]
    None,
    /// `LOW_PRIORITY`: wait until no other clients read the table.
    Low,
    /// `CONCURRENT`: allow concurrent reads on MyISAM tables.
    Concurrent,
}

/// Behavior when an input row duplicates a unique key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BulkLoaderConflictOption {
    /// Duplicate keys abort the load with an error.
    #[default]
    Error,
    /// `REPLACE` existing rows.
    Replace,
    /// `IGNORE` conflicting input rows.
    Ignore,
}

/// Builder for a `LOAD DATA INFILE` operation.
///
/// With [`local`](Self::local) the file is read from this process and
/// streamed to the server; otherwise the path names a file on the server
/// host.
#[derive(Debug, Clone)]
pub struct BulkLoader {
    table: String,
    filename: String,
    local: bool,
    priority: BulkLoaderPriority,
    conflict: BulkLoaderConflictOption,
    charset: Option<String>,
    field_terminator: Option<String>,
    field_quotation_character: Option<char>,
    field_quotation_optional: bool,
    escape_character: Option<char>,
    line_prefix: Option<String>,
    line_terminator: Option<String>,
    number_of_lines_to_skip: u64,
    columns: Vec<String>,
    expressions: Vec<String>,
    timeout: Option<Duration>,
}

impl BulkLoader {
    /// Create a loader for a table and source file.
    #[must_use]
    pub fn new(table: impl Into<String>, filename: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            filename: filename.into(),
            local: false,
            priority: BulkLoaderPriority::None,
            conflict: BulkLoaderConflictOption::Error,
            charset: None,
            field_terminator: None,
            field_quotation_character: None,
            field_quotation_optional: false,
            escape_character: None,
            line_prefix: None,
            line_terminator: None,
            number_of_lines_to_skip: 0,
            columns: Vec::new(),
            expressions: Vec::new(),
            timeout: None,
        }
    }

    /// Stream the file from this process instead of reading it server-side.
    #[must_use]
    pub fn local(mut self, local: bool) -> Self {
        self.local = local;
        self
    }

    /// Set the load priority.
    #[must_use]
    pub fn priority(mut self, priority: BulkLoaderPriority) -> Self {
        self.priority = priority;
        self
    }

    /// Set duplicate-key handling.
    #[must_use]
    pub fn conflict_option(mut self, conflict: BulkLoaderConflictOption) -> Self {
        self.conflict = conflict;
        self
    }

    /// Character set of the input file.
    #[must_use]
    pub fn charset(mut self, charset: impl Into<String>) -> Self {
        self.charset = Some(charset.into());
        self
    }

    /// `FIELDS TERMINATED BY` string.
    #[must_use]
    pub fn field_terminator(mut self, terminator: impl Into<String>) -> Self {
        self.field_terminator = Some(terminator.into());
        self
    }

    /// `FIELDS ENCLOSED BY` character, optionally only for some fields.
    #[must_use]
    pub fn field_quotation(mut self, character: char, optional: bool) -> Self {
        self.field_quotation_character = Some(character);
        self.field_quotation_optional = optional;
        self
    }

    /// `FIELDS ESCAPED BY` character.
    #[must_use]
    pub fn escape_character(mut self, character: char) -> Self {
        self.escape_character = Some(character);
        self
    }

    /// `LINES STARTING BY` prefix.
    #[must_use]
    pub fn line_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.line_prefix = Some(prefix.into());
        self
    }

    /// `LINES TERMINATED BY` string.
    #[must_use]
    pub fn line_terminator(mut self, terminator: impl Into<String>) -> Self {
        self.line_terminator = Some(terminator.into());
        self
    }

    /// Skip this many initial lines (headers).
    #[must_use]
    pub fn skip_lines(mut self, lines: u64) -> Self {
        self.number_of_lines_to_skip = lines;
        self
    }

    /// Name the target column for each input field, in order.
    #[must_use]
    pub fn column(mut self, column: impl Into<String>) -> Self {
        self.columns.push(column.into());
        self
    }

    /// Add a `SET` expression applied to each row.
    #[must_use]
    pub fn expression(mut self, expression: impl Into<String>) -> Self {
        self.expressions.push(expression.into());
        self
    }

    /// Override the connection's default command timeout.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Render the `LOAD DATA INFILE` statement this loader will run.
    #[must_use]
    pub fn build_sql_command(&self) -> String {
        let mut sql = String::from("LOAD DATA ");
        match self.priority {
            BulkLoaderPriority::None => {}
            BulkLoaderPriority::Low => sql.push_str("LOW_PRIORITY "),
            BulkLoaderPriority::Concurrent => sql.push_str("CONCURRENT "),
        }
        if self.local {
            sql.push_str("LOCAL ");
        }
        sql.push_str("INFILE ");
        sql.push_str(&escape_string_literal(&self.filename));
        match self.conflict {
            BulkLoaderConflictOption::Error => {}
            BulkLoaderConflictOption::Replace => sql.push_str(" REPLACE"),
            BulkLoaderConflictOption::Ignore => sql.push_str(" IGNORE"),
        }
        sql.push_str(" INTO TABLE ");
        sql.push_str(&quote_identifier(&self.table));
        if let Some(charset) = &self.charset {
            sql.push_str(" CHARACTER SET ");
            sql.push_str(charset);
        }

        let mut fields = String::new();
        if let Some(terminator) = &self.field_terminator {
            fields.push_str(" TERMINATED BY ");
            fields.push_str(&escape_string_literal(terminator));
        }
        if let Some(quotation) = self.field_quotation_character {
            if self.field_quotation_optional {
                fields.push_str(" OPTIONALLY");
            }
            fields.push_str(" ENCLOSED BY ");
            fields.push_str(&escape_string_literal(&quotation.to_string()));
        }
        if let Some(escape) = self.escape_character {
            fields.push_str(" ESCAPED BY ");
            fields.push_str(&escape_string_literal(&escape.to_string()));
        }
        if !fields.is_empty() {
            sql.push_str(" FIELDS");
            sql.push_str(&fields);
        }

        let mut lines = String::new();
        if let Some(prefix) = &self.line_prefix {
            lines.push_str(" STARTING BY ");
            lines.push_str(&escape_string_literal(prefix));
        }
        if let Some(terminator) = &self.line_terminator {
            lines.push_str(" TERMINATED BY ");
            lines.push_str(&escape_string_literal(terminator));
        }
        if !lines.is_empty() {
            sql.push_str(" LINES");
            sql.push_str(&lines);
        }

        if self.number_of_lines_to_skip > 0 {
            sql.push_str(&format!(" IGNORE {} LINES", self.number_of_lines_to_skip));
        }
        if !self.columns.is_empty() {
            let columns: Vec<String> =
                self.columns.iter().map(|c| quote_identifier(c)).collect();
            sql.push_str(&format!(" ({})", columns.join(", ")));
        }
        if !self.expressions.is_empty() {
            sql.push_str(" SET ");
            sql.push_str(&self.expressions.join(", "));
        }
        sql
    }

    /// Run the load. Returns the number of rows the server inserted.
    pub async fn load(&self, conn: &mut Connection) -> Result<u64> {
        let sql = self.build_sql_command();
        tracing::debug!(table = %self.table, local = self.local, "bulk load started");
        let timeout = self
            .timeout
            .unwrap_or(conn.settings_internal().default_command_timeout);
        let deadline = if timeout.is_zero() {
            None
        } else {
            Some(tokio::time::Instant::now() + timeout)
        };

        conn.send_command(command::query(&sql)).await?;
        let payload = conn.recv_deadline(deadline).await?;
        let payload = match PacketType::classify(&payload) {
            PacketType::LocalInfile => {
                let request = LocalInfileRequest::decode(payload)?;
                let stream_result = stream_file(conn, &request.filename).await;
                // The empty payload terminates the upload even when the file
                // could not be read; the server then answers for this load.
                conn.send_more(Bytes::new()).await?;
                let response = conn.recv_deadline(deadline).await?;
                stream_result?;
                response
            }
            _ => payload,
        };

        match PacketType::classify(&payload) {
            PacketType::Ok => {
                let ok = OkPacket::decode(payload)?;
                conn.apply_ok(&ok);
                tracing::debug!(rows = ok.affected_rows, "bulk load finished");
                Ok(ok.affected_rows)
            }
            PacketType::Err => Err(ErrPacket::decode(payload)?.into()),
            _ => Err(Error::Protocol(
                mysql_protocol::ProtocolError::MalformedPacket(
                    "unexpected response to LOAD DATA".into(),
                ),
            )),
        }
    }
}

/// Stream a local file to the server in payload-sized chunks.
async fn stream_file(conn: &mut Connection, filename: &str) -> Result<()> {
    let mut file = tokio::fs::File::open(filename).await?;
    let mut buf = vec![0u8; CHUNK_SIZE];
    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }
        conn.send_more(Bytes::copy_from_slice(&buf[..n])).await?;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_statement() {
        let loader = BulkLoader::new("t", "/tmp/data.csv");
        assert_eq!(
            loader.build_sql_command(),
            "LOAD DATA INFILE '/tmp/data.csv' INTO TABLE `t`"
        );
    }

    #[test]
    fn test_full_statement_clause_order() {
        let loader = BulkLoader::new("orders", "data.csv")
            .local(true)
            .priority(BulkLoaderPriority::Concurrent)
            .conflict_option(BulkLoaderConflictOption::Replace)
            .charset("utf8mb4")
            .field_terminator(",")
            .field_quotation('"', true)
            .escape_character('\\')
            .line_prefix(">")
            .line_terminator("\r\n")
            .skip_lines(1)
            .column("id")
            .column("total")
            .expression("loaded_at = NOW()");
        assert_eq!(
            loader.build_sql_command(),
            "LOAD DATA CONCURRENT LOCAL INFILE 'data.csv' REPLACE INTO TABLE `orders` \
             CHARACTER SET utf8mb4 \
             FIELDS TERMINATED BY ',' OPTIONALLY ENCLOSED BY '\"' ESCAPED BY '\\\\' \
             LINES STARTING BY '>' TERMINATED BY '\\r\\n' \
             IGNORE 1 LINES (`id`, `total`) SET loaded_at = NOW()"
        );
    }

    #[test]
    fn test_filename_backslashes_escaped() {
        let loader = BulkLoader::new("t", "C:\\data\\in.csv");
        assert!(loader
            .build_sql_command()
            .contains("INFILE 'C:\\\\data\\\\in.csv'"));
    }

    #[test]
    fn test_table_with_backtick_quoted() {
        let loader = BulkLoader::new("odd`name", "f");
        assert!(loader.build_sql_command().ends_with("INTO TABLE `odd``name`"));
    }
}
