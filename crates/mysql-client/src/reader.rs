//! Forward-only result reader.

use std::sync::Arc;

use bytes::Bytes;
use mysql_protocol::column::ColumnDefinition;
use mysql_protocol::response::{EofPacket, ErrPacket, OkPacket};
use mysql_protocol::wire::WireReadExt;
use mysql_protocol::{PacketType, Value};

use crate::connection::Connection;
use crate::error::{Error, Result};
use crate::instrumentation;

/// A single decoded row.
#[derive(Debug, Clone)]
pub struct Row {
    columns: Arc<Vec<ColumnDefinition>>,
    values: Vec<Value>,
}

impl Row {
    /// Number of columns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the row has no columns.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Value at an ordinal.
    #[must_use]
    pub fn get(&self, ordinal: usize) -> Option<&Value> {
        self.values.get(ordinal)
    }

    /// Value by column name (case-insensitive).
    #[must_use]
    pub fn get_by_name(&self, name: &str) -> Option<&Value> {
        let ordinal = self
            .columns
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(name))?;
        self.values.get(ordinal)
    }

    /// Whether the value at an ordinal is NULL.
    #[must_use]
    pub fn is_null(&self, ordinal: usize) -> bool {
        matches!(self.values.get(ordinal), Some(Value::Null) | None)
    }

    /// Column metadata for this row.
    #[must_use]
    pub fn columns(&self) -> &[ColumnDefinition] {
        &self.columns
    }
}

/// Forward-only reader over one or more result sets.
///
/// Rows are decoded lazily, one network payload at a time. The reader must
/// be driven to completion (`finish`, or `read`/`next_result` until both
/// return false) before the connection can run another command.
pub struct DataReader<'a> {
    conn: &'a mut Connection,
    columns: Arc<Vec<ColumnDefinition>>,
    binary: bool,
    current: Option<Row>,
    rows_read: u64,
    rows_skipped: u64,
    columns_accessed: Vec<bool>,
    /// Current result set exhausted.
    rows_done: bool,
    /// Whole command exhausted.
    finished: bool,
    deadline: Option<tokio::time::Instant>,
}

impl<'a> DataReader<'a> {
    /// Read the first response of a command and position before the first
    /// row. `binary` selects the prepared-statement row format.
    pub(crate) async fn init(
        conn: &'a mut Connection,
        binary: bool,
        deadline: Option<tokio::time::Instant>,
    ) -> Result<DataReader<'a>> {
        let mut reader = DataReader {
            conn,
            columns: Arc::new(Vec::new()),
            binary,
            current: None,
            rows_read: 0,
            rows_skipped: 0,
            columns_accessed: Vec::new(),
            rows_done: true,
            finished: false,
            deadline,
        };
        reader.read_result_head().await?;
        Ok(reader)
    }

    /// Column metadata of the current result set.
    #[must_use]
    pub fn columns(&self) -> &[ColumnDefinition] {
        &self.columns
    }

    /// Number of columns in the current result set.
    #[must_use]
    pub fn field_count(&self) -> usize {
        self.columns.len()
    }

    /// Ordinal of a column by name (case-insensitive).
    #[must_use]
    pub fn ordinal(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// The current row, if positioned on one.
    #[must_use]
    pub fn row(&self) -> Option<&Row> {
        self.current.as_ref()
    }

    /// Value of the current row at an ordinal, tracking column access for
    /// the usage advisor.
    #[must_use]
    pub fn get(&mut self, ordinal: usize) -> Option<&Value> {
        if let Some(slot) = self.columns_accessed.get_mut(ordinal) {
            *slot = true;
        }
        self.current.as_ref().and_then(|row| row.get(ordinal))
    }

    /// Advance to the next row. Returns false at the end of the result set.
    pub async fn read(&mut self) -> Result<bool> {
        if self.rows_done {
            self.current = None;
            return Ok(false);
        }
        let payload = self.recv().await?;
        match PacketType::classify(&payload) {
            PacketType::Eof => {
                let eof = EofPacket::decode(payload)?;
                self.conn.set_status(eof.status);
                self.rows_done = true;
                self.current = None;
                if !eof.more_results() {
                    self.finished = true;
                }
                self.close_result_set();
                Ok(false)
            }
            PacketType::Err => {
                self.rows_done = true;
                self.finished = true;
                Err(ErrPacket::decode(payload)?.into())
            }
            _ => {
                let values = if self.binary {
                    mysql_protocol::decode_binary_row(&self.columns, payload)?
                } else {
                    mysql_protocol::decode_text_row(&self.columns, payload)?
                };
                self.rows_read += 1;
                self.current = Some(Row {
                    columns: Arc::clone(&self.columns),
                    values,
                });
                Ok(true)
            }
        }
    }

    /// Skip the rest of the current result set and advance to the next one.
    /// Returns false when no further result set exists.
    pub async fn next_result(&mut self) -> Result<bool> {
        while !self.rows_done {
            let had_row = self.read().await?;
            if had_row {
                self.rows_skipped += 1;
                self.rows_read -= 1;
            }
        }
        if self.finished {
            return Ok(false);
        }
        self.read_result_head().await
    }

    /// Drain all remaining rows and result sets, leaving the connection
    /// ready for the next command.
    pub async fn finish(mut self) -> Result<()> {
        while self.next_result().await? {}
        instrumentation::query_closed();
        Ok(())
    }

    /// Chunked byte read from a BLOB/TEXT column of the current row.
    ///
    /// Copies up to `buf.len()` bytes starting at `data_offset`, returning
    /// the count actually copied (zero at or past the end).
    pub fn get_bytes(
        &mut self,
        ordinal: usize,
        data_offset: usize,
        buf: &mut [u8],
    ) -> Result<usize> {
        let value = self
            .get(ordinal)
            .ok_or_else(|| Error::Protocol(mysql_protocol::ProtocolError::MalformedRow(
                format!("no column at ordinal {ordinal}"),
            )))?;
        Ok(copy_bytes(value.as_bytes().unwrap_or(&[]), data_offset, buf))
    }

    /// Chunked character read from a TEXT column of the current row.
    ///
    /// Offsets count characters, not bytes.
    pub fn get_chars(
        &mut self,
        ordinal: usize,
        char_offset: usize,
        buf: &mut [char],
    ) -> Result<usize> {
        let value = self
            .get(ordinal)
            .ok_or_else(|| Error::Protocol(mysql_protocol::ProtocolError::MalformedRow(
                format!("no column at ordinal {ordinal}"),
            )))?;
        Ok(copy_chars(value.as_str().unwrap_or(""), char_offset, buf))
    }

    /// Read the head of the next result: an OK for row-less statements or a
    /// column count followed by definitions. Returns true when a row-bearing
    /// result set begins.
    async fn read_result_head(&mut self) -> Result<bool> {
        loop {
            let payload = self.recv().await?;
            match PacketType::classify(&payload) {
                PacketType::Ok => {
                    let ok = OkPacket::decode(payload)?;
                    let more = ok.more_results();
                    self.conn.apply_ok(&ok);
                    self.columns = Arc::new(Vec::new());
                    self.columns_accessed.clear();
                    self.rows_done = true;
                    if more {
                        // Row-less interim result; move on to the next one.
                        continue;
                    }
                    self.finished = true;
                    return Ok(false);
                }
                PacketType::Err => {
                    self.finished = true;
                    self.rows_done = true;
                    return Err(ErrPacket::decode(payload)?.into());
                }
                PacketType::LocalInfile => {
                    self.finished = true;
                    self.rows_done = true;
                    return Err(Error::Protocol(
                        mysql_protocol::ProtocolError::MalformedPacket(
                            "unexpected LOCAL INFILE request".into(),
                        ),
                    ));
                }
                _ => {
                    let mut head = payload;
                    let column_count = (&mut head)
                        .get_lenenc_int()?
                        .ok_or_else(|| {
                            mysql_protocol::ProtocolError::MalformedPacket(
                                "NULL column count".into(),
                            )
                        })? as usize;
                    let mut columns = Vec::with_capacity(column_count);
                    for _ in 0..column_count {
                        let def = self.recv().await?;
                        columns.push(ColumnDefinition::decode(def)?);
                    }
                    // Definitions are terminated by EOF.
                    let eof = self.recv().await?;
                    if PacketType::classify(&eof) != PacketType::Eof {
                        return Err(Error::Protocol(
                            mysql_protocol::ProtocolError::MalformedPacket(
                                "missing EOF after column definitions".into(),
                            ),
                        ));
                    }
                    self.columns = Arc::new(columns);
                    self.columns_accessed = vec![false; column_count];
                    self.rows_done = false;
                    self.rows_read = 0;
                    self.rows_skipped = 0;
                    instrumentation::resultset_opened(
                        column_count,
                        self.conn.affected_rows(),
                        self.conn.last_insert_id(),
                    );
                    return Ok(true);
                }
            }
        }
    }

    fn close_result_set(&mut self) {
        if self.conn.settings_internal().use_usage_advisor {
            let accessed = self.columns_accessed.iter().filter(|a| **a).count();
            instrumentation::usage_advisor(
                self.conn.status(),
                self.rows_read,
                self.rows_skipped,
                accessed,
                self.columns.len(),
            );
        }
        instrumentation::resultset_closed(self.rows_read, self.rows_skipped);
    }

    async fn recv(&mut self) -> Result<Bytes> {
        match self.conn.recv_deadline(self.deadline).await {
            Ok(payload) => Ok(payload),
            Err(Error::CommandTimeout) => {
                crate::cancel::recover_after_timeout(self.conn).await;
                self.rows_done = true;
                self.finished = true;
                Err(Error::CommandTimeout)
            }
            Err(err) => Err(err),
        }
    }
}

/// Copy from `data` starting at `offset` into `buf`; zero at or past the end.
fn copy_bytes(data: &[u8], offset: usize, buf: &mut [u8]) -> usize {
    if offset >= data.len() {
        return 0;
    }
    let available = &data[offset..];
    let count = available.len().min(buf.len());
    buf[..count].copy_from_slice(&available[..count]);
    count
}

/// Copy characters from `text` starting at character `offset` into `buf`.
fn copy_chars(text: &str, offset: usize, buf: &mut [char]) -> usize {
    let mut count = 0;
    for (slot, c) in buf.iter_mut().zip(text.chars().skip(offset)) {
        *slot = c;
        count += 1;
    }
    count
}

impl std::fmt::Debug for DataReader<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataReader")
            .field("fields", &self.columns.len())
            .field("rows_read", &self.rows_read)
            .field("finished", &self.finished)
            .finish()
    }
}
