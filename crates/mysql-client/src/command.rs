//! Command execution: text protocol, prepared statements, stored procedures.

use std::collections::HashMap;
use std::time::Duration;

use bytes::Buf;
use mysql_protocol::column::ColumnDefinition;
use mysql_protocol::quoting::escape_string_literal;
use mysql_protocol::response::ErrPacket;
use mysql_protocol::{command, PacketType, SqlTokenizer, Value};

use crate::connection::Connection;
use crate::error::{Error, Result};
use crate::instrumentation;
use crate::reader::DataReader;

/// Stored-procedure parameter direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamDirection {
    /// Input only.
    In,
    /// Output only.
    Out,
    /// Input and output.
    InOut,
}

/// A SQL command with named parameters and an optional timeout override.
#[derive(Debug, Clone)]
pub struct Command {
    sql: String,
    params: Vec<(String, Value)>,
    timeout: Option<Duration>,
}

impl Command {
    /// Create a command from SQL text.
    ///
    /// Parameters are written `@name` or `?name`; `@@name` is a system
    /// variable and never a parameter.
    #[must_use]
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
            timeout: None,
        }
    }

    /// Bind a parameter by name (without the `@`/`?` prefix).
    #[must_use]
    pub fn param(mut self, name: impl Into<String>, value: Value) -> Self {
        self.params.push((name.into(), value));
        self
    }

    /// Override the connection's default command timeout.
    /// `Duration::ZERO` means no timeout.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// The SQL text.
    #[must_use]
    pub fn sql(&self) -> &str {
        &self.sql
    }

    fn deadline(&self, conn: &Connection) -> Option<tokio::time::Instant> {
        let timeout = self
            .timeout
            .unwrap_or(conn.settings_internal().default_command_timeout);
        if timeout.is_zero() {
            None
        } else {
            Some(tokio::time::Instant::now() + timeout)
        }
    }

    /// Execute via the text protocol and return a forward-only reader.
    pub async fn execute_reader<'a>(
        &self,
        conn: &'a mut Connection,
    ) -> Result<DataReader<'a>> {
        let bound = bind_text(
            &self.sql,
            &self.params,
            conn.settings_internal().allow_user_variables,
        )?;
        instrumentation::query_opened(&bound, false);
        let deadline = self.deadline(conn);
        conn.send_command(command::query(&bound)).await?;
        DataReader::init(conn, false, deadline).await
    }

    /// Execute a statement that returns no rows; returns the real
    /// affected-row count (zero when nothing matched).
    pub async fn execute_non_query(&self, conn: &mut Connection) -> Result<u64> {
        let mut reader = self.execute_reader(conn).await?;
        while reader.next_result().await? {}
        instrumentation::query_closed();
        Ok(conn.affected_rows())
    }

    /// Execute and return the first column of the first row, if any.
    pub async fn execute_scalar(&self, conn: &mut Connection) -> Result<Option<Value>> {
        let mut reader = self.execute_reader(conn).await?;
        let mut scalar = None;
        if reader.read().await? {
            scalar = reader.get(0).cloned();
        }
        reader.finish().await?;
        Ok(scalar)
    }

    /// Prepare this command's SQL, returning a reusable statement handle.
    ///
    /// Named parameters are rewritten to positional markers; bind values in
    /// the recorded order on execute.
    pub async fn prepare(&self, conn: &mut Connection) -> Result<Statement> {
        let (rewritten, names) = positional_rewrite(&self.sql);
        Statement::prepare_rewritten(conn, rewritten, names).await
    }

    /// Prepare, bind the named parameters, and return a binary-protocol
    /// reader. One-shot convenience over [`Command::prepare`].
    pub async fn execute_prepared<'a>(
        &self,
        conn: &'a mut Connection,
    ) -> Result<DataReader<'a>> {
        let deadline = self.deadline(conn);
        let statement = self.prepare(conn).await?;
        let values = statement.bind_named(&self.params)?;
        instrumentation::query_opened(&self.sql, true);
        conn.send_command(command::stmt_execute(statement.id(), &values))
            .await?;
        DataReader::init(conn, true, deadline).await
    }
}

/// A server-side prepared statement.
#[derive(Debug, Clone)]
pub struct Statement {
    id: u32,
    param_names: Vec<String>,
    columns: Vec<ColumnDefinition>,
}

impl Statement {
    /// Prepare SQL that already uses positional `?` markers.
    pub async fn prepare(conn: &mut Connection, sql: &str) -> Result<Self> {
        let (rewritten, names) = positional_rewrite(sql);
        Self::prepare_rewritten(conn, rewritten, names).await
    }

    async fn prepare_rewritten(
        conn: &mut Connection,
        sql: String,
        param_names: Vec<String>,
    ) -> Result<Self> {
        conn.send_command(command::stmt_prepare(&sql)).await?;
        let mut head = conn.recv().await?;
        if PacketType::classify(&head) == PacketType::Err {
            return Err(ErrPacket::decode(head)?.into());
        }
        if head.remaining() < 10 {
            return Err(Error::Protocol(
                mysql_protocol::ProtocolError::MalformedPacket(
                    "short prepare response".into(),
                ),
            ));
        }
        head.advance(1); // 0x00 status
        let id = head.get_u32_le();
        let column_count = head.get_u16_le();
        let param_count = head.get_u16_le();

        // Parameter definitions, then column definitions, each EOF-terminated.
        if param_count > 0 {
            for _ in 0..param_count {
                let def = conn.recv().await?;
                ColumnDefinition::decode(def)?;
            }
            expect_eof(conn).await?;
        }
        let mut columns = Vec::with_capacity(column_count as usize);
        if column_count > 0 {
            for _ in 0..column_count {
                let def = conn.recv().await?;
                columns.push(ColumnDefinition::decode(def)?);
            }
            expect_eof(conn).await?;
        }

        if param_names.len() != param_count as usize {
            tracing::debug!(
                discovered = param_names.len(),
                server = param_count,
                "parameter count mismatch between tokenizer and server"
            );
        }

        Ok(Self {
            id,
            param_names,
            columns,
        })
    }

    /// Server-assigned statement id.
    #[must_use]
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Result column metadata reported at prepare time.
    #[must_use]
    pub fn columns(&self) -> &[ColumnDefinition] {
        &self.columns
    }

    /// Parameter names in positional order.
    #[must_use]
    pub fn param_names(&self) -> &[String] {
        &self.param_names
    }

    /// Execute with positional values, returning a binary-protocol reader.
    pub async fn execute_reader<'a>(
        &self,
        conn: &'a mut Connection,
        values: &[Value],
    ) -> Result<DataReader<'a>> {
        let deadline = if conn.settings_internal().default_command_timeout.is_zero() {
            None
        } else {
            Some(tokio::time::Instant::now() + conn.settings_internal().default_command_timeout)
        };
        conn.send_command(command::stmt_execute(self.id, values))
            .await?;
        DataReader::init(conn, true, deadline).await
    }

    /// Execute with positional values and return the affected-row count.
    pub async fn execute_non_query(
        &self,
        conn: &mut Connection,
        values: &[Value],
    ) -> Result<u64> {
        let mut reader = self.execute_reader(conn, values).await?;
        while reader.next_result().await? {}
        Ok(conn.affected_rows())
    }

    /// Close the statement on the server. Fire-and-forget per protocol.
    pub async fn close(self, conn: &mut Connection) -> Result<()> {
        conn.send_command(command::stmt_close(self.id)).await
    }

    /// Order named values to match this statement's positional parameters.
    fn bind_named(&self, params: &[(String, Value)]) -> Result<Vec<Value>> {
        self.param_names
            .iter()
            .map(|name| {
                lookup(params, name).cloned().ok_or_else(|| {
                    Error::UndefinedParameter { name: name.clone() }
                })
            })
            .collect()
    }
}

/// A parameter derived from stored-procedure metadata.
#[derive(Debug, Clone)]
pub struct DerivedParameter {
    /// Parameter name as declared.
    pub name: String,
    /// Direction.
    pub direction: ParamDirection,
    /// Declared SQL data type.
    pub data_type: String,
}

/// Derive a procedure's parameters from `information_schema.parameters`.
pub async fn derive_parameters(
    conn: &mut Connection,
    procedure: &str,
) -> Result<Vec<DerivedParameter>> {
    let cmd = Command::new(
        "SELECT parameter_name, parameter_mode, data_type \
         FROM information_schema.parameters \
         WHERE specific_schema = DATABASE() AND specific_name = @proc \
         AND parameter_name IS NOT NULL \
         ORDER BY ordinal_position",
    )
    .param("proc", Value::Text(procedure.to_string()));

    let mut reader = cmd.execute_reader(conn).await?;
    let mut derived = Vec::new();
    while reader.read().await? {
        let name = reader.get(0).and_then(Value::as_str).unwrap_or("").to_string();
        let direction = match reader.get(1).and_then(Value::as_str) {
            Some("OUT") => ParamDirection::Out,
            Some("INOUT") => ParamDirection::InOut,
            _ => ParamDirection::In,
        };
        let data_type = reader.get(2).and_then(Value::as_str).unwrap_or("").to_string();
        derived.push(DerivedParameter {
            name,
            direction,
            data_type,
        });
    }
    reader.finish().await?;
    Ok(derived)
}

/// One argument to a stored-procedure call.
#[derive(Debug, Clone)]
pub struct CallParam {
    /// Parameter name.
    pub name: String,
    /// Input value (ignored for `Out`).
    pub value: Value,
    /// Direction.
    pub direction: ParamDirection,
}

/// Call a stored procedure, routing OUT/INOUT parameters through session
/// user variables and reading them back from an implicit trailing SELECT.
///
/// Returns the OUT/INOUT values by parameter name.
pub async fn execute_call(
    conn: &mut Connection,
    procedure: &str,
    params: &[CallParam],
) -> Result<HashMap<String, Value>> {
    // Seed user variables for INOUT inputs.
    for param in params {
        if param.direction == ParamDirection::InOut {
            let var = user_variable(&param.name);
            conn.query_drop(&format!("SET {var} = {}", literal(&param.value)))
                .await?;
        }
    }

    let args: Vec<String> = params
        .iter()
        .map(|param| match param.direction {
            ParamDirection::In => literal(&param.value),
            ParamDirection::Out | ParamDirection::InOut => user_variable(&param.name),
        })
        .collect();
    let call = format!(
        "CALL {}({})",
        mysql_protocol::quote_identifier(procedure),
        args.join(", ")
    );
    conn.query_drop(&call).await?;

    let outputs: Vec<&CallParam> = params
        .iter()
        .filter(|p| p.direction != ParamDirection::In)
        .collect();
    let mut values = HashMap::new();
    if !outputs.is_empty() {
        let select = format!(
            "SELECT {}",
            outputs
                .iter()
                .map(|p| user_variable(&p.name))
                .collect::<Vec<_>>()
                .join(", ")
        );
        let mut reader = Command::new(select).execute_reader(conn).await?;
        if reader.read().await? {
            for (i, param) in outputs.iter().enumerate() {
                if let Some(value) = reader.get(i) {
                    values.insert(param.name.clone(), value.clone());
                }
            }
        }
        reader.finish().await?;
    }
    Ok(values)
}

async fn expect_eof(conn: &mut Connection) -> Result<()> {
    let eof = conn.recv().await?;
    if PacketType::classify(&eof) != PacketType::Eof {
        return Err(Error::Protocol(
            mysql_protocol::ProtocolError::MalformedPacket(
                "missing EOF in prepare response".into(),
            ),
        ));
    }
    Ok(())
}

fn user_variable(name: &str) -> String {
    format!("@_drv_{}", name.trim_start_matches('@'))
}

fn lookup<'a>(params: &'a [(String, Value)], name: &str) -> Option<&'a Value> {
    params
        .iter()
        .rev()
        .find(|(n, _)| n.eq_ignore_ascii_case(name))
        .map(|(_, v)| v)
}

/// Format a value as an invariant SQL literal for text-protocol inlining.
#[must_use]
pub fn literal(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Int(v) => v.to_string(),
        Value::UInt(v) => v.to_string(),
        Value::Float(v) => format!("{v:?}"),
        Value::Double(v) => format!("{v:?}"),
        Value::Decimal(v) => v.to_string(),
        Value::Text(v) => escape_string_literal(v),
        Value::Bytes(v) => {
            let mut hex = String::with_capacity(v.len() * 2 + 3);
            hex.push_str("X'");
            for byte in v.iter() {
                use std::fmt::Write;
                let _ = write!(hex, "{byte:02X}");
            }
            hex.push('\'');
            hex
        }
        Value::Date(v) => format!("'{}'", v.format("%Y-%m-%d")),
        Value::Time(v) => format!("'{}'", v.format("%H:%M:%S%.6f")),
        Value::DateTime(v) => format!("'{}'", v.format("%Y-%m-%d %H:%M:%S%.6f")),
    }
}

/// Inline named parameters into SQL text as escaped literals.
///
/// Quoted spans and comments pass through untouched; `@@` system variables
/// are never parameters. Unknown `@` tokens pass through only when user
/// variables are allowed.
fn bind_text(
    sql: &str,
    params: &[(String, Value)],
    allow_user_variables: bool,
) -> Result<String> {
    let mut tokenizer = SqlTokenizer::new(sql);
    tokenizer.return_comments = true;
    let mut out = String::with_capacity(sql.len());
    let mut last = 0;
    while let Some(token) = tokenizer.next_token() {
        out.push_str(&sql[last..tokenizer.start_index()]);
        if !tokenizer.quoted() && !tokenizer.is_comment() && SqlTokenizer::is_parameter(token) {
            let name = &token[1..];
            match lookup(params, name) {
                Some(value) => out.push_str(&literal(value)),
                None if token.starts_with('@') && allow_user_variables => {
                    out.push_str(token);
                }
                None => {
                    return Err(Error::UndefinedParameter {
                        name: token.to_string(),
                    });
                }
            }
        } else {
            out.push_str(token);
        }
        last = tokenizer.stop_index();
    }
    out.push_str(&sql[last..]);
    Ok(out)
}

/// Rewrite named parameter tokens to positional `?` markers, returning the
/// names in positional order.
fn positional_rewrite(sql: &str) -> (String, Vec<String>) {
    let mut tokenizer = SqlTokenizer::new(sql);
    tokenizer.return_comments = true;
    let mut out = String::with_capacity(sql.len());
    let mut names = Vec::new();
    let mut last = 0;
    while let Some(token) = tokenizer.next_token() {
        out.push_str(&sql[last..tokenizer.start_index()]);
        if !tokenizer.quoted() && !tokenizer.is_comment() && SqlTokenizer::is_parameter(token) {
            let name = token[1..].to_string();
            names.push(if name.is_empty() {
                names.len().to_string()
            } else {
                name
            });
            out.push('?');
        } else {
            out.push_str(token);
        }
        last = tokenizer.stop_index();
    }
    out.push_str(&sql[last..]);
    (out, names)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::NaiveDate;
    use rust_decimal::Decimal;
    use std::str::FromStr;

    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_literal_formats() {
        assert_eq!(literal(&Value::Null), "NULL");
        assert_eq!(literal(&Value::Int(-3)), "-3");
        assert_eq!(literal(&Value::Text("it's".into())), "'it''s'");
        assert_eq!(
            literal(&Value::Bytes(bytes::Bytes::from_static(&[0xAB, 0x01]))),
            "X'AB01'"
        );
        assert_eq!(
            literal(&Value::Decimal(Decimal::from_str("12.3400").unwrap())),
            "12.3400"
        );
        assert_eq!(
            literal(&Value::Date(
                NaiveDate::from_ymd_opt(2024, 3, 9).unwrap()
            )),
            "'2024-03-09'"
        );
    }

    #[test]
    fn test_literal_float_keeps_decimal_point() {
        assert_eq!(literal(&Value::Double(1.0)), "1.0");
    }

    #[test]
    fn test_bind_text_inlines_parameters() {
        let params = vec![
            ("id".to_string(), Value::Int(7)),
            ("name".to_string(), Value::Text("bo'b".into())),
        ];
        let bound = bind_text(
            "SELECT * FROM t WHERE id=@id AND name=?name",
            &params,
            false,
        )
        .unwrap();
        assert_eq!(bound, "SELECT * FROM t WHERE id=7 AND name='bo''b'");
    }

    #[test]
    fn test_bind_text_ignores_quoted_and_system_vars() {
        let params = vec![("id".to_string(), Value::Int(1))];
        let bound = bind_text(
            "SELECT '@id', @@version, `@id` FROM t WHERE id=@id",
            &params,
            false,
        )
        .unwrap();
        assert_eq!(bound, "SELECT '@id', @@version, `@id` FROM t WHERE id=1");
    }

    #[test]
    fn test_bind_text_comment_passthrough() {
        let bound = bind_text("SELECT 1 -- @id is not here\n", &[], false).unwrap();
        assert_eq!(bound, "SELECT 1 -- @id is not here\n");
    }

    #[test]
    fn test_bind_text_undefined_parameter() {
        let err = bind_text("SELECT @missing", &[], false).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UndefinedParameter);

        // With user variables allowed the token passes through.
        let bound = bind_text("SELECT @missing", &[], true).unwrap();
        assert_eq!(bound, "SELECT @missing");
    }

    #[test]
    fn test_bind_text_last_binding_wins() {
        let params = vec![
            ("id".to_string(), Value::Int(1)),
            ("id".to_string(), Value::Int(2)),
        ];
        assert_eq!(bind_text("SELECT @id", &params, false).unwrap(), "SELECT 2");
    }

    #[test]
    fn test_positional_rewrite() {
        let (sql, names) = positional_rewrite("UPDATE t SET a=@a, b=?b WHERE id=@id");
        assert_eq!(sql, "UPDATE t SET a=?, b=? WHERE id=?");
        assert_eq!(names, vec!["a", "b", "id"]);
    }

    #[test]
    fn test_user_variable_naming() {
        assert_eq!(user_variable("total"), "@_drv_total");
        assert_eq!(user_variable("@total"), "@_drv_total");
    }
}
