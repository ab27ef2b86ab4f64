//! Multi-statement script execution.
//!
//! Splits a script into individual statements with the tokenizer, so
//! delimiters inside string literals, quoted identifiers and comments never
//! count. Supports mid-script `DELIMITER` directives the way the `mysql`
//! command-line tool does.

use crate::connection::Connection;
use crate::error::{Error, Result};

/// One statement extracted from a script, with its delimiter stripped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptStatement {
    /// Statement text, trimmed, without the trailing delimiter.
    pub text: String,
    /// Zero-based line on which the statement starts.
    pub line: usize,
}

/// Callback invoked after each statement executes successfully.
pub type StatementCallback = Box<dyn FnMut(&ScriptStatement) + Send>;

/// Callback invoked when a statement fails; return true to continue with
/// the remaining statements.
pub type ErrorCallback = Box<dyn FnMut(&Error) -> bool + Send>;

/// Executes a script of multiple statements over one connection.
pub struct ScriptRunner {
    sql: String,
    delimiter: String,
    on_statement: Option<StatementCallback>,
    on_error: Option<ErrorCallback>,
}

impl ScriptRunner {
    /// Create a runner with the default `;` delimiter.
    #[must_use]
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            delimiter: ";".to_string(),
            on_statement: None,
            on_error: None,
        }
    }

    /// Set the initial statement delimiter.
    #[must_use]
    pub fn delimiter(mut self, delimiter: impl Into<String>) -> Self {
        self.delimiter = delimiter.into();
        self
    }

    /// Observe each statement after it executes successfully. Failing
    /// statements are reported through [`Self::on_error`] instead.
    #[must_use]
    pub fn on_statement(mut self, callback: StatementCallback) -> Self {
        self.on_statement = Some(callback);
        self
    }

    /// Decide whether to continue after a statement fails. Without a
    /// callback the first error stops the script.
    #[must_use]
    pub fn on_error(mut self, callback: ErrorCallback) -> Self {
        self.on_error = Some(callback);
        self
    }

    /// The statements this script splits into, without executing them.
    #[must_use]
    pub fn statements(&self) -> Vec<ScriptStatement> {
        break_into_statements(&self.sql, &self.delimiter)
    }

    /// Execute every statement in order. Returns the number of statements
    /// that executed successfully.
    pub async fn execute(&mut self, conn: &mut Connection) -> Result<usize> {
        self.run(conn).await
    }

    async fn run<E: StatementExecutor>(&mut self, exec: &mut E) -> Result<usize> {
        let statements = break_into_statements(&self.sql, &self.delimiter);
        let total = statements.len();
        let mut executed = 0;
        for statement in statements {
            match exec.execute_statement(&statement.text).await {
                Ok(()) => {
                    executed += 1;
                    if let Some(callback) = self.on_statement.as_mut() {
                        callback(&statement);
                    }
                }
                Err(err) => {
                    tracing::debug!(
                        line = statement.line,
                        error = %err,
                        "script statement failed"
                    );
                    let resume = !err.is_fatal()
                        && self.on_error.as_mut().is_some_and(|cb| cb(&err));
                    if !resume {
                        return Err(err);
                    }
                }
            }
        }
        tracing::debug!(executed = executed, total = total, "script finished");
        Ok(executed)
    }
}

trait StatementExecutor {
    async fn execute_statement(&mut self, sql: &str) -> Result<()>;
}

impl StatementExecutor for Connection {
    async fn execute_statement(&mut self, sql: &str) -> Result<()> {
        self.query_drop(sql).await
    }
}

impl std::fmt::Debug for ScriptRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptRunner")
            .field("delimiter", &self.delimiter)
            .field("len", &self.sql.len())
            .finish()
    }
}

/// Split a script into statements, honoring quoting, comments and
/// `DELIMITER` directives.
#[must_use]
pub fn break_into_statements(sql: &str, initial_delimiter: &str) -> Vec<ScriptStatement> {
    let mut delimiter = initial_delimiter.to_string();
    let mut statements = Vec::new();
    let mut tokenizer = mysql_protocol::SqlTokenizer::new(sql);
    tokenizer.return_comments = true;
    // Byte offset where the current statement starts.
    let mut start = 0;

    while let Some(token) = tokenizer.next_token() {
        if tokenizer.quoted() || tokenizer.is_comment() {
            continue;
        }
        let token_start = tokenizer.start_index();

        // A DELIMITER directive is client-side only and must be the first
        // thing on its line. The rest of the line names the new delimiter.
        if token.eq_ignore_ascii_case("DELIMITER") && starts_line(sql, token_start) {
            push_statement(&mut statements, sql, start, token_start);
            let line_end = sql[tokenizer.stop_index()..]
                .find('\n')
                .map_or(sql.len(), |p| tokenizer.stop_index() + p);
            let new_delimiter = sql[tokenizer.stop_index()..line_end].trim();
            if !new_delimiter.is_empty() {
                delimiter = new_delimiter.to_string();
            }
            tokenizer.set_position(line_end);
            tokenizer.set_stop_index(line_end);
            start = line_end;
            continue;
        }

        if token.eq_ignore_ascii_case(&delimiter) {
            push_statement(&mut statements, sql, start, token_start);
            start = tokenizer.stop_index();
        } else if delimiter.len() > token.len()
            && delimiter[..token.len()].eq_ignore_ascii_case(token)
            && sql.len() >= token_start + delimiter.len()
            && sql[token_start..token_start + delimiter.len()]
                .eq_ignore_ascii_case(&delimiter)
        {
            // Multi-character delimiter split across tokens (e.g. `//`).
            push_statement(&mut statements, sql, start, token_start);
            start = token_start + delimiter.len();
            tokenizer.set_position(start);
            tokenizer.set_stop_index(start);
        } else if token.len() > delimiter.len()
            && token[token.len() - delimiter.len()..].eq_ignore_ascii_case(&delimiter)
        {
            // Delimiter glued to the end of a word (e.g. `END$$`).
            let split = tokenizer.stop_index() - delimiter.len();
            push_statement(&mut statements, sql, start, split);
            start = tokenizer.stop_index();
        }
    }

    push_statement(&mut statements, sql, start, sql.len());
    statements
}

fn push_statement(statements: &mut Vec<ScriptStatement>, sql: &str, start: usize, end: usize) {
    let text = sql[start..end].trim();
    if text.is_empty() {
        return;
    }
    let lead = sql[start..end].len() - sql[start..end].trim_start().len();
    let line = sql[..start + lead].matches('\n').count();
    statements.push(ScriptStatement {
        text: text.to_string(),
        line,
    });
}

/// Whether only whitespace precedes `index` on its line.
fn starts_line(sql: &str, index: usize) -> bool {
    let line_start = sql[..index].rfind('\n').map_or(0, |p| p + 1);
    sql[line_start..index].trim().is_empty()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn texts(sql: &str) -> Vec<String> {
        break_into_statements(sql, ";")
            .into_iter()
            .map(|s| s.text)
            .collect()
    }

    #[test]
    fn test_basic_split() {
        assert_eq!(
            texts("SELECT 1; SELECT 2;\nSELECT 3"),
            vec!["SELECT 1", "SELECT 2", "SELECT 3"]
        );
    }

    #[test]
    fn test_empty_statements_skipped() {
        assert_eq!(texts(";;  ;\nSELECT 1;;"), vec!["SELECT 1"]);
    }

    #[test]
    fn test_delimiter_in_literal_ignored() {
        assert_eq!(
            texts("INSERT INTO t VALUES ('a;b'); SELECT 1"),
            vec!["INSERT INTO t VALUES ('a;b')", "SELECT 1"]
        );
    }

    #[test]
    fn test_delimiter_in_comment_ignored() {
        assert_eq!(
            texts("SELECT 1 -- trailing; comment\n; SELECT 2"),
            vec!["SELECT 1 -- trailing; comment", "SELECT 2"]
        );
    }

    #[test]
    fn test_delimiter_directive() {
        let sql = "DELIMITER //\nCREATE PROCEDURE p()\nBEGIN\n  SELECT 1;\nEND//\nDELIMITER ;\nSELECT 2;";
        let got = texts(sql);
        assert_eq!(
            got,
            vec![
                "CREATE PROCEDURE p()\nBEGIN\n  SELECT 1;\nEND",
                "SELECT 2"
            ]
        );
    }

    #[test]
    fn test_delimiter_directive_case_insensitive() {
        let got = texts("delimiter $$\nSELECT 1$$");
        assert_eq!(got, vec!["SELECT 1"]);
    }

    #[test]
    fn test_delimiter_glued_to_word() {
        let statements = break_into_statements("SELECT 1$$ SELECT 2$$", "$$");
        let got: Vec<_> = statements.into_iter().map(|s| s.text).collect();
        assert_eq!(got, vec!["SELECT 1", "SELECT 2"]);
    }

    #[test]
    fn test_delimiter_keyword_mid_line_is_not_directive() {
        // Not at line start, so it is just a word in the statement.
        assert_eq!(
            texts("SELECT 'x' AS delimiter; SELECT 2"),
            vec!["SELECT 'x' AS delimiter", "SELECT 2"]
        );
    }

    #[test]
    fn test_statement_lines() {
        let statements = break_into_statements("SELECT 1;\n\nSELECT 2;", ";");
        assert_eq!(statements[0].line, 0);
        assert_eq!(statements[1].line, 2);
    }

    #[test]
    fn test_trailing_statement_without_delimiter() {
        assert_eq!(texts("SELECT 1"), vec!["SELECT 1"]);
    }

    /// Executor that fails on any statement containing `FAIL`.
    struct RecordingExecutor {
        seen: Vec<String>,
    }

    impl StatementExecutor for RecordingExecutor {
        async fn execute_statement(&mut self, sql: &str) -> Result<()> {
            self.seen.push(sql.to_string());
            if sql.contains("FAIL") {
                return Err(Error::Server {
                    code: 1064,
                    sql_state: "42000".to_string(),
                    message: "syntax error".to_string(),
                });
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_callback_fires_after_success_only() {
        use std::sync::{Arc, Mutex};

        let notified = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&notified);
        let mut runner = ScriptRunner::new("SELECT 1; SELECT FAIL; SELECT 2;")
            .on_statement(Box::new(move |s| sink.lock().unwrap().push(s.text.clone())))
            .on_error(Box::new(|_| true));
        let mut exec = RecordingExecutor { seen: Vec::new() };

        let executed = runner.run(&mut exec).await.unwrap();
        assert_eq!(executed, 2);
        assert_eq!(exec.seen.len(), 3);
        assert_eq!(*notified.lock().unwrap(), vec!["SELECT 1", "SELECT 2"]);
    }

    #[tokio::test]
    async fn test_error_without_callback_stops_script() {
        let mut runner = ScriptRunner::new("SELECT FAIL; SELECT 1;");
        let mut exec = RecordingExecutor { seen: Vec::new() };

        let err = runner.run(&mut exec).await.unwrap_err();
        assert!(err.is_server_error(1064));
        assert_eq!(exec.seen, vec!["SELECT FAIL"]);
    }

    #[tokio::test]
    async fn test_error_callback_false_stops_script() {
        let mut runner = ScriptRunner::new("SELECT 1; SELECT FAIL; SELECT 2;")
            .on_error(Box::new(|_| false));
        let mut exec = RecordingExecutor { seen: Vec::new() };

        assert!(runner.run(&mut exec).await.is_err());
        assert_eq!(exec.seen, vec!["SELECT 1", "SELECT FAIL"]);
    }
}
