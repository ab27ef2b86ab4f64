//! Query lifecycle instrumentation.
//!
//! Structured `tracing` events for query execution, result-set consumption
//! and usage-advisor warnings. Subscribers decide what to keep; nothing here
//! is load-bearing for execution.

use mysql_protocol::{SqlTokenizer, StatusFlags};

/// Literals longer than this are truncated in logged SQL.
const MAX_LOGGED_LITERAL: usize = 64;

/// Shorten long quoted literals so logged SQL stays readable and does not
/// leak bulk payloads.
#[must_use]
pub fn sanitize_sql(sql: &str) -> String {
    let mut tokenizer = SqlTokenizer::new(sql);
    tokenizer.return_comments = true;
    let mut out = String::with_capacity(sql.len().min(1024));
    let mut last = 0;
    while let Some(token) = tokenizer.next_token() {
        out.push_str(&sql[last..tokenizer.start_index()]);
        if tokenizer.quoted() && token.len() > MAX_LOGGED_LITERAL {
            out.push_str(&token[..MAX_LOGGED_LITERAL]);
            out.push_str("…[truncated]");
        } else {
            out.push_str(token);
        }
        last = tokenizer.stop_index();
    }
    out.push_str(&sql[last..]);
    out
}

/// A query round trip has started.
pub fn query_opened(sql: &str, prepared: bool) {
    tracing::debug!(sql = %sanitize_sql(sql), prepared = prepared, "query opened");
}

/// A result set header has been read.
pub fn resultset_opened(fields: usize, affected_rows: u64, last_insert_id: u64) {
    tracing::debug!(
        fields = fields,
        affected_rows = affected_rows,
        last_insert_id = last_insert_id,
        "resultset opened"
    );
}

/// Usage-advisor findings for a finished result set.
///
/// Only emitted when the connection enables the advisor.
pub fn usage_advisor(
    status: StatusFlags,
    rows_read: u64,
    rows_skipped: u64,
    columns_accessed: usize,
    total_columns: usize,
) {
    if status.contains(StatusFlags::NO_INDEX_USED) {
        tracing::warn!("usage advisor: query used no index");
    }
    if status.contains(StatusFlags::NO_GOOD_INDEX_USED) {
        tracing::warn!("usage advisor: query used a bad index");
    }
    if rows_skipped > 0 {
        tracing::warn!(
            rows_read = rows_read,
            rows_skipped = rows_skipped,
            "usage advisor: result rows were skipped"
        );
    }
    if total_columns > 0 && columns_accessed < total_columns {
        tracing::warn!(
            columns_accessed = columns_accessed,
            total_columns = total_columns,
            "usage advisor: not all columns were accessed"
        );
    }
}

/// A result set has been fully consumed or abandoned.
pub fn resultset_closed(rows_read: u64, rows_skipped: u64) {
    tracing::debug!(
        rows_read = rows_read,
        rows_skipped = rows_skipped,
        "resultset closed"
    );
}

/// The query round trip has completed.
pub fn query_closed() {
    tracing::debug!("query closed");
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_preserves_short_sql() {
        let sql = "SELECT * FROM t WHERE name = 'bob' -- note";
        assert_eq!(sanitize_sql(sql), sql);
    }

    #[test]
    fn test_sanitize_truncates_long_literal() {
        let blob = "x".repeat(500);
        let sql = format!("INSERT INTO t VALUES ('{blob}')");
        let cleaned = sanitize_sql(&sql);
        assert!(cleaned.len() < sql.len());
        assert!(cleaned.contains("[truncated]"));
        assert!(cleaned.starts_with("INSERT INTO t VALUES ("));
    }
}
